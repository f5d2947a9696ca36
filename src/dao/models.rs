use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Registered player as known by the player directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    /// External identifier supplied by the chat front-end.
    pub player_id: i64,
    /// First name, when shared.
    pub first_name: Option<String>,
    /// Last name, when shared.
    pub last_name: Option<String>,
    /// Handle, when shared.
    pub user_name: Option<String>,
    /// Registration timestamp.
    pub registered_at: SystemTime,
}

/// Persisted state of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Public session code (`GAME_<millis>`).
    pub session_code: String,
    /// Phase name (`cardSelection`, `gameRoom`, `ended`).
    pub phase: String,
    /// Number of phase transitions applied.
    pub phase_version: usize,
    /// Remaining countdown seconds.
    pub countdown: u32,
    /// Whether numbers are currently being called.
    pub game_active: bool,
    /// Drawn numbers in call order.
    pub called_numbers: Vec<u8>,
    /// Last drawn number.
    pub current_call: Option<u8>,
    /// Player session that won the round.
    pub winner_player_session_id: Option<Uuid>,
    /// Why the round ended.
    pub end_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the record was written.
    pub updated_at: SystemTime,
    /// When the round ended.
    pub ended_at: Option<SystemTime>,
}

/// Persisted participation of one player in one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSessionEntity {
    /// Primary key of the participation record.
    pub id: Uuid,
    /// Session this record belongs to.
    pub session_id: Uuid,
    /// Owning player.
    pub player: PlayerRecord,
    /// Reserved card code.
    pub selected_card_code: Option<u32>,
    /// Card numbers as a JSON array of rows.
    pub card_numbers_json: Option<String>,
    /// Whether the player won the round.
    pub is_winner: bool,
    /// Whether a claim from this player was rejected.
    pub claim_rejected: bool,
    /// First join timestamp.
    pub joined_at: SystemTime,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}
