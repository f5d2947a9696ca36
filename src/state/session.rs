use std::{collections::BTreeSet, time::SystemTime};

use uuid::Uuid;

use crate::{
    dao::models::{PlayerRecord, PlayerSessionEntity, SessionEntity},
    error::ServiceError,
    state::{
        card::{CardGrid, MAX_NUMBER},
        state_machine::{EndReason, SessionLifecycle, SessionPhase},
    },
};

/// One round of Bingo, owned by its session actor.
#[derive(Debug, Clone)]
pub struct Session {
    /// Primary key of the session.
    pub id: Uuid,
    /// Public session code.
    pub code: String,
    /// Phase tracker.
    pub lifecycle: SessionLifecycle,
    /// Seconds left in the join window; only meaningful in card selection.
    pub countdown: u32,
    /// Whether numbers are being called.
    pub game_active: bool,
    /// Drawn numbers.
    pub called_numbers: BTreeSet<u8>,
    /// Drawn numbers in call order; same membership as `called_numbers` until the round ends.
    pub called_numbers_ordered: Vec<u8>,
    /// Last drawn number.
    pub current_call: Option<u8>,
    /// Winning player session.
    pub winner: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
    /// When the round ended.
    pub ended_at: Option<SystemTime>,
}

impl Session {
    /// Fresh session in card selection with the given countdown.
    pub fn new(code: String, countdown: u32) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            code,
            lifecycle: SessionLifecycle::new(),
            countdown,
            game_active: false,
            called_numbers: BTreeSet::new(),
            called_numbers_ordered: Vec::new(),
            current_call: None,
            winner: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase()
    }

    /// Numbers in `1..=75` not drawn yet, ascending.
    pub fn available_numbers(&self) -> Vec<u8> {
        (1..=MAX_NUMBER)
            .filter(|number| !self.called_numbers.contains(number))
            .collect()
    }

    /// Record a drawn number in both the set and the ordered trace.
    ///
    /// Returns `false` without touching anything when the number was already drawn.
    pub fn record_call(&mut self, number: u8) -> bool {
        if !self.called_numbers.insert(number) {
            return false;
        }
        self.called_numbers_ordered.push(number);
        self.current_call = Some(number);
        self.touch();
        true
    }

    /// Bump the mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

/// A registered player's participation in one session.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Primary key of the participation record.
    pub id: Uuid,
    /// Session the player joined.
    pub session_id: Uuid,
    /// Directory snapshot taken when the player joined.
    pub player: PlayerRecord,
    /// Reserved card code.
    pub selected_card_code: Option<u32>,
    /// Numbers of the reserved card.
    pub card_grid: Option<CardGrid>,
    /// Whether the player won.
    pub is_winner: bool,
    /// A claim was rejected; further claims are refused for this round.
    pub claim_rejected: bool,
    /// First join timestamp.
    pub joined_at: SystemTime,
    /// Last mutation timestamp.
    pub updated_at: SystemTime,
}

impl PlayerSession {
    /// New participation record with no card selected.
    pub fn new(session_id: Uuid, player: PlayerRecord) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            player,
            selected_card_code: None,
            card_grid: None,
            is_winner: false,
            claim_rejected: false,
            joined_at: now,
            updated_at: now,
        }
    }

    /// External player id.
    pub fn player_id(&self) -> i64 {
        self.player.player_id
    }

    /// Name shown to other players: first name, then handle, then a generic label.
    pub fn display_name(&self) -> String {
        [&self.player.first_name, &self.player.user_name]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Player {}", self.player.player_id))
    }
}

impl From<&Session> for SessionEntity {
    fn from(value: &Session) -> Self {
        Self {
            id: value.id,
            session_code: value.code.clone(),
            phase: value.phase().as_str().to_owned(),
            phase_version: value.lifecycle.version(),
            countdown: value.countdown,
            game_active: value.game_active,
            called_numbers: value.called_numbers_ordered.clone(),
            current_call: value.current_call,
            winner_player_session_id: value.winner,
            end_reason: value
                .lifecycle
                .end_reason()
                .map(|reason| reason.as_str().to_owned()),
            created_at: value.created_at,
            updated_at: value.updated_at,
            ended_at: value.ended_at,
        }
    }
}

impl TryFrom<SessionEntity> for Session {
    type Error = ServiceError;

    fn try_from(value: SessionEntity) -> Result<Self, Self::Error> {
        let phase = SessionPhase::parse(&value.phase).ok_or_else(|| {
            ServiceError::InternalState(format!(
                "session {} has unknown phase '{}'",
                value.session_code, value.phase
            ))
        })?;
        let end_reason = value.end_reason.as_deref().and_then(EndReason::parse);

        let mut called_numbers = BTreeSet::new();
        let mut called_numbers_ordered = Vec::with_capacity(value.called_numbers.len());
        for number in value.called_numbers {
            if (1..=MAX_NUMBER).contains(&number) && called_numbers.insert(number) {
                called_numbers_ordered.push(number);
            }
        }

        Ok(Self {
            id: value.id,
            code: value.session_code,
            lifecycle: SessionLifecycle::restore(phase, value.phase_version, end_reason),
            countdown: value.countdown,
            game_active: value.game_active,
            called_numbers,
            called_numbers_ordered,
            current_call: value.current_call,
            winner: value.winner_player_session_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            ended_at: value.ended_at,
        })
    }
}

impl From<&PlayerSession> for PlayerSessionEntity {
    fn from(value: &PlayerSession) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            player: value.player.clone(),
            selected_card_code: value.selected_card_code,
            card_numbers_json: value
                .card_grid
                .as_ref()
                .and_then(|grid| serde_json::to_string(grid).ok()),
            is_winner: value.is_winner,
            claim_rejected: value.claim_rejected,
            joined_at: value.joined_at,
            updated_at: value.updated_at,
        }
    }
}

impl TryFrom<PlayerSessionEntity> for PlayerSession {
    type Error = ServiceError;

    fn try_from(value: PlayerSessionEntity) -> Result<Self, Self::Error> {
        let card_grid = value
            .card_numbers_json
            .as_deref()
            .map(serde_json::from_str::<CardGrid>)
            .transpose()
            .map_err(|err| {
                ServiceError::InternalState(format!(
                    "corrupt card numbers for player session {}: {err}",
                    value.id
                ))
            })?;

        Ok(Self {
            id: value.id,
            session_id: value.session_id,
            player: value.player,
            selected_card_code: value.selected_card_code,
            card_grid,
            is_winner: value.is_winner,
            claim_rejected: value.claim_rejected,
            joined_at: value.joined_at,
            updated_at: value.updated_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn record(player_id: i64) -> PlayerRecord {
        PlayerRecord {
            player_id,
            first_name: None,
            last_name: None,
            user_name: None,
            registered_at: SystemTime::now(),
        }
    }

    pub fn player_with_card(player_id: i64, card_code: Option<u32>) -> PlayerSession {
        let mut player = PlayerSession::new(Uuid::nil(), record(player_id));
        player.selected_card_code = card_code;
        player
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn record_call_rejects_repeats() {
        let mut session = Session::new("GAME_1".into(), 30);
        assert!(session.record_call(12));
        assert!(!session.record_call(12));
        assert_eq!(session.called_numbers.len(), 1);
        assert_eq!(session.called_numbers_ordered, vec![12]);
        assert_eq!(session.current_call, Some(12));
        assert_eq!(session.available_numbers().len(), 74);
    }

    #[test]
    fn display_name_falls_back() {
        let mut player = player_with_card(42, None);
        assert_eq!(player.display_name(), "Player 42");
        player.player.user_name = Some("bingo_fan".into());
        assert_eq!(player.display_name(), "bingo_fan");
        player.player.first_name = Some("  ".into());
        assert_eq!(player.display_name(), "bingo_fan");
        player.player.first_name = Some("Abebe".into());
        assert_eq!(player.display_name(), "Abebe");
    }

    #[test]
    fn corrupt_card_json_is_an_internal_error() {
        let player = player_with_card(1, Some(3));
        let mut entity = PlayerSessionEntity::from(&player);
        entity.card_numbers_json = Some("[[1,2".into());
        match PlayerSession::try_from(entity) {
            Err(ServiceError::InternalState(message)) => assert!(message.contains("corrupt")),
            other => panic!("expected internal state error, got {other:?}"),
        }
    }

    #[test]
    fn entity_restores_ordered_trace_without_duplicates() {
        let mut session = Session::new("GAME_2".into(), 0);
        session.record_call(5);
        session.record_call(70);
        let mut entity = SessionEntity::from(&session);
        entity.called_numbers.push(5);

        let restored = Session::try_from(entity).unwrap();
        assert_eq!(restored.called_numbers_ordered, vec![5, 70]);
        assert_eq!(restored.called_numbers.len(), 2);
        assert_eq!(restored.phase(), SessionPhase::CardSelection);
        assert_eq!(restored.lifecycle.version(), 0);
    }
}
