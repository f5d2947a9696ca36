use serde::Serialize;
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::{
    dao::models::PlayerRecord,
    dto::session::SessionView,
    error::ServiceError,
    state::{card::CardGrid, state_machine::EndReason},
};

/// Reply channel carried by every command.
pub type Reply<T> = oneshot::Sender<T>;

/// Commands processed one at a time by a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// One countdown step.
    CountdownTick {
        /// Tick result.
        respond_to: Reply<Result<CountdownOutcome, ServiceError>>,
    },
    /// One number-call step.
    DrawNumber {
        /// Draw result.
        respond_to: Reply<DrawOutcome>,
    },
    /// Join the session or change card.
    Join {
        /// Player and optional card.
        request: JoinCommand,
        /// Updated view for the joining player.
        respond_to: Reply<Result<SessionView, ServiceError>>,
    },
    /// A player claims a win.
    CallBingo {
        /// Claiming player.
        player_id: i64,
        /// Updated view on success.
        respond_to: Reply<Result<SessionView, ServiceError>>,
    },
    /// Scan every card for a win.
    CheckForWinner {
        /// Scan result.
        respond_to: Reply<WinnerScan>,
    },
    /// Close the round.
    End {
        /// Why the round is closing.
        reason: EndReason,
        /// `false` when the session had already ended.
        respond_to: Reply<bool>,
    },
    /// Read-only projection.
    View {
        /// Player the view is rendered for.
        viewer: Option<i64>,
        /// Projection.
        respond_to: Reply<SessionView>,
    },
    /// Audit players and card reservations against the store.
    Reconcile {
        /// What was repaired.
        respond_to: Reply<ReconcileReport>,
    },
}

/// Card picked by a joining player.
#[derive(Debug, Clone)]
pub struct CardSelection {
    /// Card code.
    pub code: u32,
    /// Card numbers.
    pub grid: CardGrid,
}

/// Join request as seen by the actor.
#[derive(Debug, Clone)]
pub struct JoinCommand {
    /// Directory record of the player.
    pub player: PlayerRecord,
    /// Card to reserve; `None` keeps the current selection.
    pub card: Option<CardSelection>,
}

/// Result of a countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Countdown decreased.
    Running {
        /// Seconds left.
        remaining: u32,
    },
    /// Countdown reached zero; the session is now in the game room.
    Elapsed,
    /// Session is no longer selecting cards; the countdown should stop.
    Inactive,
}

/// Result of a number-call step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A number was drawn.
    Drawn {
        /// Drawn number.
        number: u8,
        /// Numbers left to draw.
        remaining: usize,
    },
    /// Every number was drawn; the session should end.
    Exhausted,
    /// A winner stopped the game; the session should end.
    WinnerDeclared,
    /// Nothing to do yet (numbers are not being called).
    Idle,
    /// Session ended; the caller should stop.
    Inactive,
}

/// Result of a full winner scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinnerScan {
    /// A winner had already been recorded.
    AlreadyDeclared,
    /// The scan found a winner and recorded it.
    Found {
        /// Winning player.
        player_id: i64,
    },
    /// No card has a full line.
    NoWinner,
}

/// Repairs applied by a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    /// Players tracked after the pass.
    pub players: usize,
    /// Reservations dropped because nobody held them.
    pub orphaned: usize,
    /// Players recovered from the store that the actor had lost track of.
    pub players_restored: usize,
    /// Card reservations rebuilt from a player's selection.
    pub reservations_restored: usize,
    /// Extra entries for an already tracked player that were dropped.
    pub duplicates_removed: usize,
    /// Later holders of an already held card whose selection was cleared.
    pub conflicts_cleared: usize,
}
