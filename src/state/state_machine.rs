use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// High-level phases a session moves through. Transitions only ever go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Join window is open and the countdown is running.
    CardSelection,
    /// Numbers are being called.
    GameRoom,
    /// Round is over; the session is read-only.
    Ended,
}

impl SessionPhase {
    /// Wire name used in views and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::CardSelection => "cardSelection",
            SessionPhase::GameRoom => "gameRoom",
            SessionPhase::Ended => "ended",
        }
    }

    /// Parse a persisted phase name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cardSelection" => Some(SessionPhase::CardSelection),
            "gameRoom" => Some(SessionPhase::GameRoom),
            "ended" => Some(SessionPhase::Ended),
            _ => None,
        }
    }

    /// Whether the session is still the live round (not ended).
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionPhase::Ended)
    }
}

/// Why a session reached [`SessionPhase::Ended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// A verified win closed the round.
    WinnerDeclared,
    /// All 75 numbers were drawn without a winner.
    BoardExhausted,
    /// An operator ended the session.
    Manual,
    /// Every session was ended by a restart.
    Restart,
}

impl EndReason {
    /// Wire name used in persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::WinnerDeclared => "winnerDeclared",
            EndReason::BoardExhausted => "boardExhausted",
            EndReason::Manual => "manual",
            EndReason::Restart => "restart",
        }
    }

    /// Parse a persisted end reason.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "winnerDeclared" => Some(EndReason::WinnerDeclared),
            "boardExhausted" => Some(EndReason::BoardExhausted),
            "manual" => Some(EndReason::Manual),
            "restart" => Some(EndReason::Restart),
            _ => None,
        }
    }
}

/// Events that can be applied to a session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Countdown reached zero; start calling numbers.
    CountdownElapsed,
    /// Close the round.
    End(EndReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the lifecycle was in when the event was received.
    pub from: SessionPhase,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Phase tracker for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLifecycle {
    phase: SessionPhase,
    version: usize,
    end_reason: Option<EndReason>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self {
            phase: SessionPhase::CardSelection,
            version: 0,
            end_reason: None,
        }
    }
}

impl SessionLifecycle {
    /// Lifecycle of a fresh session, starting in card selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a lifecycle from persisted fields.
    pub fn restore(phase: SessionPhase, version: usize, end_reason: Option<EndReason>) -> Self {
        Self {
            phase,
            version,
            end_reason: if phase == SessionPhase::Ended {
                end_reason
            } else {
                None
            },
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Reason recorded when the session ended.
    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        if let SessionEvent::End(reason) = event {
            self.end_reason = Some(reason);
        }
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::CardSelection, SessionEvent::CountdownElapsed) => SessionPhase::GameRoom,
            (SessionPhase::CardSelection | SessionPhase::GameRoom, SessionEvent::End(_)) => {
                SessionPhase::Ended
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
