//! Per-session number-call timer.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::session_service,
    state::{
        SessionHandle, SharedState, messages::DrawOutcome, state_machine::EndReason,
        tasks::TaskId,
    },
};

/// Start calling numbers for `handle` unless a caller is already running.
///
/// The first number is drawn immediately.
pub fn start(state: &SharedState, handle: &SessionHandle) -> bool {
    let task_state = state.clone();
    let task_handle = handle.clone();
    let started = state.callers().spawn_once(handle.code(), move |task_id| {
        run(task_state, task_handle, task_id)
    });
    if started {
        info!(session = %handle.code(), "number calling started");
    }
    started
}

async fn run(state: SharedState, handle: SessionHandle, task_id: TaskId) {
    let mut ticker = interval(state.config().call_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let reason = match handle.draw_number().await {
            Ok(DrawOutcome::Drawn { number, remaining }) => {
                debug!(session = %handle.code(), number, remaining, "called number");
                continue;
            }
            Ok(DrawOutcome::Idle) => continue,
            Ok(DrawOutcome::Exhausted) => EndReason::BoardExhausted,
            Ok(DrawOutcome::WinnerDeclared) => EndReason::WinnerDeclared,
            Ok(DrawOutcome::Inactive) | Err(ServiceError::SessionClosed(_)) => {
                state.callers().deregister(handle.code(), task_id);
                return;
            }
            Err(err) => {
                warn!(session = %handle.code(), error = %err, "number call failed");
                continue;
            }
        };

        state.callers().deregister(handle.code(), task_id);
        if let Err(err) = session_service::end_session(&state, handle.code(), reason).await {
            warn!(
                session = %handle.code(),
                reason = reason.as_str(),
                error = %err,
                "failed to end session after the last call"
            );
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::PlayerRecord,
        dto::session::JoinRequest,
        state::{AppState, state_machine::SessionPhase},
    };

    #[tokio::test(start_paused = true)]
    async fn exhausted_board_ends_without_winner_and_opens_next_round() {
        let config = AppConfig {
            countdown_seconds: 1,
            card_batch_size: 10,
            ..AppConfig::default()
        };
        let (state, _store) = AppState::in_memory(config).unwrap();
        let first = session_service::active_session(&state).await.unwrap();

        // 1s countdown, 75 draws every 3s starting immediately, one more tick to notice,
        // then half a tick so the successor's countdown has not moved yet
        tokio::time::sleep(Duration::from_millis((1 + 75 * 3) * 1_000 + 500)).await;

        assert_eq!(first.phase(), SessionPhase::Ended);
        let ended = first.view(None).await.unwrap();
        assert_eq!(ended.called_numbers.len(), 75);
        assert_eq!(ended.winner, None);
        assert!(!state.callers().contains(first.code()));

        let next = state.registry().find_active().await.unwrap();
        assert_ne!(next.code(), first.code());
        assert_eq!(next.phase(), SessionPhase::CardSelection);
        let view = next.view(None).await.unwrap();
        assert_eq!(view.countdown, 1);
        assert!(state.countdowns().contains(next.code()));
    }

    #[tokio::test(start_paused = true)]
    async fn detected_winner_ends_the_round_and_opens_the_next() {
        let config = AppConfig {
            card_batch_size: 10,
            auto_detect_winner: true,
            ..AppConfig::default()
        };
        let (state, _store) = AppState::in_memory(config).unwrap();
        let registered = state
            .directory()
            .register(PlayerRecord {
                player_id: 1,
                first_name: Some("Abebe".into()),
                last_name: None,
                user_name: None,
                registered_at: std::time::SystemTime::now(),
            })
            .await
            .unwrap();
        assert!(registered);
        let joined = session_service::join(
            &state,
            JoinRequest {
                player_id: 1,
                card_code: Some(3),
                card_numbers: None,
            },
        )
        .await
        .unwrap();
        let first = state.registry().find(&joined.session_code).await.unwrap();

        // the game room opens at 30s; after that sample half a call interval past each draw
        tokio::time::sleep(Duration::from_millis(30_500)).await;
        for _ in 0..75 {
            if first.phase() == SessionPhase::Ended {
                break;
            }
            tokio::time::sleep(Duration::from_secs(3)).await;
        }

        assert_eq!(first.phase(), SessionPhase::Ended);
        let ended = first.view(Some(1)).await.unwrap();
        assert_eq!(ended.winner.as_deref(), Some("Abebe"));
        assert!(ended.called_numbers.len() < 75);
        assert!(!state.callers().contains(first.code()));

        let next = state.registry().find_active().await.unwrap();
        assert_ne!(next.code(), first.code());
        assert_eq!(next.phase(), SessionPhase::CardSelection);
        assert!(state.countdowns().contains(next.code()));
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let config = AppConfig {
            card_batch_size: 10,
            ..AppConfig::default()
        };
        let (state, _store) = AppState::in_memory(config).unwrap();
        let handle = state.registry().get_or_create_active().await.unwrap();
        assert!(start(&state, &handle));
        assert!(!start(&state, &handle));

        // still selecting cards: the caller idles without drawing
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(handle.view(None).await.unwrap().called_numbers.is_empty());
        assert!(state.callers().contains(handle.code()));
    }
}
