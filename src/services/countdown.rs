//! Per-session countdown timer.

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::number_caller,
    state::{
        SessionHandle, SharedState, messages::CountdownOutcome, state_machine::SessionPhase,
        tasks::TaskId,
    },
};

/// Start the countdown for `handle` unless one is already running or the session left card
/// selection. Returns whether a timer was started.
pub fn ensure_scheduled(state: &SharedState, handle: &SessionHandle) -> bool {
    if handle.phase() != SessionPhase::CardSelection {
        return false;
    }

    let task_state = state.clone();
    let task_handle = handle.clone();
    let started = state
        .countdowns()
        .spawn_once(handle.code(), move |task_id| {
            run(task_state, task_handle, task_id)
        });
    if started {
        debug!(session = %handle.code(), "countdown scheduled");
    }
    started
}

async fn run(state: SharedState, handle: SessionHandle, task_id: TaskId) {
    let period = state.config().countdown_tick;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match handle.countdown_tick().await {
            Ok(CountdownOutcome::Running { remaining }) => {
                debug!(session = %handle.code(), remaining, "countdown tick");
            }
            Ok(CountdownOutcome::Elapsed) => {
                state.countdowns().deregister(handle.code(), task_id);
                info!(session = %handle.code(), "countdown finished; starting number calls");
                number_caller::start(&state, &handle);
                return;
            }
            Ok(CountdownOutcome::Inactive) => {
                state.countdowns().deregister(handle.code(), task_id);
                debug!(session = %handle.code(), "session left card selection; countdown stopped");
                return;
            }
            Err(ServiceError::SessionClosed(_)) => {
                state.countdowns().deregister(handle.code(), task_id);
                return;
            }
            Err(err) => {
                warn!(session = %handle.code(), error = %err, "countdown tick failed");
            }
        }
    }
}
