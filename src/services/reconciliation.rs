use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    state::{SharedState, messages::ReconcileReport},
};

/// Periodically audit every tracked session against the store and forget old ended ones.
pub async fn run(state: SharedState) {
    let period = state.config().reconcile_interval;
    info!(interval = ?period, "reconciliation supervisor started");

    loop {
        sleep(period).await;
        let reports = reconcile_all(&state).await;
        let drifted = reports.iter().filter(|(_, report)| has_drift(report)).count();
        let pruned = state
            .registry()
            .prune_ended(state.config().retained_ended_sessions)
            .await;
        debug!(
            sessions = reports.len(),
            drifted,
            pruned = pruned.len(),
            "reconciliation pass finished"
        );
    }
}

/// Reconcile every tracked session; sessions whose actor is gone are skipped.
pub async fn reconcile_all(state: &SharedState) -> Vec<(String, ReconcileReport)> {
    let mut reports = Vec::new();
    for handle in state.registry().handles().await {
        match handle.reconcile().await {
            Ok(report) => {
                if has_drift(&report) {
                    info!(session = %handle.code(), ?report, "repaired session drift");
                }
                reports.push((handle.code().to_owned(), report));
            }
            Err(err) => {
                warn!(session = %handle.code(), error = %err, "session reconciliation failed");
            }
        }
    }
    reports
}

/// Reconcile one session by code.
pub async fn reconcile_session(
    state: &SharedState,
    code: &str,
) -> Result<ReconcileReport, ServiceError> {
    state.registry().find(code).await?.reconcile().await
}

fn has_drift(report: &ReconcileReport) -> bool {
    report.orphaned > 0
        || report.players_restored > 0
        || report.reservations_restored > 0
        || report.duplicates_removed > 0
        || report.conflicts_cleared > 0
}
