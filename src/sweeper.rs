//! Aged-out correlation sweeper: periodically surfaces in-flight claims
//! that never received a remittance within the timeout window. See
//! spec.md §4.7.

use std::sync::Arc;
use std::time::Duration;

use crate::logging::log_claim_event;
use crate::store::InFlightStore;

/// Default aged-out timeout (spec.md §4.7).
pub const DEFAULT_AGED_OUT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the periodic sweep task. Swept records are only surfaced via log;
/// a remittance that later arrives for a swept correlation id falls
/// through the matcher's orphan branch (spec.md §4.5, §4.7).
pub fn spawn_sweeper(store: Arc<dyn InFlightStore>, timeout: Duration, verbose: bool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DEFAULT_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let swept = store.sweep_aged_out(timeout).await;
            if swept.is_empty() {
                continue;
            }
            for (correlation_id, in_flight) in &swept {
                log_claim_event(
                    "sweeper",
                    &in_flight.claim.claim_id,
                    "aged_out",
                    &format!(
                        "Correlation '{correlation_id}' aged out awaiting remittance from '{}'",
                        in_flight.payer_id
                    ),
                );
            }
            if verbose {
                log_claim_event(
                    "sweeper",
                    "-",
                    "sweep_complete",
                    &format!("Swept {} aged-out correlation(s)", swept.len()),
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mock_claim;
    use crate::store::{InFlightClaim, InMemoryStore};
    use chrono::Utc;
    use tokio::time::Instant;

    #[tokio::test]
    async fn sweeper_removes_stale_entries_eventually() {
        let store: Arc<dyn InFlightStore> = Arc::new(InMemoryStore::new());
        store
            .insert(
                "stale".to_string(),
                InFlightClaim {
                    claim: mock_claim(),
                    payer_id: "medicare".to_string(),
                    ingested_at: Utc::now(),
                    submitted_at: Instant::now() - Duration::from_secs(5),
                },
            )
            .await;

        // Exercise the sweep logic directly rather than waiting on the
        // task's minute-scale tick interval.
        let swept = store.sweep_aged_out(Duration::from_secs(1)).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(store.len().await, 0);
    }
}
