//! Clearinghouse router: validates inbound claims, resolves the payer,
//! persists in-flight correlation state, and dispatches to the
//! payer-specific queue with a priority derived from the claim's total
//! billed amount. See spec.md §4.3.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::PipelineError;
use crate::logging::log_claim_event;
use crate::message::{ClaimMessage, PayerMessage};
use crate::metrics::Metrics;
use crate::queue::{EnqueueOptions, PRIORITY_HIGH, PRIORITY_MEDIUM, PRIORITY_NORMAL, Queue};
use crate::store::{InFlightClaim, InFlightStore};

/// Priority thresholds from spec.md §4.3 step 3.
pub fn priority_for_total(total_billed: f64) -> i64 {
    if total_billed > 10_000.0 {
        PRIORITY_HIGH
    } else if total_billed > 1_000.0 {
        PRIORITY_MEDIUM
    } else {
        PRIORITY_NORMAL
    }
}

pub struct Clearinghouse {
    payer_queues: HashMap<String, Queue<PayerMessage>>,
    store: Arc<dyn InFlightStore>,
    fallback_payer_id: Option<String>,
    metrics: Arc<Metrics>,
    verbose: bool,
}

impl Clearinghouse {
    pub fn new(
        payer_queues: HashMap<String, Queue<PayerMessage>>,
        store: Arc<dyn InFlightStore>,
        fallback_payer_id: Option<String>,
        metrics: Arc<Metrics>,
        verbose: bool,
    ) -> Self {
        Self {
            payer_queues,
            store,
            fallback_payer_id,
            metrics,
            verbose,
        }
    }

    /// Register this clearinghouse as the claims queue's worker.
    pub fn spawn(self, claims_queue: &Queue<ClaimMessage>, concurrency: usize) -> tokio::task::JoinHandle<()> {
        let shared = Arc::new(self);
        claims_queue.register_worker(
            move |msg| {
                let shared = shared.clone();
                async move { shared.handle_claim(msg).await }
            },
            concurrency,
        )
    }

    async fn handle_claim(&self, msg: ClaimMessage) -> Result<(), PipelineError> {
        let ClaimMessage::NewClaim(envelope) = msg;
        let claim_id = envelope.claim.claim_id.clone();

        if self.verbose {
            log_claim_event(
                "clearinghouse",
                &claim_id,
                "handle_new_claim",
                &format!("Handling new claim: {claim_id}"),
            );
        }

        if let Err(e) = envelope.claim.validate() {
            self.metrics.record_error(None).await;
            return Err(e);
        }

        let resolved_payer_id = match self.resolve_payer(&envelope.claim.insurance.payer_id) {
            Ok(id) => id,
            Err(e) => {
                self.metrics.record_error(None).await;
                return Err(e);
            }
        };
        let payer_queue = match self.payer_queues.get(&resolved_payer_id) {
            Some(queue) => queue,
            None => {
                self.metrics.record_error(Some(&resolved_payer_id)).await;
                return Err(PipelineError::Schema(format!(
                    "no queue registered for payer '{resolved_payer_id}'"
                )));
            }
        };

        self.store
            .insert(
                envelope.correlation_id.clone(),
                InFlightClaim {
                    claim: envelope.claim.clone(),
                    payer_id: resolved_payer_id.clone(),
                    ingested_at: envelope.ingested_at,
                    submitted_at: Instant::now(),
                },
            )
            .await;

        let priority = priority_for_total(envelope.claim.total_billed());

        if self.verbose {
            log_claim_event(
                "clearinghouse",
                &claim_id,
                "forward_to_payer",
                &format!("Forwarding claim to payer {resolved_payer_id} at priority {priority}"),
            );
        }

        if let Err(e) = payer_queue
            .enqueue(
                PayerMessage::Adjudicate(envelope),
                EnqueueOptions {
                    priority,
                    max_attempts: 3,
                    base_delay_ms: 1000,
                    lease_ms: None,
                },
            )
            .await
        {
            self.metrics.record_error(Some(&resolved_payer_id)).await;
            return Err(PipelineError::Transient(format!("enqueue to payer failed: {e}")));
        }

        Ok(())
    }

    /// Resolve a claim's `payer_id` against the registered queues, falling
    /// back to the configured fallback payer if set (spec.md §4.3 step 1).
    fn resolve_payer(&self, payer_id: &str) -> Result<String, PipelineError> {
        if self.payer_queues.contains_key(payer_id) {
            return Ok(payer_id.to_string());
        }
        if let Some(fallback) = &self.fallback_payer_id {
            if self.payer_queues.contains_key(fallback) {
                log_claim_event(
                    "clearinghouse",
                    "-",
                    "payer_fallback",
                    &format!("Unknown payer_id '{payer_id}', falling back to '{fallback}'"),
                );
                return Ok(fallback.clone());
            }
        }
        Err(PipelineError::Schema(format!(
            "unknown payer_id '{payer_id}' with no usable fallback"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ClaimEnvelope;
    use crate::queue::QueueEvent;
    use crate::schema::mock_claim;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use tokio::time::{Duration, timeout};

    fn envelope_with_total(total_per_line: f64) -> ClaimEnvelope {
        let mut claim = mock_claim();
        claim.service_lines[0].unit_charge_amount = total_per_line;
        claim.service_lines[0].units = 1;
        ClaimEnvelope {
            correlation_id: "corr-1".to_string(),
            claim,
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn routes_known_payer_and_tracks_correlation() {
        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let payer_queue: Queue<PayerMessage> = Queue::new("payer-medicare");
        let mut payer_queues = HashMap::new();
        payer_queues.insert("medicare".to_string(), payer_queue.clone());
        let store: Arc<dyn InFlightStore> = Arc::new(InMemoryStore::new());

        let clearinghouse =
            Clearinghouse::new(payer_queues, store.clone(), None, Arc::new(Metrics::new()), false);
        clearinghouse.spawn(&claims_queue, 4);

        let envelope = envelope_with_total(100.0);
        claims_queue
            .enqueue(ClaimMessage::NewClaim(envelope), EnqueueOptions::default())
            .await
            .unwrap();

        let mut rx = claims_queue.subscribe();
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, QueueEvent::Completed(_)));
        assert_eq!(payer_queue.depth().await.waiting, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_payer_without_fallback_fails_non_retryably() {
        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let payer_queue: Queue<PayerMessage> = Queue::new("payer-medicare");
        let mut payer_queues = HashMap::new();
        payer_queues.insert("medicare".to_string(), payer_queue.clone());
        let store: Arc<dyn InFlightStore> = Arc::new(InMemoryStore::new());

        let clearinghouse =
            Clearinghouse::new(payer_queues, store, None, Arc::new(Metrics::new()), false);
        clearinghouse.spawn(&claims_queue, 4);

        let mut envelope = envelope_with_total(100.0);
        envelope.claim.insurance.payer_id = "unknown_payer".to_string();
        claims_queue
            .enqueue(ClaimMessage::NewClaim(envelope), EnqueueOptions::default())
            .await
            .unwrap();

        let mut rx = claims_queue.subscribe();
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, QueueEvent::Failed(_, _)));
        assert_eq!(payer_queue.depth().await.waiting, 0);
    }

    #[test]
    fn priority_thresholds_match_spec() {
        assert_eq!(priority_for_total(10_001.0), PRIORITY_HIGH);
        assert_eq!(priority_for_total(1_001.0), PRIORITY_MEDIUM);
        assert_eq!(priority_for_total(1_000.0), PRIORITY_NORMAL);
        assert_eq!(priority_for_total(50.0), PRIORITY_NORMAL);
    }
}
