//! Wires every stage — ingestion, clearinghouse, per-payer adjudication,
//! matcher, billing, sweeper, reporter — together over the queue substrate.
//! Generalizes the teacher's `main.rs` manual channel wiring to N payers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::billing::BillingAggregator;
use crate::clearinghouse::Clearinghouse;
use crate::ingestion::{IngestionSummary, spawn_ingestion};
use crate::matcher::spawn_matcher;
use crate::message::{ClaimMessage, PayerMessage, RemittanceMessage};
use crate::metrics::Metrics;
use crate::payer::{default_registry, spawn_payer_worker};
use crate::queue::Queue;
use crate::reporter::run_reporter;
use crate::store::{InFlightStore, InMemoryStore};
use crate::sweeper::{DEFAULT_AGED_OUT_TIMEOUT, spawn_sweeper};

/// How many claims the clearinghouse router handles concurrently (spec.md §5
/// default for claims routing).
pub const CLEARINGHOUSE_CONCURRENCY: usize = 10;

/// A fully wired pipeline: every stage is already running as a background
/// task behind its queue's worker. Feed it with `ingest_file` and read its
/// shared state (`metrics`, `billing`, `store`) for observability.
pub struct Pipeline {
    pub claims_queue: Queue<ClaimMessage>,
    pub payer_queues: HashMap<String, Queue<PayerMessage>>,
    pub remittance_queue: Queue<RemittanceMessage>,
    pub metrics: Arc<Metrics>,
    pub billing: Arc<BillingAggregator>,
    pub store: Arc<dyn InFlightStore>,
    stage_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn every stage with the default payer registry
    /// (`payer::default_registry()`).
    pub fn start(verbose: bool) -> Self {
        Self::with_registry(default_registry(), verbose)
    }

    pub fn with_registry(registry: HashMap<String, crate::payer::PayerConfig>, verbose: bool) -> Self {
        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let remittance_queue: Queue<RemittanceMessage> = Queue::new("remittance");
        let store: Arc<dyn InFlightStore> = Arc::new(InMemoryStore::new());
        let billing = Arc::new(BillingAggregator::default());
        let metrics = Arc::new(Metrics::new());

        let mut payer_queues = HashMap::new();
        let mut stage_handles = Vec::new();
        for (payer_id, config) in registry {
            let queue: Queue<PayerMessage> = Queue::new(format!("payer-{payer_id}"));
            stage_handles.push(spawn_payer_worker(
                &queue,
                config,
                remittance_queue.clone(),
                metrics.clone(),
                verbose,
            ));
            payer_queues.insert(payer_id, queue);
        }

        let clearinghouse =
            Clearinghouse::new(payer_queues.clone(), store.clone(), None, metrics.clone(), verbose);
        stage_handles.push(clearinghouse.spawn(&claims_queue, CLEARINGHOUSE_CONCURRENCY));

        stage_handles.push(spawn_matcher(
            &remittance_queue,
            store.clone(),
            billing.clone(),
            metrics.clone(),
            verbose,
        ));
        stage_handles.push(spawn_sweeper(store.clone(), DEFAULT_AGED_OUT_TIMEOUT, verbose));
        stage_handles.push(tokio::spawn(run_reporter(billing.clone(), verbose)));

        Self {
            claims_queue,
            payer_queues,
            remittance_queue,
            metrics,
            billing,
            store,
            stage_handles,
        }
    }

    /// Stream a JSONL claim file into this pipeline at `rate_per_sec` and
    /// wait for ingestion to finish (EOF or a terminating queue error).
    pub async fn ingest_file(&self, path: String, rate_per_sec: f64, verbose: bool) -> anyhow::Result<IngestionSummary> {
        let (_handle, join) = spawn_ingestion(path, rate_per_sec, self.claims_queue.clone(), self.metrics.clone(), verbose);
        join.await?
    }

    /// Close every queue and abort the background stage tasks. Queued but
    /// unprocessed work is dropped — acceptable for the CLI's one-shot
    /// `ingest` command, which only calls this after ingestion completes.
    pub async fn shutdown(self) {
        self.claims_queue.close().await;
        for queue in self.payer_queues.values() {
            queue.close().await;
        }
        self.remittance_queue.close().await;
        for handle in self.stage_handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mock_claim;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::Duration;

    #[tokio::test]
    async fn ingested_claim_flows_through_to_billing() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let claim = mock_claim();
        writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();

        let pipeline = Pipeline::start(false);
        let path = tmpfile.path().to_str().unwrap().to_string();
        let summary = pipeline.ingest_file(path, 1000.0, false).await.unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.skipped, 0);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pipeline.billing.len().await == 1 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "claim never reached billing");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = pipeline.metrics.snapshot().await;
        assert_eq!(snapshot.claims_ingested_total, 1);

        pipeline.shutdown().await;
    }
}
