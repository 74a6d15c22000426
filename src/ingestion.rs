//! Ingestion source: streams a newline-delimited claim file into the
//! claims queue at a configured rate. See spec.md §4.2.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::logging::log_claim_event;
use crate::message::{ClaimEnvelope, ClaimMessage};
use crate::metrics::Metrics;
use crate::queue::{EnqueueOptions, Queue};
use crate::schema::PayerClaim;
use crate::store::new_correlation_id;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionSummary {
    pub accepted: u64,
    pub skipped: u64,
}

/// Handle to a running ingestion task; `stop()` halts emission after the
/// current record (spec.md §4.2 `stop()`).
#[derive(Clone)]
pub struct IngestionHandle {
    stop_flag: Arc<AtomicBool>,
}

impl IngestionHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// Spawn the ingestion task. Returns a handle to stop it early and the
/// `JoinHandle` carrying the final `IngestionSummary` (or the terminating
/// error if the queue closed or was full).
pub fn spawn_ingestion(
    path: String,
    rate_per_sec: f64,
    claims_queue: Queue<ClaimMessage>,
    metrics: Arc<Metrics>,
    verbose: bool,
) -> (IngestionHandle, tokio::task::JoinHandle<anyhow::Result<IngestionSummary>>) {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let handle = IngestionHandle {
        stop_flag: stop_flag.clone(),
    };
    let join = tokio::spawn(run(path, rate_per_sec, claims_queue, metrics, verbose, stop_flag));
    (handle, join)
}

async fn run(
    path: String,
    rate_per_sec: f64,
    claims_queue: Queue<ClaimMessage>,
    metrics: Arc<Metrics>,
    verbose: bool,
    stop_flag: Arc<AtomicBool>,
) -> anyhow::Result<IngestionSummary> {
    if !(rate_per_sec > 0.0) {
        return Err(anyhow::anyhow!("rate_per_sec must be a positive number"));
    }

    if verbose {
        log_claim_event("ingestion", "-", "start", &format!("Starting claim stream from file: {path}"));
    }

    let file = File::open(&path)
        .await
        .with_context(|| format!("failed to open ingestion file '{path}'"))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    // Token bucket of size 1, refilled once per `1000/rate_per_sec` ms
    // (spec.md §4.2); one accepted record is emitted per tick.
    let period = Duration::from_secs_f64(1.0 / rate_per_sec);
    let mut ticker = tokio::time::interval(period);

    let mut rng = rand::rng();
    let mut summary = IngestionSummary::default();

    while let Some(line) = lines.next_line().await? {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let claim: PayerClaim = match serde_json::from_str(&line) {
            Ok(claim) => claim,
            Err(err) => {
                summary.skipped += 1;
                log_claim_event(
                    "ingestion",
                    "-",
                    "skip_malformed",
                    &format!("Skipping malformed record: {err}"),
                );
                continue;
            }
        };

        if let Err(err) = claim.validate() {
            summary.skipped += 1;
            log_claim_event(
                "ingestion",
                &claim.claim_id,
                "skip_invalid",
                &format!("Skipping claim that failed validation: {err}"),
            );
            continue;
        }

        ticker.tick().await;

        let correlation_id = new_correlation_id(&mut rng);
        let envelope = ClaimEnvelope {
            correlation_id,
            claim: claim.clone(),
            ingested_at: Utc::now(),
        };

        if verbose {
            log_claim_event(
                "ingestion",
                &claim.claim_id,
                "emit_claim",
                &format!("Emitting claim {} onto claims queue", claim.claim_id),
            );
        }

        claims_queue
            .enqueue(ClaimMessage::NewClaim(envelope), EnqueueOptions {
                max_attempts: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("claims queue unavailable, terminating ingestion: {e}"))?;

        metrics.record_claim_ingested();
        summary.accepted += 1;
    }

    if verbose {
        log_claim_event(
            "ingestion",
            "-",
            "finished",
            &format!("Finished streaming claims from file: {path}"),
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mock_claim;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn accepts_valid_records_and_skips_malformed_ones() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let claim = mock_claim();
        let json = serde_json::to_string(&claim).unwrap();
        writeln!(tmpfile, "not json").unwrap();
        writeln!(tmpfile).unwrap();
        writeln!(tmpfile, "{json}").unwrap();

        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let metrics = Arc::new(Metrics::new());
        let path = tmpfile.path().to_str().unwrap().to_string();

        let (_handle, join) = spawn_ingestion(path, 1000.0, claims_queue.clone(), metrics, false);
        let summary = join.await.unwrap().unwrap();

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(claims_queue.depth().await.waiting, 1);
    }

    #[tokio::test]
    async fn rejects_non_positive_rate() {
        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let metrics = Arc::new(Metrics::new());
        let (_handle, join) = spawn_ingestion("ignored.jsonl".to_string(), 0.0, claims_queue, metrics, false);
        let result = join.await.unwrap();
        assert!(result.is_err());
    }

    /// spec.md §8 property 6: for ingestion rate R, over any 10-second window
    /// the number of enqueues is <= ceil(10R) + 1.
    #[tokio::test(start_paused = true)]
    async fn respects_rate_ceiling_over_a_ten_second_window() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        for _ in 0..200 {
            let claim = mock_claim();
            writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();
        }

        let rate_per_sec: f64 = 5.0;
        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        let metrics = Arc::new(Metrics::new());
        let path = tmpfile.path().to_str().unwrap().to_string();
        let (_handle, _join) = spawn_ingestion(path, rate_per_sec, claims_queue.clone(), metrics, false);

        tokio::time::sleep(Duration::from_secs(10)).await;

        let ceiling = (10.0 * rate_per_sec).ceil() as usize + 1;
        let enqueued = claims_queue.depth().await.waiting;
        assert!(
            enqueued <= ceiling,
            "enqueued {enqueued} claims in a 10s window, expected at most {ceiling}"
        );
    }

    #[tokio::test]
    async fn terminates_when_queue_closes() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let claim = mock_claim();
        writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();

        let claims_queue: Queue<ClaimMessage> = Queue::new("claims");
        claims_queue.close().await;
        let metrics = Arc::new(Metrics::new());
        let path = tmpfile.path().to_str().unwrap().to_string();
        let (_handle, join) = spawn_ingestion(path, 1000.0, claims_queue, metrics, false);
        let result = join.await.unwrap();
        assert!(result.is_err());
    }
}
