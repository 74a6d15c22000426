use std::io::Write;

use clearingflow::pipeline::Pipeline;
use clearingflow::schema::mock_claim;
use tempfile::NamedTempFile;
use tokio::time::{Duration, Instant};

/// Core data-flow integrity test: a claim written to a JSONL file flows
/// Ingestion -> Clearinghouse -> Payer -> Matcher -> Billing, arriving in
/// the billing aggregator with its correlation untracked.
#[tokio::test]
async fn claim_flows_from_file_to_billing() {
    let mut tmpfile = NamedTempFile::new().unwrap();
    let claim = mock_claim();
    writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();

    let pipeline = Pipeline::start(false);
    let path = tmpfile.path().to_str().unwrap().to_string();
    let summary = pipeline.ingest_file(path, 1000.0, false).await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.skipped, 0);

    let processed = wait_for_billing_len(&pipeline, 1, Duration::from_secs(5)).await;
    assert_eq!(processed, 1);
    assert_eq!(pipeline.store.len().await, 0, "correlation should be untracked once matched");

    pipeline.shutdown().await;
}

/// Claims for different payers route to distinct payer queues and all
/// eventually reach billing, each charged against the right payer.
#[tokio::test]
async fn multiple_payers_route_independently() {
    let mut tmpfile = NamedTempFile::new().unwrap();
    for payer_id in ["medicare", "united_health_group", "anthem"] {
        let mut claim = mock_claim();
        claim.claim_id = format!("claim-{payer_id}");
        claim.insurance.payer_id = payer_id.to_string();
        writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();
    }

    let pipeline = Pipeline::start(false);
    let path = tmpfile.path().to_str().unwrap().to_string();
    let summary = pipeline.ingest_file(path, 1000.0, false).await.unwrap();
    assert_eq!(summary.accepted, 3);

    wait_for_billing_len(&pipeline, 3, Duration::from_secs(5)).await;

    let aging = pipeline.billing.ar_aging().await;
    for payer_id in ["medicare", "united_health_group", "anthem"] {
        assert_eq!(aging.get(payer_id).map(|b| b.total).unwrap_or(0), 1);
    }

    pipeline.shutdown().await;
}

/// A malformed line is skipped without blocking the valid record behind it.
#[tokio::test]
async fn malformed_records_do_not_block_valid_ones() {
    let mut tmpfile = NamedTempFile::new().unwrap();
    writeln!(tmpfile, "not json at all").unwrap();
    let good = mock_claim();
    writeln!(tmpfile, "{}", serde_json::to_string(&good).unwrap()).unwrap();

    let pipeline = Pipeline::start(false);
    let path = tmpfile.path().to_str().unwrap().to_string();
    let summary = pipeline.ingest_file(path, 1000.0, false).await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.skipped, 1);

    wait_for_billing_len(&pipeline, 1, Duration::from_secs(5)).await;
    pipeline.shutdown().await;
}

/// A claim whose `payer_id` is not in the registered payer queues, and has
/// no fallback configured, is skipped at ingestion before it is even
/// submitted — `Pipeline::start` wires no fallback, so the clearinghouse
/// terminal-fails it instead, and it never reaches billing.
#[tokio::test]
async fn unknown_payer_claim_never_reaches_billing() {
    let mut tmpfile = NamedTempFile::new().unwrap();
    let mut claim = mock_claim();
    claim.insurance.payer_id = "unknown_payer".to_string();
    writeln!(tmpfile, "{}", serde_json::to_string(&claim).unwrap()).unwrap();

    let pipeline = Pipeline::start(false);
    let path = tmpfile.path().to_str().unwrap().to_string();
    let summary = pipeline.ingest_file(path, 1000.0, false).await.unwrap();
    assert_eq!(summary.accepted, 1, "ingestion only validates schema, not payer routing");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pipeline.billing.len().await, 0);
    assert_eq!(pipeline.store.len().await, 0, "rejected claim should not linger in-flight");

    pipeline.shutdown().await;
}

async fn wait_for_billing_len(pipeline: &Pipeline, expected: usize, budget: Duration) -> usize {
    let deadline = Instant::now() + budget;
    loop {
        let len = pipeline.billing.len().await;
        if len >= expected {
            return len;
        }
        assert!(Instant::now() < deadline, "billing aggregator never reached {expected} record(s), saw {len}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
