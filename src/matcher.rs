//! Remittance matcher: pairs an incoming remittance with its outstanding
//! correlation record, closes out in-flight tracking, and hands off to the
//! billing aggregator. See spec.md §4.5.

use std::sync::Arc;

use crate::billing::{BillingAggregator, ProcessedClaim};
use crate::error::PipelineError;
use crate::logging::log_claim_event;
use crate::message::RemittanceMessage;
use crate::metrics::Metrics;
use crate::queue::Queue;
use crate::store::InFlightStore;

/// Matcher concurrency defaults to 5 (spec.md §4.5, §5).
pub const DEFAULT_MATCHER_CONCURRENCY: usize = 5;

pub fn spawn_matcher(
    remittance_queue: &Queue<RemittanceMessage>,
    store: Arc<dyn InFlightStore>,
    billing: Arc<BillingAggregator>,
    metrics: Arc<Metrics>,
    verbose: bool,
) -> tokio::task::JoinHandle<()> {
    remittance_queue.register_worker(
        move |msg| {
            let store = store.clone();
            let billing = billing.clone();
            let metrics = metrics.clone();
            async move { handle_remittance(msg, store, billing, metrics, verbose).await }
        },
        DEFAULT_MATCHER_CONCURRENCY,
    )
}

async fn handle_remittance(
    msg: RemittanceMessage,
    store: Arc<dyn InFlightStore>,
    billing: Arc<BillingAggregator>,
    metrics: Arc<Metrics>,
    verbose: bool,
) -> Result<(), PipelineError> {
    let RemittanceMessage::Processed(advice) = msg;

    // Atomic delete is the single point of at-most-once hand-off to billing.
    let Some(in_flight) = store.take(&advice.correlation_id).await else {
        log_claim_event(
            "matcher",
            &advice.claim_id,
            "orphan_remittance",
            &format!(
                "No in-flight correlation for '{}'; acknowledging without retry",
                advice.correlation_id
            ),
        );
        return Ok(());
    };

    let processing_time_ms = advice
        .processed_at
        .signed_duration_since(in_flight.ingested_at)
        .num_milliseconds()
        .max(0);

    if verbose {
        log_claim_event(
            "matcher",
            &advice.claim_id,
            "remittance_matched",
            &format!("Matched remittance for correlation '{}'", advice.correlation_id),
        );
    }

    let processed = ProcessedClaim {
        correlation_id: advice.correlation_id.clone(),
        claim_id: advice.claim_id.clone(),
        patient_id: in_flight.claim.insurance.patient_member_id.clone(),
        payer_id: in_flight.payer_id.clone(),
        ingested_at: in_flight.ingested_at,
        processed_at: advice.processed_at,
        processing_time_ms,
        remittance: advice,
    };
    let payer_id = processed.payer_id.clone();
    billing.record(processed).await;
    metrics.record_claim_processed(&payer_id).await;

    Ok(())
}
