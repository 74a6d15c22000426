//! Per-payer adjudication engine: simulated processing latency plus the
//! cost-share/denial computation delegated to `remittance::adjudicate_claim`.
//! See spec.md §4.4.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::error::PipelineError;
use crate::logging::log_claim_event;
use crate::message::{PayerMessage, RemittanceMessage};
use crate::metrics::Metrics;
use crate::queue::{EnqueueOptions, PRIORITY_NORMAL, Queue};
use crate::remittance::{adjudicate_claim, validate_against_claim};

/// Adjudication rules and timing for a single payer (spec.md §3 `PayerConfig`).
#[derive(Debug, Clone)]
pub struct PayerConfig {
    pub payer_id: String,
    pub display_name: String,
    pub min_processing_delay_ms: u64,
    pub max_processing_delay_ms: u64,
    pub payer_percentage: f64,
    pub copay_fixed_amount: f64,
    pub deductible_percentage: f64,
    pub denial_rate: f64,
    pub hard_denial_rate: f64,
    pub preferred_categories: Option<Vec<String>>,
    /// How many claims this payer's worker adjudicates concurrently. Not
    /// part of spec.md's `PayerConfig` fields; it's pipeline wiring, kept
    /// alongside the rest of the payer's tuning knobs for convenience.
    pub worker_concurrency: usize,
}

/// The authoritative payer registry resolves the Open Question in spec.md
/// §9: `payer_id` space is `{medicare, united_health_group, anthem}` and
/// nothing else (see `schema::KNOWN_PAYER_IDS`).
pub fn default_registry() -> HashMap<String, PayerConfig> {
    let mut registry = HashMap::new();
    registry.insert(
        "medicare".to_string(),
        PayerConfig {
            payer_id: "medicare".to_string(),
            display_name: "Medicare".to_string(),
            min_processing_delay_ms: 200,
            max_processing_delay_ms: 1500,
            payer_percentage: 0.80,
            copay_fixed_amount: 20.0,
            deductible_percentage: 0.10,
            denial_rate: 0.05,
            hard_denial_rate: 0.5,
            preferred_categories: None,
            worker_concurrency: 8,
        },
    );
    registry.insert(
        "united_health_group".to_string(),
        PayerConfig {
            payer_id: "united_health_group".to_string(),
            display_name: "United Health Group".to_string(),
            min_processing_delay_ms: 100,
            max_processing_delay_ms: 900,
            payer_percentage: 0.70,
            copay_fixed_amount: 30.0,
            deductible_percentage: 0.15,
            denial_rate: 0.08,
            hard_denial_rate: 0.6,
            preferred_categories: Some(vec![
                "medical_necessity".to_string(),
                "authorization".to_string(),
            ]),
            worker_concurrency: 8,
        },
    );
    registry.insert(
        "anthem".to_string(),
        PayerConfig {
            payer_id: "anthem".to_string(),
            display_name: "Anthem".to_string(),
            min_processing_delay_ms: 300,
            max_processing_delay_ms: 2000,
            payer_percentage: 0.75,
            copay_fixed_amount: 25.0,
            deductible_percentage: 0.12,
            denial_rate: 0.06,
            hard_denial_rate: 0.4,
            preferred_categories: Some(vec!["coverage".to_string(), "bundling".to_string()]),
            worker_concurrency: 6,
        },
    );
    registry
}

/// Register a queue worker that adjudicates every claim arriving on this
/// payer's queue and forwards the resulting remittance onto
/// `remittance_queue`. Returns the dispatcher's `JoinHandle`.
pub fn spawn_payer_worker(
    queue: &Queue<PayerMessage>,
    config: PayerConfig,
    remittance_queue: Queue<RemittanceMessage>,
    metrics: Arc<Metrics>,
    verbose: bool,
) -> tokio::task::JoinHandle<()> {
    let concurrency = config.worker_concurrency;
    queue.register_worker(
        move |msg| {
            let config = config.clone();
            let remittance_queue = remittance_queue.clone();
            let metrics = metrics.clone();
            async move { handle_claim(msg, config, remittance_queue, metrics, verbose).await }
        },
        concurrency,
    )
}

async fn handle_claim(
    msg: PayerMessage,
    config: PayerConfig,
    remittance_queue: Queue<RemittanceMessage>,
    metrics: Arc<Metrics>,
    verbose: bool,
) -> Result<(), PipelineError> {
    let PayerMessage::Adjudicate(envelope) = msg;
    let claim_id = envelope.claim.claim_id.clone();

    if verbose {
        log_claim_event(
            "payer",
            &claim_id,
            "received_for_adjudication",
            &format!("Received claim for adjudication by {}", config.payer_id),
        );
    }

    let delay_ms = {
        let mut rng = rand::rng();
        if config.max_processing_delay_ms > config.min_processing_delay_ms {
            rng.random_range(config.min_processing_delay_ms..=config.max_processing_delay_ms)
        } else {
            config.min_processing_delay_ms
        }
    };
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let advice = {
        let mut rng = rand::rng();
        adjudicate_claim(
            &envelope.correlation_id,
            &envelope.claim,
            &config,
            Utc::now(),
            &mut rng,
        )
    };

    if let Err(e) = validate_against_claim(&advice, &envelope.claim) {
        metrics.record_error(Some(&config.payer_id)).await;
        return Err(e);
    }

    if verbose {
        log_claim_event(
            "payer",
            &claim_id,
            "finished_adjudication",
            &format!("Finished adjudication for claim: {claim_id}"),
        );
    }

    if let Err(e) = remittance_queue
        .enqueue(
            RemittanceMessage::Processed(advice),
            EnqueueOptions {
                priority: PRIORITY_NORMAL,
                max_attempts: 5,
                base_delay_ms: 500,
                lease_ms: None,
            },
        )
        .await
    {
        metrics.record_error(Some(&config.payer_id)).await;
        return Err(PipelineError::Transient(format!("enqueue remittance failed: {e}")));
    }

    metrics.record_remittance_generated();

    Ok(())
}
