//! Billing aggregator: the terminal sink. Persists processed claims
//! idempotently and exposes the A/R aging and per-patient cost-share views.
//! See spec.md §4.6.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::remittance::RemittanceAdvice;

#[derive(Debug, Clone)]
pub struct ProcessedClaim {
    pub correlation_id: String,
    pub claim_id: String,
    pub patient_id: String,
    pub payer_id: String,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub processing_time_ms: i64,
    pub remittance: RemittanceAdvice,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgingBucketCounts {
    pub bucket_0_60s: usize,
    pub bucket_60_120s: usize,
    pub bucket_120_180s: usize,
    pub bucket_180s_plus: usize,
    pub total: usize,
    pub weighted_average_age_ms: f64,
}

/// Idempotent sink + aggregate-view provider. `ON CONFLICT DO NOTHING` is
/// modeled by refusing to overwrite an existing `correlation_id` (spec.md
/// §4.6, §8 property 5).
pub struct BillingAggregator {
    records: Mutex<HashMap<String, ProcessedClaim>>,
    aging_window: StdDuration,
}

impl Default for BillingAggregator {
    fn default() -> Self {
        Self::new(StdDuration::from_secs(3600))
    }
}

impl BillingAggregator {
    pub fn new(aging_window: StdDuration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            aging_window,
        }
    }

    /// Insert a processed claim. Returns `true` if this call actually
    /// inserted a new row; `false` if `correlation_id` was already present
    /// (a replay — at-least-once delivery from an upstream retry).
    pub async fn record(&self, processed: ProcessedClaim) -> bool {
        let mut records = self.records.lock().await;
        if records.contains_key(&processed.correlation_id) {
            return false;
        }
        records.insert(processed.correlation_id.clone(), processed);
        true
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Bucket processing-time-ms per payer over the trailing observation
    /// window (spec.md §4.6).
    pub async fn ar_aging(&self) -> HashMap<String, AgingBucketCounts> {
        let records = self.records.lock().await;
        let now = Utc::now();
        let mut buckets: HashMap<String, AgingBucketCounts> = HashMap::new();
        let mut age_sums: HashMap<String, i64> = HashMap::new();

        for record in records.values() {
            let age = now.signed_duration_since(record.processed_at);
            if age.to_std().unwrap_or(StdDuration::MAX) > self.aging_window {
                continue;
            }
            let entry = buckets.entry(record.payer_id.clone()).or_default();
            let ms = record.processing_time_ms;
            if ms < 60_000 {
                entry.bucket_0_60s += 1;
            } else if ms < 120_000 {
                entry.bucket_60_120s += 1;
            } else if ms < 180_000 {
                entry.bucket_120_180s += 1;
            } else {
                entry.bucket_180s_plus += 1;
            }
            entry.total += 1;
            *age_sums.entry(record.payer_id.clone()).or_insert(0) += ms;
        }

        for (payer_id, sum) in age_sums {
            if let Some(entry) = buckets.get_mut(&payer_id) {
                entry.weighted_average_age_ms = sum as f64 / entry.total as f64;
            }
        }
        buckets
    }

    /// Sum `{copay, coinsurance, deductible}` over the first remittance
    /// line per processed claim, grouped by `patient_id` (spec.md §4.6).
    pub async fn patient_cost_share(&self) -> HashMap<String, f64> {
        let records = self.records.lock().await;
        let mut totals: HashMap<String, f64> = HashMap::new();
        for record in records.values() {
            let Some(first_line) = record.remittance.service_line_remittances.first() else {
                continue;
            };
            let share = first_line.copay_amount + first_line.coinsurance_amount + first_line.deductible_amount;
            *totals.entry(record.patient_id.clone()).or_insert(0.0) += share;
        }
        totals
    }
}
