//! Read-only counters and derived rates for the metrics surface described
//! in spec.md §6. Queue depths are read directly off each `Queue` handle;
//! this module owns only the counters a queue can't derive on its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct PayerCounters {
    pub claims_processed: u64,
    pub errors: u64,
}

pub struct Metrics {
    claims_ingested_total: AtomicU64,
    claims_processed_total: AtomicU64,
    remittances_generated_total: AtomicU64,
    errors_total: AtomicU64,
    per_payer: Mutex<HashMap<String, PayerCounters>>,
    started_at: Instant,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub claims_ingested_total: u64,
    pub claims_processed_total: u64,
    pub remittances_generated_total: u64,
    pub errors_total: u64,
    pub per_payer: HashMap<String, PayerCounters>,
    pub claims_per_sec: f64,
    pub remittances_per_sec: f64,
    pub uptime_secs: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            claims_ingested_total: AtomicU64::new(0),
            claims_processed_total: AtomicU64::new(0),
            remittances_generated_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            per_payer: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn record_claim_ingested(&self) {
        self.claims_ingested_total.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_claim_processed(&self, payer_id: &str) {
        self.claims_processed_total.fetch_add(1, Ordering::Relaxed);
        let mut per_payer = self.per_payer.lock().await;
        per_payer.entry(payer_id.to_string()).or_default().claims_processed += 1;
    }

    pub fn record_remittance_generated(&self) {
        self.remittances_generated_total.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_error(&self, payer_id: Option<&str>) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        if let Some(payer_id) = payer_id {
            let mut per_payer = self.per_payer.lock().await;
            per_payer.entry(payer_id.to_string()).or_default().errors += 1;
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let uptime_secs = self.started_at.elapsed().as_secs_f64().max(1e-6);
        let claims_ingested_total = self.claims_ingested_total.load(Ordering::Relaxed);
        let remittances_generated_total = self.remittances_generated_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            claims_ingested_total,
            claims_processed_total: self.claims_processed_total.load(Ordering::Relaxed),
            remittances_generated_total,
            errors_total: self.errors_total.load(Ordering::Relaxed),
            per_payer: self.per_payer.lock().await.clone(),
            claims_per_sec: claims_ingested_total as f64 / uptime_secs,
            remittances_per_sec: remittances_generated_total as f64 / uptime_secs,
            uptime_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_accumulate_per_payer() {
        let metrics = Metrics::new();
        metrics.record_claim_ingested();
        metrics.record_claim_ingested();
        metrics.record_claim_processed("medicare").await;
        metrics.record_error(Some("medicare")).await;
        metrics.record_remittance_generated();

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.claims_ingested_total, 2);
        assert_eq!(snapshot.claims_processed_total, 1);
        assert_eq!(snapshot.remittances_generated_total, 1);
        assert_eq!(snapshot.errors_total, 1);
        let medicare = snapshot.per_payer.get("medicare").unwrap();
        assert_eq!(medicare.claims_processed, 1);
        assert_eq!(medicare.errors, 1);
    }
}
