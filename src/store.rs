//! In-flight correlation store: the collaborator boundary spec.md §1 and §6
//! mark out-of-scope (a real deployment would back this with Postgres or
//! Redis). `InFlightStore` is the trait seam; `InMemoryStore` is the
//! in-process implementation this crate ships.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::schema::PayerClaim;

/// A claim awaiting its remittance, keyed by `correlation_id`.
#[derive(Debug, Clone)]
pub struct InFlightClaim {
    pub claim: PayerClaim,
    pub payer_id: String,
    pub ingested_at: DateTime<Utc>,
    pub submitted_at: Instant,
}

#[async_trait]
pub trait InFlightStore: Send + Sync {
    async fn insert(&self, correlation_id: String, claim: InFlightClaim);

    /// Remove and return the in-flight record for a correlation id, if any.
    /// Returning `None` signals an orphan remittance (spec.md §4.5).
    async fn take(&self, correlation_id: &str) -> Option<InFlightClaim>;

    async fn len(&self) -> usize;

    /// Remove and return every record older than `max_age`, for the
    /// periodic sweep described in spec.md §4.7.
    async fn sweep_aged_out(&self, max_age: Duration) -> Vec<(String, InFlightClaim)>;
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<HashMap<String, InFlightClaim>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InFlightStore for InMemoryStore {
    async fn insert(&self, correlation_id: String, claim: InFlightClaim) {
        self.inner.lock().await.insert(correlation_id, claim);
    }

    async fn take(&self, correlation_id: &str) -> Option<InFlightClaim> {
        self.inner.lock().await.remove(correlation_id)
    }

    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    async fn sweep_aged_out(&self, max_age: Duration) -> Vec<(String, InFlightClaim)> {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let stale: Vec<String> = guard
            .iter()
            .filter(|(_, v)| now.duration_since(v.submitted_at) > max_age)
            .map(|(k, _)| k.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|id| guard.remove(&id).map(|v| (id, v)))
            .collect()
    }
}

/// A correlation id unique enough for this pipeline's lifetime: a
/// monotonic millisecond timestamp prefix plus a random suffix, per spec.md
/// §4.2's own resolution of the Open Question (no `uuid` dependency needed).
pub fn new_correlation_id(rng: &mut impl rand::Rng) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rng.random();
    format!("{millis:x}-{suffix:08x}")
}

pub fn validate_payer_id(payer_id: &str) -> Result<(), PipelineError> {
    if crate::schema::KNOWN_PAYER_IDS.contains(&payer_id) {
        Ok(())
    } else {
        Err(PipelineError::Schema(format!(
            "unknown payer_id '{payer_id}'"
        )))
    }
}
