use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remittance::RemittanceAdvice;
use crate::schema::PayerClaim;

/// A claim paired with the correlation id generated for it at ingestion
/// (spec.md §4.2). Carrying `correlation_id` + `ingested_at` through the
/// message, rather than an inline response channel, is what lets the
/// clearinghouse and matcher stages run on separate queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimEnvelope {
    pub correlation_id: String,
    pub claim: PayerClaim,
    pub ingested_at: DateTime<Utc>,
}

/// Message enqueued onto the claims queue by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClaimMessage {
    NewClaim(ClaimEnvelope),
}

/// Message enqueued onto a `payer-<id>` queue by the clearinghouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PayerMessage {
    Adjudicate(ClaimEnvelope),
}

/// Message enqueued onto the remittance queue by a payer worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemittanceMessage {
    Processed(RemittanceAdvice),
}
