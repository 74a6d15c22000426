//! Structured logging. Backed by `tracing` instead of the teacher's
//! `println!`, but `log_claim_event`'s call-site signature is unchanged.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing_subscriber::fmt` subscriber driven by
/// `LOG_LEVEL`/`SERVICE_NAME` (via `RuntimeConfig`). `level` is a standard
/// `tracing` filter directive (e.g. `"info"`, `"debug"`); invalid directives
/// fall back to `"info"`. Safe to call more than once — later calls are
/// no-ops.
pub fn init(level: &str, service_name: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
    tracing::info!(service_name, "logging initialized");
}

pub fn log_claim_event(component: &str, claim_id: &str, event: &str, message: &str) {
    tracing::info!(component, claim_id, event, message);
}
