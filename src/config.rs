//! CLI argument parsing (`clap::Parser`, replacing the teacher's hand-rolled
//! `env::args()` walk) plus env-sourced runtime configuration for the
//! out-of-scope collaborators named in spec.md §6.

use std::env;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "clearingflow", about = "Medical-claims clearinghouse pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stream claims from a newline-delimited JSON file into the pipeline.
    Ingest {
        /// Path to a JSONL file of `PayerClaim` records.
        path: String,
        /// Target ingestion rate, in accepted claims per second.
        #[arg(long, default_value_t = 1.0)]
        rate: f64,
        #[arg(long, short, default_value_t = false)]
        verbose: bool,
    },
}

/// Connection settings for the collaborators spec.md §1/§6 mark out of
/// scope for this crate's in-memory implementation. Read from the
/// environment so a future Postgres/Redis-backed `InFlightStore` or
/// `BillingAggregator` can be swapped in without touching the CLI surface.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_password: Option<String>,
    pub log_level: String,
    pub service_name: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            redis_host: env_or("REDIS_HOST", "localhost"),
            redis_port: env_or("REDIS_PORT", "6379").parse().unwrap_or(6379),
            redis_password: env::var("REDIS_PASSWORD").ok(),
            postgres_host: env_or("POSTGRES_HOST", "localhost"),
            postgres_port: env_or("POSTGRES_PORT", "5432").parse().unwrap_or(5432),
            postgres_db: env_or("POSTGRES_DB", "clearingflow"),
            postgres_user: env_or("POSTGRES_USER", "clearingflow"),
            postgres_password: env::var("POSTGRES_PASSWORD").ok(),
            log_level: env_or("LOG_LEVEL", "info"),
            service_name: env_or("SERVICE_NAME", "clearingflow"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
