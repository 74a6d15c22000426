pub mod billing;
pub mod clearinghouse;
pub mod config;
pub mod denial;
pub mod error;
pub mod fakegen;
pub mod ingestion;
pub mod logging;
pub mod matcher;
pub mod message;
pub mod metrics;
pub mod payer;
pub mod pipeline;
pub mod queue;
pub mod remittance;
pub mod reporter;
pub mod schema;
pub mod store;
pub mod sweeper;
