use clap::Parser;
use tracing::error;

use clearingflow::config::{Cli, Command, RuntimeConfig};
use clearingflow::logging;
use clearingflow::pipeline::Pipeline;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let runtime_config = RuntimeConfig::from_env();
    logging::init(&runtime_config.log_level, &runtime_config.service_name);

    let exit_code = match cli.command {
        Command::Ingest { path, rate, verbose } => run_ingest(path, rate, verbose).await,
    };

    std::process::exit(exit_code);
}

async fn run_ingest(path: String, rate: f64, verbose: bool) -> i32 {
    let pipeline = Pipeline::start(verbose);
    let result = pipeline.ingest_file(path, rate, verbose).await;
    match result {
        Ok(summary) => {
            println!(
                "Ingested {} claim(s), skipped {} malformed/invalid record(s)",
                summary.accepted, summary.skipped
            );
            pipeline.shutdown().await;
            0
        }
        Err(err) => {
            error!("ingestion terminated: {err}");
            pipeline.shutdown().await;
            1
        }
    }
}
