//! Periodic console report: A/R aging and per-patient cost-share summary,
//! read off the billing aggregator's views. See spec.md §4.6.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use prettytable::{Table, row};
use tokio::time;

use crate::billing::BillingAggregator;
use crate::logging::log_claim_event;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Runs forever, printing a combined report every `REPORT_INTERVAL`.
pub async fn run_reporter(billing: Arc<BillingAggregator>, verbose: bool) {
    if verbose {
        log_claim_event("reporter", "-", "start", "Starting reporter task");
    }
    let mut interval = time::interval(REPORT_INTERVAL);
    loop {
        interval.tick().await;
        print_combined_report(&billing).await;
    }
}

async fn print_combined_report(billing: &BillingAggregator) {
    let aging = billing.ar_aging().await;

    println!("\n{}", "--- AR Aging Report ---".bold());
    let mut aging_table = Table::new();
    aging_table.add_row(row!["Payer", "0-60s", "60-120s", "120-180s", "180s+", "Total", "Avg (ms)"]);
    for (payer, bucket) in &aging {
        aging_table.add_row(row![
            payer,
            bucket.bucket_0_60s,
            bucket.bucket_60_120s,
            bucket.bucket_120_180s,
            bucket.bucket_180s_plus,
            bucket.total,
            format!("{:.0}", bucket.weighted_average_age_ms)
        ]);
    }
    aging_table.printstd();

    let patient_totals = billing.patient_cost_share().await;
    println!("\n{}", "--- Patient Financial Summary ---".bold());
    let mut patient_table = Table::new();
    patient_table.add_row(row!["Patient", "Cost Share"]);
    for (patient, total) in &patient_totals {
        patient_table.add_row(row![patient, format!("${:.2}", total)]);
    }
    patient_table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remittance::mock_remittance;
    use chrono::Utc;

    #[tokio::test]
    async fn print_combined_report_does_not_panic_on_empty_or_populated_aggregator() {
        let billing = Arc::new(BillingAggregator::default());
        print_combined_report(&billing).await;

        let mut remittance = mock_remittance();
        remittance.claim_id = "claim-report".to_string();
        billing
            .record(crate::billing::ProcessedClaim {
                correlation_id: "corr-report".to_string(),
                claim_id: remittance.claim_id.clone(),
                patient_id: "patient-report".to_string(),
                payer_id: remittance.payer_id.clone(),
                ingested_at: Utc::now(),
                processed_at: Utc::now(),
                processing_time_ms: 45_000,
                remittance,
            })
            .await;
        print_combined_report(&billing).await;
    }
}
