use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::denial::{DenialReason, Severity};
use crate::error::PipelineError;
use crate::payer::PayerConfig;
use crate::schema::PayerClaim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Approved,
    Denied,
    PartialDenial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialInfo {
    pub code: String,
    pub group_code: String,
    pub reason_code: String,
    pub category: String,
    pub severity: Severity,
    pub description: String,
}

impl From<&DenialReason> for DenialInfo {
    fn from(reason: &DenialReason) -> Self {
        Self {
            code: reason.code.to_string(),
            group_code: reason.group_code.to_string(),
            reason_code: reason.reason_code.to_string(),
            category: reason.category.to_string(),
            severity: reason.severity,
            description: reason.description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemittanceLine {
    pub service_line_id: String,
    pub billed_amount: f64,
    pub payer_paid_amount: f64,
    pub coinsurance_amount: f64,
    pub copay_amount: f64,
    pub deductible_amount: f64,
    pub not_allowed_amount: f64,
    pub status: LineStatus,
    pub denial_info: Option<DenialInfo>,
}

impl RemittanceLine {
    fn sum(&self) -> f64 {
        self.payer_paid_amount
            + self.coinsurance_amount
            + self.copay_amount
            + self.deductible_amount
            + self.not_allowed_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Approved,
    Denied,
    PartialDenial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemittanceAdvice {
    pub correlation_id: String,
    pub claim_id: String,
    pub payer_id: String,
    pub service_line_remittances: Vec<RemittanceLine>,
    pub processed_at: DateTime<Utc>,
    pub overall_status: OverallStatus,
    pub total_denied_amount: Option<f64>,
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Add the rounding residual (target minus the rounded sum) to whichever
/// component is largest, so the five components sum to `target` exactly
/// (spec.md §4.4 step 3, §8 property 1).
fn reconcile(components: &mut [f64; 5], target: f64) {
    for c in components.iter_mut() {
        *c = round_cents(*c);
    }
    let sum: f64 = components.iter().sum();
    let residual = round_cents(target - sum);
    if residual != 0.0 {
        let (idx, _) = components
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        components[idx] = round_cents(components[idx] + residual);
    }
}

/// Adjudicate a single service line against a payer's rules (spec.md §4.4).
pub fn adjudicate_line(
    service_line_id: &str,
    billed_amount: f64,
    config: &PayerConfig,
    rng: &mut impl rand::Rng,
) -> RemittanceLine {
    let billed = round_cents(billed_amount);

    if rng.random_bool(config.denial_rate) {
        let hard = rng.random_bool(config.hard_denial_rate);
        if hard {
            let mut components = [0.0, 0.0, 0.0, 0.0, billed];
            reconcile(&mut components, billed);
            let reason = crate::denial::select_reason(
                Severity::Hard,
                config.preferred_categories.as_deref(),
                rng,
            );
            return RemittanceLine {
                service_line_id: service_line_id.to_string(),
                billed_amount: billed,
                payer_paid_amount: components[0],
                coinsurance_amount: components[1],
                copay_amount: components[2],
                deductible_amount: components[3],
                not_allowed_amount: components[4],
                status: LineStatus::Denied,
                denial_info: Some(reason.into()),
            };
        }

        let not_allowed = round_cents(billed * rng.random_range(0.3..0.7));
        let remainder = (billed - not_allowed).max(0.0);
        let copay = config.copay_fixed_amount.min(remainder).max(0.0);
        let deductible = (remainder - copay).max(0.0) * config.deductible_percentage;
        let coinsurance = (remainder - copay - deductible).max(0.0);
        let mut components = [0.0, coinsurance, copay, deductible, not_allowed];
        reconcile(&mut components, billed);
        let reason =
            crate::denial::select_reason(Severity::Soft, config.preferred_categories.as_deref(), rng);
        return RemittanceLine {
            service_line_id: service_line_id.to_string(),
            billed_amount: billed,
            payer_paid_amount: components[0],
            coinsurance_amount: components[1],
            copay_amount: components[2],
            deductible_amount: components[3],
            not_allowed_amount: components[4],
            status: LineStatus::PartialDenial,
            denial_info: Some(reason.into()),
        };
    }

    let payer_paid = billed * config.payer_percentage;
    let copay = config.copay_fixed_amount.min(billed - payer_paid).max(0.0);
    let deductible = (billed - payer_paid - copay).max(0.0) * config.deductible_percentage;
    let coinsurance = (billed - payer_paid - copay - deductible).max(0.0);
    let mut components = [payer_paid, coinsurance, copay, deductible, 0.0];
    reconcile(&mut components, billed);
    RemittanceLine {
        service_line_id: service_line_id.to_string(),
        billed_amount: billed,
        payer_paid_amount: components[0],
        coinsurance_amount: components[1],
        copay_amount: components[2],
        deductible_amount: components[3],
        not_allowed_amount: components[4],
        status: LineStatus::Approved,
        denial_info: None,
    }
}

/// Adjudicate every service line on a claim and assemble the advice. Does
/// not sleep; the payer worker is responsible for the processing delay.
pub fn adjudicate_claim(
    correlation_id: &str,
    claim: &PayerClaim,
    config: &PayerConfig,
    processed_at: DateTime<Utc>,
    rng: &mut impl rand::Rng,
) -> RemittanceAdvice {
    let lines: Vec<RemittanceLine> = claim
        .service_lines
        .iter()
        .map(|line| adjudicate_line(&line.service_line_id, line.billed_amount(), config, rng))
        .collect();

    let overall_status = if lines.iter().all(|l| l.status == LineStatus::Approved) {
        OverallStatus::Approved
    } else if lines.iter().all(|l| l.status != LineStatus::Approved) {
        OverallStatus::Denied
    } else {
        OverallStatus::PartialDenial
    };

    let total_denied_amount = if overall_status == OverallStatus::Approved {
        None
    } else {
        Some(
            lines
                .iter()
                .filter(|l| l.status != LineStatus::Approved)
                .map(|l| l.not_allowed_amount)
                .sum(),
        )
    };

    RemittanceAdvice {
        correlation_id: correlation_id.to_string(),
        claim_id: claim.claim_id.clone(),
        payer_id: claim.insurance.payer_id.clone(),
        service_line_remittances: lines,
        processed_at,
        overall_status,
        total_denied_amount,
    }
}

/// Verify the money-conservation invariant (spec.md §3, §8 property 1).
/// A violation here indicates a reconciliation bug, not bad input — it is
/// a `PipelineError::Semantic`, non-retryable.
pub fn validate_against_claim(
    advice: &RemittanceAdvice,
    claim: &PayerClaim,
) -> Result<(), PipelineError> {
    for (remit, service_line) in advice
        .service_line_remittances
        .iter()
        .zip(&claim.service_lines)
    {
        let billed = round_cents(service_line.billed_amount());
        let sum = remit.sum();
        if (sum - billed).abs() > 1e-2 {
            return Err(PipelineError::Semantic(format!(
                "claim {}: service line {} remittance sum {:.2} does not match billed amount {:.2}",
                claim.claim_id, remit.service_line_id, sum, billed
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub fn mock_remittance() -> RemittanceAdvice {
    RemittanceAdvice {
        correlation_id: "corr-1".to_string(),
        claim_id: "abc123".to_string(),
        payer_id: "medicare".to_string(),
        service_line_remittances: vec![RemittanceLine {
            service_line_id: "sl1".to_string(),
            billed_amount: 150.0,
            payer_paid_amount: 120.0,
            coinsurance_amount: 15.0,
            copay_amount: 10.0,
            deductible_amount: 5.0,
            not_allowed_amount: 0.0,
            status: LineStatus::Approved,
            denial_info: None,
        }],
        processed_at: Utc::now(),
        overall_status: OverallStatus::Approved,
        total_denied_amount: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payer::default_registry;
    use crate::schema::mock_claim;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn medicare_config() -> PayerConfig {
        default_registry().get("medicare").unwrap().clone()
    }

    #[test]
    fn single_approved_claim_matches_spec_example() {
        let config = PayerConfig {
            payer_percentage: 0.8,
            copay_fixed_amount: 20.0,
            deductible_percentage: 0.1,
            denial_rate: 0.0,
            ..medicare_config()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let line = adjudicate_line("sl1", 100.0, &config, &mut rng);
        assert_eq!(line.status, LineStatus::Approved);
        assert!((line.payer_paid_amount - 80.0).abs() < 1e-9);
        assert!((line.copay_amount - 20.0).abs() < 1e-9);
        assert!((line.deductible_amount - 0.0).abs() < 1e-9);
        assert!((line.coinsurance_amount - 0.0).abs() < 1e-9);
        assert!((line.not_allowed_amount - 0.0).abs() < 1e-9);
    }

    #[test]
    fn hard_denial_zeroes_payment_and_allocates_full_billed_to_not_allowed() {
        let config = PayerConfig {
            denial_rate: 1.0,
            hard_denial_rate: 1.0,
            ..medicare_config()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let line = adjudicate_line("sl1", 50.0, &config, &mut rng);
        assert_eq!(line.status, LineStatus::Denied);
        assert_eq!(line.not_allowed_amount, 50.0);
        assert_eq!(line.payer_paid_amount, 0.0);
        assert_eq!(line.coinsurance_amount, 0.0);
        assert_eq!(line.copay_amount, 0.0);
        assert_eq!(line.deductible_amount, 0.0);
        let info = line.denial_info.expect("hard denial carries a denial reason");
        assert_eq!(info.severity, Severity::Hard);
    }

    #[test]
    fn rounding_reconciliation_sums_exactly_to_billed() {
        let config = PayerConfig {
            payer_percentage: 1.0 / 3.0,
            copay_fixed_amount: 0.0,
            deductible_percentage: 1.0 / 3.0,
            denial_rate: 0.0,
            ..medicare_config()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let line = adjudicate_line("sl1", 100.03, &config, &mut rng);
        let sum = line.payer_paid_amount
            + line.coinsurance_amount
            + line.copay_amount
            + line.deductible_amount
            + line.not_allowed_amount;
        assert!((sum - 100.03).abs() < 1e-9);
    }

    #[test]
    fn rounding_reconciliation_matches_spec_worked_example() {
        // spec.md §8: billed 100.03 split three even ways rounds each share to
        // 33.34 (sum 100.02); the 1-cent residual lands on the last tied-max
        // component, giving {33.34, 33.34, 33.35}.
        let mut components = [33.34, 33.34, 33.34, 0.0, 0.0];
        reconcile(&mut components, 100.03);
        assert_eq!(components, [33.34, 33.34, 33.35, 0.0, 0.0]);
        let sum: f64 = components.iter().sum();
        assert!((sum - 100.03).abs() < 1e-9);
    }

    #[test]
    fn money_conservation_holds_across_many_seeds() {
        let config = medicare_config();
        let claim = mock_claim();
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let advice = adjudicate_claim("corr", &claim, &config, Utc::now(), &mut rng);
            assert!(validate_against_claim(&advice, &claim).is_ok());
        }
    }

    #[test]
    fn overall_status_denied_when_every_line_denied() {
        let config = PayerConfig {
            denial_rate: 1.0,
            hard_denial_rate: 1.0,
            ..medicare_config()
        };
        let claim = mock_claim();
        let mut rng = StdRng::seed_from_u64(4);
        let advice = adjudicate_claim("corr", &claim, &config, Utc::now(), &mut rng);
        assert_eq!(advice.overall_status, OverallStatus::Denied);
        assert_eq!(advice.total_denied_amount, Some(150.0));
    }

    #[test]
    fn validate_against_claim_rejects_broken_sum() {
        let claim = mock_claim();
        let mut advice = mock_remittance();
        advice.service_line_remittances[0].not_allowed_amount += 1000.0;
        assert!(validate_against_claim(&advice, &claim).is_err());
    }
}
