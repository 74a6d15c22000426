use rand::Rng;
use serde::{Deserialize, Serialize};

/// Denial severity: HARD (no payment), SOFT (partial/reviewable),
/// ADMINISTRATIVE (procedural). See spec.md GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Hard,
    Soft,
    Administrative,
}

/// A single catalogue entry: stable code, EDI group/reason code, category,
/// severity, human description, and selection weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialReason {
    pub code: &'static str,
    pub group_code: &'static str,
    pub reason_code: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub weight: f64,
}

/// Static, read-only-at-startup denial catalogue (spec.md §6).
pub fn catalogue() -> &'static [DenialReason] {
    &[
        DenialReason {
            code: "NONCOVERED",
            group_code: "CO",
            reason_code: "96",
            category: "coverage",
            severity: Severity::Hard,
            description: "Non-covered charge(s)",
            weight: 3.0,
        },
        DenialReason {
            code: "MEDNEC",
            group_code: "CO",
            reason_code: "50",
            category: "medical_necessity",
            severity: Severity::Hard,
            description: "These are non-covered services because this is not deemed a medical necessity",
            weight: 2.0,
        },
        DenialReason {
            code: "DUPLICATE",
            group_code: "CO",
            reason_code: "18",
            category: "administrative",
            severity: Severity::Administrative,
            description: "Exact duplicate claim/service",
            weight: 1.5,
        },
        DenialReason {
            code: "AUTHREQ",
            group_code: "CO",
            reason_code: "197",
            category: "authorization",
            severity: Severity::Hard,
            description: "Precertification/authorization/notification absent",
            weight: 2.5,
        },
        DenialReason {
            code: "TIMELY",
            group_code: "CO",
            reason_code: "29",
            category: "administrative",
            severity: Severity::Administrative,
            description: "The time limit for filing has expired",
            weight: 1.0,
        },
        DenialReason {
            code: "PATRESP",
            group_code: "PR",
            reason_code: "1",
            category: "patient_responsibility",
            severity: Severity::Soft,
            description: "Deductible amount",
            weight: 4.0,
        },
        DenialReason {
            code: "BUNDLED",
            group_code: "OA",
            reason_code: "23",
            category: "bundling",
            severity: Severity::Soft,
            description: "The impact of prior payer(s) adjudication including payments and/or adjustments",
            weight: 2.0,
        },
    ]
}

/// Weighted-random selection from the catalogue, optionally restricted to a
/// payer's preferred denial categories (spec.md §4.4).
pub fn select_reason(
    severity: Severity,
    preferred_categories: Option<&[String]>,
    rng: &mut impl Rng,
) -> &'static DenialReason {
    let all = catalogue();
    let candidates: Vec<&DenialReason> = all
        .iter()
        .filter(|r| r.severity == severity)
        .filter(|r| match preferred_categories {
            Some(cats) if !cats.is_empty() => cats.iter().any(|c| c == r.category),
            _ => true,
        })
        .collect();
    // Fall back to any reason of the right severity if the preferred
    // categories filter left nothing (a misconfigured payer shouldn't
    // crash adjudication).
    let candidates = if candidates.is_empty() {
        all.iter().filter(|r| r.severity == severity).collect()
    } else {
        candidates
    };
    let total_weight: f64 = candidates.iter().map(|r| r.weight).sum();
    let mut pick = rng.random_range(0.0..total_weight.max(f64::MIN_POSITIVE));
    for reason in &candidates {
        if pick < reason.weight {
            return reason;
        }
        pick -= reason.weight;
    }
    candidates.last().copied().unwrap_or(&all[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn catalogue_has_non_negative_weights() {
        for reason in catalogue() {
            assert!(reason.weight >= 0.0);
        }
    }

    #[test]
    fn select_reason_respects_severity() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let reason = select_reason(Severity::Hard, None, &mut rng);
            assert_eq!(reason.severity, Severity::Hard);
        }
    }

    #[test]
    fn select_reason_respects_preferred_categories() {
        let mut rng = StdRng::seed_from_u64(2);
        let preferred = vec!["coverage".to_string()];
        for _ in 0..20 {
            let reason = select_reason(Severity::Hard, Some(&preferred), &mut rng);
            assert_eq!(reason.category, "coverage");
        }
    }

    #[test]
    fn select_reason_falls_back_when_no_category_match() {
        let mut rng = StdRng::seed_from_u64(3);
        let preferred = vec!["nonexistent_category".to_string()];
        let reason = select_reason(Severity::Soft, Some(&preferred), &mut rng);
        assert_eq!(reason.severity, Severity::Soft);
    }
}
