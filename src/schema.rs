use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The root struct for a claim, as submitted by a billing organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerClaim {
    pub claim_id: String,
    pub place_of_service_code: u32,
    pub insurance: Insurance,
    pub patient: Patient,
    pub organization: Organization,
    pub rendering_provider: Provider,
    pub service_lines: Vec<ServiceLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insurance {
    pub payer_id: String,
    pub patient_member_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub dob: String,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub billing_npi: Option<String>,
    pub ein: Option<String>,
    pub contact: Option<Contact>,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub first_name: String,
    pub last_name: String,
    pub npi: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_line_id: String,
    pub procedure_code: String,
    pub units: u32,
    pub details: String,
    pub unit_charge_currency: String,
    pub unit_charge_amount: f64,
    pub modifiers: Option<Vec<String>>,
    pub do_not_bill: Option<bool>,
}

impl ServiceLine {
    /// Billed amount for this line: `units × unit_charge_amount`.
    pub fn billed_amount(&self) -> f64 {
        self.units as f64 * self.unit_charge_amount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Payer id space this clearinghouse recognizes. Resolves the Open Question
/// in spec.md §9: this is the authoritative id space, not an unrelated
/// registry key.
pub const KNOWN_PAYER_IDS: [&str; 3] = ["medicare", "united_health_group", "anthem"];

impl PayerClaim {
    /// Total billed amount across all service lines.
    pub fn total_billed(&self) -> f64 {
        self.service_lines.iter().map(ServiceLine::billed_amount).sum()
    }

    /// Validate the invariants from spec.md §3: at least one service line,
    /// NPI format, well-formed DOB, gender in {m, f}.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.service_lines.is_empty() {
            return Err(PipelineError::Schema(format!(
                "claim {} has no service lines",
                self.claim_id
            )));
        }
        if !is_valid_npi(&self.rendering_provider.npi) {
            return Err(PipelineError::Schema(format!(
                "claim {}: rendering provider NPI '{}' is not 10 digits",
                self.claim_id, self.rendering_provider.npi
            )));
        }
        if self.patient.gender != "m" && self.patient.gender != "f" {
            return Err(PipelineError::Schema(format!(
                "claim {}: patient gender '{}' must be m or f",
                self.claim_id, self.patient.gender
            )));
        }
        if !is_valid_dob(&self.patient.dob) {
            return Err(PipelineError::Schema(format!(
                "claim {}: patient dob '{}' is not a valid YYYY-MM-DD date",
                self.claim_id, self.patient.dob
            )));
        }
        for line in &self.service_lines {
            if line.units == 0 {
                return Err(PipelineError::Schema(format!(
                    "claim {}: service line {} has zero units",
                    self.claim_id, line.service_line_id
                )));
            }
            if line.unit_charge_amount < 0.0 {
                return Err(PipelineError::Schema(format!(
                    "claim {}: service line {} has negative unit charge",
                    self.claim_id, line.service_line_id
                )));
            }
        }
        Ok(())
    }
}

/// 10 digit NPI.
fn is_valid_npi(npi: &str) -> bool {
    npi.len() == 10 && npi.bytes().all(|b| b.is_ascii_digit())
}

/// YYYY-MM-DD well-formedness, delegated to chrono's calendar validation.
fn is_valid_dob(dob: &str) -> bool {
    chrono::NaiveDate::parse_from_str(dob, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
pub fn mock_claim() -> PayerClaim {
    PayerClaim {
        claim_id: "abc123".to_string(),
        place_of_service_code: 11,
        insurance: Insurance {
            payer_id: "medicare".to_string(),
            patient_member_id: "pmid456".to_string(),
        },
        patient: Patient {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            gender: "f".to_string(),
            dob: "1990-01-01".to_string(),
            address: Some(Address {
                street: Some("123 Main St".to_string()),
                city: Some("Metropolis".to_string()),
                state: Some("NY".to_string()),
                zip: Some("12345".to_string()),
                country: Some("USA".to_string()),
            }),
        },
        organization: Organization {
            name: "Health Inc".to_string(),
            billing_npi: Some("9876543210".to_string()),
            ein: Some("12-3456789".to_string()),
            contact: Some(Contact {
                first_name: Some("Bob".to_string()),
                last_name: Some("Jones".to_string()),
                phone_number: Some("555-1234".to_string()),
            }),
            address: Some(Address {
                street: Some("456 Health Ave".to_string()),
                city: Some("Gotham".to_string()),
                state: Some("CA".to_string()),
                zip: Some("67890".to_string()),
                country: Some("USA".to_string()),
            }),
        },
        rendering_provider: Provider {
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            npi: "1234567890".to_string(),
        },
        service_lines: vec![ServiceLine {
            service_line_id: "sl1".to_string(),
            procedure_code: "99213".to_string(),
            units: 1,
            details: "Office visit".to_string(),
            unit_charge_currency: "USD".to_string(),
            unit_charge_amount: 150.0,
            modifiers: Some(vec!["A1".to_string(), "B2".to_string()]),
            do_not_bill: Some(false),
        }],
    }
}
