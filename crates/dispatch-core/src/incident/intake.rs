//! Intake draft and field validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::state::{EmergencyType, Location, PriorityLevel};

/// Phone numbers accept an optional `+` then 2 to 15 digits, no leading
/// zero (covers international formats like `+819012345678`).
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone regex is valid"));

/// The fields a caller submits to open an incident.
///
/// A draft carries no identity and no status; those are assigned by the
/// coordinator once [`IncidentDraft::validate`] passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDraft {
    /// Caller name. Required.
    pub caller_name: String,
    /// Caller phone number. Required, validated.
    pub caller_phone: String,
    /// Kind of emergency.
    pub emergency_type: EmergencyType,
    /// Scene location. Address required, coordinates optional.
    pub location: Location,
    /// Free-text detail.
    pub description: Option<String>,
    /// Urgency.
    pub priority: PriorityLevel,
}

impl IncidentDraft {
    /// Checks every field before any state is created.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: missing caller name or
    /// address, malformed phone number, or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.caller_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "caller_name",
            });
        }
        if self.caller_phone.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "caller_phone",
            });
        }
        if !PHONE_PATTERN.is_match(&self.caller_phone) {
            return Err(ValidationError::InvalidPhone {
                value: self.caller_phone.clone(),
            });
        }
        if self.location.address.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "location.address",
            });
        }
        if let Some(position) = self.location.position {
            let lat_ok = (-90.0..=90.0).contains(&position.latitude);
            let lon_ok = (-180.0..=180.0).contains(&position.longitude);
            if !lat_ok || !lon_ok {
                return Err(ValidationError::CoordinatesOutOfRange {
                    latitude: position.latitude,
                    longitude: position.longitude,
                });
            }
        }
        Ok(())
    }
}
