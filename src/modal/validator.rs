//! Billing field validation
//!
//! Pure presence checks over the billing inputs the modal collects itself.
//! The hosted widget validates its own card fields; this validator only
//! covers the fields the application renders.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A billing input field the modal renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingField {
    /// Cardholder name
    Name,
    /// Street address, line 1
    AddressLine1,
    /// Street address, line 2 (never required)
    AddressLine2,
    /// City
    City,
    /// State, province, or region
    State,
    /// Postal or ZIP code
    PostalCode,
}

impl BillingField {
    /// Stable field key, matching the form input names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::AddressLine1 => "address_line1",
            Self::AddressLine2 => "address_line2",
            Self::City => "city",
            Self::State => "state",
            Self::PostalCode => "postal_code",
        }
    }
}

impl fmt::Display for BillingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-keyed validation messages; keys are unique, iteration is ordered
pub type ValidationErrors = BTreeMap<BillingField, String>;

/// Editable billing form values held by the modal state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingFields {
    /// Cardholder name
    pub name: String,
    /// Street address, line 1
    pub line1: String,
    /// Street address, line 2
    pub line2: String,
    /// City
    pub city: String,
    /// State, province, or region
    pub state: String,
    /// Postal or ZIP code
    pub postal_code: String,
}

impl BillingFields {
    /// Set one field by its key
    pub fn set(&mut self, field: BillingField, value: String) {
        match field {
            BillingField::Name => self.name = value,
            BillingField::AddressLine1 => self.line1 = value,
            BillingField::AddressLine2 => self.line2 = value,
            BillingField::City => self.city = value,
            BillingField::State => self.state = value,
            BillingField::PostalCode => self.postal_code = value,
        }
    }
}

/// Check required billing fields for non-empty trimmed values
///
/// Cardholder name and address line 1 are always required; city, state, and
/// postal code only when `include_address_fields` is set. Returns an empty
/// map when everything passes.
pub fn validate(fields: &BillingFields, include_address_fields: bool) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    let mut require = |field: BillingField, value: &str, message: &str| {
        if value.trim().is_empty() {
            errors.insert(field, message.to_string());
        }
    };

    require(BillingField::Name, &fields.name, "Cardholder name is required");
    require(
        BillingField::AddressLine1,
        &fields.line1,
        "Address line 1 is required",
    );

    if include_address_fields {
        require(BillingField::City, &fields.city, "City is required");
        require(BillingField::State, &fields.state, "State is required");
        require(
            BillingField::PostalCode,
            &fields.postal_code,
            "Postal code is required",
        );
    }

    errors
}
