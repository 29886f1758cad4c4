//! Payment wire types
//!
//! Strongly-typed representations of the backend payment records and the
//! request/response payloads of the payment endpoints.

use serde::{Deserialize, Serialize};

/// Card summary attached to a stored payment method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    /// Card network (e.g. `"visa"`)
    pub brand: String,
    /// Last four digits
    pub last4: String,
    /// Expiry month (1–12)
    pub exp_month: u8,
    /// Four-digit expiry year
    pub exp_year: u16,
}

/// Linked-identity summary (processor-hosted saved payment / autofill)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    /// Email the linked identity is registered under
    pub email: String,
}

/// Structured postal address for card-network verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Street address, line 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    /// Street address, line 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// City
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State, province, or region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal or ZIP code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Two-letter country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Billing details attached to a payment method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    /// Cardholder name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Billing email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Billing phone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Billing address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// A stored payment method as the backend reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodRecord {
    /// Processor identifier (e.g. `pm_123`)
    pub id: String,

    /// Method type (`"card"`, `"link"`, ...)
    #[serde(rename = "type")]
    pub method_type: String,

    /// Card summary, present for card methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardSummary>,

    /// Linked-identity summary, present for link methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkSummary>,

    /// Billing details, when the backend has them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_details: Option<BillingDetails>,
}

impl PaymentMethodRecord {
    /// Whether this record can back the existing-payment view
    ///
    /// A record without a card or linked-identity summary has nothing to
    /// show the user, so the modal opens on the new-payment form instead.
    pub fn is_usable(&self) -> bool {
        self.card.is_some() || self.link.is_some()
    }

    /// Short human-readable summary for the existing-payment view
    pub fn display_summary(&self) -> String {
        if let Some(card) = &self.card {
            format!("{} •••• {}", card.brand, card.last4)
        } else if let Some(link) = &self.link {
            format!("Link ({})", link.email)
        } else {
            self.method_type.clone()
        }
    }
}

/// Setup-intent token issued by the backend, used once per update attempt
#[derive(Debug, Clone, Deserialize)]
pub struct SetupIntent {
    /// Client secret passed to the widget's confirm step
    pub client_secret: String,
}

/// Parameters for the widget's confirm-setup step
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmSetupParams {
    /// Client secret from a freshly created setup intent
    pub client_secret: String,
    /// Billing details to attach to the new payment method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_details: Option<BillingDetails>,
}

/// Request body for `POST /api/stripe/update-payment-method`
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePaymentMethodRequest {
    /// The payment method to persist as the account's active method
    pub payment_method_id: String,
    /// Updated billing details, for the card-edit flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_details: Option<BillingDetails>,
}

/// Response body for `POST /api/stripe/update-payment-method`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaymentMethodResponse {
    /// Whether the backend persisted the change
    pub success: bool,
}

/// Envelope for `GET /api/stripe/payment-methods`
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodEnvelope {
    /// The account's active payment method, once propagation completes
    pub payment_method: Option<PaymentMethodRecord>,
}

/// Error body the backend attaches to non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable error detail
    #[serde(default)]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn card_record() -> PaymentMethodRecord {
        PaymentMethodRecord {
            id: "pm_123".to_string(),
            method_type: "card".to_string(),
            card: Some(CardSummary {
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                exp_month: 12,
                exp_year: 2030,
            }),
            link: None,
            billing_details: None,
        }
    }

    #[test]
    fn test_record_usability() {
        assert!(card_record().is_usable());

        let bare = PaymentMethodRecord {
            id: "pm_x".to_string(),
            method_type: "card".to_string(),
            card: None,
            link: None,
            billing_details: None,
        };
        assert!(!bare.is_usable());
    }

    #[test]
    fn test_display_summary() {
        assert_eq!(card_record().display_summary(), "visa •••• 4242");

        let link = PaymentMethodRecord {
            id: "pm_l".to_string(),
            method_type: "link".to_string(),
            card: None,
            link: Some(LinkSummary {
                email: "user@example.com".to_string(),
            }),
            billing_details: None,
        };
        assert_eq!(link.display_summary(), "Link (user@example.com)");
    }

    #[test]
    fn test_record_round_trips_type_field() {
        let json = serde_json::to_value(card_record()).unwrap();
        assert_eq!(json["type"], "card");
        let back: PaymentMethodRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, card_record());
    }

    #[test]
    fn test_update_request_omits_absent_billing_details() {
        let req = UpdatePaymentMethodRequest {
            payment_method_id: "pm_123".to_string(),
            billing_details: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "payment_method_id": "pm_123" })
        );
    }

    #[test]
    fn test_envelope_with_null_record() {
        let env: PaymentMethodEnvelope =
            serde_json::from_str(r#"{"payment_method": null}"#).unwrap();
        assert!(env.payment_method.is_none());
    }
}
