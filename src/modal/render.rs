//! Pure view projection
//!
//! `render` maps the modal state to a plain description of what the UI
//! should show. The rendering layer draws from this description and never
//! reaches into the state machine, so every transition is testable without
//! a UI harness.

use crate::modal::state::{ModalState, ModalViewState};
use crate::modal::validator::{BillingFields, ValidationErrors};

/// Description of the rendered modal
#[derive(Debug, Clone, PartialEq)]
pub struct ModalView {
    /// Modal heading
    pub title: &'static str,
    /// Which body to draw
    pub body: ModalBody,
    /// Single top-level error banner, when present
    pub top_level_error: Option<String>,
    /// Whether the primary update control accepts clicks
    pub update_enabled: bool,
    /// Whether a spinner should replace the update label
    pub busy: bool,
}

/// Body of the modal, one variant per view
#[derive(Debug, Clone, PartialEq)]
pub enum ModalBody {
    /// Stored payment method summary
    ExistingPayment {
        /// e.g. `"visa •••• 4242"`
        summary: String,
        /// Edit mode is active
        editing: bool,
        /// The stored method is a card whose metadata can be edited
        can_edit_card: bool,
    },
    /// New-card entry form
    NewPaymentForm {
        /// Current billing input values
        fields: BillingFields,
        /// Extended address inputs are visible
        show_address_fields: bool,
        /// Inline errors keyed by field
        errors: ValidationErrors,
    },
    /// Card metadata editor
    EditCard {
        /// Current billing input values
        fields: BillingFields,
        /// Save control enabled only after an actual change
        save_enabled: bool,
        /// Inline errors keyed by field
        errors: ValidationErrors,
    },
}

/// Project the modal state into a view description
pub fn render(state: &ModalState) -> ModalView {
    let body = match state.view {
        ModalViewState::ExistingPayment => ModalBody::ExistingPayment {
            summary: state
                .current_method
                .as_ref()
                .map(|m| m.display_summary())
                .unwrap_or_default(),
            editing: state.is_editing_mode,
            can_edit_card: state
                .current_method
                .as_ref()
                .is_some_and(|m| m.card.is_some()),
        },
        ModalViewState::NewPayment => ModalBody::NewPaymentForm {
            fields: state.fields.clone(),
            show_address_fields: state.show_additional_address_fields,
            errors: state.validation_errors.clone(),
        },
        ModalViewState::EditCard => ModalBody::EditCard {
            fields: state.fields.clone(),
            save_enabled: state.has_card_fields_changed,
            errors: state.validation_errors.clone(),
        },
    };

    ModalView {
        title: "Payment method",
        body,
        top_level_error: state.top_level_error.clone(),
        update_enabled: !state.is_submitting && !state.is_processing_link_auth,
        busy: state.is_submitting || state.is_processing_link_auth,
    }
}
