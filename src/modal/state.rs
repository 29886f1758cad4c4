//! Modal state machine
//!
//! The modal shows one of three views and a handful of flags. State is
//! created when the modal opens, mutated only through the named transitions
//! below, and discarded when the modal closes. Transitions invoked from the
//! wrong view are ignored with a debug log rather than panicking; the UI
//! may deliver a stale gesture during a re-render.

use crate::modal::validator::{BillingFields, ValidationErrors};
use crate::processor::types::PaymentMethodRecord;

/// Which of the three modal views is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalViewState {
    /// Summary of the stored payment method
    ExistingPayment,
    /// The new-card entry form (hosted widget plus billing fields)
    NewPayment,
    /// Metadata editor for the stored card
    EditCard,
}

/// Full modal state owned by the controller
#[derive(Debug, Clone)]
pub struct ModalState {
    /// Current view
    pub view: ModalViewState,
    /// Update should reuse the stored payment method
    pub use_existing: bool,
    /// The existing-payment view is in edit mode
    pub is_editing_mode: bool,
    /// The new-card form is visible
    pub show_new_card_form: bool,
    /// The card metadata editor is open
    pub is_editing_card: bool,
    /// The user changed a field in the card metadata editor
    pub has_card_fields_changed: bool,
    /// The extended address inputs are visible on the new-card form
    pub show_additional_address_fields: bool,
    /// A background auto-submit chain is in flight
    pub is_processing_link_auth: bool,
    /// A user-initiated update is in flight; disables the submit control
    pub is_submitting: bool,
    /// Single top-level error banner
    pub top_level_error: Option<String>,
    /// Inline field errors; non-empty only while a form view is showing
    pub validation_errors: ValidationErrors,
    /// Editable billing form values
    pub fields: BillingFields,
    /// The stored payment method, as known locally
    pub current_method: Option<PaymentMethodRecord>,
}

impl ModalState {
    /// Initial state for a freshly opened modal
    ///
    /// Opens on the existing-payment view when a usable stored method was
    /// supplied; otherwise straight onto the new-card form with the
    /// extended address inputs already visible.
    pub fn new(current_method: Option<PaymentMethodRecord>, user_name: Option<&str>) -> Self {
        let usable = current_method
            .as_ref()
            .is_some_and(PaymentMethodRecord::is_usable);

        let mut fields = BillingFields::default();
        if let Some(name) = current_method
            .as_ref()
            .and_then(|m| m.billing_details.as_ref())
            .and_then(|b| b.name.as_deref())
            .or(user_name)
        {
            fields.name = name.to_string();
        }

        Self {
            view: if usable {
                ModalViewState::ExistingPayment
            } else {
                ModalViewState::NewPayment
            },
            use_existing: usable,
            is_editing_mode: false,
            show_new_card_form: !usable,
            is_editing_card: false,
            has_card_fields_changed: false,
            show_additional_address_fields: !usable,
            is_processing_link_auth: false,
            is_submitting: false,
            top_level_error: None,
            validation_errors: ValidationErrors::new(),
            fields,
            current_method,
        }
    }

    /// Turn on edit mode for the existing-payment view
    pub fn enable_edit_mode(&mut self) {
        if self.view != ModalViewState::ExistingPayment {
            tracing::debug!(view = ?self.view, "enable_edit_mode ignored outside existing-payment view");
            return;
        }
        self.is_editing_mode = true;
    }

    /// Switch to the new-card form, from any view
    pub fn show_new_payment_form(&mut self) {
        self.view = ModalViewState::NewPayment;
        self.show_new_card_form = true;
        self.use_existing = false;
        self.show_additional_address_fields = true;
        self.is_editing_card = false;
        self.has_card_fields_changed = false;
        self.validation_errors.clear();
        self.top_level_error = None;
    }

    /// Abandon the new-card form and go back to the stored method
    ///
    /// `is_editing_mode` deliberately survives the round trip.
    pub fn return_to_existing_payment(&mut self) {
        if self.view != ModalViewState::NewPayment {
            tracing::debug!(view = ?self.view, "return_to_existing_payment ignored outside new-payment view");
            return;
        }
        self.view = ModalViewState::ExistingPayment;
        self.show_new_card_form = false;
        self.use_existing = true;
        self.validation_errors.clear();
    }

    /// Open the card metadata editor
    pub fn show_card_edit_form(&mut self) {
        if self.view != ModalViewState::ExistingPayment {
            tracing::debug!(view = ?self.view, "show_card_edit_form ignored outside existing-payment view");
            return;
        }
        self.view = ModalViewState::EditCard;
        self.is_editing_card = true;
        self.has_card_fields_changed = false;
        self.seed_fields_from_record();
    }

    /// Close the card metadata editor without saving
    pub fn cancel_card_edit(&mut self) {
        if self.view != ModalViewState::EditCard {
            tracing::debug!(view = ?self.view, "cancel_card_edit ignored outside edit-card view");
            return;
        }
        self.view = ModalViewState::ExistingPayment;
        self.is_editing_card = false;
        self.has_card_fields_changed = false;
        self.validation_errors.clear();
    }

    /// Record that a card metadata field was edited
    pub fn mark_card_fields_changed(&mut self) {
        if self.view != ModalViewState::EditCard {
            tracing::debug!(view = ?self.view, "mark_card_fields_changed ignored outside edit-card view");
            return;
        }
        self.has_card_fields_changed = true;
    }

    fn seed_fields_from_record(&mut self) {
        let Some(billing) = self
            .current_method
            .as_ref()
            .and_then(|m| m.billing_details.as_ref())
        else {
            return;
        };
        if let Some(name) = &billing.name {
            self.fields.name = name.clone();
        }
        if let Some(address) = &billing.address {
            self.fields.line1 = address.line1.clone().unwrap_or_default();
            self.fields.line2 = address.line2.clone().unwrap_or_default();
            self.fields.city = address.city.clone().unwrap_or_default();
            self.fields.state = address.state.clone().unwrap_or_default();
            self.fields.postal_code = address.postal_code.clone().unwrap_or_default();
        }
    }
}
