//! UI commands
//!
//! The rendering layer translates user gestures into these commands and
//! hands them to [`PaymentModal::dispatch`](crate::modal::PaymentModal::dispatch).
//! Keeping the surface to one enum keeps gesture wiring out of the business
//! logic and makes every interaction replayable in tests.

use crate::modal::validator::BillingField;

/// A user gesture, as the rendering layer reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalCommand {
    /// Dismiss the modal without saving
    Close,
    /// The primary "Update" action
    Update,
    /// Enter edit mode on the existing-payment view
    EnableEditMode,
    /// Switch to the new-card form
    ShowNewCardForm,
    /// Abandon the new-card form, back to the stored method
    ReturnToSavedPayment,
    /// Open the card metadata editor
    ShowCardEdit,
    /// Close the card metadata editor without saving
    CancelCardEdit,
    /// A billing input changed
    CardFieldChanged {
        /// Which field
        field: BillingField,
        /// New raw value
        value: String,
    },
    /// Save the card metadata editor
    CardEditUpdate,
    /// Detach the stored card
    RemoveCard,
}
