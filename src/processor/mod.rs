//! Payment processor integration
//!
//! Everything that talks past the modal: the hosted widget contract, the
//! backend REST client, the adapter that fronts both, and the post-update
//! reconciliation loop.

pub mod adapter;
pub mod backend;
pub mod reconcile;
pub mod types;
pub mod widget;

pub use adapter::ProcessorAdapter;
pub use backend::{BackendApi, HttpBackend};
pub use reconcile::{reconcile_payment_method, ReconcileOutcome};
pub use types::{
    Address, BillingDetails, CardSummary, ConfirmSetupParams, LinkSummary, PaymentMethodRecord,
    SetupIntent, UpdatePaymentMethodRequest,
};
pub use widget::{NoopWidget, PaymentWidget, WidgetEvent};
