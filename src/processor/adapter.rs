//! Payment processor adapter
//!
//! Combines the hosted widget and the backend payment API behind one
//! surface. The adapter owns the widget handle for its whole lifetime:
//! `initialize` mounts it exactly once and `destroy` releases it exactly
//! once, tolerating repeated calls on double-close.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{FlowError, Result};
use crate::processor::backend::BackendApi;
use crate::processor::types::{
    BillingDetails, ConfirmSetupParams, PaymentMethodRecord, SetupIntent,
    UpdatePaymentMethodRequest,
};
use crate::processor::widget::{PaymentWidget, WidgetEvent};

/// Adapter over the hosted widget and the backend payment endpoints
pub struct ProcessorAdapter<W, B> {
    widget: W,
    backend: B,
    initialized: AtomicBool,
    destroyed: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedReceiver<WidgetEvent>>>,
}

impl<W: PaymentWidget, B: BackendApi> ProcessorAdapter<W, B> {
    /// Create an adapter over an unmounted widget and a backend client
    pub fn new(widget: W, backend: B) -> Self {
        Self {
            widget,
            backend,
            initialized: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            events: Mutex::new(None),
        }
    }

    /// Construct and mount the widget into `mount_target`
    ///
    /// Returns `false` if widget construction fails; the failure is logged
    /// rather than propagated so the modal can still render.
    pub fn initialize(&self, mount_target: &str) -> bool {
        if self.initialized.load(Ordering::SeqCst) {
            tracing::debug!("widget already initialized");
            return true;
        }
        match self.widget.mount(mount_target) {
            Ok(rx) => {
                *self.events.lock() = Some(rx);
                self.initialized.store(true, Ordering::SeqCst);
                tracing::debug!(mount_target, "payment widget mounted");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, mount_target, "failed to construct payment widget");
                false
            }
        }
    }

    /// Take the widget's event stream for pumping
    ///
    /// Available once after a successful `initialize`.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<WidgetEvent>> {
        self.events.lock().take()
    }

    /// Trigger the widget's own field validation
    pub async fn submit(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(FlowError::processor("payment widget was never initialized"));
        }
        self.widget.submit().await.map_err(FlowError::Processor)
    }

    /// Obtain a setup-intent token from the backend
    pub async fn create_setup_intent(&self) -> Result<SetupIntent> {
        self.backend.create_setup_intent().await
    }

    /// Confirm the setup with the processor; returns the payment-method id
    pub async fn confirm_setup(
        &self,
        client_secret: &str,
        billing_details: Option<BillingDetails>,
    ) -> Result<String> {
        let params = ConfirmSetupParams {
            client_secret: client_secret.to_string(),
            billing_details,
        };
        self.widget
            .confirm_setup(params)
            .await
            .map_err(FlowError::Processor)
    }

    /// Persist the chosen payment method as the account's active method
    pub async fn update_payment_method(
        &self,
        payment_method_id: &str,
        billing_details: Option<BillingDetails>,
    ) -> Result<()> {
        let req = UpdatePaymentMethodRequest {
            payment_method_id: payment_method_id.to_string(),
            billing_details,
        };
        self.backend.update_payment_method(&req).await
    }

    /// Detach a stored payment method
    pub async fn remove_payment_method(&self, payment_method_id: &str) -> Result<()> {
        self.backend.remove_payment_method(payment_method_id).await
    }

    /// Fetch the backend's current payment-method record
    pub async fn fetch_payment_method(&self) -> Result<Option<PaymentMethodRecord>> {
        self.backend.fetch_payment_method().await
    }

    /// Backend handle, for the reconciliation loop
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Widget handle; the adapter stays its exclusive owner
    #[cfg(test)]
    pub(crate) fn widget(&self) -> &W {
        &self.widget
    }

    /// Unmount and release the widget; idempotent
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.initialized.load(Ordering::SeqCst) {
            self.widget.unmount();
        }
        self.events.lock().take();
        tracing::debug!("payment widget released");
    }
}
