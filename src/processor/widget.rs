//! Hosted payment widget contract
//!
//! The third-party widget renders its own card fields, runs its own inline
//! validation, and reports readiness and change-completion events. The crate
//! only sees it through this trait; a UI host supplies a real binding and the
//! test suite supplies scripted stubs.

use tokio::sync::mpsc;

use crate::processor::types::ConfirmSetupParams;

/// Events the hosted widget emits after mounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    /// The widget finished rendering and is interactive
    Ready,
    /// The user edited the widget's fields
    Change {
        /// Whether the widget considers its fields complete
        complete: bool,
    },
}

/// Contract for the hosted payment widget
///
/// Errors are the widget's own human-readable messages; the widget has
/// already rendered them inline by the time a call returns `Err`.
#[async_trait::async_trait]
pub trait PaymentWidget: Send + Sync + 'static {
    /// Construct and mount the widget into the given container
    ///
    /// Returns the widget's event stream. Construction failure is an
    /// `Err`; the adapter logs it and reports an uninitialized widget.
    fn mount(&self, container: &str) -> anyhow::Result<mpsc::UnboundedReceiver<WidgetEvent>>;

    /// Trigger the widget's own field validation
    ///
    /// On failure the widget renders its own inline errors; the returned
    /// message is informational only.
    async fn submit(&self) -> std::result::Result<(), String>;

    /// Confirm a setup intent and return the attached payment-method id
    async fn confirm_setup(
        &self,
        params: ConfirmSetupParams,
    ) -> std::result::Result<String, String>;

    /// Unmount and release the widget
    ///
    /// The adapter guarantees at most one call.
    fn unmount(&self);
}

/// Widget that accepts everything; useful for tests and headless flows
pub struct NoopWidget;

#[async_trait::async_trait]
impl PaymentWidget for NoopWidget {
    fn mount(&self, _container: &str) -> anyhow::Result<mpsc::UnboundedReceiver<WidgetEvent>> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }

    async fn submit(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn confirm_setup(
        &self,
        _params: ConfirmSetupParams,
    ) -> std::result::Result<String, String> {
        Ok("pm_noop".to_string())
    }

    fn unmount(&self) {}
}
