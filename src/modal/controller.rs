//! Modal controller
//!
//! Owns the state machine and the processor adapter, and orchestrates the
//! two update protocols:
//!
//! ```text
//! Update gesture ──▶ widget submit ──▶ local validation ──▶ resolve id
//!                                                               │
//!              existing record id ◀── or ──▶ create intent + confirm
//!                                                               │
//!                                                               ▼
//!                          backend update ──▶ close + success ──▶ reconcile
//! ```
//!
//! The background auto-submit protocol runs the same chain when the hosted
//! widget reports completion (linked-identity autofill), without the local
//! validation step. Every protocol invocation carries a generation token;
//! a continuation that resumes after `close()` or after a newer invocation
//! finds its token stale and abandons without touching state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::modal::command::ModalCommand;
use crate::modal::render::{render, ModalView};
use crate::modal::state::{ModalState, ModalViewState};
use crate::modal::validator::{validate, ValidationErrors};
use crate::processor::adapter::ProcessorAdapter;
use crate::processor::backend::{BackendApi, HttpBackend};
use crate::processor::reconcile::{reconcile_payment_method, ReconcileOutcome};
use crate::processor::types::{Address, BillingDetails, PaymentMethodRecord};
use crate::processor::widget::{PaymentWidget, WidgetEvent};

/// Callback invoked on modal success or cancel
pub type FlowCallback = Arc<dyn Fn() + Send + Sync>;

/// Construction options for the payment modal
pub struct ModalOptions {
    /// The account's stored payment method, if any
    pub current_payment_method: Option<PaymentMethodRecord>,
    /// Account email, attached to new billing details
    pub user_email: String,
    /// Account display name, used as the default cardholder name
    pub user_name: Option<String>,
    /// Bearer token for the backend payment endpoints
    pub access_token: String,
    /// Invoked after a successful update, once the modal has closed
    pub on_success: Option<FlowCallback>,
    /// Invoked when the user dismisses the modal
    pub on_cancel: Option<FlowCallback>,
}

impl ModalOptions {
    /// Minimal options: an email and an access token
    pub fn new(user_email: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            current_payment_method: None,
            user_email: user_email.into(),
            user_name: None,
            access_token: access_token.into(),
            on_success: None,
            on_cancel: None,
        }
    }
}

/// Outcome of one run of the submit → intent → confirm → update chain
enum ChainResult {
    Success,
    /// A newer invocation or a close superseded this one mid-flight
    Stale,
    /// The widget rejected its own fields; it renders the inline error
    WidgetRejected,
    Invalid(ValidationErrors),
    Failed(FlowError),
}

struct Inner<W, B> {
    state: Mutex<ModalState>,
    adapter: ProcessorAdapter<W, B>,
    config: FlowConfig,
    user_email: String,
    user_name: Option<String>,
    on_success: Option<FlowCallback>,
    on_cancel: Option<FlowCallback>,
    /// Bumped by every protocol invocation and by close()
    generation: AtomicU64,
    open: AtomicBool,
    /// Latest record the reconciliation loop fetched
    cached_record: Mutex<Option<PaymentMethodRecord>>,
}

/// Handle to an open payment-method modal
///
/// Cheap to clone; the UI host keeps one handle and spawned protocol tasks
/// hold their own. There is no ambient global: the modal lives exactly as
/// long as its handles.
pub struct PaymentModal<W, B> {
    inner: Arc<Inner<W, B>>,
}

impl<W, B> Clone for PaymentModal<W, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: PaymentWidget> PaymentModal<W, HttpBackend> {
    /// Create a modal backed by the HTTP payment API
    pub fn connect(widget: W, options: ModalOptions, config: FlowConfig) -> Result<Self> {
        let backend = HttpBackend::new(&config.api_base, options.access_token.clone())?;
        Ok(Self::with_backend(widget, backend, options, config))
    }
}

impl<W: PaymentWidget, B: BackendApi> PaymentModal<W, B> {
    /// Create a modal over an explicit backend implementation
    pub fn with_backend(widget: W, backend: B, options: ModalOptions, config: FlowConfig) -> Self {
        let state = ModalState::new(
            options.current_payment_method,
            options.user_name.as_deref(),
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                adapter: ProcessorAdapter::new(widget, backend),
                config,
                user_email: options.user_email,
                user_name: options.user_name,
                on_success: options.on_success,
                on_cancel: options.on_cancel,
                generation: AtomicU64::new(0),
                open: AtomicBool::new(true),
                cached_record: Mutex::new(None),
            }),
        }
    }

    /// Mount the hosted widget and start pumping its events
    ///
    /// Returns `false` when widget construction fails; the modal still
    /// renders, but card entry is unavailable.
    pub fn show(&self, mount_target: &str) -> bool {
        if !self.inner.adapter.initialize(mount_target) {
            return false;
        }
        if let Some(events) = self.inner.adapter.take_events() {
            let modal = self.clone();
            tokio::spawn(async move { modal.run_events(events).await });
        }
        true
    }

    /// Pump widget events until the stream or the modal closes
    pub async fn run_events(&self, mut events: mpsc::UnboundedReceiver<WidgetEvent>) {
        while let Some(event) = events.recv().await {
            if !self.is_open() {
                break;
            }
            self.handle_widget_event(event).await;
        }
    }

    /// React to one widget event
    pub async fn handle_widget_event(&self, event: WidgetEvent) {
        match event {
            WidgetEvent::Ready => tracing::debug!("payment widget ready"),
            WidgetEvent::Change { complete: true } => self.handle_change_complete().await,
            WidgetEvent::Change { complete: false } => {}
        }
    }

    /// Route a UI command to the matching operation
    pub async fn dispatch(&self, command: ModalCommand) {
        match command {
            ModalCommand::Close => self.close(),
            ModalCommand::Update => self.update().await,
            ModalCommand::EnableEditMode => self.inner.state.lock().enable_edit_mode(),
            ModalCommand::ShowNewCardForm => self.inner.state.lock().show_new_payment_form(),
            ModalCommand::ReturnToSavedPayment => {
                self.inner.state.lock().return_to_existing_payment();
            }
            ModalCommand::ShowCardEdit => self.inner.state.lock().show_card_edit_form(),
            ModalCommand::CancelCardEdit => self.inner.state.lock().cancel_card_edit(),
            ModalCommand::CardFieldChanged { field, value } => {
                let mut state = self.inner.state.lock();
                state.fields.set(field, value);
                if state.view == ModalViewState::EditCard {
                    state.mark_card_fields_changed();
                }
            }
            ModalCommand::CardEditUpdate => self.card_edit_update().await,
            ModalCommand::RemoveCard => self.remove_card().await,
        }
    }

    /// Primary update protocol, driven by the "Update" gesture
    pub async fn update(&self) {
        if !self.is_open() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if state.is_submitting {
                tracing::debug!("update ignored: submit already in flight");
                return;
            }
            if state.is_processing_link_auth {
                tracing::debug!("update ignored: link authentication in progress");
                return;
            }
            state.is_submitting = true;
            state.top_level_error = None;
        }
        let token = self.begin_attempt();

        match self.run_update_chain(token, true).await {
            ChainResult::Success => {
                self.inner.state.lock().is_submitting = false;
                self.close_with(false);
                self.notify_success();
                // Record refresh runs off the gesture path; the token is
                // already stale after close, so only the cached record
                // picks up what reconciliation finds.
                let modal = self.clone();
                tokio::spawn(async move {
                    modal.reconcile_and_cache(token).await;
                });
            }
            ChainResult::Stale => {
                // A superseded attempt must not leave the submit control
                // locked if the modal is still showing
                if self.is_open() {
                    self.inner.state.lock().is_submitting = false;
                }
            }
            ChainResult::WidgetRejected => {
                if self.is_current(token) {
                    self.inner.state.lock().is_submitting = false;
                }
            }
            ChainResult::Invalid(errors) => {
                if self.is_current(token) {
                    let mut state = self.inner.state.lock();
                    state.show_additional_address_fields = true;
                    state.validation_errors = errors;
                    state.is_submitting = false;
                }
            }
            ChainResult::Failed(e) => {
                tracing::warn!(error = %e, "payment method update failed");
                if self.is_current(token) {
                    let mut state = self.inner.state.lock();
                    state.top_level_error = Some(e.user_message());
                    state.is_submitting = false;
                }
            }
        }
    }

    /// Background auto-submit, driven by widget change-completion
    ///
    /// Guarded so at most one chain is in flight; overlapping completion
    /// events are dropped, not queued. Failures are logged and never
    /// surfaced, so a misfire cannot interrupt the autofill experience.
    pub async fn handle_change_complete(&self) {
        if !self.is_open() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if !state.show_new_card_form {
                return;
            }
            if state.is_submitting {
                tracing::debug!("completion event dropped: update already in flight");
                return;
            }
            if state.is_processing_link_auth {
                tracing::debug!("overlapping completion event dropped");
                return;
            }
            state.is_processing_link_auth = true;
        }
        let token = self.begin_attempt();
        let attempt_id = Uuid::new_v4();
        tracing::debug!(%attempt_id, "background auto-submit started");

        sleep(self.inner.config.settle_delay).await;

        let result = if self.is_current(token) {
            self.run_update_chain(token, false).await
        } else {
            ChainResult::Stale
        };

        match result {
            ChainResult::Success => {
                self.reconcile_and_cache(token).await;
                sleep(self.inner.config.propagation_delay).await;
                if self.is_current(token) {
                    self.close_with(false);
                    self.notify_success();
                }
            }
            ChainResult::Stale => {}
            ChainResult::WidgetRejected => {
                tracing::debug!(%attempt_id, "widget rejected background submit");
            }
            ChainResult::Invalid(_) => {
                // Local validation is skipped on this path
                tracing::debug!(%attempt_id, "unexpected validation result in background submit");
            }
            ChainResult::Failed(e) => {
                tracing::warn!(%attempt_id, error = %e, "background auto-submit failed");
            }
        }

        self.inner.state.lock().is_processing_link_auth = false;
    }

    /// Save the card metadata editor
    pub async fn card_edit_update(&self) {
        let (is_editing, changed, fields, method_id) = {
            let state = self.inner.state.lock();
            if state.is_submitting || state.is_processing_link_auth {
                tracing::debug!("card edit save ignored: another operation in flight");
                return;
            }
            (
                state.is_editing_card,
                state.has_card_fields_changed,
                state.fields.clone(),
                state.current_method.as_ref().map(|m| m.id.clone()),
            )
        };
        if !is_editing {
            return;
        }
        if !changed {
            self.inner.state.lock().cancel_card_edit();
            return;
        }
        let errors = validate(&fields, false);
        if !errors.is_empty() {
            self.inner.state.lock().validation_errors = errors;
            return;
        }
        let Some(method_id) = method_id else {
            tracing::warn!("card edit submitted without a stored payment method");
            return;
        };

        let token = self.begin_attempt();
        {
            let mut state = self.inner.state.lock();
            state.is_submitting = true;
            state.top_level_error = None;
        }
        let billing = self.billing_details();

        match self
            .inner
            .adapter
            .update_payment_method(&method_id, Some(billing.clone()))
            .await
        {
            Ok(()) => {
                tracing::info!(payment_method_id = %method_id, "card billing details updated");
                self.reconcile_and_cache(token).await;
                if !self.is_current(token) {
                    return;
                }
                let mut state = self.inner.state.lock();
                state.is_submitting = false;
                if let Some(method) = state.current_method.as_mut() {
                    method.billing_details = Some(billing);
                }
                state.cancel_card_edit();
            }
            Err(e) => {
                tracing::warn!(error = %e, "card billing details update failed");
                if self.is_current(token) {
                    let mut state = self.inner.state.lock();
                    state.top_level_error = Some(e.user_message());
                    state.is_submitting = false;
                }
            }
        }
    }

    /// Detach the stored card and fall through to the new-card form
    pub async fn remove_card(&self) {
        let method_id = {
            let state = self.inner.state.lock();
            if state.is_submitting || state.is_processing_link_auth {
                tracing::debug!("card removal ignored: another operation in flight");
                return;
            }
            state.current_method.as_ref().map(|m| m.id.clone())
        };
        let Some(method_id) = method_id else {
            return;
        };

        let token = self.begin_attempt();
        {
            let mut state = self.inner.state.lock();
            state.is_submitting = true;
            state.top_level_error = None;
        }

        match self.inner.adapter.remove_payment_method(&method_id).await {
            Ok(()) => {
                tracing::info!(payment_method_id = %method_id, "payment method removed");
                if !self.is_current(token) {
                    return;
                }
                *self.inner.cached_record.lock() = None;
                let mut state = self.inner.state.lock();
                state.is_submitting = false;
                state.current_method = None;
                state.show_new_payment_form();
            }
            Err(e) => {
                tracing::warn!(error = %e, "payment method removal failed");
                if self.is_current(token) {
                    let mut state = self.inner.state.lock();
                    state.top_level_error = Some(e.user_message());
                    state.is_submitting = false;
                }
            }
        }
    }

    /// Dismiss the modal; releases the widget and fires the cancel callback
    pub fn close(&self) {
        self.close_with(true);
    }

    /// Whether the modal is still open
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Current view description for the rendering layer
    pub fn view(&self) -> ModalView {
        render(&self.inner.state.lock())
    }

    /// Snapshot of the full modal state
    pub fn state(&self) -> ModalState {
        self.inner.state.lock().clone()
    }

    /// Best known payment-method record: reconciled if available, else the
    /// record the modal was opened with
    pub fn payment_method(&self) -> Option<PaymentMethodRecord> {
        self.inner
            .cached_record
            .lock()
            .clone()
            .or_else(|| self.inner.state.lock().current_method.clone())
    }

    fn close_with(&self, canceled: bool) {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return;
        }
        // Invalidate any continuation still in flight
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.adapter.destroy();
        tracing::debug!(canceled, "payment modal closed");
        if canceled {
            if let Some(callback) = &self.inner.on_cancel {
                callback();
            }
        }
    }

    fn notify_success(&self) {
        if let Some(callback) = &self.inner.on_success {
            callback();
        }
    }

    fn begin_attempt(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, token: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == token
    }

    /// One run of submit → validate → resolve id → persist
    async fn run_update_chain(&self, token: u64, validate_locally: bool) -> ChainResult {
        let (use_existing, existing_id, fields) = {
            let state = self.inner.state.lock();
            (
                state.use_existing,
                state.current_method.as_ref().map(|m| m.id.clone()),
                state.fields.clone(),
            )
        };

        if !use_existing {
            // The widget validates its own card fields and renders its own
            // inline errors; nothing further happens on rejection.
            if let Err(e) = self.inner.adapter.submit().await {
                tracing::debug!(error = %e, "widget submit reported an error");
                return ChainResult::WidgetRejected;
            }
            if !self.is_current(token) {
                return ChainResult::Stale;
            }
            if validate_locally {
                let errors = validate(&fields, true);
                if !errors.is_empty() {
                    return ChainResult::Invalid(errors);
                }
            }
        }

        let payment_method_id = if use_existing {
            match existing_id {
                Some(id) => id,
                None => {
                    return ChainResult::Failed(FlowError::processor(
                        "no stored payment method to reuse",
                    ))
                }
            }
        } else {
            let intent = match self.inner.adapter.create_setup_intent().await {
                Ok(intent) => intent,
                Err(e) => return ChainResult::Failed(e),
            };
            if !self.is_current(token) {
                return ChainResult::Stale;
            }
            let billing = self.billing_details();
            let id = match self
                .inner
                .adapter
                .confirm_setup(&intent.client_secret, Some(billing))
                .await
            {
                Ok(id) => id,
                Err(e) => return ChainResult::Failed(e),
            };
            if !self.is_current(token) {
                return ChainResult::Stale;
            }
            id
        };

        if let Err(e) = self
            .inner
            .adapter
            .update_payment_method(&payment_method_id, None)
            .await
        {
            return ChainResult::Failed(e);
        }
        if !self.is_current(token) {
            return ChainResult::Stale;
        }
        tracing::info!(payment_method_id = %payment_method_id, "payment method updated");
        ChainResult::Success
    }

    /// Run the reconciliation loop and cache what it finds
    async fn reconcile_and_cache(&self, token: u64) -> ReconcileOutcome {
        let outcome =
            reconcile_payment_method(self.inner.adapter.backend(), &self.inner.config.reconcile)
                .await;
        if let ReconcileOutcome::Found(record) = &outcome {
            *self.inner.cached_record.lock() = Some(record.clone());
            if self.is_current(token) {
                self.inner.state.lock().current_method = Some(record.clone());
            }
        }
        outcome
    }

    /// Billing details assembled from the form values and account identity
    fn billing_details(&self) -> BillingDetails {
        let state = self.inner.state.lock();
        let fields = &state.fields;
        let non_empty = |s: &str| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        BillingDetails {
            name: non_empty(&fields.name).or_else(|| self.inner.user_name.clone()),
            email: Some(self.inner.user_email.clone()),
            phone: None,
            address: Some(Address {
                line1: non_empty(&fields.line1),
                line2: non_empty(&fields.line2),
                city: non_empty(&fields.city),
                state: non_empty(&fields.state),
                postal_code: non_empty(&fields.postal_code),
                country: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modal::validator::BillingField;
    use crate::processor::types::{
        CardSummary, SetupIntent, UpdatePaymentMethodRequest,
    };
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct ScriptedWidget {
        submit_error: Mutex<Option<String>>,
        submit_delay: Mutex<Duration>,
        submit_calls: AtomicU32,
        confirm_calls: AtomicU32,
    }

    impl ScriptedWidget {
        fn ok() -> Self {
            Self {
                submit_error: Mutex::new(None),
                submit_delay: Mutex::new(Duration::ZERO),
                submit_calls: AtomicU32::new(0),
                confirm_calls: AtomicU32::new(0),
            }
        }

        fn rejecting(message: &str) -> Self {
            Self {
                submit_error: Mutex::new(Some(message.to_string())),
                ..Self::ok()
            }
        }
    }

    #[async_trait::async_trait]
    impl PaymentWidget for ScriptedWidget {
        fn mount(
            &self,
            _container: &str,
        ) -> anyhow::Result<mpsc::UnboundedReceiver<WidgetEvent>> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }

        async fn submit(&self) -> std::result::Result<(), String> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.submit_delay.lock();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            match self.submit_error.lock().clone() {
                Some(msg) => Err(msg),
                None => Ok(()),
            }
        }

        async fn confirm_setup(
            &self,
            params: crate::processor::types::ConfirmSetupParams,
        ) -> std::result::Result<String, String> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            assert!(!params.client_secret.is_empty());
            Ok("pm_new".to_string())
        }

        fn unmount(&self) {}
    }

    #[derive(Default)]
    struct ScriptedBackend {
        create_calls: AtomicU32,
        update_calls: AtomicU32,
        update_delay: Mutex<Duration>,
        updated: Mutex<Vec<UpdatePaymentMethodRequest>>,
        remove_calls: AtomicU32,
        fail_update: AtomicBool,
        fetch_results: Mutex<VecDeque<Option<PaymentMethodRecord>>>,
    }

    impl ScriptedBackend {
        fn with_fetches(results: Vec<Option<PaymentMethodRecord>>) -> Self {
            Self {
                fetch_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl BackendApi for ScriptedBackend {
        async fn create_setup_intent(&self) -> Result<SetupIntent> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SetupIntent {
                client_secret: "seti_secret".to_string(),
            })
        }

        async fn update_payment_method(&self, req: &UpdatePaymentMethodRequest) -> Result<()> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.update_delay.lock();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            self.updated.lock().push(req.clone());
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(FlowError::Backend {
                    status: 502,
                    detail: "Upstream payment service unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn remove_payment_method(&self, _payment_method_id: &str) -> Result<()> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_payment_method(&self) -> Result<Option<PaymentMethodRecord>> {
            Ok(self.fetch_results.lock().pop_front().flatten())
        }
    }

    fn card_method(id: &str) -> PaymentMethodRecord {
        PaymentMethodRecord {
            id: id.to_string(),
            method_type: "card".to_string(),
            card: Some(CardSummary {
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                exp_month: 9,
                exp_year: 2031,
            }),
            link: None,
            billing_details: None,
        }
    }

    fn options_with(method: Option<PaymentMethodRecord>) -> ModalOptions {
        ModalOptions {
            current_payment_method: method,
            user_name: Some("Test User".to_string()),
            ..ModalOptions::new("user@example.com", "tok_test")
        }
    }

    fn modal(
        widget: ScriptedWidget,
        backend: ScriptedBackend,
        method: Option<PaymentMethodRecord>,
    ) -> PaymentModal<ScriptedWidget, ScriptedBackend> {
        PaymentModal::with_backend(
            widget,
            backend,
            options_with(method),
            FlowConfig::test_config(),
        )
    }

    fn fill_fields(modal: &PaymentModal<ScriptedWidget, ScriptedBackend>) {
        let mut state = modal.inner.state.lock();
        state.fields.name = "Test User".to_string();
        state.fields.line1 = "1 Main St".to_string();
        state.fields.city = "Springfield".to_string();
        state.fields.state = "IL".to_string();
        state.fields.postal_code = "62704".to_string();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_with_existing_method_reuses_stored_id() {
        let success_count = Arc::new(AtomicU32::new(0));
        let counter = success_count.clone();
        let mut options = options_with(Some(card_method("pm_123")));
        options.on_success = Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let modal = PaymentModal::with_backend(
            ScriptedWidget::ok(),
            ScriptedBackend::with_fetches(vec![Some(card_method("pm_123"))]),
            options,
            FlowConfig::test_config(),
        );

        modal.update().await;

        let backend = modal.inner.adapter.backend();
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            modal.inner.adapter.widget().confirm_calls.load(Ordering::SeqCst),
            0
        );
        let updated = backend.updated.lock();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].payment_method_id, "pm_123");
        assert!(!modal.is_open());
        assert_eq!(success_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_rejection_aborts_before_intent() {
        let modal = modal(
            ScriptedWidget::rejecting("Your card number is incomplete."),
            ScriptedBackend::default(),
            None,
        );
        modal.inner.adapter.initialize("#payment-element");

        modal.update().await;

        let backend = modal.inner.adapter.backend();
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
        assert!(modal.is_open());
        let state = modal.state();
        assert!(!state.is_submitting);
        assert!(state.top_level_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_reveals_address_fields() {
        // No account name either, so every required field is missing
        let modal = PaymentModal::with_backend(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            ModalOptions::new("user@example.com", "tok_test"),
            FlowConfig::test_config(),
        );
        modal.inner.adapter.initialize("#payment-element");

        modal.update().await;

        let state = modal.state();
        assert_eq!(state.validation_errors.len(), 5);
        assert!(state.show_additional_address_fields);
        assert!(!state.is_submitting);
        assert!(modal.is_open());
        assert_eq!(
            modal
                .inner
                .adapter
                .backend()
                .create_calls
                .load(Ordering::SeqCst),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_card_update_runs_full_chain() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::with_fetches(vec![Some(card_method("pm_new"))]),
            None,
        );
        modal.inner.adapter.initialize("#payment-element");
        fill_fields(&modal);

        modal.update().await;

        let backend = modal.inner.adapter.backend();
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            modal.inner.adapter.widget().confirm_calls.load(Ordering::SeqCst),
            1
        );
        let updated = backend.updated.lock();
        assert_eq!(updated[0].payment_method_id, "pm_new");
        assert!(!modal.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_keeps_modal_open() {
        let backend = ScriptedBackend::default();
        backend.fail_update.store(true, Ordering::SeqCst);
        let modal = modal(ScriptedWidget::ok(), backend, Some(card_method("pm_123")));

        modal.update().await;

        assert!(modal.is_open());
        let state = modal.state();
        assert_eq!(
            state.top_level_error.as_deref(),
            Some("Upstream payment service unavailable")
        );
        assert!(!state.is_submitting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_auto_submit_runs_one_chain() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::with_fetches(vec![Some(card_method("pm_new"))]),
            None,
        );
        modal.inner.adapter.initialize("#payment-element");
        fill_fields(&modal);

        let first = {
            let modal = modal.clone();
            tokio::spawn(async move { modal.handle_change_complete().await })
        };
        // Let the first invocation claim the guard and park on its settle
        // delay before firing the duplicate.
        tokio::task::yield_now().await;
        modal.handle_change_complete().await;
        first.await.unwrap();

        let backend = modal.inner.adapter.backend();
        assert_eq!(
            modal.inner.adapter.widget().submit_calls.load(Ordering::SeqCst),
            1
        );
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.update_calls.load(Ordering::SeqCst), 1);
        assert!(!modal.state().is_processing_link_auth);
        assert!(!modal.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_complete_during_update_is_dropped() {
        let widget = ScriptedWidget::ok();
        *widget.submit_delay.lock() = Duration::from_millis(50);
        let modal = modal(
            widget,
            ScriptedBackend::with_fetches(vec![Some(card_method("pm_new"))]),
            None,
        );
        modal.inner.adapter.initialize("#payment-element");
        fill_fields(&modal);

        let update = {
            let modal = modal.clone();
            tokio::spawn(async move { modal.update().await })
        };
        // The update claims is_submitting and parks inside widget submit;
        // a completion event arriving now must not start a second chain.
        tokio::task::yield_now().await;
        modal.handle_change_complete().await;
        update.await.unwrap();

        let backend = modal.inner.adapter.backend();
        assert_eq!(
            modal.inner.adapter.widget().submit_calls.load(Ordering::SeqCst),
            1
        );
        assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.update_calls.load(Ordering::SeqCst), 1);
        assert!(!modal.is_open());
        let state = modal.state();
        assert!(!state.is_submitting);
        assert!(!state.is_processing_link_auth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_operations_ignored_while_submit_in_flight() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );
        {
            let mut state = modal.inner.state.lock();
            state.view = ModalViewState::EditCard;
            state.is_editing_card = true;
            state.has_card_fields_changed = true;
            state.is_submitting = true;
        }
        fill_fields(&modal);

        modal.card_edit_update().await;
        modal.remove_card().await;

        let backend = modal.inner.adapter.backend();
        assert_eq!(backend.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_submit_failure_is_silent_and_clears_guard() {
        let backend = ScriptedBackend::default();
        backend.fail_update.store(true, Ordering::SeqCst);
        let modal = modal(ScriptedWidget::ok(), backend, None);
        modal.inner.adapter.initialize("#payment-element");
        fill_fields(&modal);

        modal.handle_change_complete().await;

        let state = modal.state();
        assert!(!state.is_processing_link_auth);
        // Background errors never reach the user
        assert!(state.top_level_error.is_none());
        assert!(modal.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_submit_ignored_outside_new_card_form() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );
        modal.inner.adapter.initialize("#payment-element");

        modal.handle_change_complete().await;

        assert_eq!(
            modal
                .inner
                .adapter
                .widget()
                .submit_calls
                .load(Ordering::SeqCst),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mid_flight_drops_continuation() {
        let success_count = Arc::new(AtomicU32::new(0));
        let counter = success_count.clone();
        let mut options = options_with(Some(card_method("pm_123")));
        options.on_success = Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let backend = ScriptedBackend::default();
        // Holds the chain inside the backend call long enough for the
        // close to land first
        *backend.update_delay.lock() = Duration::from_millis(50);
        let modal = PaymentModal::with_backend(
            ScriptedWidget::ok(),
            backend,
            options,
            FlowConfig::test_config(),
        );

        let update = {
            let modal = modal.clone();
            tokio::spawn(async move { modal.update().await })
        };
        tokio::task::yield_now().await;
        modal.close();
        update.await.unwrap();

        assert!(!modal.is_open());
        assert_eq!(success_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciliation_caches_found_record() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::with_fetches(vec![None, None, Some(card_method("pm_fresh"))]),
            Some(card_method("pm_123")),
        );

        modal.update().await;
        assert!(!modal.is_open());

        // Reconciliation runs after the close, off the gesture path
        for _ in 0..50 {
            if modal.payment_method().map(|m| m.id).as_deref() == Some("pm_fresh") {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            modal.payment_method().map(|m| m.id),
            Some("pm_fresh".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciliation_exhaustion_is_soft() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );

        modal.update().await;

        // Update still succeeded; the stale local record is kept
        assert!(!modal.is_open());
        assert_eq!(
            modal.payment_method().map(|m| m.id),
            Some("pm_123".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_edit_update_sends_billing_details() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );
        modal.dispatch(ModalCommand::ShowCardEdit).await;
        modal
            .dispatch(ModalCommand::CardFieldChanged {
                field: BillingField::Name,
                value: "New Name".to_string(),
            })
            .await;
        modal
            .dispatch(ModalCommand::CardFieldChanged {
                field: BillingField::AddressLine1,
                value: "2 Side St".to_string(),
            })
            .await;

        modal.dispatch(ModalCommand::CardEditUpdate).await;

        let backend = modal.inner.adapter.backend();
        let updated = backend.updated.lock();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].payment_method_id, "pm_123");
        let billing = updated[0].billing_details.as_ref().unwrap();
        assert_eq!(billing.name.as_deref(), Some("New Name"));

        let state = modal.state();
        assert_eq!(state.view, ModalViewState::ExistingPayment);
        assert!(!state.is_editing_card);
        assert!(modal.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_edit_without_changes_just_closes_editor() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );
        modal.dispatch(ModalCommand::ShowCardEdit).await;
        modal.dispatch(ModalCommand::CardEditUpdate).await;

        assert_eq!(
            modal
                .inner
                .adapter
                .backend()
                .update_calls
                .load(Ordering::SeqCst),
            0
        );
        assert_eq!(modal.state().view, ModalViewState::ExistingPayment);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_card_falls_through_to_new_form() {
        let modal = modal(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            Some(card_method("pm_123")),
        );

        modal.dispatch(ModalCommand::RemoveCard).await;

        let state = modal.state();
        assert!(state.current_method.is_none());
        assert_eq!(state.view, ModalViewState::NewPayment);
        assert!(state.show_new_card_form);
        assert!(!state.use_existing);
        assert_eq!(
            modal
                .inner
                .adapter
                .backend()
                .remove_calls
                .load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_fires_cancel_callback_once() {
        let cancel_count = Arc::new(AtomicU32::new(0));
        let counter = cancel_count.clone();
        let mut options = options_with(None);
        options.on_cancel = Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let modal = PaymentModal::with_backend(
            ScriptedWidget::ok(),
            ScriptedBackend::default(),
            options,
            FlowConfig::test_config(),
        );

        modal.close();
        modal.close();

        assert_eq!(cancel_count.load(Ordering::SeqCst), 1);
        assert!(!modal.is_open());
    }
}
