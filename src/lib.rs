//! Cardflow - Payment-Method Management Workflow
//!
//! This crate implements the payment-method modal of a SaaS billing UI: an
//! explicit multi-state flow that lets a user view a stored payment method,
//! enter a new one, or edit a stored card's metadata, while coordinating a
//! hosted payment widget and an eventually-consistent backend record.
//!
//! # Features
//!
//! - **State Machine**: Three modal views with guarded transitions, owned
//!   by the controller and projected to the UI through a pure `render`
//! - **Processor Adapter**: One surface over the hosted widget and the
//!   backend's setup-intent/update/remove/fetch endpoints
//! - **Update Protocols**: The user-driven update chain and a guarded
//!   background auto-submit chain for widget-completed (autofill) entry
//! - **Reconciliation**: Bounded backoff polling until the backend record
//!   reflects a just-completed write
//!
//! # Architecture
//!
//! ```text
//! UI Host ──▶ ModalCommand ──▶ PaymentModal ──▶ ProcessorAdapter
//!                 ▲                 │                │        │
//!                 │                 ▼                ▼        ▼
//!            render(state)     ModalState     PaymentWidget  BackendApi
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cardflow::config::FlowConfig;
//! use cardflow::modal::{ModalCommand, ModalOptions, PaymentModal};
//! use cardflow::processor::NoopWidget;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = ModalOptions::new("user@example.com", "access-token");
//!     let modal = PaymentModal::connect(NoopWidget, options, FlowConfig::from_env())?;
//!
//!     modal.show("#payment-element");
//!     let view = modal.view();
//!     // ... render `view`, then forward gestures:
//!     modal.dispatch(ModalCommand::Update).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod modal;
pub mod processor;

// Re-exports for convenience
pub use config::{FlowConfig, ReconcilePolicy};
pub use error::{FlowError, Result};
pub use modal::{ModalCommand, ModalOptions, ModalView, ModalViewState, PaymentModal};
pub use processor::{
    BackendApi, PaymentMethodRecord, PaymentWidget, ProcessorAdapter, ReconcileOutcome,
    WidgetEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
