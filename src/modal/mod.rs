//! Payment-method modal
//!
//! The state machine, validator, command surface, view projection, and the
//! controller that ties them to the processor adapter.

pub mod command;
pub mod controller;
pub mod render;
pub mod state;
pub mod validator;

pub use command::ModalCommand;
pub use controller::{FlowCallback, ModalOptions, PaymentModal};
pub use render::{render, ModalBody, ModalView};
pub use state::{ModalState, ModalViewState};
pub use validator::{validate, BillingField, BillingFields, ValidationErrors};
