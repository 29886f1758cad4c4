//! Post-update reconciliation
//!
//! After a successful payment-method update, the processor's write reaches
//! the application's own database only after a propagation delay. This loop
//! re-fetches the backend record with bounded exponential backoff plus
//! jitter until it appears, the attempt count runs out, or the wall-clock
//! budget is spent. Exhaustion is a soft outcome, not an error: the caller
//! proceeds with whatever record it already has.

use tokio::time::{sleep, Instant};

use crate::config::ReconcilePolicy;
use crate::processor::backend::BackendApi;
use crate::processor::types::PaymentMethodRecord;

/// Typed result of the reconciliation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The backend record appeared within the retry budget
    Found(PaymentMethodRecord),
    /// All attempts exhausted without a record; soft failure
    NotFoundAfterRetries {
        /// How many fetch attempts were made
        attempts: u32,
    },
}

impl ReconcileOutcome {
    /// The record, if reconciliation found one
    pub fn record(&self) -> Option<&PaymentMethodRecord> {
        match self {
            ReconcileOutcome::Found(record) => Some(record),
            ReconcileOutcome::NotFoundAfterRetries { .. } => None,
        }
    }
}

/// Poll the backend until its payment-method record reflects the update
pub async fn reconcile_payment_method<B: BackendApi>(
    backend: &B,
    policy: &ReconcilePolicy,
) -> ReconcileOutcome {
    sleep(policy.initial_delay).await;
    let started = Instant::now();
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        attempts += 1;
        match backend.fetch_payment_method().await {
            Ok(Some(record)) => {
                tracing::debug!(
                    payment_method_id = %record.id,
                    attempts,
                    "backend payment record reconciled"
                );
                return ReconcileOutcome::Found(record);
            }
            Ok(None) => {
                tracing::debug!(attempts, "backend payment record not yet visible");
            }
            Err(e) => {
                // Transient fetch failures count as an attempt and retry
                tracing::warn!(error = %e, attempts, "payment record fetch failed");
            }
        }

        if attempts >= policy.max_attempts {
            break;
        }
        let delay = policy.retry_delay(attempts - 1);
        if started.elapsed() + delay > policy.budget {
            tracing::debug!(
                elapsed_ms = started.elapsed().as_millis(),
                "reconciliation wall-clock budget spent"
            );
            break;
        }
        sleep(delay).await;
    }

    tracing::warn!(
        attempts,
        "payment record still missing after reconciliation retries"
    );
    ReconcileOutcome::NotFoundAfterRetries { attempts }
}
