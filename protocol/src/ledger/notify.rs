//! Best-effort notification fan-out for lifecycle events.
//!
//! Notification failure never fails the operation that triggered it: the
//! commit already happened, and a dropped SMS is not grounds for unwinding
//! a posted record. Sinks get the event after the fact and deal with their
//! own delivery problems.

use serde::Serialize;
use tracing::info;

use crate::ledger::receipt::Receipt;
use crate::ledger::record::FinancialRecord;

/// A lifecycle event worth telling someone about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositEvent {
    /// A token was issued.
    TokenIssued {
        /// The new token.
        token_id: String,
        /// The target account.
        account_ref: String,
    },
    /// A completion committed. Carries the full record and receipt so
    /// sinks can render customer-facing content without a read-back.
    DepositCompleted {
        /// The consumed token.
        token_id: String,
        /// The posted record.
        record: FinancialRecord,
        /// The issued receipt.
        receipt: Receipt,
    },
    /// A token was cancelled.
    TokenCancelled {
        /// The cancelled token.
        token_id: String,
    },
    /// A token was rejected at the counter.
    TokenRejected {
        /// The rejected token.
        token_id: String,
        /// The stated reason.
        reason: String,
    },
    /// A token was stamped expired.
    TokenExpired {
        /// The expired token.
        token_id: String,
    },
}

/// Receives lifecycle events after they are durable.
pub trait NotificationSink: Send + Sync {
    /// Deliver one event. Must not panic; must not block for long.
    fn notify(&self, event: &DepositEvent);
}

/// The default sink: structured log lines, nothing more. Deployments wire
/// in SMS/push sinks on top; the log line is always there.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, event: &DepositEvent) {
        match event {
            DepositEvent::TokenIssued {
                token_id,
                account_ref,
            } => info!(%token_id, %account_ref, "token issued"),
            DepositEvent::DepositCompleted {
                token_id,
                record,
                receipt,
            } => info!(
                %token_id,
                record_id = %record.record_id,
                receipt_number = %receipt.receipt_number,
                signed = receipt.is_signed(),
                "deposit completed"
            ),
            DepositEvent::TokenCancelled { token_id } => info!(%token_id, "token cancelled"),
            DepositEvent::TokenRejected { token_id, reason } => {
                info!(%token_id, %reason, "token rejected")
            }
            DepositEvent::TokenExpired { token_id } => info!(%token_id, "token expired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationSink for Recorder {
        fn notify(&self, event: &DepositEvent) {
            self.seen
                .lock()
                .push(serde_json::to_string(event).unwrap());
        }
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let recorder = Recorder::default();
        recorder.notify(&DepositEvent::TokenRejected {
            token_id: "DRID-20260825-AAAAAA".to_string(),
            reason: "depositor ID does not match".to_string(),
        });

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("\"event\":\"TOKEN_REJECTED\""));
        assert!(seen[0].contains("DRID-20260825-AAAAAA"));
    }
}
