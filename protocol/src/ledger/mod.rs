//! # Ledger Module — Records, Receipts, Completion
//!
//! The far end of the token lifecycle. [`completion`] turns a VERIFIED
//! token into a posted [`record`] plus a signed [`receipt`] in one atomic
//! commit; [`verification`] re-checks any receipt's signature on demand;
//! [`notify`] fans completion events out to whoever cares, best-effort.

pub mod completion;
pub mod notify;
pub mod record;
pub mod receipt;
pub mod verification;

pub use completion::CompletionOutcome;
pub use notify::{DepositEvent, LogNotifier, NotificationSink};
pub use record::FinancialRecord;
pub use receipt::Receipt;
pub use verification::ReceiptVerification;
