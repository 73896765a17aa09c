//! # Store Module — Persistence Seam
//!
//! Everything the engine knows about durability goes through the
//! [`DepositStore`] trait. The engine's correctness obligations are phrased
//! as store primitives: token writes are compare-and-swap (the failed CAS
//! is how the second concurrent completion loses), the one-active-token
//! rule is a reservation on an index keyed by account, and completion is a
//! single all-or-nothing commit across every tree it touches.
//!
//! [`sled_store`] is the production implementation. Tests wrap it or
//! substitute their own to inject failures.

pub mod sled_store;

pub use sled_store::SledDepositStore;

use thiserror::Error;

use crate::ledger::receipt::Receipt;
use crate::ledger::record::FinancialRecord;
use crate::token::types::{DepositToken, TokenStatus};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store itself failed.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored value would not (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A uniqueness constraint refused the write (duplicate token id,
    /// duplicate record id).
    #[error("key already exists: {0}")]
    Conflict(String),
}

/// Outcome of trying to reserve an account's active-token slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The slot was free and is now held by the caller's token.
    Reserved,
    /// Another token already holds the slot.
    Held {
        /// The token currently occupying the slot.
        existing_token_id: String,
    },
}

/// Durable state for tokens, records, and receipts.
///
/// All methods take `&self`; implementations are internally synchronized.
/// Writes that race are decided by compare-and-swap, not by locks in the
/// engine.
pub trait DepositStore: Send + Sync {
    /// Insert a brand-new token. Fails with [`StoreError::Conflict`] if the
    /// id is already taken — the issuer treats that as "regenerate and
    /// retry".
    fn insert_token(&self, token: &DepositToken) -> Result<(), StoreError>;

    /// Fetch a token by id.
    fn get_token(&self, token_id: &str) -> Result<Option<DepositToken>, StoreError>;

    /// Replace `expected` with `updated` iff the stored bytes still equal
    /// `expected`. Returns `false` when somebody else got there first; the
    /// caller re-reads and re-decides.
    fn cas_token(
        &self,
        expected: &DepositToken,
        updated: &DepositToken,
    ) -> Result<bool, StoreError>;

    /// Atomically claim the account's active-token slot for `token_id`.
    fn reserve_active(
        &self,
        account_ref: &str,
        token_id: &str,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Free the slot, but only if `token_id` is the one holding it. A
    /// release by a stale holder is a no-op, not an error.
    fn release_active(&self, account_ref: &str, token_id: &str) -> Result<(), StoreError>;

    /// The token currently holding the account's slot, if any.
    fn active_token_id(&self, account_ref: &str) -> Result<Option<String>, StoreError>;

    /// All tokens currently in `status`. Full scan; used by the expiry
    /// sweep and operator queries, not by the hot path.
    fn tokens_with_status(&self, status: TokenStatus) -> Result<Vec<DepositToken>, StoreError>;

    /// All tokens ever issued for a customer, newest first.
    fn tokens_for_customer(&self, customer_ref: &str) -> Result<Vec<DepositToken>, StoreError>;

    /// The completion commit: persist the COMPLETED token, the new record,
    /// and the new receipt, and drop the account's active-slot entry — all
    /// in one atomic step. If this returns an error, none of the four
    /// writes happened.
    fn commit_completion(
        &self,
        token: &DepositToken,
        record: &FinancialRecord,
        receipt: &Receipt,
    ) -> Result<(), StoreError>;

    /// Fetch a financial record by id.
    fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>, StoreError>;

    /// Fetch a receipt by receipt number.
    fn get_receipt(&self, receipt_number: &str) -> Result<Option<Receipt>, StoreError>;

    /// Fetch the receipt evidencing a given record.
    fn receipt_for_record(&self, record_id: &str) -> Result<Option<Receipt>, StoreError>;

    /// Overwrite a receipt (verification bookkeeping: counters, last
    /// outcome). Never used to alter business fields.
    fn put_receipt(&self, receipt: &Receipt) -> Result<(), StoreError>;
}
