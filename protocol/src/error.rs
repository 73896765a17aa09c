//! Error types for the DRID core.
//!
//! Every public operation on the engine returns a [`DridError`] on failure.
//! The variants are deliberately structured: a caller that receives
//! [`DridError::AlreadyActive`] gets the conflicting token id so it can
//! offer "view or cancel the existing one" instead of a bare "operation
//! failed". Nothing crosses the core boundary as a panic.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::store::StoreError;
use crate::token::types::TokenStatus;

/// Result alias used throughout the crate's public surface.
pub type DridResult<T> = Result<T, DridError>;

/// Errors that can occur across the token lifecycle, completion, and
/// verification operations.
#[derive(Debug, Error)]
pub enum DridError {
    /// No token (or record, or receipt) exists under the given reference.
    #[error("reference not found: {0}")]
    NotFound(String),

    /// Issuance refused: the target account already has a token in a
    /// non-terminal state. Carries the conflicting id so the caller can
    /// surface it.
    #[error("an active token already exists for this account: {existing_token_id}")]
    AlreadyActive {
        /// The token currently holding the account's active slot.
        existing_token_id: String,
    },

    /// The token's deadline has passed. No guarded transition is permitted
    /// once this is returned.
    #[error("token {token_id} expired at {expired_at}")]
    Expired {
        /// The expired token.
        token_id: String,
        /// When the validity window closed.
        expired_at: DateTime<Utc>,
    },

    /// The token has already been consumed by a completion (or one is in
    /// flight right now).
    #[error("token {token_id} has already been used (status {status})")]
    AlreadyUsed {
        /// The token in question.
        token_id: String,
        /// The status that makes it unusable: PROCESSING or COMPLETED.
        status: TokenStatus,
    },

    /// The token was cancelled by the customer or an agent.
    #[error("token {token_id} was cancelled")]
    Cancelled {
        /// The cancelled token.
        token_id: String,
    },

    /// The token was rejected at the counter.
    #[error("token {token_id} was rejected")]
    Rejected {
        /// The rejected token.
        token_id: String,
    },

    /// A transition-specific guard did not pass: wrong lifecycle state,
    /// amount not confirmed, instrument not verified, authorization
    /// missing. The reason names what failed and, for state violations,
    /// both the actual and the required state.
    #[error("transition guard failed: {0}")]
    GuardFailed(String),

    /// The request itself is malformed: zero amount, amount above the
    /// ceiling, out-of-range validity. Distinct from [`Self::AlreadyActive`].
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Directory lookup refused the referenced account/customer pair.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Signing key material is not available. Under the `Allow` policy the
    /// completion still succeeds with an unsigned, flagged receipt; under
    /// `Reject` this surfaces to the caller.
    #[error("signing key material unavailable")]
    SignatureUnavailable,

    /// A signature is present but does not verify against the canonical
    /// payload. Never collapsed into a boolean `false`.
    #[error("signature does not match the canonical payload: possible tampering")]
    TamperDetected,

    /// The persistence layer failed. During completion this is the only
    /// error class that undoes a prior state change (PROCESSING rolls back
    /// to VERIFIED).
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
