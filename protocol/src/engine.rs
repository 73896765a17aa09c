//! # Deposit Engine — the context object
//!
//! One `DepositEngine` owns every dependency the lifecycle operations
//! need: the store, the signature engine, the account directory, the
//! clock, the notification sink, and policy knobs. Operations live in
//! `impl DepositEngine` blocks next to the domain they belong to (issuance
//! in `token::issuer`, completion in `ledger::completion`, and so on);
//! this module holds the construction surface and the small shared
//! helpers every transition uses.
//!
//! There is no global instance. Construct one per store and pass it
//! around; two engines over two stores in one process is a supported
//! configuration, which is exactly what the tests do.

use std::sync::Arc;

use tracing::info;

use crate::authcode::AuthCodeService;
use crate::clock::{Clock, SystemClock};
use crate::directory::AccountDirectory;
use crate::error::{DridError, DridResult};
use crate::ledger::notify::{DepositEvent, LogNotifier, NotificationSink};
use crate::signing::engine::SignatureEngine;
use crate::store::DepositStore;
use crate::token::types::{DepositToken, TokenStatus};

/// What to do when a completion is requested and the signature engine has
/// no key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsignedReceiptPolicy {
    /// Complete anyway; the receipt is issued unsigned and visibly flagged
    /// as such. Branch operations continue through a key outage.
    #[default]
    Allow,
    /// Refuse the completion. Nothing posts without a signature.
    Reject,
}

/// The lifecycle engine. See the crate root for the full operation list.
pub struct DepositEngine {
    pub(crate) store: Arc<dyn DepositStore>,
    pub(crate) signer: SignatureEngine,
    pub(crate) directory: Arc<dyn AccountDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
    pub(crate) auth_codes: Option<AuthCodeService>,
    pub(crate) policy: UnsignedReceiptPolicy,
}

impl DepositEngine {
    /// An engine with production defaults: system clock, log-only
    /// notifications, unsigned receipts allowed, no authorization codes.
    pub fn new(
        store: Arc<dyn DepositStore>,
        signer: SignatureEngine,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            store,
            signer,
            directory,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            auth_codes: None,
            policy: UnsignedReceiptPolicy::default(),
        }
    }

    /// Replace the clock. Tests freeze time with this.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the notification sink.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the unsigned-receipt policy.
    pub fn with_policy(mut self, policy: UnsignedReceiptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Require one-time authorization codes at completion. Issuance starts
    /// returning a code for out-of-band delivery.
    pub fn with_auth_codes(mut self, service: AuthCodeService) -> Self {
        self.auth_codes = Some(service);
        self
    }

    /// Whether the signing subsystem currently has keys.
    pub fn signer_available(&self) -> bool {
        self.signer.is_available()
    }

    // -- shared transition plumbing ----------------------------------------

    /// Fetch a token or say plainly that it does not exist.
    pub(crate) fn fetch_token(&self, token_id: &str) -> DridResult<DepositToken> {
        self.store
            .get_token(token_id)?
            .ok_or_else(|| DridError::NotFound(token_id.to_string()))
    }

    /// Commit `updated` over the `current` snapshot. A lost race re-reads
    /// the token and reports the state that beat us. Terminal states other
    /// than COMPLETED free the account's active slot here (completion
    /// frees it inside its own commit).
    pub(crate) fn apply_transition(
        &self,
        current: &DepositToken,
        updated: DepositToken,
    ) -> DridResult<DepositToken> {
        if !self.store.cas_token(current, &updated)? {
            let fresh = self.fetch_token(&current.token_id)?;
            return Err(self.unusable_error(&fresh));
        }
        if updated.status.is_terminal() && updated.status != TokenStatus::Completed {
            self.store
                .release_active(&updated.account_ref, &updated.token_id)?;
        }
        info!(
            token_id = %updated.token_id,
            from = %current.status,
            to = %updated.status,
            "token transition"
        );
        Ok(updated)
    }

    /// The error that describes why `token` cannot be operated on, when
    /// there is no single expected state to name (a lost CAS). Operations
    /// that do expect a specific state use [`Self::state_error`] instead.
    pub(crate) fn unusable_error(&self, token: &DepositToken) -> DridError {
        match token.status {
            TokenStatus::Processing | TokenStatus::Completed => DridError::AlreadyUsed {
                token_id: token.token_id.clone(),
                status: token.status,
            },
            TokenStatus::Cancelled => DridError::Cancelled {
                token_id: token.token_id.clone(),
            },
            TokenStatus::Rejected => DridError::Rejected {
                token_id: token.token_id.clone(),
            },
            TokenStatus::Expired => DridError::Expired {
                token_id: token.token_id.clone(),
                expired_at: token.expires_at,
            },
            status => DridError::GuardFailed(format!(
                "token {} changed concurrently (now {})",
                token.token_id, status
            )),
        }
    }

    /// The state-machine guard failed: the token is not where the
    /// operation requires it to be. Both sides are named in the reason.
    pub(crate) fn state_error(&self, token: &DepositToken, expected: TokenStatus) -> DridError {
        DridError::GuardFailed(format!(
            "token {} is {}, operation requires {}",
            token.token_id, token.status, expected
        ))
    }

    /// Stamp an in-progress token EXPIRED and free its slot. Called
    /// lazily by whichever operation first touches a token past its
    /// deadline. Losing the CAS is fine — someone else stamped it first.
    pub(crate) fn expire_in_place(&self, token: &DepositToken) -> DridResult<DepositToken> {
        Ok(self.try_expire(token)?.0)
    }

    /// [`Self::expire_in_place`] plus whether this call performed the
    /// stamp. A lost CAS returns the fresh token and `false`; the sweep
    /// counts on the distinction.
    pub(crate) fn try_expire(&self, token: &DepositToken) -> DridResult<(DepositToken, bool)> {
        let mut expired = token.clone();
        expired.status = TokenStatus::Expired;
        if self.store.cas_token(token, &expired)? {
            self.store
                .release_active(&expired.account_ref, &expired.token_id)?;
            self.notifier.notify(&DepositEvent::TokenExpired {
                token_id: expired.token_id.clone(),
            });
            info!(token_id = %expired.token_id, "token expired on access");
            Ok((expired, true))
        } else {
            Ok((self.fetch_token(&token.token_id)?, false))
        }
    }
}
