//! Completion: the terminal transition that posts money.
//!
//! Exactly-once is enforced structurally. First the token is moved
//! VERIFIED → PROCESSING by compare-and-swap — of two concurrent
//! completions, one loses the swap and is refused. Then the record and
//! receipt are built and signed, and everything lands in one atomic store
//! commit. If anything after the swap fails, the token rolls back to
//! VERIFIED and no record exists; re-running the completion is safe.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::authcode::AuthCodeOutcome;
use crate::config::{
    MAX_REFERENCE_RETRIES, RECEIPT_PREFIX, RECEIPT_SUFFIX_LENGTH, RECORD_PREFIX,
    RECORD_SUFFIX_LENGTH, SIGNING_ALGORITHM_ID,
};
use crate::engine::{DepositEngine, UnsignedReceiptPolicy};
use crate::error::{DridError, DridResult};
use crate::ledger::notify::DepositEvent;
use crate::ledger::receipt::Receipt;
use crate::ledger::record::FinancialRecord;
use crate::token::issuer::generate_reference;
use crate::token::types::{DepositToken, TokenStatus, TransitionStamp};

/// The agent's request to execute a verified token.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    /// The token to complete. Must be VERIFIED.
    pub token_id: String,
    /// The executing agent; stamped onto the record and receipt.
    pub agent_id: String,
    /// The agent's attestation that the customer authorized execution.
    /// Completion refuses without it, whatever else checks out.
    pub authorization_captured: bool,
    /// The customer's one-time authorization code. Required when the
    /// engine is configured with an authorization service.
    pub auth_code: Option<String>,
}

/// Everything a successful completion produced.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// The token, now COMPLETED and linked to its record.
    pub token: DepositToken,
    /// The posted financial record.
    pub record: FinancialRecord,
    /// The receipt — signed unless key material was down and policy
    /// allowed completing anyway.
    pub receipt: Receipt,
}

impl DepositEngine {
    /// Execute a VERIFIED token: post the record, issue the receipt, mark
    /// the token COMPLETED, free the account's slot. One atomic commit.
    pub fn complete(&self, req: CompleteRequest) -> DridResult<CompletionOutcome> {
        let token = self.fetch_token(&req.token_id)?;
        let now = self.clock.now();

        if token.status.is_in_progress() && token.is_expired_at(now) {
            let expired = self.expire_in_place(&token)?;
            return Err(self.unusable_error(&expired));
        }
        if token.status != TokenStatus::Verified {
            return Err(match token.status {
                TokenStatus::Initiated | TokenStatus::Retrieved => {
                    self.state_error(&token, TokenStatus::Verified)
                }
                _ => self.unusable_error(&token),
            });
        }

        self.check_authorization(&req)?;

        // Refuse before taking PROCESSING if policy forbids an unsigned
        // outcome and we already know the signer is down.
        if self.policy == UnsignedReceiptPolicy::Reject && !self.signer.is_available() {
            return Err(DridError::SignatureUnavailable);
        }

        // The exactly-once gate: of N concurrent completions, one wins
        // this swap and the rest see AlreadyUsed.
        let mut processing = token.clone();
        processing.status = TokenStatus::Processing;
        if !self.store.cas_token(&token, &processing)? {
            let fresh = self.fetch_token(&token.token_id)?;
            return Err(self.unusable_error(&fresh));
        }

        match self.post_and_commit(&processing, &req.agent_id, now) {
            Ok(outcome) => {
                info!(
                    token_id = %outcome.token.token_id,
                    record_id = %outcome.record.record_id,
                    receipt_number = %outcome.receipt.receipt_number,
                    signed = outcome.receipt.is_signed(),
                    "completion committed"
                );
                self.notifier.notify(&DepositEvent::DepositCompleted {
                    token_id: outcome.token.token_id.clone(),
                    record: outcome.record.clone(),
                    receipt: outcome.receipt.clone(),
                });
                Ok(outcome)
            }
            Err(err) => {
                self.rollback_to_verified(&processing);
                Err(err)
            }
        }
    }

    /// Issue a replacement authorization code for a token still in play.
    ///
    /// Covers re-delivery ("the code never arrived") and retries after a
    /// failed completion: [`Self::complete`] consumes the code before the
    /// commit, so a rolled-back attempt leaves the token VERIFIED with no
    /// live code. The replacement invalidates any outstanding one.
    pub fn reissue_auth_code(&self, token_id: &str) -> DridResult<String> {
        let codes = self.auth_codes.as_ref().ok_or_else(|| {
            DridError::GuardFailed("authorization codes are not enabled".to_string())
        })?;

        let token = self.fetch_token(token_id)?;
        let now = self.clock.now();
        if token.status.is_in_progress() && token.is_expired_at(now) {
            let expired = self.expire_in_place(&token)?;
            return Err(self.unusable_error(&expired));
        }
        if !token.status.is_in_progress() {
            return Err(self.unusable_error(&token));
        }

        Ok(codes.issue(token_id))
    }

    fn check_authorization(&self, req: &CompleteRequest) -> DridResult<()> {
        if !req.authorization_captured {
            return Err(DridError::GuardFailed(
                "customer authorization not captured".to_string(),
            ));
        }
        let codes = match &self.auth_codes {
            Some(codes) => codes,
            None => return Ok(()),
        };
        let code = req.auth_code.as_deref().ok_or_else(|| {
            DridError::GuardFailed("authorization code required".to_string())
        })?;
        match codes.verify(&req.token_id, code) {
            AuthCodeOutcome::Approved => Ok(()),
            AuthCodeOutcome::Mismatch { attempts_left } => Err(DridError::GuardFailed(format!(
                "authorization code mismatch ({} attempts left)",
                attempts_left
            ))),
            AuthCodeOutcome::Locked => Err(DridError::GuardFailed(
                "authorization code locked after repeated mismatches".to_string(),
            )),
            AuthCodeOutcome::ExpiredOrMissing => Err(DridError::GuardFailed(
                "no live authorization code for this token".to_string(),
            )),
        }
    }

    /// Build the record and receipt for a PROCESSING token and commit.
    /// Any error out of here means nothing was written.
    fn post_and_commit(
        &self,
        processing: &DepositToken,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> DridResult<CompletionOutcome> {
        let record_id = self.fresh_record_id(now)?;
        let receipt_number = self.fresh_receipt_number(now)?;

        let record = FinancialRecord::from_token(processing, record_id, agent_id, now)?;

        let mut receipt = Receipt {
            receipt_number,
            record_id: record.record_id.clone(),
            token_id: processing.token_id.clone(),
            amount: record.amount.clone(),
            customer_name: record.customer_name.clone(),
            customer_account: record.account_ref.clone(),
            transaction_type: record.kind,
            transaction_date: record.created_at,
            branch_id: record.branch_id.clone(),
            teller_id: record.teller_id.clone(),
            signature_b64: None,
            payload_hash_hex: None,
            signed_at: None,
            key_id: None,
            algorithm: SIGNING_ALGORITHM_ID.to_string(),
            is_signature_valid: None,
            verified_count: 0,
            last_verified_at: None,
            created_at: now,
        };

        match self.signer.sign(&receipt.fields(), now) {
            Ok(signed) => receipt = receipt.with_signature(signed),
            Err(_) if self.policy == UnsignedReceiptPolicy::Allow => {
                warn!(
                    receipt_number = %receipt.receipt_number,
                    "signing unavailable; issuing unsigned receipt"
                );
            }
            Err(_) => return Err(DridError::SignatureUnavailable),
        }

        let mut completed = processing.clone();
        completed.status = TokenStatus::Completed;
        completed.completed = Some(TransitionStamp::new(agent_id, now));
        completed.linked_financial_record_id = Some(record.record_id.clone());

        self.store.commit_completion(&completed, &record, &receipt)?;

        Ok(CompletionOutcome {
            token: completed,
            record,
            receipt,
        })
    }

    /// Undo the PROCESSING claim. Failure here is logged loudly and
    /// swallowed: the original completion error is what the caller needs,
    /// and a token stuck in PROCESSING is operator-visible.
    fn rollback_to_verified(&self, processing: &DepositToken) {
        let mut verified = processing.clone();
        verified.status = TokenStatus::Verified;
        match self.store.cas_token(processing, &verified) {
            Ok(true) => {
                warn!(token_id = %processing.token_id, "completion failed; token rolled back to VERIFIED")
            }
            Ok(false) => {
                error!(token_id = %processing.token_id, "rollback lost a race; token state is not PROCESSING")
            }
            Err(err) => {
                error!(token_id = %processing.token_id, %err, "rollback write failed; token may be stuck in PROCESSING")
            }
        }
    }

    fn fresh_record_id(&self, now: DateTime<Utc>) -> DridResult<String> {
        for _ in 0..MAX_REFERENCE_RETRIES {
            let candidate = generate_reference(RECORD_PREFIX, RECORD_SUFFIX_LENGTH, now);
            if self.store.get_record(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(DridError::GuardFailed(
            "record reference space exhausted".to_string(),
        ))
    }

    fn fresh_receipt_number(&self, now: DateTime<Utc>) -> DridResult<String> {
        for _ in 0..MAX_REFERENCE_RETRIES {
            let candidate = generate_reference(RECEIPT_PREFIX, RECEIPT_SUFFIX_LENGTH, now);
            if self.store.get_receipt(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(DridError::GuardFailed(
            "receipt reference space exhausted".to_string(),
        ))
    }
}
