//! Guarded lifecycle transitions: retrieve, verify, cancel, reject.
//!
//! Each transition follows the same shape: fetch the token, deal with
//! expiry first (a past-deadline token is stamped EXPIRED on the spot and
//! the operation refuses), check the state machine, check the guards, and
//! commit via compare-and-swap. Completion has its own module in the
//! ledger; it is the only transition that creates new data.

use serde::Deserialize;
use tracing::info;

use crate::engine::DepositEngine;
use crate::error::{DridError, DridResult};
use crate::ledger::notify::DepositEvent;
use crate::token::types::{ClosureStamp, DepositToken, TokenStatus, TransitionStamp};

/// The agent's counter checks for the VERIFIED transition.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VerificationChecks {
    /// The money on the counter matches the staged amount.
    pub amount_confirmed: bool,
    /// The person presenting matches the staged depositor identity.
    pub depositor_identity_verified: bool,
    /// The physical instrument (cheque, pay order) was sighted and
    /// matches. Required `Some(true)` for instrument-backed kinds;
    /// ignored for everything else.
    pub instrument_verified: Option<bool>,
}

impl DepositEngine {
    /// A branch agent pulls the token up at the counter.
    ///
    /// INITIATED moves to RETRIEVED. Calling again while RETRIEVED or
    /// VERIFIED is a no-op returning the current token — agents re-scan,
    /// screens refresh, and neither should be an error.
    pub fn retrieve(&self, token_id: &str, agent_id: &str) -> DridResult<DepositToken> {
        let token = self.fetch_token(token_id)?;
        let now = self.clock.now();

        if token.status.is_in_progress() && token.is_expired_at(now) {
            let expired = self.expire_in_place(&token)?;
            return Err(self.unusable_error(&expired));
        }

        match token.status {
            TokenStatus::Initiated => {
                let mut updated = token.clone();
                updated.status = TokenStatus::Retrieved;
                updated.retrieved = Some(TransitionStamp::new(agent_id, now));
                self.apply_transition(&token, updated)
            }
            TokenStatus::Retrieved | TokenStatus::Verified => Ok(token),
            _ => Err(self.unusable_error(&token)),
        }
    }

    /// The agent confirms the counter checks; RETRIEVED moves to VERIFIED.
    ///
    /// Every applicable guard must pass. Instrument-backed kinds
    /// additionally require the instrument flag to be explicitly `true` —
    /// an absent answer is a failing answer.
    pub fn verify(
        &self,
        token_id: &str,
        agent_id: &str,
        checks: VerificationChecks,
    ) -> DridResult<DepositToken> {
        let token = self.fetch_token(token_id)?;
        let now = self.clock.now();

        if token.status.is_in_progress() && token.is_expired_at(now) {
            let expired = self.expire_in_place(&token)?;
            return Err(self.unusable_error(&expired));
        }

        if token.status != TokenStatus::Retrieved {
            return Err(match token.status {
                TokenStatus::Initiated | TokenStatus::Verified => {
                    self.state_error(&token, TokenStatus::Retrieved)
                }
                _ => self.unusable_error(&token),
            });
        }

        if !checks.amount_confirmed {
            return Err(DridError::GuardFailed(
                "amount not confirmed at the counter".to_string(),
            ));
        }
        if !checks.depositor_identity_verified {
            return Err(DridError::GuardFailed(
                "depositor identity not verified".to_string(),
            ));
        }
        if token.kind.requires_instrument() && checks.instrument_verified != Some(true) {
            return Err(DridError::GuardFailed(format!(
                "{} requires the instrument to be verified",
                token.kind
            )));
        }

        let mut updated = token.clone();
        updated.status = TokenStatus::Verified;
        updated.verified = Some(TransitionStamp::new(agent_id, now));
        self.apply_transition(&token, updated)
    }

    /// Withdraw a token before completion. Allowed from any in-progress
    /// state; frees the account's slot immediately.
    pub fn cancel(
        &self,
        token_id: &str,
        actor: Option<&str>,
        reason: &str,
    ) -> DridResult<DepositToken> {
        let token = self.in_progress_or_refuse(token_id)?;

        let mut updated = token.clone();
        updated.status = TokenStatus::Cancelled;
        updated.closed = Some(ClosureStamp {
            actor: actor.map(str::to_string),
            at: self.clock.now(),
            reason: reason.to_string(),
        });
        let cancelled = self.apply_transition(&token, updated)?;
        self.notifier.notify(&DepositEvent::TokenCancelled {
            token_id: cancelled.token_id.clone(),
        });
        info!(%token_id, %reason, "token cancelled");
        Ok(cancelled)
    }

    /// An agent refuses the token at the counter. Same state rules as
    /// cancellation, distinct terminal state and a mandatory reason.
    pub fn reject(
        &self,
        token_id: &str,
        agent_id: &str,
        reason: &str,
    ) -> DridResult<DepositToken> {
        let token = self.in_progress_or_refuse(token_id)?;

        let mut updated = token.clone();
        updated.status = TokenStatus::Rejected;
        updated.closed = Some(ClosureStamp {
            actor: Some(agent_id.to_string()),
            at: self.clock.now(),
            reason: reason.to_string(),
        });
        let rejected = self.apply_transition(&token, updated)?;
        self.notifier.notify(&DepositEvent::TokenRejected {
            token_id: rejected.token_id.clone(),
            reason: reason.to_string(),
        });
        info!(%token_id, agent_id, %reason, "token rejected");
        Ok(rejected)
    }

    /// Fetch a token that must still be in progress and inside its window.
    fn in_progress_or_refuse(&self, token_id: &str) -> DridResult<DepositToken> {
        let token = self.fetch_token(token_id)?;
        if !token.status.is_in_progress() {
            return Err(self.unusable_error(&token));
        }
        if token.is_expired_at(self.clock.now()) {
            let expired = self.expire_in_place(&token)?;
            return Err(self.unusable_error(&expired));
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{AccountProfile, MemoryDirectory};
    use crate::signing::engine::SignatureEngine;
    use crate::store::SledDepositStore;
    use crate::token::issuer::IssueRequest;
    use crate::token::types::{Amount, Currency, TransactionKind};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn engine() -> (Arc<ManualClock>, DepositEngine) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 0).unwrap(),
        ));
        let directory = MemoryDirectory::new();
        directory.upsert(AccountProfile {
            account_ref: "A-001".to_string(),
            customer_ref: "C-001".to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_phone: None,
            branch_id: "BR-014".to_string(),
        });
        let engine = DepositEngine::new(
            Arc::new(SledDepositStore::temporary().unwrap()),
            SignatureEngine::unavailable(),
            Arc::new(directory),
        )
        .with_clock(clock.clone());
        (clock, engine)
    }

    fn issue(engine: &DepositEngine, kind: TransactionKind) -> String {
        engine
            .issue(IssueRequest {
                account_ref: "A-001".to_string(),
                customer_ref: "C-001".to_string(),
                kind,
                amount: Amount::new(10_000, Currency::PKR),
                validity_minutes: Some(30),
                depositor: None,
                narration: None,
                extra: None,
            })
            .unwrap()
            .token
            .token_id
    }

    fn all_good() -> VerificationChecks {
        VerificationChecks {
            amount_confirmed: true,
            depositor_identity_verified: true,
            instrument_verified: Some(true),
        }
    }

    #[test]
    fn retrieve_stamps_the_agent_and_is_idempotent() {
        let (_, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);

        let retrieved = engine.retrieve(&id, "AGT-7").unwrap();
        assert_eq!(retrieved.status, TokenStatus::Retrieved);
        assert_eq!(retrieved.retrieved.as_ref().unwrap().actor, "AGT-7");

        // Re-scan: same token back, no error, stamp unchanged.
        let again = engine.retrieve(&id, "AGT-8").unwrap();
        assert_eq!(again.retrieved.as_ref().unwrap().actor, "AGT-7");
    }

    #[test]
    fn verify_requires_retrieved_state() {
        let (_, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);

        match engine.verify(&id, "AGT-7", all_good()) {
            Err(DridError::GuardFailed(reason)) => {
                assert!(reason.contains("INITIATED"));
                assert!(reason.contains("RETRIEVED"));
            }
            other => panic!("expected GuardFailed, got {:?}", other.map(|t| t.status)),
        }

        engine.retrieve(&id, "AGT-7").unwrap();
        let verified = engine.verify(&id, "AGT-7", all_good()).unwrap();
        assert_eq!(verified.status, TokenStatus::Verified);
        assert_eq!(verified.verified.as_ref().unwrap().actor, "AGT-7");
    }

    #[test]
    fn failed_guards_leave_the_token_retrieved() {
        let (_, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);
        engine.retrieve(&id, "AGT-7").unwrap();

        let mut checks = all_good();
        checks.amount_confirmed = false;
        assert!(matches!(
            engine.verify(&id, "AGT-7", checks),
            Err(DridError::GuardFailed(_))
        ));

        let mut checks = all_good();
        checks.depositor_identity_verified = false;
        assert!(matches!(
            engine.verify(&id, "AGT-7", checks),
            Err(DridError::GuardFailed(_))
        ));

        assert_eq!(engine.token(&id).unwrap().status, TokenStatus::Retrieved);
    }

    #[test]
    fn cheques_require_the_instrument_flag_cash_ignores_it() {
        let (_, engine) = engine();

        let cheque = issue(&engine, TransactionKind::ChequeDeposit);
        engine.retrieve(&cheque, "AGT-7").unwrap();
        for absent_or_false in [None, Some(false)] {
            let mut checks = all_good();
            checks.instrument_verified = absent_or_false;
            assert!(matches!(
                engine.verify(&cheque, "AGT-7", checks),
                Err(DridError::GuardFailed(_))
            ));
        }
        engine.verify(&cheque, "AGT-7", all_good()).unwrap();
        // Free the account slot for the cash case.
        engine.cancel(&cheque, None, "test cleanup").unwrap();

        let cash = issue(&engine, TransactionKind::CashDeposit);
        engine.retrieve(&cash, "AGT-7").unwrap();
        let mut checks = all_good();
        checks.instrument_verified = None;
        assert_eq!(
            engine.verify(&cash, "AGT-7", checks).unwrap().status,
            TokenStatus::Verified
        );
    }

    #[test]
    fn cancel_frees_the_slot_and_is_terminal() {
        let (_, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);

        let cancelled = engine
            .cancel(&id, Some("CUSTOMER"), "changed my mind")
            .unwrap();
        assert_eq!(cancelled.status, TokenStatus::Cancelled);
        assert_eq!(
            cancelled.closed.as_ref().unwrap().reason,
            "changed my mind"
        );

        // Terminal means terminal.
        assert!(matches!(
            engine.cancel(&id, None, "again"),
            Err(DridError::Cancelled { .. })
        ));
        assert!(matches!(
            engine.retrieve(&id, "AGT-7"),
            Err(DridError::Cancelled { .. })
        ));

        // And the account can stage a new deposit straight away.
        issue(&engine, TransactionKind::CashDeposit);
    }

    #[test]
    fn reject_is_a_distinct_terminal_with_a_reason() {
        let (_, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);
        engine.retrieve(&id, "AGT-7").unwrap();

        let rejected = engine
            .reject(&id, "AGT-7", "depositor ID does not match")
            .unwrap();
        assert_eq!(rejected.status, TokenStatus::Rejected);
        assert_eq!(
            rejected.closed.as_ref().unwrap().actor.as_deref(),
            Some("AGT-7")
        );

        assert!(matches!(
            engine.retrieve(&id, "AGT-7"),
            Err(DridError::Rejected { .. })
        ));
        issue(&engine, TransactionKind::CashDeposit);
    }

    #[test]
    fn expired_tokens_refuse_every_transition_and_get_stamped() {
        let (clock, engine) = engine();
        let id = issue(&engine, TransactionKind::CashDeposit);
        engine.retrieve(&id, "AGT-7").unwrap();

        clock.advance(Duration::minutes(31));
        assert!(matches!(
            engine.verify(&id, "AGT-7", all_good()),
            Err(DridError::Expired { .. })
        ));
        assert_eq!(engine.token(&id).unwrap().status, TokenStatus::Expired);

        // Cancelling an already-expired token reports expiry, not success.
        assert!(matches!(
            engine.cancel(&id, None, "too late"),
            Err(DridError::Expired { .. })
        ));
    }
}
