//! Token issuance.
//!
//! Issuance is the only operation that creates a token, and the only one
//! the customer drives directly. It validates the request against the
//! amount ceiling and validity bounds, resolves the account through the
//! directory, claims the account's active-token slot, and persists the
//! new token — in that order, so a refused request leaves no trace.

use chrono::Duration;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{
    AMOUNT_CEILING_MINOR, DEFAULT_VALIDITY_MINUTES, MAX_REFERENCE_RETRIES, MAX_VALIDITY_MINUTES,
    MIN_VALIDITY_MINUTES, TOKEN_PREFIX, TOKEN_SUFFIX_LENGTH,
};
use crate::engine::DepositEngine;
use crate::error::{DridError, DridResult};
use crate::ledger::notify::DepositEvent;
use crate::store::{ReserveOutcome, StoreError};
use crate::token::types::{
    Amount, DepositToken, DepositorIdentity, TokenStatus, TransactionKind,
};

/// A customer's request to stage a deposit.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    /// Target account.
    pub account_ref: String,
    /// Requesting customer; must own the account.
    pub customer_ref: String,
    /// What kind of transaction is being staged.
    pub kind: TransactionKind,
    /// The staged amount.
    pub amount: Amount,
    /// Requested validity window in minutes. `None` takes the default.
    pub validity_minutes: Option<i64>,
    /// Who will hand over the money. `None` means the account holder
    /// themselves, with their identity document checked against the file.
    pub depositor: Option<DepositorIdentity>,
    /// Free-text memo.
    pub narration: Option<String>,
    /// Type-specific payload (cheque fields, consumer number, ...).
    pub extra: Option<serde_json::Value>,
}

/// What issuance hands back.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The newly created token, in INITIATED state.
    pub token: DepositToken,
    /// One-time authorization code for completion, when the engine is
    /// configured to require them. Deliver out-of-band; never log it.
    pub auth_code: Option<String>,
}

impl DepositEngine {
    /// Stage a deposit: validate, resolve, claim the account slot, persist.
    ///
    /// At most one token per account may be in progress; a second request
    /// while one is outstanding fails with [`DridError::AlreadyActive`]
    /// naming the existing token.
    pub fn issue(&self, req: IssueRequest) -> DridResult<IssuedToken> {
        if req.amount.is_zero() {
            return Err(DridError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }
        if req.amount.minor > AMOUNT_CEILING_MINOR {
            return Err(DridError::InvalidRequest(format!(
                "amount {} exceeds the per-transaction ceiling {}",
                req.amount,
                Amount::new(AMOUNT_CEILING_MINOR, req.amount.currency.clone()),
            )));
        }

        let validity_minutes = req.validity_minutes.unwrap_or(DEFAULT_VALIDITY_MINUTES);
        if !(MIN_VALIDITY_MINUTES..=MAX_VALIDITY_MINUTES).contains(&validity_minutes) {
            return Err(DridError::InvalidRequest(format!(
                "validity must be between {} and {} minutes, got {}",
                MIN_VALIDITY_MINUTES, MAX_VALIDITY_MINUTES, validity_minutes
            )));
        }

        let profile = self.directory.resolve(&req.account_ref, &req.customer_ref)?;
        let depositor = req.depositor.unwrap_or_else(|| DepositorIdentity {
            name: profile.customer_name.clone(),
            id_number: "ON-FILE".to_string(),
            phone: profile.customer_phone.clone(),
            relationship: "SELF".to_string(),
        });

        let now = self.clock.now();
        for _ in 0..MAX_REFERENCE_RETRIES {
            let token_id = generate_reference(TOKEN_PREFIX, TOKEN_SUFFIX_LENGTH, now);

            match self.store.reserve_active(&req.account_ref, &token_id)? {
                ReserveOutcome::Held { existing_token_id } => {
                    // Expiry is lazy, so the holder may be past its
                    // deadline without having been stamped yet. Issuance
                    // counts as an access: stamp it (which frees the slot)
                    // and try the reservation again.
                    match self.store.get_token(&existing_token_id)? {
                        Some(holder)
                            if holder.status.is_in_progress() && holder.is_expired_at(now) =>
                        {
                            self.expire_in_place(&holder)?;
                            continue;
                        }
                        _ => return Err(DridError::AlreadyActive { existing_token_id }),
                    }
                }
                ReserveOutcome::Reserved => {}
            }

            let token = DepositToken {
                token_id: token_id.clone(),
                status: TokenStatus::Initiated,
                created_at: now,
                expires_at: now + Duration::minutes(validity_minutes),
                validity_minutes,
                kind: req.kind,
                amount: req.amount.clone(),
                account_ref: req.account_ref.clone(),
                customer_ref: req.customer_ref.clone(),
                customer_name: profile.customer_name.clone(),
                branch_id: profile.branch_id.clone(),
                depositor: depositor.clone(),
                narration: req.narration.clone(),
                extra: req.extra.clone(),
                retrieved: None,
                verified: None,
                completed: None,
                closed: None,
                linked_financial_record_id: None,
                validation_attempts: 0,
                last_validated_at: None,
            };

            match self.store.insert_token(&token) {
                Ok(()) => {
                    info!(
                        %token_id,
                        account_ref = %token.account_ref,
                        amount = %token.amount,
                        kind = %token.kind,
                        validity_minutes,
                        "token issued"
                    );
                    self.notifier.notify(&DepositEvent::TokenIssued {
                        token_id: token_id.clone(),
                        account_ref: token.account_ref.clone(),
                    });
                    let auth_code = self
                        .auth_codes
                        .as_ref()
                        .map(|codes| codes.issue(&token_id));
                    return Ok(IssuedToken { token, auth_code });
                }
                // Somebody else got this reference today. Free the slot we
                // just took under the dead id and try a fresh one.
                Err(StoreError::Conflict(_)) => {
                    self.store.release_active(&req.account_ref, &token_id)?;
                }
                Err(err) => {
                    self.store.release_active(&req.account_ref, &token_id)?;
                    return Err(err.into());
                }
            }
        }

        Err(DridError::Persistence(StoreError::Conflict(
            "token reference space exhausted after repeated collisions".to_string(),
        )))
    }
}

/// Build a reference like `DRID-20260825-7F3A1C`: prefix, UTC date, random
/// uppercase-hex suffix. Uniqueness is enforced by the store; this only
/// has to make collisions rare.
pub(crate) fn generate_reference(
    prefix: &str,
    suffix_len: usize,
    now: chrono::DateTime<chrono::Utc>,
) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%Y%m%d"),
        raw[..suffix_len].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{AccountProfile, MemoryDirectory};
    use crate::signing::engine::SignatureEngine;
    use crate::store::SledDepositStore;
    use crate::token::types::Currency;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn engine_with_clock() -> (Arc<ManualClock>, DepositEngine) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 0).unwrap(),
        ));
        let directory = MemoryDirectory::new();
        directory.upsert(AccountProfile {
            account_ref: "A-001".to_string(),
            customer_ref: "C-001".to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_phone: Some("+92-300-1234567".to_string()),
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

    fn engine() -> DepositEngine {
        engine_with_clock().1
    }

    fn request() -> IssueRequest {
        IssueRequest {
            account_ref: "A-001".to_string(),
            customer_ref: "C-001".to_string(),
            kind: TransactionKind::CashDeposit,
            amount: Amount::new(1_500_000, Currency::PKR),
            validity_minutes: None,
            depositor: None,
            narration: None,
            extra: None,
        }
    }

    #[test]
    fn issue_produces_a_well_formed_initiated_token() {
        let issued = engine().issue(request()).unwrap().token;
        assert_eq!(issued.status, TokenStatus::Initiated);
        assert!(issued.token_id.starts_with("DRID-20260825-"));
        assert_eq!(issued.token_id.len(), "DRID-20260825-".len() + 6);
        assert_eq!(issued.validity_minutes, 60);
        assert_eq!(issued.expires_at - issued.created_at, Duration::minutes(60));
        // Depositor defaulted to the account holder.
        assert_eq!(issued.depositor.name, "Ayesha Khan");
        assert_eq!(issued.depositor.relationship, "SELF");
        assert_eq!(issued.branch_id, "BR-014");
    }

    #[test]
    fn zero_and_over_ceiling_amounts_are_refused() {
        let engine = engine();

        let mut req = request();
        req.amount = Amount::new(0, Currency::PKR);
        assert!(matches!(
            engine.issue(req),
            Err(DridError::InvalidRequest(_))
        ));

        let mut req = request();
        req.amount = Amount::new(AMOUNT_CEILING_MINOR + 1, Currency::PKR);
        assert!(matches!(
            engine.issue(req),
            Err(DridError::InvalidRequest(_))
        ));

        // Exactly at the ceiling is fine.
        let mut req = request();
        req.amount = Amount::new(AMOUNT_CEILING_MINOR, Currency::PKR);
        assert!(engine.issue(req).is_ok());
    }

    #[test]
    fn validity_outside_bounds_is_refused() {
        let engine = engine();
        for bad in [MIN_VALIDITY_MINUTES - 1, MAX_VALIDITY_MINUTES + 1, 0, -5] {
            let mut req = request();
            req.validity_minutes = Some(bad);
            assert!(
                matches!(engine.issue(req), Err(DridError::InvalidRequest(_))),
                "validity {} should have been refused",
                bad
            );
        }
    }

    #[test]
    fn second_active_token_for_the_account_is_refused() {
        let engine = engine();
        let first = engine.issue(request()).unwrap().token;

        match engine.issue(request()) {
            Err(DridError::AlreadyActive { existing_token_id }) => {
                assert_eq!(existing_token_id, first.token_id);
            }
            other => panic!("expected AlreadyActive, got {:?}", other.map(|i| i.token)),
        }
    }

    #[test]
    fn expired_holder_does_not_block_a_new_issuance() {
        let (clock, engine) = engine_with_clock();
        let first = engine.issue(request()).unwrap().token;

        // Past the deadline, with no validate/sweep in between: issuance
        // itself must see the holder as dead, stamp it, and proceed.
        clock.advance(Duration::minutes(61));
        let second = engine.issue(request()).unwrap().token;
        assert_ne!(second.token_id, first.token_id);
        assert_eq!(
            engine.token(&first.token_id).unwrap().status,
            TokenStatus::Expired
        );

        // The slot now belongs to the fresh token.
        match engine.issue(request()) {
            Err(DridError::AlreadyActive { existing_token_id }) => {
                assert_eq!(existing_token_id, second.token_id);
            }
            other => panic!("expected AlreadyActive, got {:?}", other.map(|i| i.token)),
        }
    }

    #[test]
    fn unknown_account_is_a_directory_error() {
        let mut req = request();
        req.account_ref = "A-404".to_string();
        assert!(matches!(
            engine().issue(req),
            Err(DridError::Directory(_))
        ));
    }
}
