//! Token validation and the expiry sweep.
//!
//! Validation is a read with one side effect: a token found past its
//! deadline while still in progress is stamped EXPIRED on the spot. Expiry
//! is evaluated lazily on every access, so correctness never depends on a
//! background job — the sweep below exists only to tidy tokens nobody ever
//! asked about again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::engine::DepositEngine;
use crate::error::DridResult;
use crate::token::types::{DepositToken, TokenStatus};

/// The answer to "is this token good right now?".
///
/// `is_valid` is the headline; the other flags say why not, and `message`
/// is a counter-ready sentence for the agent's screen.
#[derive(Debug, Clone, Serialize)]
pub struct TokenValidation {
    /// The token in question.
    pub token_id: String,
    /// Its status after this validation (lazy expiry may have just
    /// changed it).
    pub status: TokenStatus,
    /// Whether the token can still proceed through the lifecycle.
    pub is_valid: bool,
    /// The deadline passed.
    pub is_expired: bool,
    /// A completion consumed it (or is consuming it).
    pub is_used: bool,
    /// Cancelled or rejected.
    pub is_closed: bool,
    /// Seconds left before expiry; zero once expired.
    pub time_remaining_secs: i64,
    /// One sentence for the human at the counter.
    pub message: String,
}

impl DepositEngine {
    /// Judge a token's current validity. Unknown ids are an error, not an
    /// "invalid" verdict — a typo and a dead token are different answers.
    pub fn validate(&self, token_id: &str) -> DridResult<TokenValidation> {
        let mut token = self.fetch_token(token_id)?;
        let now = self.clock.now();

        token = self.note_validation(token, now)?;

        if token.status.is_in_progress() && token.is_expired_at(now) {
            token = self.expire_in_place(&token)?;
        }

        Ok(Self::verdict(&token, now))
    }

    fn verdict(token: &DepositToken, now: DateTime<Utc>) -> TokenValidation {
        let status = token.status;
        let is_valid = status.is_in_progress() && !token.is_expired_at(now);
        let message = match status {
            _ if is_valid => format!(
                "token is {} and valid for another {} seconds",
                status,
                token.time_remaining_secs(now)
            ),
            TokenStatus::Expired => format!("token expired at {}", token.expires_at),
            TokenStatus::Processing | TokenStatus::Completed => {
                "token has already been used".to_string()
            }
            TokenStatus::Cancelled => "token was cancelled".to_string(),
            TokenStatus::Rejected => "token was rejected".to_string(),
            // In progress but past deadline would have been expired above;
            // this arm is unreachable in practice.
            other => format!("token is {}", other),
        };

        TokenValidation {
            token_id: token.token_id.clone(),
            status,
            is_valid,
            is_expired: status == TokenStatus::Expired,
            is_used: status.is_used(),
            is_closed: status.is_closed_out(),
            time_remaining_secs: if is_valid {
                token.time_remaining_secs(now)
            } else {
                0
            },
            message,
        }
    }

    /// Record that somebody looked. Best-effort: a lost CAS here means a
    /// real transition is happening, which matters more than the counter.
    fn note_validation(
        &self,
        token: DepositToken,
        now: DateTime<Utc>,
    ) -> DridResult<DepositToken> {
        let mut noted = token.clone();
        noted.validation_attempts += 1;
        noted.last_validated_at = Some(now);
        if self.store.cas_token(&token, &noted)? {
            Ok(noted)
        } else {
            self.fetch_token(&token.token_id)
        }
    }

    /// Stamp every INITIATED/RETRIEVED/VERIFIED token past its deadline.
    /// Returns how many this sweep expired. Operator housekeeping, not a
    /// correctness requirement.
    pub fn sweep_expired(&self) -> DridResult<usize> {
        let now = self.clock.now();
        let mut swept = 0;
        for status in [
            TokenStatus::Initiated,
            TokenStatus::Retrieved,
            TokenStatus::Verified,
        ] {
            for token in self.store.tokens_with_status(status)? {
                if token.is_expired_at(now) {
                    // A lost race means someone else dealt with the
                    // token; it's no longer stale, but it isn't ours to
                    // count either.
                    let (_, stamped) = self.try_expire(&token)?;
                    if stamped {
                        swept += 1;
                    }
                }
            }
        }
        if swept > 0 {
            info!(swept, "expiry sweep finished");
        }
        Ok(swept)
    }

    /// The token currently holding an account's active slot, fully loaded.
    pub fn active_token(&self, account_ref: &str) -> DridResult<Option<DepositToken>> {
        match self.store.active_token_id(account_ref)? {
            Some(token_id) => Ok(Some(self.fetch_token(&token_id)?)),
            None => Ok(None),
        }
    }

    /// Every token ever issued for a customer, newest first.
    pub fn tokens_for_customer(&self, customer_ref: &str) -> DridResult<Vec<DepositToken>> {
        Ok(self.store.tokens_for_customer(customer_ref)?)
    }

    /// Fetch a token by id, for display.
    pub fn token(&self, token_id: &str) -> DridResult<DepositToken> {
        self.fetch_token(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{AccountProfile, MemoryDirectory};
    use crate::error::DridError;
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

    fn issue(engine: &DepositEngine) -> String {
        engine
            .issue(IssueRequest {
                account_ref: "A-001".to_string(),
                customer_ref: "C-001".to_string(),
                kind: TransactionKind::CashDeposit,
                amount: Amount::new(1_000, Currency::PKR),
                validity_minutes: Some(30),
                depositor: None,
                narration: None,
                extra: None,
            })
            .unwrap()
            .token
            .token_id
    }

    #[test]
    fn fresh_token_validates_with_time_remaining() {
        let (_, engine) = engine();
        let token_id = issue(&engine);

        let verdict = engine.validate(&token_id).unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.status, TokenStatus::Initiated);
        assert_eq!(verdict.time_remaining_secs, 30 * 60);
        assert!(verdict.message.contains("INITIATED"));
    }

    #[test]
    fn validation_attempts_are_counted() {
        let (_, engine) = engine();
        let token_id = issue(&engine);

        engine.validate(&token_id).unwrap();
        engine.validate(&token_id).unwrap();
        let token = engine.token(&token_id).unwrap();
        assert_eq!(token.validation_attempts, 2);
        assert!(token.last_validated_at.is_some());
    }

    #[test]
    fn expiry_is_stamped_on_access_and_frees_the_slot() {
        let (clock, engine) = engine();
        let token_id = issue(&engine);

        clock.advance(Duration::minutes(31));
        let verdict = engine.validate(&token_id).unwrap();
        assert!(!verdict.is_valid);
        assert!(verdict.is_expired);
        assert_eq!(verdict.status, TokenStatus::Expired);
        assert_eq!(verdict.time_remaining_secs, 0);

        // Stored state changed, and the account can stage again.
        assert_eq!(
            engine.token(&token_id).unwrap().status,
            TokenStatus::Expired
        );
        assert_eq!(engine.active_token("A-001").unwrap(), None);
        issue(&engine);
    }

    #[test]
    fn unknown_token_is_not_found() {
        let (_, engine) = engine();
        assert!(matches!(
            engine.validate("DRID-20260825-ZZZZZZ"),
            Err(DridError::NotFound(_))
        ));
    }

    #[test]
    fn sweep_expires_only_the_overdue() {
        let (clock, engine) = engine();
        let stale = issue(&engine);
        assert_eq!(engine.sweep_expired().unwrap(), 0);

        clock.advance(Duration::minutes(31));
        let swept = engine.sweep_expired().unwrap();
        assert_eq!(swept, 1);
        assert_eq!(engine.token(&stale).unwrap().status, TokenStatus::Expired);

        // The sweep freed the slot, so the account can stage again, and
        // the fresh token is left alone by the next sweep.
        let fresh = issue(&engine);
        assert_eq!(engine.sweep_expired().unwrap(), 0);
        assert_eq!(
            engine.token(&fresh).unwrap().status,
            TokenStatus::Initiated
        );
    }

    #[test]
    fn a_lost_expiry_race_is_not_counted_as_swept() {
        let (clock, engine) = engine();
        let token_id = issue(&engine);
        let stale = engine.token(&token_id).unwrap();

        clock.advance(Duration::minutes(31));
        engine.validate(&token_id).unwrap();

        // Working from the stale snapshot, the stamp loses its CAS: the
        // token comes back fresh and the stamp is not claimed.
        let (fresh, stamped) = engine.try_expire(&stale).unwrap();
        assert!(!stamped);
        assert_eq!(fresh.status, TokenStatus::Expired);

        // Nothing left for the sweep, and nothing to over-report.
        assert_eq!(engine.sweep_expired().unwrap(), 0);
    }

    #[test]
    fn active_token_round_trips() {
        let (_, engine) = engine();
        let token_id = issue(&engine);
        assert_eq!(
            engine.active_token("A-001").unwrap().unwrap().token_id,
            token_id
        );

        let mine = engine.tokens_for_customer("C-001").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].token_id, token_id);
    }
}
