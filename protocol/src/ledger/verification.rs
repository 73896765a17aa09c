//! Receipt re-verification and the key-export surface.
//!
//! Anyone holding a receipt number can ask, at any time, "is this receipt
//! still exactly what was signed?". Verification rebuilds the canonical
//! payload from the receipt's stored fields and checks the stored
//! signature against it. The answer is three-valued — authentic, tampered,
//! or never signed — and each verification is counted on the receipt.

use serde::Serialize;
use tracing::warn;

use crate::engine::DepositEngine;
use crate::error::{DridError, DridResult};
use crate::ledger::receipt::Receipt;
use crate::signing::engine::{SignatureInfo, VerificationOutcome};
use crate::signing::payload::ReceiptFields;

/// The full verification report for one receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptVerification {
    /// The receipt that was checked.
    pub receipt_number: String,
    /// The record it evidences.
    pub record_id: String,
    /// Headline answer: `outcome == Authentic`.
    pub is_authentic: bool,
    /// The three-valued verdict.
    #[serde(skip)]
    pub outcome: VerificationOutcome,
    /// Algorithm the receipt claims.
    pub algorithm: String,
    /// When it was signed, if it was.
    pub signed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// The exact fields the signature covers, so a third party can
    /// re-derive the canonical payload themselves.
    pub fields: ReceiptFields,
    /// Verifications performed on this receipt so far, this one included.
    pub verified_count: u64,
    /// One sentence for the human asking.
    pub message: String,
}

impl ReceiptVerification {
    /// Collapse the report into a hard pass/fail, for callers (exit codes,
    /// batch jobs) that need an error on anything short of authentic.
    pub fn ensure_authentic(&self) -> DridResult<()> {
        match self.outcome {
            VerificationOutcome::Authentic => Ok(()),
            VerificationOutcome::TamperDetected => Err(DridError::TamperDetected),
            VerificationOutcome::NotSigned => Err(DridError::GuardFailed(format!(
                "receipt {} was issued unsigned",
                self.receipt_number
            ))),
        }
    }
}

impl DepositEngine {
    /// Re-verify a receipt's signature.
    ///
    /// `expected_checksum`, when supplied (a customer reading it off their
    /// printed copy), is compared against the stored payload hash first; a
    /// mismatch is tampering and the RSA check is not even attempted.
    pub fn verify_receipt(
        &self,
        receipt_number: &str,
        expected_checksum: Option<&str>,
    ) -> DridResult<ReceiptVerification> {
        let mut receipt = self
            .store
            .get_receipt(receipt_number)?
            .ok_or_else(|| DridError::NotFound(receipt_number.to_string()))?;

        let outcome = self.judge(&receipt, expected_checksum)?;

        // Bookkeeping is best-effort: a failed counter write must not turn
        // an authentic receipt into an error.
        receipt.verified_count += 1;
        receipt.last_verified_at = Some(self.clock.now());
        receipt.is_signature_valid = match outcome {
            VerificationOutcome::Authentic => Some(true),
            VerificationOutcome::TamperDetected => Some(false),
            VerificationOutcome::NotSigned => None,
        };
        if let Err(err) = self.store.put_receipt(&receipt) {
            warn!(%receipt_number, %err, "could not persist verification bookkeeping");
        }

        let message = match outcome {
            VerificationOutcome::Authentic => {
                "signature verifies against the stored fields".to_string()
            }
            VerificationOutcome::TamperDetected => {
                "signature does NOT match the stored fields; treat this receipt as altered"
                    .to_string()
            }
            VerificationOutcome::NotSigned => {
                "receipt was issued without a signature and cannot be authenticated".to_string()
            }
        };

        Ok(ReceiptVerification {
            receipt_number: receipt.receipt_number.clone(),
            record_id: receipt.record_id.clone(),
            is_authentic: outcome == VerificationOutcome::Authentic,
            outcome,
            algorithm: receipt.algorithm.clone(),
            signed_at: receipt.signed_at,
            fields: receipt.fields(),
            verified_count: receipt.verified_count,
            message,
        })
    }

    fn judge(
        &self,
        receipt: &Receipt,
        expected_checksum: Option<&str>,
    ) -> DridResult<VerificationOutcome> {
        // An unsigned receipt is NotSigned regardless of key availability;
        // no key material is needed to state that.
        if !receipt.is_signed() {
            return Ok(VerificationOutcome::NotSigned);
        }

        if let (Some(expected), Some(stored)) = (expected_checksum, &receipt.payload_hash_hex) {
            if !expected.eq_ignore_ascii_case(stored) {
                return Ok(VerificationOutcome::TamperDetected);
            }
        }

        // A signed receipt without its signing timestamp lost a field it
        // cannot verify without. That is tampering, not a soft failure.
        let signed_at = match receipt.signed_at {
            Some(ts) => ts,
            None => return Ok(VerificationOutcome::TamperDetected),
        };

        self.signer
            .verify(&receipt.fields(), receipt.signature_b64.as_deref(), signed_at)
            .map_err(|_| DridError::SignatureUnavailable)
    }

    /// The signing public key as PEM, for independent offline verification.
    pub fn export_public_key(&self) -> DridResult<String> {
        self.signer
            .public_key_pem()
            .map_err(|_| DridError::SignatureUnavailable)
    }

    /// Descriptor of the signing setup (algorithm, payload version, key id).
    pub fn signature_info(&self) -> SignatureInfo {
        self.signer.info()
    }

    /// Fetch a receipt by number.
    pub fn receipt(&self, receipt_number: &str) -> DridResult<Receipt> {
        self.store
            .get_receipt(receipt_number)?
            .ok_or_else(|| DridError::NotFound(receipt_number.to_string()))
    }

    /// Fetch the receipt evidencing a record.
    pub fn receipt_for_record(&self, record_id: &str) -> DridResult<Receipt> {
        self.store
            .receipt_for_record(record_id)?
            .ok_or_else(|| DridError::NotFound(record_id.to_string()))
    }

    /// Fetch a financial record by id.
    pub fn record(&self, record_id: &str) -> DridResult<crate::ledger::record::FinancialRecord> {
        self.store
            .get_record(record_id)?
            .ok_or_else(|| DridError::NotFound(record_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{AccountProfile, MemoryDirectory};
    use crate::ledger::completion::CompleteRequest;
    use crate::signing::engine::SignatureEngine;
    use crate::signing::keys::KeyRing;
    use crate::store::{DepositStore, SledDepositStore};
    use crate::token::issuer::IssueRequest;
    use crate::token::lifecycle::VerificationChecks;
    use crate::token::types::{Amount, Currency, TransactionKind};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn signing_engine() -> SignatureEngine {
        let dir = tempfile::tempdir().unwrap();
        let ring = KeyRing::load_or_generate(
            dir.path(),
            b"test-secret",
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        SignatureEngine::with_ring(ring)
    }

    fn engine_with_store() -> (Arc<SledDepositStore>, DepositEngine) {
        let store = Arc::new(SledDepositStore::temporary().unwrap());
        let directory = MemoryDirectory::new();
        directory.upsert(AccountProfile {
            account_ref: "A-001".to_string(),
            customer_ref: "C-001".to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_phone: None,
            branch_id: "BR-014".to_string(),
        });
        let engine = DepositEngine::new(
            store.clone(),
            signing_engine(),
            Arc::new(directory),
        )
        .with_clock(Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 0).unwrap(),
        )));
        (store, engine)
    }

    fn completed_receipt(engine: &DepositEngine) -> Receipt {
        let id = engine
            .issue(IssueRequest {
                account_ref: "A-001".to_string(),
                customer_ref: "C-001".to_string(),
                kind: TransactionKind::CashDeposit,
                amount: Amount::new(75_000, Currency::PKR),
                validity_minutes: Some(30),
                depositor: None,
                narration: None,
                extra: None,
            })
            .unwrap()
            .token
            .token_id;
        engine.retrieve(&id, "AGT-7").unwrap();
        engine
            .verify(
                &id,
                "AGT-7",
                VerificationChecks {
                    amount_confirmed: true,
                    depositor_identity_verified: true,
                    instrument_verified: None,
                },
            )
            .unwrap();
        engine
            .complete(CompleteRequest {
                token_id: id,
                agent_id: "AGT-7".to_string(),
                authorization_captured: true,
                auth_code: None,
            })
            .unwrap()
            .receipt
    }

    #[test]
    fn untouched_receipt_verifies_authentic_and_counts() {
        let (_, engine) = engine_with_store();
        let receipt = completed_receipt(&engine);
        assert!(receipt.is_signed());

        let first = engine
            .verify_receipt(&receipt.receipt_number, None)
            .unwrap();
        assert!(first.is_authentic);
        assert_eq!(first.verified_count, 1);
        first.ensure_authentic().unwrap();

        let second = engine
            .verify_receipt(&receipt.receipt_number, None)
            .unwrap();
        assert_eq!(second.verified_count, 2);

        let stored = engine.receipt(&receipt.receipt_number).unwrap();
        assert_eq!(stored.is_signature_valid, Some(true));
        assert!(stored.last_verified_at.is_some());
    }

    #[test]
    fn altered_stored_field_is_tamper() {
        let (store, engine) = engine_with_store();
        let mut receipt = completed_receipt(&engine);

        receipt.amount = Amount::new(receipt.amount.minor + 1, Currency::PKR);
        store.put_receipt(&receipt).unwrap();

        let report = engine
            .verify_receipt(&receipt.receipt_number, None)
            .unwrap();
        assert!(!report.is_authentic);
        assert_eq!(report.outcome, VerificationOutcome::TamperDetected);
        assert!(matches!(
            report.ensure_authentic(),
            Err(DridError::TamperDetected)
        ));
        assert_eq!(
            engine
                .receipt(&receipt.receipt_number)
                .unwrap()
                .is_signature_valid,
            Some(false)
        );
    }

    #[test]
    fn checksum_mismatch_short_circuits() {
        let (_, engine) = engine_with_store();
        let receipt = completed_receipt(&engine);
        let good = receipt.payload_hash_hex.clone().unwrap();

        let report = engine
            .verify_receipt(&receipt.receipt_number, Some("deadbeef"))
            .unwrap();
        assert_eq!(report.outcome, VerificationOutcome::TamperDetected);

        // The right checksum (any case) proceeds to a full verification.
        let report = engine
            .verify_receipt(&receipt.receipt_number, Some(&good.to_uppercase()))
            .unwrap();
        assert!(report.is_authentic);
    }

    #[test]
    fn receipt_lookup_by_record_and_key_export() {
        let (_, engine) = engine_with_store();
        let receipt = completed_receipt(&engine);

        let by_record = engine.receipt_for_record(&receipt.record_id).unwrap();
        assert_eq!(by_record.receipt_number, receipt.receipt_number);

        let pem = engine.export_public_key().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let info = engine.signature_info();
        assert!(info.available);
        assert_eq!(info.algorithm, "RSA-SHA256");
    }

    #[test]
    fn unknown_receipt_is_not_found() {
        let (_, engine) = engine_with_store();
        assert!(matches!(
            engine.verify_receipt("RCP-20260825-NOPE0000", None),
            Err(DridError::NotFound(_))
        ));
    }
}
