//! The signature engine: sign canonical payloads, verify them later.
//!
//! PKCS#1 v1.5 over SHA-256. The padding is deterministic, so the same
//! payload under the same key always produces the same base64 signature.
//! Verification is three-valued ([`VerificationOutcome`]): unsigned is not
//! the same thing as tampered, and neither is an engine failure.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::config::{PAYLOAD_VERSION, SIGNING_ALGORITHM_DESCRIPTOR, SIGNING_ALGORITHM_ID};
use crate::signing::keys::KeyRing;
use crate::signing::payload::ReceiptFields;

/// The engine has no key ring, so it can neither sign nor verify. Whether
/// this is fatal is the caller's policy decision, not ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("signature engine has no key material")]
pub struct SignerUnavailable;

/// What [`SignatureEngine::sign`] hands back: everything the receipt needs
/// to store for later re-verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// The RSA signature, base64 (standard alphabet, padded).
    pub signature_b64: String,
    /// SHA-256 of the canonical payload, lowercase hex.
    pub payload_hash_hex: String,
    /// The signing instant bound into the payload.
    pub signed_at: DateTime<Utc>,
    /// Which ring key produced the signature.
    pub key_id: String,
}

/// Result of re-verifying a receipt's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The receipt carries no signature at all.
    NotSigned,
    /// The signature matches the canonical payload rebuilt from the
    /// receipt's stored fields.
    Authentic,
    /// A signature is present but does not match. Either the fields changed
    /// after signing or the signature itself was altered.
    TamperDetected,
}

/// Descriptor of the signing setup, for the key-export surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignatureInfo {
    /// Short algorithm identifier, e.g. `RSA-SHA256`.
    pub algorithm: String,
    /// Human-facing description of key size, hash, and padding.
    pub descriptor: String,
    /// Canonical payload format version.
    pub payload_version: u16,
    /// Active key id, if the engine has keys.
    pub key_id: Option<String>,
    /// Whether signing is currently possible.
    pub available: bool,
}

/// Signs and verifies receipt payloads against a [`KeyRing`].
///
/// Constructed without a ring, the engine degrades instead of panicking:
/// every operation reports [`SignerUnavailable`] and the completion path
/// decides what that means.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    ring: Option<KeyRing>,
}

impl SignatureEngine {
    /// An engine backed by key material.
    pub fn with_ring(ring: KeyRing) -> Self {
        Self { ring: Some(ring) }
    }

    /// An engine with no keys. Signing and verification both report
    /// [`SignerUnavailable`].
    pub fn unavailable() -> Self {
        Self { ring: None }
    }

    /// Whether the engine can sign right now.
    pub fn is_available(&self) -> bool {
        self.ring.is_some()
    }

    /// Sign `fields` as of `now` with the active key.
    pub fn sign(
        &self,
        fields: &ReceiptFields,
        now: DateTime<Utc>,
    ) -> Result<SignedPayload, SignerUnavailable> {
        let ring = self.ring.as_ref().ok_or(SignerUnavailable)?;
        let entry = ring.active();

        let payload = fields.canonical_payload(now);
        let signing_key = SigningKey::<Sha256>::new(entry.keypair.private_key().clone());
        let signature = match signing_key.try_sign(payload.as_bytes()) {
            Ok(sig) => sig,
            Err(err) => {
                // try_sign on PKCS#1 v1.5 only fails if the key is smaller
                // than the padded digest, which a 2048-bit key never is.
                warn!(%err, "RSA signing failed");
                return Err(SignerUnavailable);
            }
        };

        Ok(SignedPayload {
            signature_b64: BASE64.encode(signature.to_bytes()),
            payload_hash_hex: fields.payload_hash(now),
            signed_at: now,
            key_id: entry.key_id.clone(),
        })
    }

    /// Re-verify a stored signature against the canonical payload rebuilt
    /// from `fields` and the stored `signed_at`.
    ///
    /// A missing signature is [`VerificationOutcome::NotSigned`]; anything
    /// present that fails to parse or fails RSA verification is
    /// [`VerificationOutcome::TamperDetected`].
    pub fn verify(
        &self,
        fields: &ReceiptFields,
        signature_b64: Option<&str>,
        signed_at: DateTime<Utc>,
    ) -> Result<VerificationOutcome, SignerUnavailable> {
        let ring = self.ring.as_ref().ok_or(SignerUnavailable)?;

        let signature_b64 = match signature_b64 {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(VerificationOutcome::NotSigned),
        };

        let sig_bytes = match BASE64.decode(signature_b64) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(VerificationOutcome::TamperDetected),
        };
        let signature = match Signature::try_from(sig_bytes.as_slice()) {
            Ok(sig) => sig,
            Err(_) => return Ok(VerificationOutcome::TamperDetected),
        };

        let entry = ring.key_for(signed_at);
        let verifying_key = VerifyingKey::<Sha256>::new(entry.keypair.public_key().clone());
        let payload = fields.canonical_payload(signed_at);

        Ok(match verifying_key.verify(payload.as_bytes(), &signature) {
            Ok(()) => VerificationOutcome::Authentic,
            Err(_) => VerificationOutcome::TamperDetected,
        })
    }

    /// The active public key as SPKI PEM.
    pub fn public_key_pem(&self) -> Result<String, SignerUnavailable> {
        let ring = self.ring.as_ref().ok_or(SignerUnavailable)?;
        ring.active()
            .keypair
            .public_key_pem()
            .map_err(|_| SignerUnavailable)
    }

    /// Descriptor of the signing setup.
    pub fn info(&self) -> SignatureInfo {
        SignatureInfo {
            algorithm: SIGNING_ALGORITHM_ID.to_string(),
            descriptor: SIGNING_ALGORITHM_DESCRIPTOR.to_string(),
            payload_version: PAYLOAD_VERSION,
            key_id: self.ring.as_ref().map(|r| r.active().key_id.clone()),
            available: self.is_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::types::{Amount, Currency, TransactionKind};
    use chrono::TimeZone;
    use std::sync::OnceLock;

    // RSA keygen is the slow part; one ring serves every test here.
    fn engine() -> &'static SignatureEngine {
        static ENGINE: OnceLock<SignatureEngine> = OnceLock::new();
        ENGINE.get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            let ring = KeyRing::load_or_generate(
                dir.path(),
                b"test-secret",
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            )
            .unwrap();
            SignatureEngine::with_ring(ring)
        })
    }

    fn fields() -> ReceiptFields {
        ReceiptFields {
            receipt_number: "RCP-20260825-1A2B3C4D".to_string(),
            transaction_reference: "TXN-20260825-9F8E7D6C".to_string(),
            amount: Amount::new(5_000_000, Currency::PKR),
            customer_name: "Ayesha Khan".to_string(),
            customer_account: "PK36SCBL0000001123456702".to_string(),
            transaction_type: TransactionKind::CashDeposit,
            transaction_date: Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 0).unwrap(),
            branch_id: "BR-014".to_string(),
            teller_id: "AGT-7".to_string(),
        }
    }

    #[test]
    fn sign_then_verify_is_authentic() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let signed = engine().sign(&fields(), now).unwrap();
        assert_eq!(signed.payload_hash_hex.len(), 64);

        let outcome = engine()
            .verify(&fields(), Some(&signed.signature_b64), signed.signed_at)
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::Authentic);
    }

    #[test]
    fn altering_any_field_is_tamper() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let signed = engine().sign(&fields(), now).unwrap();

        let mut tampered = fields();
        tampered.amount = Amount::new(5_000_001, Currency::PKR);
        assert_eq!(
            engine()
                .verify(&tampered, Some(&signed.signature_b64), signed.signed_at)
                .unwrap(),
            VerificationOutcome::TamperDetected
        );
    }

    #[test]
    fn altering_the_signed_at_is_tamper() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let signed = engine().sign(&fields(), now).unwrap();
        assert_eq!(
            engine()
                .verify(
                    &fields(),
                    Some(&signed.signature_b64),
                    signed.signed_at + chrono::Duration::seconds(1),
                )
                .unwrap(),
            VerificationOutcome::TamperDetected
        );
    }

    #[test]
    fn missing_signature_is_not_signed_not_tampered() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        assert_eq!(
            engine().verify(&fields(), None, now).unwrap(),
            VerificationOutcome::NotSigned
        );
        assert_eq!(
            engine().verify(&fields(), Some(""), now).unwrap(),
            VerificationOutcome::NotSigned
        );
    }

    #[test]
    fn garbage_signature_is_tamper() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        assert_eq!(
            engine()
                .verify(&fields(), Some("not!!base64"), now)
                .unwrap(),
            VerificationOutcome::TamperDetected
        );
        assert_eq!(
            engine().verify(&fields(), Some("QUJD"), now).unwrap(),
            VerificationOutcome::TamperDetected
        );
    }

    #[test]
    fn signatures_are_deterministic() {
        // PKCS#1 v1.5 padding has no randomness: same payload, same key,
        // same bytes out.
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let a = engine().sign(&fields(), now).unwrap();
        let b = engine().sign(&fields(), now).unwrap();
        assert_eq!(a.signature_b64, b.signature_b64);
        assert_eq!(a.payload_hash_hex, b.payload_hash_hex);
    }

    #[test]
    fn unavailable_engine_degrades_cleanly() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let engine = SignatureEngine::unavailable();
        assert!(!engine.is_available());
        assert_eq!(engine.sign(&fields(), now), Err(SignerUnavailable));
        assert_eq!(engine.verify(&fields(), Some("x"), now), Err(SignerUnavailable));
        assert!(engine.public_key_pem().is_err());

        let info = engine.info();
        assert!(!info.available);
        assert!(info.key_id.is_none());
    }
}
