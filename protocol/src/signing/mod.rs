//! # Receipt Signing — RSA over a Canonical Payload
//!
//! Non-repudiation for completed deposits. A receipt's business fields are
//! serialized into a fixed canonical byte string ([`payload`]), hashed with
//! SHA-256 and signed with a 2048-bit RSA key under PKCS#1 v1.5 padding
//! ([`engine`]). The padding scheme is deterministic: the same payload under
//! the same key always yields the same signature bytes, which keeps the
//! audit trail greppable.
//!
//! Key material is generated once and sealed at rest ([`keys`]): the private
//! key never touches disk unencrypted, the public key is exportable as plain
//! PEM for independent offline verification.

pub mod engine;
pub mod keys;
pub mod payload;

pub use engine::{SignatureEngine, SignatureInfo, SignedPayload, VerificationOutcome};
pub use keys::{KeyRing, SigningKeypair};
pub use payload::ReceiptFields;
