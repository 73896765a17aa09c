//! The deposit receipt: the customer-facing proof a completion happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::VERIFICATION_HASH_LENGTH;
use crate::signing::engine::SignedPayload;
use crate::signing::payload::{render_timestamp, ReceiptFields};
use crate::token::types::{Amount, TransactionKind};

/// A receipt for a posted financial record.
///
/// The business fields are a value snapshot taken at completion time, not a
/// join against the record: verification rebuilds the canonical payload
/// from what the receipt itself carries, so these fields are exactly what
/// the signature covers.
///
/// An unsigned receipt (key material unavailable at completion, policy
/// permitting) has all four signature fields `None` and stays that way —
/// receipts are never signed retroactively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt number, `RCP-YYYYMMDD-XXXXXXXX`.
    pub receipt_number: String,
    /// The financial record this receipt evidences.
    pub record_id: String,
    /// The token the record settled.
    pub token_id: String,
    /// Recorded amount.
    pub amount: Amount,
    /// Account holder name.
    pub customer_name: String,
    /// Target account reference.
    pub customer_account: String,
    /// Transaction kind.
    pub transaction_type: TransactionKind,
    /// When the record was posted.
    pub transaction_date: DateTime<Utc>,
    /// Executing branch.
    pub branch_id: String,
    /// Executing agent.
    pub teller_id: String,
    /// RSA signature, base64. `None` on unsigned receipts.
    pub signature_b64: Option<String>,
    /// SHA-256 of the canonical payload, lowercase hex.
    pub payload_hash_hex: Option<String>,
    /// The signing instant bound into the payload.
    pub signed_at: Option<DateTime<Utc>>,
    /// Which ring key signed this receipt.
    pub key_id: Option<String>,
    /// Algorithm identifier, e.g. `RSA-SHA256`. Present even on unsigned
    /// receipts so a reader knows what signature was expected.
    pub algorithm: String,
    /// Result of the most recent signature re-verification, if any.
    pub is_signature_valid: Option<bool>,
    /// How many times this receipt has been re-verified.
    pub verified_count: u64,
    /// When it was last re-verified.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// When the receipt was issued.
    pub created_at: DateTime<Utc>,
}

impl Receipt {
    /// Whether this receipt carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature_b64.is_some()
    }

    /// Rebuild the canonical field set the signature covers.
    pub fn fields(&self) -> ReceiptFields {
        ReceiptFields {
            receipt_number: self.receipt_number.clone(),
            transaction_reference: self.record_id.clone(),
            amount: self.amount.clone(),
            customer_name: self.customer_name.clone(),
            customer_account: self.customer_account.clone(),
            transaction_type: self.transaction_type,
            transaction_date: self.transaction_date,
            branch_id: self.branch_id.clone(),
            teller_id: self.teller_id.clone(),
        }
    }

    /// Attach a freshly produced signature. Used only at completion time.
    pub(crate) fn with_signature(mut self, signed: SignedPayload) -> Self {
        self.signature_b64 = Some(signed.signature_b64);
        self.payload_hash_hex = Some(signed.payload_hash_hex);
        self.signed_at = Some(signed.signed_at);
        self.key_id = Some(signed.key_id);
        self
    }

    /// Short verification hash printed on the receipt and embedded in its
    /// QR payload: truncated SHA-256 over the headline fields. This is a
    /// typo check for the human holding a printed copy, not the integrity
    /// check — that is the signature over the full canonical payload.
    pub fn verification_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}:{}:{}:{}:{}",
                self.receipt_number,
                self.record_id,
                self.amount.decimal_string(),
                self.customer_name,
                render_timestamp(self.transaction_date),
            )
            .as_bytes(),
        );
        let mut hash = hex::encode(hasher.finalize());
        hash.truncate(VERIFICATION_HASH_LENGTH);
        hash
    }

    /// Whether a hash read off a printed receipt matches this one.
    pub fn matches_verification_hash(&self, provided: &str) -> bool {
        self.verification_hash().eq_ignore_ascii_case(provided)
    }

    /// Where a scanner lands to verify this receipt. `base_url` is the
    /// deployment's public verification page.
    pub fn verification_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}?h={}",
            base_url.trim_end_matches('/'),
            self.receipt_number,
            self.verification_hash()
        )
    }

    /// The data a printed QR code carries.
    pub fn qr_payload(&self, base_url: &str) -> QrPayload {
        QrPayload {
            receipt_number: self.receipt_number.clone(),
            record_id: self.record_id.clone(),
            amount: self.amount.decimal_string(),
            currency: self.amount.currency.to_string(),
            customer_name: self.customer_name.clone(),
            transaction_date: self.transaction_date.format("%Y-%m-%d %H:%M").to_string(),
            verification_url: self.verification_url(base_url),
            verification_hash: self.verification_hash(),
        }
    }
}

/// What gets encoded into a receipt's QR code. Keys are abbreviated to
/// keep the code at a density cheap printers can render; rendering the
/// code image itself is the presentation layer's job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrPayload {
    /// Receipt number.
    #[serde(rename = "rn")]
    pub receipt_number: String,
    /// Financial record reference.
    #[serde(rename = "ref")]
    pub record_id: String,
    /// Amount as a decimal string.
    #[serde(rename = "amt")]
    pub amount: String,
    /// Currency code.
    #[serde(rename = "cur")]
    pub currency: String,
    /// Account holder name.
    #[serde(rename = "cn")]
    pub customer_name: String,
    /// Posting date, minute precision.
    #[serde(rename = "dt")]
    pub transaction_date: String,
    /// Where a scanner lands to verify.
    #[serde(rename = "url")]
    pub verification_url: String,
    /// Short verification hash, also in the URL.
    #[serde(rename = "h")]
    pub verification_hash: String,
}
