//! Canonical signing payload.
//!
//! The payload is a single UTF-8 line of `label:value` pairs joined by `|`,
//! in a fixed order, with the signing timestamp always last. The format is
//! frozen at version 1: field order, labels, the delimiter, the amount
//! rendering and the timestamp rendering are all part of the signature.
//! Reorder one field and every receipt ever issued stops verifying.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::PAYLOAD_DELIMITER;
use crate::token::types::{Amount, TransactionKind};

/// The business fields that get signed onto a receipt.
///
/// This is a value snapshot, not a reference into the record: verification
/// rebuilds the payload from the receipt as stored, so whatever is signed
/// must be exactly what the receipt carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptFields {
    /// Receipt number, `RCP-YYYYMMDD-XXXXXXXX`.
    pub receipt_number: String,
    /// Financial record reference, `TXN-YYYYMMDD-XXXXXXXX`.
    pub transaction_reference: String,
    /// The recorded amount. Rendered as its decimal string.
    pub amount: Amount,
    /// Account holder name.
    pub customer_name: String,
    /// Target account reference.
    pub customer_account: String,
    /// Transaction kind, rendered in its canonical SCREAMING form.
    pub transaction_type: TransactionKind,
    /// When the financial record was created.
    pub transaction_date: DateTime<Utc>,
    /// Branch that executed the completion.
    pub branch_id: String,
    /// Agent that executed the completion.
    pub teller_id: String,
}

impl ReceiptFields {
    /// Render the canonical payload bytes for signing or verification.
    ///
    /// `signed_at` is the signing timestamp and goes last. It is supplied by
    /// the signer at signing time and read back off the receipt at
    /// verification time — never regenerated.
    pub fn canonical_payload(&self, signed_at: DateTime<Utc>) -> String {
        let d = PAYLOAD_DELIMITER;
        format!(
            "receipt_number:{rcp}{d}transaction_reference:{txn}{d}amount:{amt}{d}\
             currency:{cur}{d}customer_name:{name}{d}customer_account:{acct}{d}\
             transaction_type:{kind}{d}transaction_date:{date}{d}branch_id:{br}{d}\
             teller_id:{tlr}{d}signing_timestamp:{ts}",
            rcp = self.receipt_number,
            txn = self.transaction_reference,
            amt = self.amount.decimal_string(),
            cur = self.amount.currency,
            name = self.customer_name,
            acct = self.customer_account,
            kind = self.transaction_type,
            date = render_timestamp(self.transaction_date),
            br = self.branch_id,
            tlr = self.teller_id,
            ts = render_timestamp(signed_at),
        )
    }

    /// SHA-256 of the canonical payload, lowercase hex. Stored on the
    /// receipt as a fast first-pass integrity check.
    pub fn payload_hash(&self, signed_at: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_payload(signed_at).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Canonical timestamp rendering: RFC 3339, microsecond precision, `Z`
/// suffix. Frozen alongside the rest of the format.
pub fn render_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::types::Currency;
    use chrono::TimeZone;

    fn sample_fields() -> ReceiptFields {
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
    fn payload_field_order_is_frozen() {
        let signed_at = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let payload = sample_fields().canonical_payload(signed_at);
        assert_eq!(
            payload,
            "receipt_number:RCP-20260825-1A2B3C4D|\
             transaction_reference:TXN-20260825-9F8E7D6C|\
             amount:50000.00|\
             currency:PKR|\
             customer_name:Ayesha Khan|\
             customer_account:PK36SCBL0000001123456702|\
             transaction_type:CASH_DEPOSIT|\
             transaction_date:2026-08-25T10:30:00.000000Z|\
             branch_id:BR-014|\
             teller_id:AGT-7|\
             signing_timestamp:2026-08-25T10:30:05.000000Z"
        );
    }

    #[test]
    fn signing_timestamp_is_bound_into_the_payload() {
        let fields = sample_fields();
        let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let t2 = t1 + chrono::Duration::microseconds(1);
        assert_ne!(fields.canonical_payload(t1), fields.canonical_payload(t2));
        assert_ne!(fields.payload_hash(t1), fields.payload_hash(t2));
    }

    #[test]
    fn payload_hash_is_lowercase_hex_sha256() {
        let signed_at = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        let hash = sample_fields().payload_hash(signed_at);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn amount_rendering_uses_minor_units_faithfully() {
        let mut fields = sample_fields();
        fields.amount = Amount::new(7, Currency::PKR);
        let signed_at = Utc.with_ymd_and_hms(2026, 8, 25, 10, 30, 5).unwrap();
        assert!(fields
            .canonical_payload(signed_at)
            .contains("amount:0.07|currency:PKR"));
    }
}
