//! The financial record: the posting a completed token turns into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DridError, DridResult};
use crate::token::types::{
    Amount, DepositToken, DepositorIdentity, RecordCategory, TransactionKind,
};

/// A posted financial record. Created exactly once, by completion, inside
/// the same storage transaction that marks its token COMPLETED. Immutable
/// after that — corrections are new records, not edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    /// Record reference, `TXN-YYYYMMDD-XXXXXXXX`.
    pub record_id: String,
    /// The token this record settles.
    pub token_id: String,
    /// Coarse category, derived from the kind at completion time.
    pub category: RecordCategory,
    /// The staged transaction kind.
    pub kind: TransactionKind,
    /// Principal amount.
    pub amount: Amount,
    /// Fee charged, if any. Same currency as the principal.
    pub fee: Amount,
    /// Tax withheld, if any. Same currency as the principal.
    pub tax: Amount,
    /// amount + fee + tax, checked at construction.
    pub total: Amount,
    /// Target account reference.
    pub account_ref: String,
    /// Target customer reference.
    pub customer_ref: String,
    /// Account holder name.
    pub customer_name: String,
    /// Branch that executed the completion.
    pub branch_id: String,
    /// Agent that executed the completion.
    pub teller_id: String,
    /// Who handed over the money.
    pub depositor: DepositorIdentity,
    /// Free-text memo carried over from the token.
    pub narration: Option<String>,
    /// Type-specific payload carried over from the token.
    pub extra: Option<serde_json::Value>,
    /// When the record was posted.
    pub created_at: DateTime<Utc>,
}

impl FinancialRecord {
    /// Build the record a completion will post for `token`.
    ///
    /// Fees and taxes default to zero in the token's currency; the total is
    /// computed with checked arithmetic and refuses to overflow.
    pub fn from_token(
        token: &DepositToken,
        record_id: String,
        teller_id: &str,
        now: DateTime<Utc>,
    ) -> DridResult<Self> {
        let fee = Amount::new(0, token.amount.currency.clone());
        let tax = Amount::new(0, token.amount.currency.clone());
        let total = token
            .amount
            .checked_add(&fee)
            .and_then(|t| t.checked_add(&tax))
            .ok_or_else(|| {
                DridError::InvalidRequest("amount total overflows minor units".to_string())
            })?;

        Ok(Self {
            record_id,
            token_id: token.token_id.clone(),
            category: token.kind.category(),
            kind: token.kind,
            amount: token.amount.clone(),
            fee,
            tax,
            total,
            account_ref: token.account_ref.clone(),
            customer_ref: token.customer_ref.clone(),
            customer_name: token.customer_name.clone(),
            branch_id: token.branch_id.clone(),
            teller_id: teller_id.to_string(),
            depositor: token.depositor.clone(),
            narration: token.narration.clone(),
            extra: token.extra.clone(),
            created_at: now,
        })
    }
}
