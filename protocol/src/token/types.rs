//! Core type definitions for deposit tokens.
//!
//! These types form the vocabulary of every staged deposit. They are closed
//! sum types on purpose: a status outside the eight below, or a transaction
//! kind outside the five, is not a thing that can exist in this system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TokenStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a deposit token.
///
/// State only ever moves forward along the legal edges (see the lifecycle
/// module); the one sanctioned regression is PROCESSING → VERIFIED when a
/// completion fails partway. COMPLETED, EXPIRED, CANCELLED and REJECTED are
/// terminal — nothing transitions out of them, ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    /// Created by the customer, not yet seen by a branch agent.
    Initiated,
    /// A branch agent has pulled up the token at the counter.
    Retrieved,
    /// Amount, depositor identity (and instrument, where applicable)
    /// confirmed by the agent.
    Verified,
    /// A completion is in flight. Transient — either COMPLETED or back to
    /// VERIFIED.
    Processing,
    /// Terminal. The financial record exists and is linked.
    Completed,
    /// Terminal. The validity window closed before completion.
    Expired,
    /// Terminal. Withdrawn by the customer (or on their behalf).
    Cancelled,
    /// Terminal. Refused by a branch agent.
    Rejected,
}

impl TokenStatus {
    /// Returns `true` for the four states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Expired | Self::Cancelled | Self::Rejected
        )
    }

    /// Returns `true` for states that hold an account's active slot
    /// (the uniqueness invariant counts these as "in progress").
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Initiated | Self::Retrieved | Self::Verified)
    }

    /// Returns `true` when the token has been consumed (or is being
    /// consumed) by a completion.
    pub fn is_used(self) -> bool {
        matches!(self, Self::Processing | Self::Completed)
    }

    /// Returns `true` for the two "somebody said no" terminals.
    pub fn is_closed_out(self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "INITIATED",
            Self::Retrieved => "RETRIEVED",
            Self::Verified => "VERIFIED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// TransactionKind / RecordCategory
// ---------------------------------------------------------------------------

/// What the staged transaction actually is.
///
/// The kind determines which verification guards apply at the counter:
/// instrument-backed kinds (cheque, pay order) require the physical
/// instrument to be sighted and confirmed; cash does not carry that flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Cash over the counter.
    CashDeposit,
    /// Cheque deposit — instrument verification required.
    ChequeDeposit,
    /// Pay order — instrument verification required.
    PayOrder,
    /// Utility or merchant bill payment.
    BillPayment,
    /// Account-to-account transfer.
    FundTransfer,
}

impl TransactionKind {
    /// Whether this kind requires the `instrument_verified` guard to reach
    /// VERIFIED.
    pub fn requires_instrument(self) -> bool {
        matches!(self, Self::ChequeDeposit | Self::PayOrder)
    }

    /// The coarser category recorded on the financial record. This mapping
    /// is fixed; it is part of what gets signed.
    pub fn category(self) -> RecordCategory {
        match self {
            Self::CashDeposit | Self::ChequeDeposit => RecordCategory::Deposit,
            Self::PayOrder | Self::BillPayment => RecordCategory::Payment,
            Self::FundTransfer => RecordCategory::Transfer,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CashDeposit => "CASH_DEPOSIT",
            Self::ChequeDeposit => "CHEQUE_DEPOSIT",
            Self::PayOrder => "PAY_ORDER",
            Self::BillPayment => "BILL_PAYMENT",
            Self::FundTransfer => "FUND_TRANSFER",
        };
        write!(f, "{}", s)
    }
}

/// Coarse classification of a financial record, derived from
/// [`TransactionKind::category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordCategory {
    /// Money into an account.
    Deposit,
    /// Money out to a payee.
    Payment,
    /// Money between accounts.
    Transfer,
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deposit => "DEPOSIT",
            Self::Payment => "PAYMENT",
            Self::Transfer => "TRANSFER",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Currency / Amount
// ---------------------------------------------------------------------------

/// Supported currency denominations. All two-decimal fiat; a custom ticker
/// escape hatch exists for correspondent-banking oddities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Pakistani Rupee (smallest unit: paisa, 10^-2). The home currency.
    PKR,
    /// United States Dollar.
    USD,
    /// Euro.
    EUR,
    /// Pound Sterling.
    GBP,
    /// UAE Dirham.
    AED,
    /// Saudi Riyal.
    SAR,
    /// Anything else, by ticker. Assumed two decimals.
    Custom(String),
}

impl Currency {
    /// Number of decimal places for display formatting. The engine itself
    /// always operates on integer minor units.
    pub fn decimals(&self) -> u32 {
        2
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PKR => write!(f, "PKR"),
            Self::USD => write!(f, "USD"),
            Self::EUR => write!(f, "EUR"),
            Self::GBP => write!(f, "GBP"),
            Self::AED => write!(f, "AED"),
            Self::SAR => write!(f, "SAR"),
            Self::Custom(ticker) => write!(f, "{}", ticker),
        }
    }
}

/// A monetary amount in the smallest indivisible unit of its currency.
///
/// `minor` is always an integer — no floating point anywhere near money.
/// `Amount::new(5_000_000, Currency::PKR)` is 50,000.00 PKR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Value in minor units (paisa, cents, ...).
    pub minor: u64,
    /// The denomination.
    pub currency: Currency,
}

impl Amount {
    /// Creates a new amount.
    pub fn new(minor: u64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Returns `true` if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Checked addition. Currencies must match; overflow returns `None`.
    /// Used at every arithmetic boundary (fees, totals) — silent wraparound
    /// on a ledger is not an acceptable failure mode.
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        if self.currency != other.currency {
            return None;
        }
        Some(Amount {
            minor: self.minor.checked_add(other.minor)?,
            currency: self.currency.clone(),
        })
    }

    /// The decimal string without the currency suffix, e.g. `"50000.00"`.
    ///
    /// This exact rendering is part of the canonical signing payload, so it
    /// must stay stable: whole part, one dot, zero-padded fraction.
    pub fn decimal_string(&self) -> String {
        let divisor = 10u64.pow(self.currency.decimals());
        let whole = self.minor / divisor;
        let frac = self.minor % divisor;
        format!(
            "{}.{:0>width$}",
            whole,
            frac,
            width = self.currency.decimals() as usize
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.decimal_string(), self.currency)
    }
}

// ---------------------------------------------------------------------------
// DepositorIdentity
// ---------------------------------------------------------------------------

/// Who is physically handing over the money. Not necessarily the account
/// holder — the relationship field says how they're connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositorIdentity {
    /// Full name as presented at the counter.
    pub name: String,
    /// National identity number (CNIC or equivalent).
    pub id_number: String,
    /// Contact phone, if provided.
    pub phone: Option<String>,
    /// Relationship to the account holder ("SELF", "SPOUSE", ...).
    pub relationship: String,
}

impl DepositorIdentity {
    /// A depositor who is the account holder themselves.
    pub fn account_holder(name: impl Into<String>, id_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_number: id_number.into(),
            phone: None,
            relationship: "SELF".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition stamps
// ---------------------------------------------------------------------------

/// Who performed a transition, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStamp {
    /// Actor identifier (agent id, or "CUSTOMER").
    pub actor: String,
    /// When the transition was recorded.
    pub at: DateTime<Utc>,
}

impl TransitionStamp {
    /// Stamp a transition.
    pub fn new(actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            at,
        }
    }
}

/// Stamp for the cancel/reject terminals, which additionally carry a reason
/// for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureStamp {
    /// Actor identifier, if one was supplied (customer cancellations may
    /// be anonymous).
    pub actor: Option<String>,
    /// When the token was closed out.
    pub at: DateTime<Utc>,
    /// Why.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// DepositToken
// ---------------------------------------------------------------------------

/// The DRID record: a pre-staged deposit waiting (briefly) for a branch
/// agent to act on it.
///
/// `created_at`, `expires_at` and `validity_minutes` are fixed at issuance
/// and never change. Transitions produce a new value with the relevant
/// stamp filled in; nothing mutates a token that readers can already see —
/// the store's compare-and-swap decides which version wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositToken {
    /// Globally unique, human-presentable reference: `DRID-YYYYMMDD-XXXXXX`.
    /// Never reused, even after expiry or cancellation.
    pub token_id: String,
    /// Current lifecycle state.
    pub status: TokenStatus,
    /// Issuance instant.
    pub created_at: DateTime<Utc>,
    /// Hard deadline. Fixed at creation; never extended.
    pub expires_at: DateTime<Utc>,
    /// The validity window that produced `expires_at`, for display.
    pub validity_minutes: i64,
    /// What kind of transaction this stages.
    pub kind: TransactionKind,
    /// The staged amount.
    pub amount: Amount,
    /// Target account reference.
    pub account_ref: String,
    /// Target customer reference.
    pub customer_ref: String,
    /// Account holder's name, resolved from the directory at issuance.
    pub customer_name: String,
    /// Branch that owns the target account.
    pub branch_id: String,
    /// Who will hand over the money.
    pub depositor: DepositorIdentity,
    /// Free-text memo.
    pub narration: Option<String>,
    /// Type-specific payload (cheque fields, bill consumer number, ...).
    /// Opaque to the lifecycle engine; carried through to the record.
    pub extra: Option<serde_json::Value>,
    /// Stamped when a branch agent first pulls the token up.
    pub retrieved: Option<TransitionStamp>,
    /// Stamped when verification passes.
    pub verified: Option<TransitionStamp>,
    /// Stamped when completion commits.
    pub completed: Option<TransitionStamp>,
    /// Stamped when the token is cancelled or rejected.
    pub closed: Option<ClosureStamp>,
    /// Set exactly once, by completion. Non-null iff status = COMPLETED.
    pub linked_financial_record_id: Option<String>,
    /// How many times `validate` has been called on this token.
    pub validation_attempts: u64,
    /// When `validate` last ran.
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl DepositToken {
    /// Whether the validity window has closed as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds left before expiry, clamped at zero.
    pub fn time_remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// The remaining validity as a `Duration`, clamped at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        Duration::seconds(self.time_remaining_secs(now))
    }
}
