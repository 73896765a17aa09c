// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # DRID Protocol — Core Library
//!
//! The engine behind digital reference deposits: a customer stages a branch
//! transaction from their phone, walks in with a short-lived DRID token, and
//! walks out with a cryptographically signed receipt that nobody — customer,
//! teller, or bank — can later repudiate.
//!
//! Two subsystems carry all the weight here:
//!
//! 1. The **token lifecycle engine** — issue → retrieve → verify →
//!    complete/cancel/expire/reject, with strict guards and exactly-once
//!    completion under concurrent tellers.
//! 2. The **signing subsystem** — RSA-2048 over a frozen canonical payload,
//!    so a third party can re-derive the exact bytes and verify a receipt
//!    without ever calling back into the bank.
//!
//! ## Architecture
//!
//! - **token** — DRID issuance, validation, and the guarded state machine.
//! - **ledger** — financial records, signed receipts, completion, public
//!   verification, and notification dispatch.
//! - **signing** — key material lifecycle, canonical payloads, sign/verify.
//! - **store** — the persistence seam and its sled implementation.
//! - **directory** — account/customer resolution (consumed, read-only).
//! - **authcode** — one-time authorization codes over a TTL key-value seam.
//! - **engine** — the context object that wires all of the above together.
//! - **config** — every protocol constant, in one place.
//!
//! ## Design Philosophy
//!
//! 1. State moves forward or not at all. The single sanctioned regression
//!    (PROCESSING back to VERIFIED on a failed completion) is explicit.
//! 2. Typed errors cross the boundary; panics do not.
//! 3. Money is integers. Floats near a ledger are a firing offense.
//! 4. If it signs something, it has tests. Plural.

pub mod authcode;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod signing;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{AccountDirectory, AccountProfile, MemoryDirectory};
pub use engine::{DepositEngine, UnsignedReceiptPolicy};
pub use error::{DridError, DridResult};
pub use ledger::completion::{CompleteRequest, CompletionOutcome};
pub use ledger::receipt::Receipt;
pub use ledger::record::FinancialRecord;
pub use ledger::verification::ReceiptVerification;
pub use signing::engine::{SignatureEngine, SignatureInfo, VerificationOutcome};
pub use signing::keys::KeyRing;
pub use store::{DepositStore, SledDepositStore};
pub use token::issuer::{IssueRequest, IssuedToken};
pub use token::lifecycle::VerificationChecks;
pub use token::types::{Amount, Currency, DepositToken, TokenStatus, TransactionKind};
pub use token::validator::TokenValidation;
