//! # Token Module — DRID Lifecycle
//!
//! Everything about the time-bound reference token: its vocabulary
//! ([`types`]), how it comes into existence ([`issuer`]), how its current
//! validity is judged ([`validator`]), and the guarded transitions that move
//! it through its life ([`lifecycle`]).
//!
//! The terminal transition — completion — lives in the `ledger` module,
//! because it is the one transition that creates something new (a financial
//! record and a signed receipt) rather than merely advancing the token.

pub mod issuer;
pub mod lifecycle;
pub mod types;
pub mod validator;

pub use issuer::{IssueRequest, IssuedToken};
pub use lifecycle::VerificationChecks;
pub use types::{Amount, Currency, DepositToken, DepositorIdentity, TokenStatus, TransactionKind};
pub use validator::TokenValidation;
