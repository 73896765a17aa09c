//! # Protocol Configuration & Constants
//!
//! Every magic number in the DRID protocol lives here. If you're hardcoding
//! a constant somewhere else, you're doing it wrong and you owe the team
//! coffee.
//!
//! Several of these values are load-bearing for verifiability: the canonical
//! payload delimiter and the signing algorithm identifiers must never change
//! for a given algorithm version, or previously issued receipts stop
//! re-verifying. Treat them as frozen.

// ---------------------------------------------------------------------------
// Reference Formats
// ---------------------------------------------------------------------------

/// Prefix for deposit token references: `DRID-YYYYMMDD-XXXXXX`.
pub const TOKEN_PREFIX: &str = "DRID";

/// Length of the random suffix in a token reference. Six characters of a
/// UUID gives us ~16.7M combinations per day — collisions are handled by
/// regeneration, not prayer.
pub const TOKEN_SUFFIX_LENGTH: usize = 6;

/// Prefix for financial record references: `TXN-YYYYMMDD-XXXXXXXX`.
pub const RECORD_PREFIX: &str = "TXN";

/// Length of the random suffix in a record reference.
pub const RECORD_SUFFIX_LENGTH: usize = 8;

/// Prefix for receipt numbers: `RCP-YYYYMMDD-XXXXXXXX`.
pub const RECEIPT_PREFIX: &str = "RCP";

/// Length of the random suffix in a receipt number.
pub const RECEIPT_SUFFIX_LENGTH: usize = 8;

/// How many times the issuer will regenerate a candidate reference after a
/// collision before giving up. If we ever exhaust this, the RNG is broken
/// and refusing the request is the least of anyone's problems.
pub const MAX_REFERENCE_RETRIES: usize = 16;

// ---------------------------------------------------------------------------
// Token Validity
// ---------------------------------------------------------------------------

/// Default token validity when the request doesn't specify one. An hour is
/// long enough to travel to a branch, short enough to bound exposure.
pub const DEFAULT_VALIDITY_MINUTES: i64 = 60;

/// Lower bound on requested validity.
pub const MIN_VALIDITY_MINUTES: i64 = 5;

/// Upper bound on requested validity. Validity is fixed at creation and is
/// never extended, so a full day is the most we'll ever promise.
pub const MAX_VALIDITY_MINUTES: i64 = 1_440;

// ---------------------------------------------------------------------------
// Amount Limits
// ---------------------------------------------------------------------------

/// Hard ceiling on a single staged transaction, in minor units (paisa).
/// 500,000.00 PKR — the per-transaction limit branch policy allows without
/// escalation. Anything above this is refused at issuance, not at the
/// counter.
pub const AMOUNT_CEILING_MINOR: u64 = 50_000_000;

// ---------------------------------------------------------------------------
// Signing Parameters
// ---------------------------------------------------------------------------

/// RSA modulus size in bits. 2048 is the compliance floor for financial
/// records and comfortably sufficient for receipt lifetimes measured in
/// years, not decades.
pub const RSA_KEY_BITS: usize = 2048;

/// Short algorithm identifier stored on every receipt.
pub const SIGNING_ALGORITHM_ID: &str = "RSA-SHA256";

/// Human-facing algorithm descriptor for the key-export interface.
pub const SIGNING_ALGORITHM_DESCRIPTOR: &str = "RSA-2048 with SHA-256 (PKCS#1 v1.5)";

/// Canonical payload field delimiter. Frozen — changing this invalidates
/// every signature ever produced under this algorithm version.
pub const PAYLOAD_DELIMITER: char = '|';

/// Canonical payload format version. Bump only together with a new
/// algorithm identifier.
pub const PAYLOAD_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Key Storage
// ---------------------------------------------------------------------------

/// AES-256-GCM key length used to seal the private key at rest.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length. 96 bits is the standard and the only length
/// you should use. 12 bytes. Not 16. Not 8. Twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// File name of the exportable public key (plain PEM).
pub const PUBLIC_KEY_FILE: &str = "receipt_signing_public.pem";

/// File name of the key ring metadata (key id, activation timestamp).
pub const KEY_META_FILE: &str = "receipt_signing_key.json";

// ---------------------------------------------------------------------------
// Receipt Verification
// ---------------------------------------------------------------------------

/// Hex characters kept from the SHA-256 verification hash printed on
/// receipts and embedded in their QR payloads. Short enough to type off a
/// printed copy; the full payload hash backs the real integrity check.
pub const VERIFICATION_HASH_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Authorization Codes
// ---------------------------------------------------------------------------

/// Number of digits in a one-time authorization code.
pub const AUTH_CODE_LENGTH: usize = 5;

/// Authorization code time-to-live in seconds. Five minutes — the customer
/// is standing at the counter; if they can't produce the code by then,
/// something else is wrong.
pub const AUTH_CODE_TTL_SECS: i64 = 300;

/// Maximum verification attempts before a code is burned.
pub const AUTH_CODE_MAX_ATTEMPTS: u32 = 3;
