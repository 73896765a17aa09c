//! One-time authorization codes for completion.
//!
//! Before an agent can complete a token, the customer proves presence with
//! a short numeric code delivered out-of-band at issuance. Codes are
//! short-lived (five minutes), burn after three wrong attempts, and are
//! single-use — a successful check consumes the code.
//!
//! Storage goes through [`TtlStore`] so deployments can point this at a
//! shared cache; the in-memory implementation is enough for a single node.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{AUTH_CODE_LENGTH, AUTH_CODE_MAX_ATTEMPTS, AUTH_CODE_TTL_SECS};

/// Expiring key-value storage. Implementations own their notion of time;
/// a `get` after the TTL behaves exactly like a `get` of a missing key.
pub trait TtlStore: Send + Sync {
    /// Store `value` under `key` for `ttl_secs` seconds, replacing any
    /// previous value and its deadline.
    fn put(&self, key: &str, value: String, ttl_secs: i64);

    /// Fetch a live value.
    fn get(&self, key: &str) -> Option<String>;

    /// Drop a key, live or not.
    fn remove(&self, key: &str);
}

/// In-memory TTL store. Expiry is lazy: entries die on access, and
/// whatever never gets read again just sits there until process exit —
/// acceptable for codes measured in minutes.
pub struct MemoryTtlStore {
    entries: DashMap<String, (String, DateTime<Utc>)>,
    clock: Arc<dyn Clock>,
}

impl MemoryTtlStore {
    /// A store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }
}

impl TtlStore for MemoryTtlStore {
    fn put(&self, key: &str, value: String, ttl_secs: i64) {
        let deadline = self.clock.now() + Duration::seconds(ttl_secs);
        self.entries.insert(key.to_string(), (value, deadline));
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        // Read under the shard guard, then drop it before any removal —
        // DashMap does not tolerate re-entry on the same shard.
        let live = match self.entries.get(key) {
            Some(entry) => {
                let (value, deadline) = entry.value().clone();
                (deadline > now).then_some(value)
            }
            None => return None,
        };
        if live.is_none() {
            self.entries.remove(key);
        }
        live
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Result of checking an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCodeOutcome {
    /// Correct code. The code is consumed.
    Approved,
    /// Wrong code; tries remain.
    Mismatch {
        /// Attempts left before the code burns.
        attempts_left: u32,
    },
    /// No live code for this token — never issued, already consumed, or
    /// past its TTL.
    ExpiredOrMissing,
    /// Too many wrong attempts. The code is burned; a new one must be
    /// issued.
    Locked,
}

#[derive(Debug, Serialize, Deserialize)]
struct CodeState {
    code: String,
    attempts: u32,
}

/// Issues and checks one-time authorization codes.
pub struct AuthCodeService {
    store: Arc<dyn TtlStore>,
}

impl AuthCodeService {
    /// A service backed by `store`.
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh code for `token_id`, replacing any outstanding one.
    /// The code is returned for out-of-band delivery; it is never logged.
    pub fn issue(&self, token_id: &str) -> String {
        let code = generate_code();
        let state = CodeState {
            code: code.clone(),
            attempts: 0,
        };
        self.store.put(
            &storage_key(token_id),
            serde_json::to_string(&state).expect("code state always serializes"),
            AUTH_CODE_TTL_SECS,
        );
        info!(%token_id, "authorization code issued");
        code
    }

    /// Check `code` against the outstanding code for `token_id`.
    pub fn verify(&self, token_id: &str, code: &str) -> AuthCodeOutcome {
        let key = storage_key(token_id);
        let raw = match self.store.get(&key) {
            Some(raw) => raw,
            None => return AuthCodeOutcome::ExpiredOrMissing,
        };
        let mut state: CodeState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(%token_id, %err, "unreadable code state; burning it");
                self.store.remove(&key);
                return AuthCodeOutcome::ExpiredOrMissing;
            }
        };

        if constant_neq(&state.code, code) {
            state.attempts += 1;
            if state.attempts >= AUTH_CODE_MAX_ATTEMPTS {
                self.store.remove(&key);
                warn!(%token_id, "authorization code burned after repeated mismatches");
                return AuthCodeOutcome::Locked;
            }
            let attempts_left = AUTH_CODE_MAX_ATTEMPTS - state.attempts;
            self.store.put(
                &key,
                serde_json::to_string(&state).expect("code state always serializes"),
                AUTH_CODE_TTL_SECS,
            );
            return AuthCodeOutcome::Mismatch { attempts_left };
        }

        self.store.remove(&key);
        AuthCodeOutcome::Approved
    }
}

fn storage_key(token_id: &str) -> String {
    format!("auth/{}", token_id)
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let lower = 10u32.pow(AUTH_CODE_LENGTH as u32 - 1);
    let upper = 10u32.pow(AUTH_CODE_LENGTH as u32);
    rng.gen_range(lower..upper).to_string()
}

/// Byte-wise comparison that doesn't short-circuit on the first mismatch.
fn constant_neq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return true;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) != 0
}
