//! Signing key material: generation, sealing at rest, and the key ring.
//!
//! The private key exists in exactly two forms: in memory inside a
//! [`SigningKeypair`], and on disk as a sealed blob (AES-256-GCM over the
//! PKCS#8 DER, keyed by the SHA-256 of a deployment secret). There is no
//! code path that writes the private key to disk in the clear.
//!
//! Sealed blob layout: `nonce (12 bytes) || ciphertext`. The GCM tag rides
//! inside the ciphertext.
//!
//! Rotation is append-only: a new key joins the ring with its activation
//! timestamp, old keys stay forever so old receipts keep verifying. The
//! signer always uses the newest key; verification picks the key that was
//! active at the receipt's signing timestamp.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{AES_NONCE_LENGTH, KEY_META_FILE, PUBLIC_KEY_FILE, RSA_KEY_BITS};

/// Errors from key generation, sealing, and ring loading.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Filesystem trouble in the key directory.
    #[error("key storage I/O: {0}")]
    Io(#[from] std::io::Error),

    /// RSA generation or encoding failed.
    #[error("RSA key handling: {0}")]
    Rsa(String),

    /// The sealed blob would not decrypt — wrong secret, or the blob is
    /// corrupt or truncated.
    #[error("sealed private key would not open (wrong secret or corrupt blob)")]
    SealBroken,

    /// The ring metadata file is unreadable.
    #[error("key ring metadata: {0}")]
    Meta(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// SigningKeypair
// ---------------------------------------------------------------------------

/// An RSA keypair held in memory.
#[derive(Clone)]
pub struct SigningKeypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl SigningKeypair {
    /// Generate a fresh 2048-bit keypair. This takes a noticeable fraction
    /// of a second; it happens once per key lifetime, at init.
    pub fn generate() -> Result<Self, KeyError> {
        let private =
            RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| KeyError::Rsa(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The private half. Crate-internal; only the signature engine touches it.
    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Public key as SPKI PEM, suitable for handing to auditors.
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Rsa(e.to_string()))
    }

    /// Seal the private key under `secret`: PKCS#8 DER encrypted with
    /// AES-256-GCM, fresh random nonce prepended.
    pub fn seal(&self, secret: &[u8]) -> Result<Vec<u8>, KeyError> {
        let der = self
            .private
            .to_pkcs8_der()
            .map_err(|e| KeyError::Rsa(e.to_string()))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest_secret(secret)));
        let mut nonce = [0u8; AES_NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), der.as_bytes())
            .map_err(|_| KeyError::SealBroken)?;

        let mut sealed = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed blob produced by [`Self::seal`].
    pub fn unseal(sealed: &[u8], secret: &[u8]) -> Result<Self, KeyError> {
        if sealed.len() <= AES_NONCE_LENGTH {
            return Err(KeyError::SealBroken);
        }
        let (nonce, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest_secret(secret)));
        let der = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KeyError::SealBroken)?;

        let private =
            RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| KeyError::Rsa(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }
}

/// The sealing key is the SHA-256 of the deployment secret, so operators can
/// hand us a passphrase of any length.
fn digest_secret(secret: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret));
    out
}

// Never let the private key leak through a debug log.
impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("private", &"<sealed>")
            .field("bits", &RSA_KEY_BITS)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KeyRing
// ---------------------------------------------------------------------------

/// On-disk metadata for one ring entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntryMeta {
    key_id: String,
    activated_at: DateTime<Utc>,
    sealed_file: String,
}

/// One loaded ring entry.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    /// Opaque key identifier, stamped onto receipts.
    pub key_id: String,
    /// When this key became the signing key.
    pub activated_at: DateTime<Utc>,
    /// The keypair itself.
    pub keypair: SigningKeypair,
}

/// The full set of signing keys, newest last.
#[derive(Debug, Clone)]
pub struct KeyRing {
    dir: PathBuf,
    entries: Vec<KeyEntry>,
}

impl KeyRing {
    /// Load the ring from `dir`, generating an initial key if the directory
    /// holds none. `secret` seals and opens every private key in the ring.
    pub fn load_or_generate(
        dir: impl AsRef<Path>,
        secret: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let meta_path = dir.join(KEY_META_FILE);
        if meta_path.exists() {
            let metas: Vec<KeyEntryMeta> = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let mut entries = Vec::with_capacity(metas.len());
            for meta in metas {
                let sealed = fs::read(dir.join(&meta.sealed_file))?;
                entries.push(KeyEntry {
                    key_id: meta.key_id,
                    activated_at: meta.activated_at,
                    keypair: SigningKeypair::unseal(&sealed, secret)?,
                });
            }
            entries.sort_by_key(|e| e.activated_at);
            return Ok(Self { dir, entries });
        }

        let mut ring = Self {
            dir,
            entries: Vec::new(),
        };
        ring.rotate(secret, now)?;
        Ok(ring)
    }

    /// Generate and persist a new signing key, activated as of `now`. The
    /// old keys stay in the ring for verification.
    pub fn rotate(&mut self, secret: &[u8], now: DateTime<Utc>) -> Result<&KeyEntry, KeyError> {
        let keypair = SigningKeypair::generate()?;
        let key_id = format!("K{}", &Uuid::new_v4().simple().to_string()[..12].to_uppercase());
        let sealed_file = format!("{}.sealed", key_id);

        fs::write(self.dir.join(&sealed_file), keypair.seal(secret)?)?;
        fs::write(self.dir.join(PUBLIC_KEY_FILE), keypair.public_key_pem()?)?;

        self.entries.push(KeyEntry {
            key_id,
            activated_at: now,
            keypair,
        });
        self.persist_meta()?;
        Ok(self.entries.last().unwrap())
    }

    fn persist_meta(&self) -> Result<(), KeyError> {
        let metas: Vec<KeyEntryMeta> = self
            .entries
            .iter()
            .map(|e| KeyEntryMeta {
                key_id: e.key_id.clone(),
                activated_at: e.activated_at,
                sealed_file: format!("{}.sealed", e.key_id),
            })
            .collect();
        fs::write(
            self.dir.join(KEY_META_FILE),
            serde_json::to_vec_pretty(&metas)?,
        )?;
        Ok(())
    }

    /// The current signing key (newest activation).
    pub fn active(&self) -> &KeyEntry {
        // Invariant: the ring is never empty once constructed.
        self.entries.last().expect("key ring is never empty")
    }

    /// The key that was active at `ts` — what a receipt signed at `ts` was
    /// signed with. Falls back to the oldest key for pre-ring timestamps.
    pub fn key_for(&self, ts: DateTime<Utc>) -> &KeyEntry {
        self.entries
            .iter()
            .rev()
            .find(|e| e.activated_at <= ts)
            .unwrap_or_else(|| self.entries.first().expect("key ring is never empty"))
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }
}
