//! Account directory: who owns what, resolved at issuance.
//!
//! The engine refuses to stage a deposit against a reference it cannot
//! resolve, and refuses account/customer pairs that don't belong together.
//! The directory is a trait so that deployments can back it with the core
//! banking system; the in-memory implementation covers tests and demos.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory lookup failures. These surface verbatim to the caller — an
/// issuance against an unknown account is the caller's mistake, not ours.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// No account under this reference.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// No customer under this reference.
    #[error("customer not found: {0}")]
    CustomerNotFound(String),

    /// Both exist, but the account does not belong to the customer.
    #[error("account {account_ref} does not belong to customer {customer_ref}")]
    OwnershipMismatch {
        /// The referenced account.
        account_ref: String,
        /// The referenced customer.
        customer_ref: String,
    },
}

/// What the directory knows about an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Account reference.
    pub account_ref: String,
    /// Owning customer reference.
    pub customer_ref: String,
    /// Account holder name, as it should appear on records and receipts.
    pub customer_name: String,
    /// Registered contact phone.
    pub customer_phone: Option<String>,
    /// Branch that owns the account.
    pub branch_id: String,
}

/// Resolves account/customer pairs to a profile.
pub trait AccountDirectory: Send + Sync {
    /// Resolve `account_ref` and confirm it belongs to `customer_ref`.
    fn resolve(
        &self,
        account_ref: &str,
        customer_ref: &str,
    ) -> Result<AccountProfile, DirectoryError>;
}

/// In-memory directory for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: DashMap<String, AccountProfile>,
}

impl MemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a profile.
    pub fn upsert(&self, profile: AccountProfile) {
        self.accounts.insert(profile.account_ref.clone(), profile);
    }
}

impl AccountDirectory for MemoryDirectory {
    fn resolve(
        &self,
        account_ref: &str,
        customer_ref: &str,
    ) -> Result<AccountProfile, DirectoryError> {
        let profile = self
            .accounts
            .get(account_ref)
            .ok_or_else(|| DirectoryError::AccountNotFound(account_ref.to_string()))?;
        if profile.customer_ref != customer_ref {
            return Err(DirectoryError::OwnershipMismatch {
                account_ref: account_ref.to_string(),
                customer_ref: customer_ref.to_string(),
            });
        }
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryDirectory {
        let dir = MemoryDirectory::new();
        dir.upsert(AccountProfile {
            account_ref: "A-001".to_string(),
            customer_ref: "C-001".to_string(),
            customer_name: "Ayesha Khan".to_string(),
            customer_phone: Some("+92-300-1234567".to_string()),
            branch_id: "BR-014".to_string(),
        });
        dir
    }

    #[test]
    fn resolves_a_matching_pair() {
        let profile = directory().resolve("A-001", "C-001").unwrap();
        assert_eq!(profile.customer_name, "Ayesha Khan");
        assert_eq!(profile.branch_id, "BR-014");
    }

    #[test]
    fn unknown_account_is_named_in_the_error() {
        assert_eq!(
            directory().resolve("A-999", "C-001"),
            Err(DirectoryError::AccountNotFound("A-999".to_string()))
        );
    }

    #[test]
    fn ownership_mismatch_is_refused() {
        assert_eq!(
            directory().resolve("A-001", "C-999"),
            Err(DirectoryError::OwnershipMismatch {
                account_ref: "A-001".to_string(),
                customer_ref: "C-999".to_string(),
            })
        );
    }
}
