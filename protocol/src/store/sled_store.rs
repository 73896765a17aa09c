//! Sled-backed implementation of [`DepositStore`].
//!
//! ## Tree Layout
//!
//! | Tree       | Key                      | Value                     |
//! |------------|--------------------------|---------------------------|
//! | `tokens`   | token id (UTF-8)         | `json(DepositToken)`      |
//! | `active`   | account ref (UTF-8)      | token id (UTF-8)          |
//! | `records`  | record id (UTF-8)        | `json(FinancialRecord)`   |
//! | `receipts` | receipt number (UTF-8)   | `json(Receipt)`           |
//! | `receipts` | `rec/` + record id       | receipt number (UTF-8)    |
//!
//! Values are serde_json rather than a binary codec: tokens and records
//! carry a free-form `extra` payload (`serde_json::Value`), which only a
//! self-describing format can round-trip, and being able to `grep` a dump
//! of a financial store has paid for the byte overhead many times over.
//!
//! The record-to-receipt index lives inside the `receipts` tree under a
//! `rec/` prefix, which keeps the completion commit down to a four-tree
//! transaction. Receipt numbers all start with `RCP-`, so the namespaces
//! cannot collide.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use crate::ledger::receipt::Receipt;
use crate::ledger::record::FinancialRecord;
use crate::store::{DepositStore, ReserveOutcome, StoreError};
use crate::token::types::{DepositToken, TokenStatus};

const TOKENS_TREE: &str = "tokens";
const ACTIVE_TREE: &str = "active";
const RECORDS_TREE: &str = "records";
const RECEIPTS_TREE: &str = "receipts";

/// Prefix for record-to-receipt index keys inside the receipts tree.
const RECORD_INDEX_PREFIX: &str = "rec/";

/// Production store: one sled database, four trees.
pub struct SledDepositStore {
    _db: Db,
    tokens: Tree,
    active: Tree,
    records: Tree,
    receipts: Tree,
}

impl SledDepositStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// An in-memory store that vanishes on drop. For tests and demos.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            tokens: db.open_tree(TOKENS_TREE)?,
            active: db.open_tree(ACTIVE_TREE)?,
            records: db.open_tree(RECORDS_TREE)?,
            receipts: db.open_tree(RECEIPTS_TREE)?,
            _db: db,
        })
    }
}

fn to_bytes<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_bytes<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl DepositStore for SledDepositStore {
    fn insert_token(&self, token: &DepositToken) -> Result<(), StoreError> {
        let bytes = to_bytes(token)?;
        match self
            .tokens
            .compare_and_swap(token.token_id.as_bytes(), None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict(token.token_id.clone())),
        }
    }

    fn get_token(&self, token_id: &str) -> Result<Option<DepositToken>, StoreError> {
        self.tokens
            .get(token_id.as_bytes())?
            .map(|ivec| from_bytes(&ivec))
            .transpose()
    }

    fn cas_token(
        &self,
        expected: &DepositToken,
        updated: &DepositToken,
    ) -> Result<bool, StoreError> {
        let old = to_bytes(expected)?;
        let new = to_bytes(updated)?;
        Ok(self
            .tokens
            .compare_and_swap(expected.token_id.as_bytes(), Some(old), Some(new))?
            .is_ok())
    }

    fn reserve_active(
        &self,
        account_ref: &str,
        token_id: &str,
    ) -> Result<ReserveOutcome, StoreError> {
        loop {
            match self.active.compare_and_swap(
                account_ref.as_bytes(),
                None::<&[u8]>,
                Some(token_id.as_bytes()),
            )? {
                Ok(()) => return Ok(ReserveOutcome::Reserved),
                Err(cas) => match cas.current {
                    Some(holder) => {
                        return Ok(ReserveOutcome::Held {
                            existing_token_id: String::from_utf8_lossy(&holder).into_owned(),
                        })
                    }
                    // The holder vanished between our read and our swap;
                    // the slot is free again, so try again.
                    None => continue,
                },
            }
        }
    }

    fn release_active(&self, account_ref: &str, token_id: &str) -> Result<(), StoreError> {
        // Only the current holder may free the slot; a stale release
        // (slot already re-reserved by a newer token) must not clobber it.
        let _ = self.active.compare_and_swap(
            account_ref.as_bytes(),
            Some(token_id.as_bytes()),
            None::<&[u8]>,
        )?;
        Ok(())
    }

    fn active_token_id(&self, account_ref: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .active
            .get(account_ref.as_bytes())?
            .map(|ivec| String::from_utf8_lossy(&ivec).into_owned()))
    }

    fn tokens_with_status(&self, status: TokenStatus) -> Result<Vec<DepositToken>, StoreError> {
        let mut out = Vec::new();
        for entry in self.tokens.iter() {
            let (_, value) = entry?;
            let token: DepositToken = from_bytes(&value)?;
            if token.status == status {
                out.push(token);
            }
        }
        Ok(out)
    }

    fn tokens_for_customer(&self, customer_ref: &str) -> Result<Vec<DepositToken>, StoreError> {
        let mut out = Vec::new();
        for entry in self.tokens.iter() {
            let (_, value) = entry?;
            let token: DepositToken = from_bytes(&value)?;
            if token.customer_ref == customer_ref {
                out.push(token);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn commit_completion(
        &self,
        token: &DepositToken,
        record: &FinancialRecord,
        receipt: &Receipt,
    ) -> Result<(), StoreError> {
        let token_bytes = to_bytes(token)?;
        let record_bytes = to_bytes(record)?;
        let receipt_bytes = to_bytes(receipt)?;
        let index_key = format!("{}{}", RECORD_INDEX_PREFIX, record.record_id);

        // Transactional over a slice of trees; the view preserves order.
        let trees: [&sled::Tree; 4] = [&self.tokens, &self.active, &self.records, &self.receipts];
        let result = trees.as_ref().transaction(
            |view: &Vec<sled::transaction::TransactionalTree>| {
                let (tokens, active, records, receipts) =
                    (&view[0], &view[1], &view[2], &view[3]);
                if records.get(record.record_id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(
                        record.record_id.clone(),
                    )));
                }
                if receipts.get(receipt.receipt_number.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(
                        receipt.receipt_number.clone(),
                    )));
                }

                tokens.insert(token.token_id.as_bytes(), token_bytes.as_slice())?;
                active.remove(token.account_ref.as_bytes())?;
                records.insert(record.record_id.as_bytes(), record_bytes.as_slice())?;
                receipts.insert(receipt.receipt_number.as_bytes(), receipt_bytes.as_slice())?;
                receipts.insert(index_key.as_bytes(), receipt.receipt_number.as_bytes())?;
                Ok(())
            },
        );

        result.map_err(|err| match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Sled(e),
        })
    }

    fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>, StoreError> {
        self.records
            .get(record_id.as_bytes())?
            .map(|ivec| from_bytes(&ivec))
            .transpose()
    }

    fn get_receipt(&self, receipt_number: &str) -> Result<Option<Receipt>, StoreError> {
        self.receipts
            .get(receipt_number.as_bytes())?
            .map(|ivec| from_bytes(&ivec))
            .transpose()
    }

    fn receipt_for_record(&self, record_id: &str) -> Result<Option<Receipt>, StoreError> {
        let index_key = format!("{}{}", RECORD_INDEX_PREFIX, record_id);
        match self.receipts.get(index_key.as_bytes())? {
            Some(number) => self.get_receipt(&String::from_utf8_lossy(&number)),
            None => Ok(None),
        }
    }

    fn put_receipt(&self, receipt: &Receipt) -> Result<(), StoreError> {
        let bytes = to_bytes(receipt)?;
        self.receipts
            .insert(receipt.receipt_number.as_bytes(), bytes)?;
        Ok(())
    }
}
