//! Persistent table store — sled-backed, transactional per registration
//!
//! The curator's entire mutable state lives here: commitments, decommitment
//! logs, counters, the key book and the serialized reference string. The store
//! exposes exactly the interface the bookkeeping needs — `get`, `put`, `del`,
//! `range` over `(table, row)` cells — plus a transaction wrapper so that a
//! whole registration (merge cascade included) commits or rolls back as one
//! unit.
//!
//! ## Layout
//!
//! All tables share a single sled tree. A cell key is
//! `tag (1 byte) ‖ level (1 byte) ‖ row (u64, big-endian)`; the level byte is
//! zero for tables that are not split by merge level. Big-endian rows make
//! lexicographic key order equal numeric row order, so `range` and the digest
//! walk cells in a deterministic order.
//!
//! ## Values
//!
//! Group elements are stored in canonical compressed form; counters are
//! big-endian `u64`. A counter cell that is absent reads as zero — this keeps
//! `Setup` O(1) instead of pre-seeding counter rows for every possible user.
//!
//! ## Concurrency
//!
//! Exactly one logical writer. `transaction` serialises all writes of one
//! registration; plain reads see committed state only. A sled-level write
//! conflict (impossible under the single-writer discipline) surfaces as
//! [`StoreError::Transaction`] and is the caller's retry decision.

#![forbid(unsafe_code)]
#![allow(missing_docs)] // Variant-level docs below cover the surface; cell enums are self-describing.

use std::path::Path;

use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, UnabortableTransactionError,
};

use crate::group::{decode_g1, encode_g1};
use crate::G1;

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying sled database failed.
    #[error("storage backend: {0}")]
    Backend(#[from] sled::Error),
    /// A transaction could not complete; no writes were applied.
    #[error("storage transaction: {0}")]
    Transaction(String),
    /// A cell held bytes that do not decode as the expected value type.
    #[error("malformed cell encoding: {0}")]
    Decode(String),
}

impl From<crate::group::CodecError> for StoreError {
    fn from(e: crate::group::CodecError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// The tables the curator reads and writes.
///
/// Rows are plain `u64`; composite row-ids (block·n + slot, and so on) are the
/// caller's convention. The `u8` payload on the `Level*` tables selects the
/// merge level, one logical table per level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// Serialized reference string (fixed schema, written once by `Setup`).
    Crs,
    /// Key book: row = id, value = registered public key.
    Keys,
    /// Regular variant: row = block, value = running commitment.
    Commitments,
    /// Regular variant: chronological decommitment log,
    /// row = block·n² + slot·n + seq.
    AuxLog,
    /// Regular variant: registrations per block, row = block.
    AuxCount,
    /// Efficient variant: registrations per block, row = block.
    BlockCount,
    /// Efficient variant: users aggregated per level, row = block·n + level.
    LevelCount,
    /// Efficient variant: decommitments displaced by merges,
    /// row = promotion_seq·N + block·n + slot.
    PromotionLog,
    /// Efficient variant: promotions so far per slot, row = block·n + slot.
    PromotionCount,
    /// Efficient variant: commitment of the group at this level, row = block.
    LevelCommitments(u8),
    /// Efficient variant: live decommitment per slot at this level,
    /// row = block·n + slot.
    LevelAux(u8),
    /// Efficient variant: 1 if the slot registered within this level's group,
    /// row = block·n + slot.
    LevelRegistered(u8),
}

impl Table {
    fn prefix(self) -> [u8; 2] {
        match self {
            Table::Crs => [0, 0],
            Table::Keys => [1, 0],
            Table::Commitments => [2, 0],
            Table::AuxLog => [3, 0],
            Table::AuxCount => [4, 0],
            Table::BlockCount => [5, 0],
            Table::LevelCount => [6, 0],
            Table::PromotionLog => [7, 0],
            Table::PromotionCount => [8, 0],
            Table::LevelCommitments(level) => [9, level],
            Table::LevelAux(level) => [10, level],
            Table::LevelRegistered(level) => [11, level],
        }
    }

    fn key(self, row: u64) -> [u8; 10] {
        let mut key = [0u8; 10];
        key[..2].copy_from_slice(&self.prefix());
        key[2..].copy_from_slice(&row.to_be_bytes());
        key
    }
}

fn decode_counter(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Decode(format!("counter cell of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn unabortable(e: UnabortableTransactionError) -> StoreError {
    match e {
        UnabortableTransactionError::Storage(e) => StoreError::Backend(e),
        UnabortableTransactionError::Conflict => {
            StoreError::Transaction("write conflict".to_owned())
        }
    }
}

/// Handle to the curator's persistent state.
pub struct Store {
    db: sled::Db,
}

impl Store {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Store { db: sled::open(path)? })
    }

    /// Open a throwaway store that is deleted on drop. Used by tests and the
    /// demo walkthrough.
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Store { db: sled::Config::new().temporary(true).open()? })
    }

    // ----------------------------- raw cells -----------------------------

    /// Read the raw bytes of a cell.
    pub fn get(&self, table: Table, row: u64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(table.key(row))?.map(|v| v.to_vec()))
    }

    /// Write a cell, replacing any previous value.
    pub fn put(&self, table: Table, row: u64, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(table.key(row), value)?;
        Ok(())
    }

    /// Delete a cell. Deleting an absent cell is a no-op.
    pub fn del(&self, table: Table, row: u64) -> Result<(), StoreError> {
        self.db.remove(table.key(row))?;
        Ok(())
    }

    /// All present cells of `table` with row in `[lo, hi)`, ascending.
    pub fn range(&self, table: Table, lo: u64, hi: u64) -> Result<Vec<(u64, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        if lo >= hi {
            return Ok(out);
        }
        for entry in self.db.range(table.key(lo)..table.key(hi)) {
            let (key, value) = entry?;
            let row = decode_counter(&key[2..])?;
            out.push((row, value.to_vec()));
        }
        Ok(out)
    }

    // ---------------------------- typed cells ----------------------------

    /// Read a `G1` cell.
    pub fn get_g1(&self, table: Table, row: u64) -> Result<Option<G1>, StoreError> {
        match self.get(table, row)? {
            Some(bytes) => Ok(Some(decode_g1(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a `G1` cell.
    pub fn put_g1(&self, table: Table, row: u64, value: &G1) -> Result<(), StoreError> {
        self.put(table, row, &encode_g1(value))
    }

    /// Read a counter cell; absent cells read as zero.
    pub fn get_counter(&self, table: Table, row: u64) -> Result<u64, StoreError> {
        match self.get(table, row)? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }

    /// Write a counter cell.
    pub fn put_counter(&self, table: Table, row: u64, value: u64) -> Result<(), StoreError> {
        self.put(table, row, &value.to_be_bytes())
    }

    /// All present `G1` cells of `table` with row in `[lo, hi)`, ascending.
    pub fn range_g1(&self, table: Table, lo: u64, hi: u64) -> Result<Vec<(u64, G1)>, StoreError> {
        self.range(table, lo, hi)?
            .into_iter()
            .map(|(row, bytes)| Ok((row, decode_g1(&bytes)?)))
            .collect()
    }

    // --------------------------- transactions ----------------------------

    /// Run `f` atomically: either every write it performs is committed, or —
    /// on any error — none is.
    ///
    /// sled may invoke `f` more than once, so the closure must be free of
    /// side effects outside the transaction handle.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: Fn(&StoreTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let result = self.db.transaction(|tree| {
            let txn = StoreTxn { tree };
            f(&txn).map_err(ConflictableTransactionError::Abort)
        });
        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(E::from(StoreError::Backend(e))),
        }
    }

    // ---------------------------- diagnostics ----------------------------

    /// BLAKE3 digest over every cell in table order.
    ///
    /// Two stores with identical logical content produce identical digests,
    /// which is how tests assert that a rejected registration left no trace.
    pub fn digest(&self) -> Result<[u8; 32], StoreError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"RBE.store.v1");
        for entry in self.db.iter() {
            let (key, value) = entry?;
            hasher.update(&(key.len() as u64).to_be_bytes());
            hasher.update(&key);
            hasher.update(&(value.len() as u64).to_be_bytes());
            hasher.update(&value);
        }
        Ok(*hasher.finalize().as_bytes())
    }

    /// Total serialized bytes held by one table (values only).
    pub fn table_bytes(&self, table: Table) -> Result<u64, StoreError> {
        let mut total = 0u64;
        for entry in self.db.scan_prefix(table.prefix()) {
            let (_, value) = entry?;
            total += value.len() as u64;
        }
        Ok(total)
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Cell access inside a [`Store::transaction`] closure.
///
/// Mirrors the typed accessors of [`Store`]; range scans are read-path only
/// and deliberately absent here.
pub struct StoreTxn<'a> {
    tree: &'a TransactionalTree,
}

impl StoreTxn<'_> {
    /// Read the raw bytes of a cell.
    pub fn get(&self, table: Table, row: u64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .tree
            .get(table.key(row))
            .map_err(unabortable)?
            .map(|v| v.to_vec()))
    }

    /// Write a cell, replacing any previous value.
    pub fn put(&self, table: Table, row: u64, value: &[u8]) -> Result<(), StoreError> {
        self.tree
            .insert(&table.key(row)[..], value)
            .map_err(unabortable)?;
        Ok(())
    }

    /// Delete a cell. Deleting an absent cell is a no-op.
    pub fn del(&self, table: Table, row: u64) -> Result<(), StoreError> {
        self.tree.remove(&table.key(row)[..]).map_err(unabortable)?;
        Ok(())
    }

    /// Read a `G1` cell.
    pub fn get_g1(&self, table: Table, row: u64) -> Result<Option<G1>, StoreError> {
        match self.get(table, row)? {
            Some(bytes) => Ok(Some(decode_g1(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a `G1` cell.
    pub fn put_g1(&self, table: Table, row: u64, value: &G1) -> Result<(), StoreError> {
        self.put(table, row, &encode_g1(value))
    }

    /// Read a counter cell; absent cells read as zero.
    pub fn get_counter(&self, table: Table, row: u64) -> Result<u64, StoreError> {
        match self.get(table, row)? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }

    /// Write a counter cell.
    pub fn put_counter(&self, table: Table, row: u64, value: u64) -> Result<(), StoreError> {
        self.put(table, row, &value.to_be_bytes())
    }
}
