//! Common reference string — h-vector construction, persistence, reuse policy
//!
//! `Setup` derives every public parameter of the scheme from a single
//! trapdoor scalar `z`: the h-vector holds `h1[i] = g1·z^{i+1}` and
//! `h2[i] = g2·z^{i+1}` for `i ∈ [0, 2n)`, where `n = ⌈√N⌉` is the block
//! size. The slot at index `n` is a **deliberate hole** — no valid operation
//! ever reads it, and the panicking accessors treat a read as a caller bug.
//!
//! The algebraic hook the whole scheme rests on:
//! `e(h1[i], h2[j]) = e(g1, g2)·z^{i+j+2}` — so `e(h1[i], h2[n-1-i])`
//! depends only on `n`, never on `i`. Commitments over a block and per-slot
//! decommitments meet in that one target-group value.
//!
//! The trapdoor exists only inside [`Crs::generate`] and is dropped before it
//! returns; anyone holding `z` could forge decommitments for arbitrary slots.
//!
//! The reference string is persisted into the store so that a curator can be
//! reopened against existing state. Re-running `Setup` over a populated store
//! follows the caller's [`OnExisting`] policy — reuse or refuse, never a
//! silent reset.

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup};
use ark_serialize::CanonicalSerialize;
use rand::{CryptoRng, Rng};

use crate::group::{self, decode_g1, decode_g2, encode_g1, encode_g2};
use crate::store::{Store, StoreError, Table};
use crate::{Variant, G1, G2};

/// Largest supported system capacity. Keeps every composite row-id
/// (`block·n² + slot·n + seq` is the widest) inside `u64`.
pub const MAX_SUPPORTED_USERS: u64 = 1 << 32;

/// What `setup` does when the store already holds a reference string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnExisting {
    /// Load and return the stored reference string; its capacity and variant
    /// must match the request.
    Reuse,
    /// Fail with [`SetupError::AlreadyInitialised`].
    Refuse,
}

/// Errors raised while creating or loading a reference string.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The store already holds a reference string and the policy was
    /// [`OnExisting::Refuse`].
    #[error("store already holds a reference string")]
    AlreadyInitialised,
    /// Reuse was requested but the stored capacity differs.
    #[error("stored system is sized for {stored} users, requested {requested}")]
    MaxUsersMismatch {
        /// Capacity recorded in the store.
        stored: u64,
        /// Capacity the caller asked for.
        requested: u64,
    },
    /// Reuse was requested but the stored variant differs.
    #[error("stored system was initialised as {stored:?}, requested {requested:?}")]
    VariantMismatch {
        /// Variant recorded in the store.
        stored: Variant,
        /// Variant the caller asked for.
        requested: Variant,
    },
    /// Requested capacity outside `[1, 2^32]`.
    #[error("system capacity {0} is outside the supported range")]
    MaxUsersOutOfRange(u64),
    /// The persisted reference string fails validation.
    #[error("stored reference string is corrupt: {0}")]
    Corrupt(String),
    /// The store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// Fixed rows of the `Table::Crs` schema.
const ROW_MAX_USERS: u64 = 0;
const ROW_GENERATOR_G1: u64 = 1;
const ROW_GENERATOR_G2: u64 = 2;
const ROW_VARIANT: u64 = 3;
const ROW_H_BASE: u64 = 4;

fn h1_row(i: u64) -> u64 {
    ROW_H_BASE + 2 * i
}

fn h2_row(i: u64) -> u64 {
    ROW_H_BASE + 2 * i + 1
}

/// The immutable reference string.
///
/// Derived quantities: `block_size = ⌈√max_users⌉`, `levels = ⌈log₂ n⌉`
/// (at least 1), `blocks = ⌈max_users / block_size⌉`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crs {
    /// System capacity `N`.
    pub max_users: u64,
    /// Identity slots per block, `n`.
    pub block_size: u64,
    /// Merge levels per block in the efficient variant, `t`.
    pub levels: u32,
    /// Number of blocks, `⌈N/n⌉`.
    pub blocks: u64,
    /// Generator of `G1`.
    pub g1: G1,
    /// Generator of `G2`.
    pub g2: G2,
    h1: Vec<Option<G1>>,
    h2: Vec<Option<G2>>,
}

impl Crs {
    /// Sample a fresh reference string for up to `max_users` identities.
    ///
    /// The trapdoor never escapes this function.
    pub(crate) fn generate<R: Rng + CryptoRng>(
        max_users: u64,
        rng: &mut R,
    ) -> Result<Crs, SetupError> {
        if max_users == 0 || max_users > MAX_SUPPORTED_USERS {
            return Err(SetupError::MaxUsersOutOfRange(max_users));
        }
        let block_size = ceil_sqrt(max_users);
        let levels = levels_for(block_size);
        let blocks = max_users.div_ceil(block_size);
        let g1 = G1::generator();
        let g2 = G2::generator();

        let z = group::random_scalar(rng);
        let len = (2 * block_size) as usize;
        let mut h1 = Vec::with_capacity(len);
        let mut h2 = Vec::with_capacity(len);
        let mut power = z; // z^{i+1} at index i
        for i in 0..2 * block_size {
            if i == block_size {
                h1.push(None);
                h2.push(None);
            } else {
                h1.push(Some((g1 * power).into_affine()));
                h2.push(Some((g2 * power).into_affine()));
            }
            power *= z;
        }

        Ok(Crs { max_users, block_size, levels, blocks, g1, g2, h1, h2 })
    }

    // ------------------------------ indexing ------------------------------

    /// Block index of `id`.
    #[inline]
    pub fn block_of(&self, id: u64) -> u64 {
        id / self.block_size
    }

    /// Slot of `id` within its block.
    #[inline]
    pub fn slot_of(&self, id: u64) -> u64 {
        id % self.block_size
    }

    /// `h1[i]`, if the slot exists (index in range and not the hole).
    #[inline]
    pub fn h1_opt(&self, i: u64) -> Option<&G1> {
        self.h1.get(i as usize).and_then(|slot| slot.as_ref())
    }

    /// `h2[i]`, if the slot exists.
    #[inline]
    pub fn h2_opt(&self, i: u64) -> Option<&G2> {
        self.h2.get(i as usize).and_then(|slot| slot.as_ref())
    }

    /// `h1[i]` for an index the caller guarantees to exist.
    ///
    /// # Panics
    ///
    /// If `i` is out of range or is the reserved hole at index `n`; both are
    /// caller bugs, not runtime conditions.
    #[inline]
    pub fn h1(&self, i: u64) -> &G1 {
        self.h1_opt(i)
            .unwrap_or_else(|| panic!("h1[{i}] is the reserved hole or out of range"))
    }

    /// `h2[i]` for an index the caller guarantees to exist.
    ///
    /// # Panics
    ///
    /// See [`Crs::h1`].
    #[inline]
    pub fn h2(&self, i: u64) -> &G2 {
        self.h2_opt(i)
            .unwrap_or_else(|| panic!("h2[{i}] is the reserved hole or out of range"))
    }

    // ----------------------------- persistence ----------------------------

    /// Does `store` already hold a reference string?
    pub fn is_initialised(store: &Store) -> Result<bool, StoreError> {
        Ok(store.get(Table::Crs, ROW_MAX_USERS)?.is_some())
    }

    /// Write the reference string (and the variant marker) into the store.
    pub(crate) fn persist(&self, store: &Store, variant: Variant) -> Result<(), StoreError> {
        store.put_counter(Table::Crs, ROW_MAX_USERS, self.max_users)?;
        store.put(Table::Crs, ROW_GENERATOR_G1, &encode_g1(&self.g1))?;
        store.put(Table::Crs, ROW_GENERATOR_G2, &encode_g2(&self.g2))?;
        let marker = match variant {
            Variant::Regular => 0,
            Variant::Efficient => 1,
        };
        store.put_counter(Table::Crs, ROW_VARIANT, marker)?;
        for i in 0..2 * self.block_size {
            match (&self.h1[i as usize], &self.h2[i as usize]) {
                (Some(p1), Some(p2)) => {
                    store.put(Table::Crs, h1_row(i), &encode_g1(p1))?;
                    store.put(Table::Crs, h2_row(i), &encode_g2(p2))?;
                }
                // The hole is stored as an explicitly empty cell so that a
                // loader can distinguish it from a truncated table.
                _ => {
                    store.put(Table::Crs, h1_row(i), &[])?;
                    store.put(Table::Crs, h2_row(i), &[])?;
                }
            }
        }
        store.flush()
    }

    /// Load a previously persisted reference string.
    pub(crate) fn load(store: &Store) -> Result<(Crs, Variant), SetupError> {
        let max_users = store.get_counter(Table::Crs, ROW_MAX_USERS)?;
        if max_users == 0 || max_users > MAX_SUPPORTED_USERS {
            return Err(SetupError::Corrupt(format!("stored capacity {max_users}")));
        }
        let block_size = ceil_sqrt(max_users);
        let levels = levels_for(block_size);
        let blocks = max_users.div_ceil(block_size);

        let g1_bytes = store
            .get(Table::Crs, ROW_GENERATOR_G1)?
            .ok_or_else(|| SetupError::Corrupt("missing g1 generator".into()))?;
        let g2_bytes = store
            .get(Table::Crs, ROW_GENERATOR_G2)?
            .ok_or_else(|| SetupError::Corrupt("missing g2 generator".into()))?;
        let g1 = decode_g1(&g1_bytes).map_err(|e| SetupError::Corrupt(e.to_string()))?;
        let g2 = decode_g2(&g2_bytes).map_err(|e| SetupError::Corrupt(e.to_string()))?;

        let variant = match store.get_counter(Table::Crs, ROW_VARIANT)? {
            0 => Variant::Regular,
            1 => Variant::Efficient,
            other => return Err(SetupError::Corrupt(format!("variant marker {other}"))),
        };

        let len = (2 * block_size) as usize;
        let mut h1 = Vec::with_capacity(len);
        let mut h2 = Vec::with_capacity(len);
        for i in 0..2 * block_size {
            let b1 = store
                .get(Table::Crs, h1_row(i))?
                .ok_or_else(|| SetupError::Corrupt(format!("missing h1[{i}]")))?;
            let b2 = store
                .get(Table::Crs, h2_row(i))?
                .ok_or_else(|| SetupError::Corrupt(format!("missing h2[{i}]")))?;
            match (b1.is_empty(), b2.is_empty(), i == block_size) {
                (true, true, true) => {
                    h1.push(None);
                    h2.push(None);
                }
                (false, false, false) => {
                    h1.push(Some(
                        decode_g1(&b1).map_err(|e| SetupError::Corrupt(e.to_string()))?,
                    ));
                    h2.push(Some(
                        decode_g2(&b2).map_err(|e| SetupError::Corrupt(e.to_string()))?,
                    ));
                }
                _ => {
                    return Err(SetupError::Corrupt(format!(
                        "hole marker out of place at index {i}"
                    )))
                }
            }
        }

        Ok((Crs { max_users, block_size, levels, blocks, g1, g2, h1, h2 }, variant))
    }

    /// Serialized size of the reference string in canonical compressed form.
    pub fn serialized_size_bytes(&self) -> usize {
        let mut total = 8 + self.g1.compressed_size() + self.g2.compressed_size();
        for slot in &self.h1 {
            if let Some(p) = slot {
                total += p.compressed_size();
            }
        }
        for slot in &self.h2 {
            if let Some(p) = slot {
                total += p.compressed_size();
            }
        }
        total
    }
}

/// Smallest `r` with `r·r ≥ value`.
fn ceil_sqrt(value: u64) -> u64 {
    if value == 0 {
        return 0;
    }
    let mut root = (value as f64).sqrt() as u64;
    while root.checked_mul(root).map_or(true, |sq| sq < value) {
        root += 1;
    }
    while root > 1 && (root - 1) * (root - 1) >= value {
        root -= 1;
    }
    root
}

/// Merge levels for a block of `n` slots: `⌈log₂ n⌉`, floored at one so the
/// degenerate one-slot block still has a level to write into.
fn levels_for(block_size: u64) -> u32 {
    if block_size <= 1 {
        1
    } else {
        (64 - (block_size - 1).leading_zeros()).max(1)
    }
}
