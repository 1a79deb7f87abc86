//! Registration plumbing shared by both variants
//!
//! Registration is the only write path of the curator. Before any state is
//! touched, the submitted helping values are checked against the public key
//! with Type-3 pairings; a submission that fails the check is rejected with
//! no store mutation. The check enforces that one discrete log `sk` was used
//! consistently across `pk` and every populated helping value — without it a
//! malicious registrant could poison the decommitments the curator derives
//! for *other* users' slots.
//!
//! The key book (`Table::Keys`) doubles as the duplicate-registration guard.

#![forbid(unsafe_code)]

use crate::crs::Crs;
use crate::group::pairing;
use crate::store::{StoreError, StoreTxn, Table};
use crate::G1;

/// Errors raised by `register`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The helping values do not all open to the submitted public key.
    #[error("helping values are inconsistent with the public key")]
    InconsistentHelpingValues,
    /// The target block already holds a full complement of users.
    #[error("block {block} already holds {capacity} registered users")]
    BlockFull {
        /// Block that rejected the registration.
        block: u64,
        /// Its capacity, `n`.
        capacity: u64,
    },
    /// The id is already present in the key book.
    #[error("id {0} is already registered")]
    DuplicateId(u64),
    /// The id does not fit the system capacity fixed at setup.
    #[error("id {id} exceeds the system capacity of {max_users} users")]
    IdOutOfRange {
        /// Offending id.
        id: u64,
        /// Capacity `N`.
        max_users: u64,
    },
    /// A cell the bookkeeping invariants guarantee to exist was absent.
    #[error("registry state is corrupt: {0}")]
    Corrupt(&'static str),
    /// The store failed; the registration was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Helping values `χ` submitted alongside a public key.
///
/// A vector of length `n`; coordinate `i` is the contribution the curator
/// multiplies into slot `i`'s decommitment when this user registers. The
/// registrant's own slot is the one empty coordinate — the h-vector hole
/// lands exactly there, and a user holds no useful decommitment contribution
/// for itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpingValues {
    pub(crate) values: Vec<Option<G1>>,
}

impl HelpingValues {
    pub(crate) fn new(values: Vec<Option<G1>>) -> Self {
        HelpingValues { values }
    }

    /// Number of coordinates (always `n` for a well-formed vector).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the vector has no coordinates at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coordinate `slot`, if populated.
    pub fn get(&self, slot: u64) -> Option<&G1> {
        self.values.get(slot as usize).and_then(|v| v.as_ref())
    }
}

/// Verify `χ` against `pk`: with `E = e(pk, h2[n-1])`, every populated
/// coordinate must satisfy `e(χ[i+1], h2[i]) = E`.
///
/// Each check pins `χ[i+1]` to `h1[idx + n - 1 - i]·sk` for the same `sk`
/// that links `pk` to `h1[idx]`; the Type-3 structure leaves the submitter no
/// other way to satisfy all equations simultaneously.
pub(crate) fn check_helping_values(
    crs: &Crs,
    pk: &G1,
    helping: &HelpingValues,
) -> Result<(), RegistryError> {
    let n = crs.block_size;
    if helping.len() as u64 != n {
        return Err(RegistryError::InconsistentHelpingValues);
    }
    let expected = pairing(*pk, *crs.h2(n - 1));
    for i in 0..n.saturating_sub(1) {
        let (Some(value), Some(h)) = (helping.get(i + 1), crs.h2_opt(i)) else {
            continue;
        };
        if pairing(*value, *h) != expected {
            return Err(RegistryError::InconsistentHelpingValues);
        }
    }
    Ok(())
}

/// Duplicate guard plus key-book append, inside the registration transaction.
pub(crate) fn record_public_key(
    txn: &StoreTxn<'_>,
    id: u64,
    pk: &G1,
) -> Result<(), RegistryError> {
    if txn.get(Table::Keys, id)?.is_some() {
        return Err(RegistryError::DuplicateId(id));
    }
    txn.put_g1(Table::Keys, id, pk)?;
    Ok(())
}
