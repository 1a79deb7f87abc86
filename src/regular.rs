//! Regular variant — one commitment per block, chronological decommitment log
//!
//! Block `k` keeps a single running commitment `pp[k] = Σ pk` over everyone
//! registered into it. Each registration also appends, for every *other* slot
//! of the block, the next running product of helping values contributed on
//! that slot's behalf: row `k·n² + slot·n + seq` holds the decommitment that
//! was valid after `seq + 1` registrations. Updates therefore grow linearly
//! with the block — the price the efficient variant exists to avoid.

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup};
use tracing::debug;

use crate::crs::Crs;
use crate::registry::{HelpingValues, RegistryError};
use crate::store::{Store, StoreError, StoreTxn, Table};
use crate::G1;

fn log_base(crs: &Crs, block: u64, slot: u64) -> u64 {
    let n = crs.block_size;
    block * n * n + slot * n
}

/// Fold one registration into the block commitment and the decommitment log.
/// Runs inside the registration transaction; the consistency check has
/// already passed.
pub(crate) fn register(
    crs: &Crs,
    txn: &StoreTxn<'_>,
    id: u64,
    pk: &G1,
    helping: &HelpingValues,
) -> Result<(), RegistryError> {
    let n = crs.block_size;
    let block = crs.block_of(id);
    let slot = crs.slot_of(id);

    let count = txn.get_counter(Table::AuxCount, block)?;
    if count == n {
        return Err(RegistryError::BlockFull { block, capacity: n });
    }

    let commitment = match txn.get_g1(Table::Commitments, block)? {
        Some(current) => (current.into_group() + pk).into_affine(),
        None => *pk,
    };
    txn.put_g1(Table::Commitments, block, &commitment)?;

    for other in 0..n {
        if other == slot {
            // A registrant contributes nothing to its own slot.
            continue;
        }
        let contribution = helping
            .get(other)
            .ok_or(RegistryError::Corrupt("helping value absent for a foreign slot"))?;
        let base = log_base(crs, block, other);

        // Latest predecessor: normally at `count - 1`; the `count - 2` probe
        // only fires if an earlier write went missing, and a fresh slot
        // starts from the identity.
        let (previous, write_at) = match probe(txn, base, count)? {
            Some((value, hit)) => (Some(value), base + hit + 1),
            None => (None, base),
        };
        let value = match previous {
            Some(prev) => (prev.into_group() + contribution).into_affine(),
            None => *contribution,
        };
        txn.put_g1(Table::AuxLog, write_at, &value)?;
    }

    txn.put_counter(Table::AuxCount, block, count + 1)?;
    debug!(id, block, slot, registered = count + 1, "appended to block log");
    Ok(())
}

/// Find the newest populated log row for a slot: offset `count-1`, else
/// `count-2`. Returns the value and the offset it was found at.
fn probe(
    txn: &StoreTxn<'_>,
    base: u64,
    count: u64,
) -> Result<Option<(G1, u64)>, RegistryError> {
    for back in 1..=2u64 {
        if count < back {
            break;
        }
        let offset = count - back;
        if let Some(value) = txn.get_g1(Table::AuxLog, base + offset)? {
            return Ok(Some((value, offset)));
        }
    }
    Ok(None)
}

/// The single commitment to encrypt against; identity while the block is
/// still empty.
pub(crate) fn commitments(_crs: &Crs, store: &Store, block: u64) -> Result<Vec<G1>, StoreError> {
    Ok(vec![store
        .get_g1(Table::Commitments, block)?
        .unwrap_or_else(G1::identity)])
}

/// Every decommitment recorded for `id`'s slot, oldest first, prepended with
/// the identity (which opens a commitment no other party has joined yet).
pub(crate) fn updates(crs: &Crs, store: &Store, id: u64) -> Result<Vec<G1>, StoreError> {
    let block = crs.block_of(id);
    let slot = crs.slot_of(id);
    let count = store.get_counter(Table::AuxCount, block)?;
    let base = log_base(crs, block, slot);

    let rows = store.range_g1(Table::AuxLog, base, base + count)?;
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(G1::identity());
    out.extend(rows.into_iter().map(|(_, value)| value));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{keygen, register as api_register, UserKeys};
    use crate::{Store, Variant};
    use rand::{rngs::StdRng, SeedableRng};

    fn setup(max_users: u64) -> (Crs, Store, StdRng) {
        let mut rng = StdRng::from_seed([31; 32]);
        let crs = Crs::generate(max_users, &mut rng).unwrap();
        (crs, Store::temporary().unwrap(), rng)
    }

    fn join(crs: &Crs, store: &Store, id: u64, rng: &mut StdRng) -> UserKeys {
        let keys = keygen(crs, id, rng);
        api_register(crs, store, id, &keys.pk, &keys.helping, Variant::Regular).unwrap();
        keys
    }

    #[test]
    fn commitment_is_product_of_block_keys() {
        let (crs, store, mut rng) = setup(9); // n = 3
        let a = join(&crs, &store, 0, &mut rng);
        let b = join(&crs, &store, 2, &mut rng);
        let c = join(&crs, &store, 1, &mut rng);
        // A different block must not interfere.
        join(&crs, &store, 4, &mut rng);

        let expected = (a.pk.into_group() + b.pk + c.pk).into_affine();
        assert_eq!(store.get_g1(Table::Commitments, 0).unwrap(), Some(expected));
    }

    #[test]
    fn log_rows_are_running_products_of_foreign_contributions() {
        let (crs, store, mut rng) = setup(9); // n = 3, block 0 = ids {0,1,2}
        let first = join(&crs, &store, 0, &mut rng);
        let second = join(&crs, &store, 2, &mut rng);
        join(&crs, &store, 1, &mut rng);

        // Slot 1's decommitments accumulate χ[1] of every *other* registrant
        // in registration order; id 1's own join appends nothing to its slot.
        let base = log_base(&crs, 0, 1);
        let rows = store.range_g1(Table::AuxLog, base, base + 3).unwrap();
        let chi_first = *first.helping.get(1).unwrap();
        let chi_second = *second.helping.get(1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, chi_first);
        assert_eq!(
            rows[1].1,
            (chi_first.into_group() + chi_second).into_affine()
        );

        // Updates for id 1: identity plus both log rows.
        let upds = updates(&crs, &store, 1).unwrap();
        assert_eq!(upds.len(), 3);
        assert_eq!(upds[0], G1::identity());
        assert_eq!(upds[1], rows[0].1);
        assert_eq!(upds[2], rows[1].1);
    }

    #[test]
    fn empty_block_yields_identity_commitment_and_single_update() {
        let (crs, store, _) = setup(9);
        assert_eq!(
            commitments(&crs, &store, 2).unwrap(),
            vec![G1::identity()]
        );
        assert_eq!(updates(&crs, &store, 7).unwrap(), vec![G1::identity()]);
    }
}
