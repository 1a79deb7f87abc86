//! Efficient variant — logarithmic merge levels and the promotion log
//!
//! Block `k` spreads its registrants over at most `t = ⌈log₂ n⌉` levels of
//! commitments over disjoint user groups. Level 0 carries the oldest and
//! largest group; a new registrant lands one level past the occupied prefix.
//! Whenever the two trailing levels cover groups of equal size they merge,
//! and the cascade repeats — after `r` registrations the occupied levels are
//! exactly `popcount(r)` many, their group sizes the binary decomposition of
//! `r` in descending order. The product of all level commitments always
//! equals the single commitment the regular variant would hold.
//!
//! A merge destroys the commitment a user's live decommitment was valid
//! against. Any slot registered within a group being merged therefore has its
//! pre-merge decommitment **promoted** into the append-only log `L` first;
//! that log is what lets a recipient open a ciphertext produced against a
//! commitment that has since been merged away. Ciphertexts only ever target
//! committed level states, so promoting the lower group at each cascade step
//! covers every commitment that was observable between registrations.

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup};
use tracing::debug;

use crate::crs::Crs;
use crate::registry::{HelpingValues, RegistryError};
use crate::store::{Store, StoreError, StoreTxn, Table};
use crate::G1;

/// Place one registration at the first free level, then run the merge
/// cascade. Runs inside the registration transaction.
pub(crate) fn register(
    crs: &Crs,
    txn: &StoreTxn<'_>,
    id: u64,
    pk: &G1,
    helping: &HelpingValues,
) -> Result<(), RegistryError> {
    let n = crs.block_size;
    let block = crs.block_of(id);

    let parties = txn.get_counter(Table::BlockCount, block)?;
    if parties == n {
        return Err(RegistryError::BlockFull { block, capacity: n });
    }
    // Occupied levels form the prefix [0, popcount(parties)); the new
    // singleton goes one past it.
    let level = parties.count_ones() as u8;

    txn.put_g1(Table::LevelCommitments(level), block, pk)?;
    txn.put_counter(Table::BlockCount, block, parties + 1)?;
    txn.put_counter(Table::LevelCount, block * n + u64::from(level), 1)?;

    for slot in 0..n {
        let row = block * n + slot;
        let value = if row == id {
            // The registrant's own slot holds no useful decommitment.
            G1::identity()
        } else {
            *helping
                .get(slot)
                .ok_or(RegistryError::Corrupt("helping value absent for a foreign slot"))?
        };
        txn.put_g1(Table::LevelAux(level), row, &value)?;
    }
    txn.put_counter(Table::LevelRegistered(level), id, 1)?;

    debug!(id, block, level, parties = parties + 1, "placed singleton commitment");
    merge(crs, txn, block, level)
}

/// Merge level `last` into `last - 1` if both cover groups of the same size,
/// then recurse towards level 0.
fn merge(crs: &Crs, txn: &StoreTxn<'_>, block: u64, last: u8) -> Result<(), RegistryError> {
    if last == 0 {
        return Ok(());
    }
    let n = crs.block_size;
    let count_row = block * n + u64::from(last);
    let count_last = txn.get_counter(Table::LevelCount, count_row)?;
    let count_prev = txn.get_counter(Table::LevelCount, count_row - 1)?;
    if count_last == 0 || count_last != count_prev {
        return Ok(());
    }

    let last_com = txn
        .get_g1(Table::LevelCommitments(last), block)?
        .ok_or(RegistryError::Corrupt("merge source commitment missing"))?;
    let prev_com = txn
        .get_g1(Table::LevelCommitments(last - 1), block)?
        .ok_or(RegistryError::Corrupt("merge target commitment missing"))?;
    let merged = (prev_com.into_group() + last_com).into_affine();
    txn.put_g1(Table::LevelCommitments(last - 1), block, &merged)?;
    txn.del(Table::LevelCommitments(last), block)?;
    txn.put_counter(Table::LevelCount, count_row - 1, count_prev + count_last)?;
    txn.put_counter(Table::LevelCount, count_row, 0)?;

    for slot in 0..n {
        let row = block * n + slot;
        let prev_aux = txn
            .get_g1(Table::LevelAux(last - 1), row)?
            .unwrap_or_else(G1::identity);
        let last_aux = txn
            .get_g1(Table::LevelAux(last), row)?
            .unwrap_or_else(G1::identity);
        let in_prev = txn.get_counter(Table::LevelRegistered(last - 1), row)?;
        let in_last = txn.get_counter(Table::LevelRegistered(last), row)?;

        if in_prev == 1 {
            // This slot registered inside the lower group: its decommitment
            // against that group's commitment is about to stop matching any
            // stored commitment, so it moves to the promotion log.
            let seq = txn.get_counter(Table::PromotionCount, row)?;
            txn.put_g1(Table::PromotionLog, seq * crs.max_users + row, &prev_aux)?;
            txn.put_counter(Table::PromotionCount, row, seq + 1)?;
        }

        txn.put_g1(
            Table::LevelAux(last - 1),
            row,
            &(prev_aux.into_group() + last_aux).into_affine(),
        )?;
        if in_prev == 1 || in_last == 1 {
            txn.put_counter(Table::LevelRegistered(last - 1), row, 1)?;
        }
        txn.del(Table::LevelAux(last), row)?;
        txn.del(Table::LevelRegistered(last), row)?;
    }

    debug!(
        block,
        from = last,
        into = last - 1,
        group_size = count_prev + count_last,
        "merged adjacent levels"
    );
    merge(crs, txn, block, last - 1)
}

/// One commitment per level, identity where the level is empty. Encryption
/// targets all of them; exactly one will be openable by the recipient.
pub(crate) fn commitments(crs: &Crs, store: &Store, block: u64) -> Result<Vec<G1>, StoreError> {
    (0..crs.levels)
        .map(|level| {
            Ok(store
                .get_g1(Table::LevelCommitments(level as u8), block)?
                .unwrap_or_else(G1::identity))
        })
        .collect()
}

/// The `2t` update candidates for `id`: positions `[0, t)` are promoted
/// decommitments from the log `L` (oldest first), positions `[t, 2t)` the
/// live per-level decommitments. Absent cells read as the identity.
pub(crate) fn updates(crs: &Crs, store: &Store, id: u64) -> Result<Vec<G1>, StoreError> {
    let t = u64::from(crs.levels);
    let block = crs.block_of(id);
    let slot = crs.slot_of(id);
    let row = block * crs.block_size + slot;

    let mut out = vec![G1::identity(); (2 * t) as usize];
    for i in 0..t {
        if let Some(promoted) = store.get_g1(Table::PromotionLog, i * crs.max_users + row)? {
            out[i as usize] = promoted;
        }
        if let Some(live) = store.get_g1(Table::LevelAux(i as u8), row)? {
            out[(t + i) as usize] = live;
        }
    }
    Ok(out)
}

/// Group size per level for one block, level 0 first. Diagnostic surface for
/// the demo walkthrough and the structure tests.
pub(crate) fn level_population(
    crs: &Crs,
    store: &Store,
    block: u64,
) -> Result<Vec<u64>, StoreError> {
    (0..u64::from(crs.levels))
        .map(|level| store.get_counter(Table::LevelCount, block * crs.block_size + level))
        .collect()
}
