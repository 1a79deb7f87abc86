//! Algorithm surface — `setup / keygen / register / encrypt / fetch_updates /
//! decrypt`
//!
//! This module wraps the bookkeeping core with the six operations the scheme
//! exposes. The split of responsibilities:
//!
//! - the **curator** runs `setup` once and `register` for every join; it
//!   holds the store but never any secret key;
//! - a **sender** needs only the reference string, the store's committed
//!   public parameters and the recipient's id to `encrypt`;
//! - a **recipient** keeps `sk` from `keygen`, pulls `fetch_updates`
//!   occasionally and runs `decrypt` offline. A [`Decryption::GetUpdate`]
//!   outcome means "fetch newer updates and retry", never an error.
//!
//! All randomness is taken from caller-supplied RNGs so that deterministic
//! schedules can be replayed in tests.

#![forbid(unsafe_code)]

use ark_ec::CurveGroup;
use ark_ff::Field;
use rand::{CryptoRng, Rng};

use crate::crs::{Crs, OnExisting, SetupError};
use crate::group;
use crate::registry::{self, HelpingValues, RegistryError};
use crate::store::{Store, StoreError, Table};
use crate::{efficient, regular, Ciphertext, Gt, Variant, Zr, G1};

/// Errors raised by the read-side operations (`encrypt`, `fetch_updates`,
/// `decrypt`).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The id does not fit the system capacity fixed at setup.
    #[error("id {id} exceeds the system capacity of {max_users} users")]
    IdOutOfRange {
        /// Offending id.
        id: u64,
        /// Capacity `N`.
        max_users: u64,
    },
    /// Ciphertext / update lists have shapes `decrypt` cannot try.
    #[error("malformed ciphertext or update shape: {0}")]
    MalformedCiphertext(&'static str),
    /// The secret key is zero and cannot unblind anything.
    #[error("secret key is not invertible")]
    NonInvertibleSecretKey,
    /// The store failed while reading public parameters.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Output of `keygen`: the public half goes to the curator, `sk` stays with
/// the user.
#[derive(Clone, Debug)]
pub struct UserKeys {
    /// Public key, `h1[idx]·sk`.
    pub pk: G1,
    /// Secret key; never leaves the user.
    pub sk: Zr,
    /// Helping values the curator folds into other slots' decommitments.
    pub helping: HelpingValues,
}

/// Outcome of `decrypt`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decryption {
    /// The plaintext; some `(ciphertext, update)` pair satisfied the
    /// decommitment equation.
    Message(Gt),
    /// No pair matched: the updates predate the ciphertext (or the recipient
    /// was not yet registered when it was produced). Fetch updates and retry.
    GetUpdate,
}

impl Decryption {
    /// The recovered plaintext, if any.
    pub fn message(self) -> Option<Gt> {
        match self {
            Decryption::Message(m) => Some(m),
            Decryption::GetUpdate => None,
        }
    }
}

/// Serialized footprint of the curator's state, for auditing the sub-linear
/// growth of the public material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParameterSizes {
    /// Reference string, canonical compressed form.
    pub crs_bytes: u64,
    /// All commitment cells (`pp`).
    pub public_parameters_bytes: u64,
    /// All live decommitment cells (`aux`).
    pub auxiliary_bytes: u64,
    /// Promoted decommitments (`L`; efficient variant only).
    pub promotion_log_bytes: u64,
    /// The key book.
    pub key_book_bytes: u64,
}

/// Create the system: sample the reference string, persist it, and leave the
/// bookkeeping tables in their empty (all counters zero) state.
///
/// The trapdoor behind the h-vector is dropped inside [`Crs::generate`]. If
/// `store` already holds a reference string the `on_existing` policy decides
/// between reusing it (capacity and variant must match) and refusing; there
/// is no silent-reset path.
pub fn setup<R: Rng + CryptoRng>(
    store: &Store,
    max_users: u64,
    variant: Variant,
    on_existing: OnExisting,
    rng: &mut R,
) -> Result<Crs, SetupError> {
    if Crs::is_initialised(store)? {
        return match on_existing {
            OnExisting::Refuse => Err(SetupError::AlreadyInitialised),
            OnExisting::Reuse => {
                let (crs, stored_variant) = Crs::load(store)?;
                if crs.max_users != max_users {
                    return Err(SetupError::MaxUsersMismatch {
                        stored: crs.max_users,
                        requested: max_users,
                    });
                }
                if stored_variant != variant {
                    return Err(SetupError::VariantMismatch {
                        stored: stored_variant,
                        requested: variant,
                    });
                }
                Ok(crs)
            }
        };
    }
    let crs = Crs::generate(max_users, rng)?;
    crs.persist(store, variant)?;
    Ok(crs)
}

/// Generate a keypair and helping values for identity `id`.
///
/// Deterministic given the RNG stream: `pk = h1[idx]·sk` and
/// `χ[n-1-j] = h1[idx+j+1]·sk` wherever that h-slot exists. The one missing
/// coordinate is the registrant's own slot — the h-vector hole lands there.
pub fn keygen<R: Rng + CryptoRng>(crs: &Crs, id: u64, rng: &mut R) -> UserKeys {
    let n = crs.block_size;
    let idx = crs.slot_of(id);
    let sk = group::random_scalar(rng);
    let pk = (*crs.h1(idx) * sk).into_affine();

    let mut values = vec![None; n as usize];
    for j in 0..n {
        if let Some(h) = crs.h1_opt(idx + j + 1) {
            values[(n - 1 - j) as usize] = Some((*h * sk).into_affine());
        }
    }
    UserKeys { pk, sk, helping: HelpingValues::new(values) }
}

/// Register `(id, pk, χ)` with the curator.
///
/// The helping values are verified against `pk` before any write; a failed
/// registration of any kind leaves the store byte-identical. All writes —
/// including a full merge cascade in the efficient variant — commit in one
/// transaction.
pub fn register(
    crs: &Crs,
    store: &Store,
    id: u64,
    pk: &G1,
    helping: &HelpingValues,
    variant: Variant,
) -> Result<(), RegistryError> {
    if id >= crs.max_users {
        return Err(RegistryError::IdOutOfRange { id, max_users: crs.max_users });
    }
    registry::check_helping_values(crs, pk, helping)?;
    store.transaction(|txn| {
        registry::record_public_key(txn, id, pk)?;
        match variant {
            Variant::Regular => regular::register(crs, txn, id, pk, helping),
            Variant::Efficient => efficient::register(crs, txn, id, pk, helping),
        }
    })
}

/// Encrypt `m` to identity `id` under the current public parameters.
///
/// Returns one tuple per commitment: a single one in the regular variant,
/// `t` in the efficient variant (empty levels encrypt against the identity
/// and are unopenable, which is harmless). All tuples share one `r`; the
/// recipient needs exactly one matching tuple.
pub fn encrypt<R: Rng + CryptoRng>(
    crs: &Crs,
    store: &Store,
    id: u64,
    m: &Gt,
    variant: Variant,
    rng: &mut R,
) -> Result<Vec<Ciphertext>, CryptoError> {
    if id >= crs.max_users {
        return Err(CryptoError::IdOutOfRange { id, max_users: crs.max_users });
    }
    let n = crs.block_size;
    let block = crs.block_of(id);
    let idx = crs.slot_of(id);

    let commitments = match variant {
        Variant::Regular => regular::commitments(crs, store, block)?,
        Variant::Efficient => efficient::commitments(crs, store, block)?,
    };

    let r = group::random_scalar(rng);
    let h2_slot = *crs.h2(n - 1 - idx);
    let ct2 = (crs.g2 * r).into_affine();
    let ct3 = *m + group::pairing(*crs.h1(idx), h2_slot) * r;

    Ok(commitments
        .into_iter()
        .map(|c| Ciphertext { ct0: c, ct1: group::pairing(c, h2_slot) * r, ct2, ct3 })
        .collect())
}

/// Fetch the decommitment candidates `id` needs for decryption.
///
/// Regular variant: the identity followed by every decommitment logged for
/// the slot so far. Efficient variant: `2t` candidates — promoted log
/// entries first, live per-level decommitments second.
pub fn fetch_updates(
    crs: &Crs,
    store: &Store,
    id: u64,
    variant: Variant,
) -> Result<Vec<G1>, CryptoError> {
    if id >= crs.max_users {
        return Err(CryptoError::IdOutOfRange { id, max_users: crs.max_users });
    }
    let updates = match variant {
        Variant::Regular => regular::updates(crs, store, id)?,
        Variant::Efficient => efficient::updates(crs, store, id)?,
    };
    Ok(updates)
}

/// Try to decrypt `cts` with the candidates in `updates`.
///
/// For each pair the decommitment equation
/// `e(ct0, h2[n-1-idx]) = e(u, g2) + e(h1[idx], h2[n-1-idx])·sk`
/// is tested; the first match unblinds the plaintext. With `upd_idx` set,
/// only that single candidate is tried. No match is the ordinary
/// [`Decryption::GetUpdate`] outcome; malformed shapes are errors.
pub fn decrypt(
    crs: &Crs,
    id: u64,
    sk: &Zr,
    updates: &[G1],
    cts: &[Ciphertext],
    upd_idx: Option<usize>,
) -> Result<Decryption, CryptoError> {
    if id >= crs.max_users {
        return Err(CryptoError::IdOutOfRange { id, max_users: crs.max_users });
    }
    if cts.is_empty() {
        return Err(CryptoError::MalformedCiphertext("empty ciphertext list"));
    }
    if updates.is_empty() {
        return Err(CryptoError::MalformedCiphertext("empty update list"));
    }
    let candidates = match upd_idx {
        Some(i) => updates
            .get(i..=i)
            .ok_or(CryptoError::MalformedCiphertext("update index out of range"))?,
        None => updates,
    };

    let n = crs.block_size;
    let idx = crs.slot_of(id);
    let h2_slot = *crs.h2(n - 1 - idx);
    let sk_term = group::pairing(*crs.h1(idx) * *sk, h2_slot);
    let sk_inv = sk.inverse().ok_or(CryptoError::NonInvertibleSecretKey)?;

    for ct in cts {
        let lhs = group::pairing(ct.ct0, h2_slot);
        for u in candidates {
            if lhs == group::pairing(*u, crs.g2) + sk_term {
                let mask = ct.ct1 - group::pairing(*u, ct.ct2);
                return Ok(Decryption::Message(ct.ct3 - mask * sk_inv));
            }
        }
    }
    Ok(Decryption::GetUpdate)
}

/// Serialized footprint of the system's public material.
pub fn parameter_sizes(
    crs: &Crs,
    store: &Store,
    variant: Variant,
) -> Result<ParameterSizes, StoreError> {
    let (public_parameters_bytes, auxiliary_bytes) = match variant {
        Variant::Regular => (
            store.table_bytes(Table::Commitments)?,
            store.table_bytes(Table::AuxLog)?,
        ),
        Variant::Efficient => {
            let mut pp = 0;
            let mut aux = 0;
            for level in 0..crs.levels {
                pp += store.table_bytes(Table::LevelCommitments(level as u8))?;
                aux += store.table_bytes(Table::LevelAux(level as u8))?;
            }
            (pp, aux)
        }
    };
    Ok(ParameterSizes {
        crs_bytes: crs.serialized_size_bytes() as u64,
        public_parameters_bytes,
        auxiliary_bytes,
        promotion_log_bytes: store.table_bytes(Table::PromotionLog)?,
        key_book_bytes: store.table_bytes(Table::Keys)?,
    })
}

// ===========================================================================
// Scenario tests — deterministic end-to-end schedules
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::AffineRepr;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn fresh(max_users: u64, variant: Variant, seed: u8) -> (Crs, Store, StdRng) {
        let mut rng = StdRng::from_seed([seed; 32]);
        let store = Store::temporary().unwrap();
        let crs = setup(&store, max_users, variant, OnExisting::Refuse, &mut rng).unwrap();
        (crs, store, rng)
    }

    fn join(crs: &Crs, store: &Store, id: u64, variant: Variant, rng: &mut StdRng) -> UserKeys {
        let keys = keygen(crs, id, rng);
        register(crs, store, id, &keys.pk, &keys.helping, variant).unwrap();
        keys
    }

    /// The occupied levels of a block must form a prefix of length
    /// `popcount(count)` whose group sizes are the binary decomposition of
    /// `count`, largest first; all later levels must be empty.
    fn assert_counter_structure(crs: &Crs, store: &Store, block: u64) {
        let n = crs.block_size;
        let count = store.get_counter(Table::BlockCount, block).unwrap();
        let occupied = u64::from(count.count_ones());
        let mut remaining = count;
        for level in 0..u64::from(crs.levels) {
            let commitment = store
                .get_g1(Table::LevelCommitments(level as u8), block)
                .unwrap();
            let size = store.get_counter(Table::LevelCount, block * n + level).unwrap();
            if level < occupied {
                let expected = 1u64 << (63 - remaining.leading_zeros());
                assert!(commitment.is_some(), "level {level} should be occupied");
                assert_eq!(size, expected, "group size at level {level}");
                remaining -= expected;
            } else {
                assert!(commitment.is_none(), "level {level} should be empty");
                assert_eq!(size, 0, "group size at empty level {level}");
            }
        }
        assert_eq!(remaining, 0, "level sizes must sum to the block count");
    }

    fn round_trip(
        crs: &Crs,
        store: &Store,
        keys: &UserKeys,
        id: u64,
        variant: Variant,
        rng: &mut StdRng,
    ) {
        let m = group::random_message(rng);
        let cts = encrypt(crs, store, id, &m, variant, rng).unwrap();
        let upds = fetch_updates(crs, store, id, variant).unwrap();
        let out = decrypt(crs, id, &keys.sk, &upds, &cts, None).unwrap();
        assert_eq!(out, Decryption::Message(m), "round trip for id {id}");
    }

    #[test]
    fn s1_regular_out_of_order_registrations_round_trip() {
        let variant = Variant::Regular;
        let (crs, store, mut rng) = fresh(4, variant, 51);

        let mut users = Vec::new();
        for id in [3u64, 1, 0, 2] {
            let keys = join(&crs, &store, id, variant, &mut rng);
            // Encrypt, update and decrypt immediately after each join.
            round_trip(&crs, &store, &keys, id, variant, &mut rng);
            users.push((id, keys));
        }
        // Everyone can still decrypt fresh ciphertexts at the end.
        for (id, keys) in &users {
            round_trip(&crs, &store, keys, *id, variant, &mut rng);
        }
        // Ciphertext shape: exactly one tuple per call.
        let m = group::random_message(&mut rng);
        assert_eq!(encrypt(&crs, &store, 0, &m, variant, &mut rng).unwrap().len(), 1);
    }

    #[test]
    fn s2_efficient_counter_structure_holds_after_every_registration() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(100, variant, 52);

        let mut ids: Vec<u64> = (0..100).collect();
        ids.shuffle(&mut rng);

        let mut keys_by_id = std::collections::BTreeMap::new();
        for &id in &ids {
            let keys = join(&crs, &store, id, variant, &mut rng);
            assert_counter_structure(&crs, &store, crs.block_of(id));
            keys_by_id.insert(id, keys);
        }

        // Every block is full: 10 = 0b1010 users, so two occupied levels of
        // sizes 8 and 2.
        for block in 0..crs.blocks {
            assert_eq!(store.get_counter(Table::BlockCount, block).unwrap(), 10);
            assert_eq!(
                efficient::level_population(&crs, &store, block).unwrap(),
                vec![8, 2, 0, 0]
            );

            // Product over occupied levels equals the product of the block's
            // public keys.
            let mut acc = G1::identity().into_group();
            for level in 0..crs.levels {
                if let Some(c) = store
                    .get_g1(Table::LevelCommitments(level as u8), block)
                    .unwrap()
                {
                    acc += c;
                }
            }
            let mut expected = G1::identity().into_group();
            for id in block * 10..(block + 1) * 10 {
                expected += keys_by_id[&id].pk;
            }
            assert_eq!(acc.into_affine(), expected.into_affine());
        }

        // And the system still decrypts end to end.
        for id in [0u64, 37, 99] {
            round_trip(&crs, &store, &keys_by_id[&id], id, variant, &mut rng);
        }
    }

    #[test]
    fn s3_decryption_survives_merges_via_the_promotion_log() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(100, variant, 53);
        let t = crs.levels as usize;

        for id in 0..3 {
            join(&crs, &store, id, variant, &mut rng);
        }
        let target = join(&crs, &store, 3, variant, &mut rng);
        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 3, &m, variant, &mut rng).unwrap();
        assert_eq!(cts.len(), t);

        // Five more registrations cascade several merges over the target's
        // level.
        for id in 4..9 {
            join(&crs, &store, id, variant, &mut rng);
        }

        let upds = fetch_updates(&crs, &store, 3, variant).unwrap();
        assert_eq!(upds.len(), 2 * t);
        let out = decrypt(&crs, 3, &target.sk, &upds, &cts, None).unwrap();
        assert_eq!(out, Decryption::Message(m));

        // The matching candidate sits in the promoted half: the commitment
        // the sender used has been merged away since.
        let matching: Vec<usize> = (0..upds.len())
            .filter(|&i| {
                decrypt(&crs, 3, &target.sk, &upds, &cts, Some(i)).unwrap()
                    == Decryption::Message(m)
            })
            .collect();
        assert!(!matching.is_empty());
        assert!(matching.iter().all(|&i| i < t), "match must come from the log half");
    }

    #[test]
    fn s4_rejected_registration_leaves_the_store_byte_identical() {
        for (variant, seed) in [(Variant::Regular, 54u8), (Variant::Efficient, 55)] {
            let (crs, store, mut rng) = fresh(16, variant, seed);
            join(&crs, &store, 0, variant, &mut rng);

            let mut keys = keygen(&crs, 1, &mut rng);
            // Swap one checked helping value for a random point.
            let garbage =
                (G1::generator() * group::random_scalar(&mut rng)).into_affine();
            keys.helping.values[2] = Some(garbage);

            let before = store.digest().unwrap();
            let err = register(&crs, &store, 1, &keys.pk, &keys.helping, variant).unwrap_err();
            assert!(matches!(err, RegistryError::InconsistentHelpingValues));
            assert_eq!(store.digest().unwrap(), before, "store must be untouched");

            // A duplicate id rolls back the same way.
            let again = keygen(&crs, 0, &mut rng);
            let err = register(&crs, &store, 0, &again.pk, &again.helping, variant).unwrap_err();
            assert!(matches!(err, RegistryError::DuplicateId(0)));
            assert_eq!(store.digest().unwrap(), before);
        }
    }

    #[test]
    fn s5_explicit_update_index_selects_a_single_candidate() {
        let variant = Variant::Regular;
        let (crs, store, mut rng) = fresh(4, variant, 56); // n = 2

        let first = join(&crs, &store, 0, variant, &mut rng);
        join(&crs, &store, 1, variant, &mut rng);

        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 0, &m, variant, &mut rng).unwrap();
        let upds = fetch_updates(&crs, &store, 0, variant).unwrap();
        assert_eq!(upds.len(), 2);

        // The identity candidate predates the second registration: no match.
        assert_eq!(
            decrypt(&crs, 0, &first.sk, &upds, &cts, Some(0)).unwrap(),
            Decryption::GetUpdate
        );
        // The logged decommitment opens the current commitment.
        assert_eq!(
            decrypt(&crs, 0, &first.sk, &upds, &cts, Some(1)).unwrap(),
            Decryption::Message(m)
        );
        // Out-of-range index is a shape error, not a GetUpdate.
        assert!(matches!(
            decrypt(&crs, 0, &first.sk, &upds, &cts, Some(7)),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn s6_full_blocks_collapse_to_a_single_commitment() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(16, variant, 57); // n = 4, t = 2

        let mut keys_by_id = std::collections::BTreeMap::new();
        for id in 0..16 {
            keys_by_id.insert(id, join(&crs, &store, id, variant, &mut rng));
        }

        for block in 0..crs.blocks {
            let mut expected = G1::identity().into_group();
            for id in block * 4..(block + 1) * 4 {
                expected += keys_by_id[&id].pk;
            }
            assert_eq!(
                store.get_g1(Table::LevelCommitments(0), block).unwrap(),
                Some(expected.into_affine()),
                "block {block} collapses into level 0"
            );
            for level in 1..crs.levels {
                assert!(store
                    .get_g1(Table::LevelCommitments(level as u8), block)
                    .unwrap()
                    .is_none());
            }
            assert_eq!(
                efficient::level_population(&crs, &store, block).unwrap(),
                vec![4, 0]
            );
        }

        round_trip(&crs, &store, &keys_by_id[&9], 9, variant, &mut rng);
    }

    #[test]
    fn decryption_is_idempotent() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(16, variant, 58);
        let keys = join(&crs, &store, 2, variant, &mut rng);
        join(&crs, &store, 0, variant, &mut rng);

        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 2, &m, variant, &mut rng).unwrap();
        let upds = fetch_updates(&crs, &store, 2, variant).unwrap();

        let first = decrypt(&crs, 2, &keys.sk, &upds, &cts, None).unwrap();
        let second = decrypt(&crs, 2, &keys.sk, &upds, &cts, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Decryption::Message(m));
    }

    #[test]
    fn encrypting_before_registration_yields_get_update() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(16, variant, 59);
        join(&crs, &store, 0, variant, &mut rng);
        join(&crs, &store, 1, variant, &mut rng);

        // Id 2 has keys but never registered.
        let keys = keygen(&crs, 2, &mut rng);
        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 2, &m, variant, &mut rng).unwrap();
        let upds = fetch_updates(&crs, &store, 2, variant).unwrap();
        assert_eq!(
            decrypt(&crs, 2, &keys.sk, &upds, &cts, None).unwrap(),
            Decryption::GetUpdate
        );

        // After registering and re-encrypting, the same user succeeds.
        register(&crs, &store, 2, &keys.pk, &keys.helping, variant).unwrap();
        round_trip(&crs, &store, &keys, 2, variant, &mut rng);
    }

    #[test]
    fn stale_updates_yield_get_update_until_refetched() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(16, variant, 60);
        let keys = join(&crs, &store, 0, variant, &mut rng);
        let stale = fetch_updates(&crs, &store, 0, variant).unwrap();

        // A later registration merges id 0's singleton away; a ciphertext
        // against the merged commitment cannot be opened with stale updates.
        join(&crs, &store, 1, variant, &mut rng);
        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 0, &m, variant, &mut rng).unwrap();
        assert_eq!(
            decrypt(&crs, 0, &keys.sk, &stale, &cts, None).unwrap(),
            Decryption::GetUpdate
        );

        let current = fetch_updates(&crs, &store, 0, variant).unwrap();
        assert_eq!(
            decrypt(&crs, 0, &keys.sk, &current, &cts, None).unwrap(),
            Decryption::Message(m)
        );
    }

    #[test]
    fn block_full_is_rejected() {
        for (variant, table, seed) in [
            (Variant::Regular, Table::AuxCount, 61u8),
            (Variant::Efficient, Table::BlockCount, 62),
        ] {
            let (crs, store, mut rng) = fresh(16, variant, seed);
            // Force the full-block counter; ids of block 0 are then refused.
            store.put_counter(table, 0, crs.block_size).unwrap();
            let keys = keygen(&crs, 0, &mut rng);
            assert!(matches!(
                register(&crs, &store, 0, &keys.pk, &keys.helping, variant),
                Err(RegistryError::BlockFull { block: 0, .. })
            ));
        }
    }

    #[test]
    fn ids_beyond_capacity_are_rejected_everywhere() {
        let variant = Variant::Regular;
        let (crs, store, mut rng) = fresh(4, variant, 63);
        let keys = keygen(&crs, 1, &mut rng);
        let m = group::random_message(&mut rng);

        assert!(matches!(
            register(&crs, &store, 4, &keys.pk, &keys.helping, variant),
            Err(RegistryError::IdOutOfRange { id: 4, .. })
        ));
        assert!(matches!(
            encrypt(&crs, &store, 4, &m, variant, &mut rng),
            Err(CryptoError::IdOutOfRange { id: 4, .. })
        ));
        assert!(matches!(
            decrypt(&crs, 4, &keys.sk, &[G1::identity()], &[], None),
            Err(CryptoError::IdOutOfRange { id: 4, .. })
        ));
    }

    #[test]
    fn empty_shapes_are_malformed_not_get_update() {
        let (crs, store, mut rng) = fresh(4, Variant::Regular, 64);
        let keys = join(&crs, &store, 0, Variant::Regular, &mut rng);
        let m = group::random_message(&mut rng);
        let cts = encrypt(&crs, &store, 0, &m, Variant::Regular, &mut rng).unwrap();

        assert!(matches!(
            decrypt(&crs, 0, &keys.sk, &[], &cts, None),
            Err(CryptoError::MalformedCiphertext(_))
        ));
        assert!(matches!(
            decrypt(&crs, 0, &keys.sk, &[G1::identity()], &[], None),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn setup_policies_never_silently_reset() {
        let mut rng = StdRng::from_seed([65; 32]);
        let store = Store::temporary().unwrap();
        let crs = setup(&store, 16, Variant::Efficient, OnExisting::Refuse, &mut rng).unwrap();

        assert!(matches!(
            setup(&store, 16, Variant::Efficient, OnExisting::Refuse, &mut rng),
            Err(SetupError::AlreadyInitialised)
        ));
        let reused = setup(&store, 16, Variant::Efficient, OnExisting::Reuse, &mut rng).unwrap();
        assert_eq!(reused, crs);

        assert!(matches!(
            setup(&store, 25, Variant::Efficient, OnExisting::Reuse, &mut rng),
            Err(SetupError::MaxUsersMismatch { stored: 16, requested: 25 })
        ));
        assert!(matches!(
            setup(&store, 16, Variant::Regular, OnExisting::Reuse, &mut rng),
            Err(SetupError::VariantMismatch { .. })
        ));
    }

    #[test]
    fn parameter_sizes_reflect_registered_state() {
        let variant = Variant::Efficient;
        let (crs, store, mut rng) = fresh(16, variant, 66);
        let empty = parameter_sizes(&crs, &store, variant).unwrap();
        assert_eq!(empty.public_parameters_bytes, 0);
        assert_eq!(empty.key_book_bytes, 0);
        assert_eq!(empty.crs_bytes, crs.serialized_size_bytes() as u64);

        for id in 0..4 {
            join(&crs, &store, id, variant, &mut rng);
        }
        let sizes = parameter_sizes(&crs, &store, variant).unwrap();
        // A full block holds one 48-byte commitment and n live decommitments.
        assert_eq!(sizes.public_parameters_bytes, 48);
        assert_eq!(sizes.auxiliary_bytes, 4 * 48);
        assert_eq!(sizes.key_book_bytes, 4 * 48);
        assert!(sizes.promotion_log_bytes > 0);
    }
}
