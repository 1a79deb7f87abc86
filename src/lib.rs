//! Crate root: public surface, core aliases, and scheme-wide invariants
//!
//! This module is the **single canonical entry-point** for downstream users of
//! the library. It centralizes the group aliases over BLS12-381, the ciphertext
//! type, and re-exports the submodules that implement registration-based
//! encryption (RBE) with sub-linear public parameters.
//!
//! ## Invariants
//!
//! - **Groups.** The pairing is Type-3 over BLS12-381: `e: G1 × G2 → GT`, all
//!   three groups of the same prime order. Group arithmetic is written
//!   additively, as provided by Arkworks; we **forbid unsafe** throughout the
//!   crate. Canonical encodings are Arkworks compressed serialisation.
//!
//! - **Reference string.** `Setup` derives the h-vector
//!   `h1[i] = g1·z^{i+1}`, `h2[i] = g2·z^{i+1}` for `i ∈ [0, 2n)` from a
//!   one-shot trapdoor `z` that is dropped before `Setup` returns. The slot at
//!   index `n` is a deliberate hole; reading it is a programmer error and
//!   panics.
//!
//! - **Commitment consistency.** Every non-empty commitment cell equals the
//!   sum of the public keys registered into it, and every decommitment `u`
//!   stored beside a commitment `C` for slot `idx` satisfies
//!   `e(C, h2[n-1-idx]) = e(u, g2) + e(h1[idx], h2[n-1-idx])·sk`.
//!   Decryption verifies nothing else.
//!
//! - **Atomicity.** All writes of a single registration, including a full
//!   merge cascade, commit in one store transaction. A failed registration
//!   leaves the store byte-identical.
//!
//! The key curator is a single writer; concurrent registrations are not
//! supported. Readers only ever observe committed snapshots.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

/// Pairing group wrappers: canonical encodings, samplers, pairing evaluation.
pub mod group;
/// Table-structured persistent store with per-registration transactions.
pub mod store;
/// Common reference string: h-vector construction, persistence, reuse policy.
pub mod crs;
/// Registration plumbing shared by both variants: helping-value consistency
/// check, key book, error taxonomy.
pub mod registry;
/// Regular variant: one commitment per block, chronological decommitment log.
pub mod regular;
/// Efficient variant: logarithmic merge levels and the promotion log.
pub mod efficient;
/// Algorithm surface: `setup / keygen / register / encrypt / fetch_updates /
/// decrypt`.
pub mod api;

// ============================================================================
// Canonical aliases (centralization)
// ============================================================================

/// Scalar field of BLS12-381 (`ZR` in the scheme description).
pub type Zr = ark_bls12_381::Fr;

/// G1 affine group element; public keys, commitments and decommitments live
/// here.
pub type G1 = ark_bls12_381::G1Affine;

/// G2 affine group element; the verification side of the h-vector.
pub type G2 = ark_bls12_381::G2Affine;

/// Target group of the pairing; plaintexts are `Gt` elements.
pub type Gt = ark_ec::pairing::PairingOutput<ark_bls12_381::Bls12_381>;

// ============================================================================
// Scheme-wide types
// ============================================================================

/// Which bookkeeping structure the curator maintains.
///
/// Both variants share `keygen`, the consistency check and the decryption
/// equation; they differ in how commitments and decommitments are laid out in
/// the store and therefore in the shape of `encrypt` / `fetch_updates` output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// One commitment per block; updates grow linearly with the block.
    Regular,
    /// Per-block merge levels; commitments and updates stay logarithmic.
    Efficient,
}

/// One RBE ciphertext tuple.
///
/// `encrypt` returns one tuple per commitment it encrypted against: a single
/// tuple in the regular variant, one per merge level in the efficient variant.
/// All tuples of one call share the same encryption randomness.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Ciphertext {
    /// The commitment this tuple was produced against.
    pub ct0: G1,
    /// `e(ct0, h2[n-1-idx])·r`.
    pub ct1: Gt,
    /// `g2·r`.
    pub ct2: G2,
    /// `m + e(h1[idx], h2[n-1-idx])·r` — the blinded plaintext.
    pub ct3: Gt,
}

impl Ciphertext {
    /// Size of this tuple under canonical compressed encoding.
    pub fn serialized_size_bytes(&self) -> usize {
        self.ct0.compressed_size()
            + self.ct1.compressed_size()
            + self.ct2.compressed_size()
            + self.ct3.compressed_size()
    }
}

// ============================================================================
// Root-level re-exports
// ============================================================================

pub use crate::api::{
    decrypt, encrypt, fetch_updates, keygen, parameter_sizes, register, setup, CryptoError,
    Decryption, ParameterSizes, UserKeys,
};
pub use crate::crs::{Crs, OnExisting, SetupError};
pub use crate::registry::{HelpingValues, RegistryError};
pub use crate::store::{Store, StoreError, Table};
