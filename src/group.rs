//! Pairing group layer — BLS12-381, canonical encodings, samplers
//!
//! Everything above this module treats group elements as opaque: exponentiate,
//! multiply, pair, serialise. The pairing is Type-3 (no efficient homomorphism
//! `G2 → G1`), which the helping-value consistency check depends on.
//!
//! Encodings are Arkworks canonical **compressed** form: 48 bytes for `G1`,
//! 96 for `G2`. Decoding validates that the point is on the curve and in the
//! correct subgroup; a cell that fails to decode is treated as store
//! corruption by the callers, never silently skipped.

#![forbid(unsafe_code)]

use ark_bls12_381::Bls12_381;
use ark_ec::pairing::Pairing;
use ark_ff::UniformRand;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::{CryptoRng, Rng};

use crate::{Gt, Zr, G1, G2};

/// A group element failed to decode from its canonical byte form.
#[derive(Debug, thiserror::Error)]
#[error("malformed group element encoding: {0}")]
pub struct CodecError(
    /// What failed to decode, and why.
    pub String,
);

/// Evaluate the Type-3 pairing `e(p, q)`.
#[inline]
pub fn pairing(p: impl Into<<Bls12_381 as Pairing>::G1Prepared>, q: impl Into<<Bls12_381 as Pairing>::G2Prepared>) -> Gt {
    Bls12_381::pairing(p, q)
}

/// Sample a uniform scalar (secret keys, encryption randomness, trapdoors).
#[inline]
pub fn random_scalar<R: Rng + CryptoRng>(rng: &mut R) -> Zr {
    Zr::rand(rng)
}

/// Sample a uniform target-group element; plaintexts are sampled this way in
/// tests and in the demo walkthrough.
#[inline]
pub fn random_message<R: Rng + CryptoRng>(rng: &mut R) -> Gt {
    Gt::rand(rng)
}

/// Canonical compressed encoding of a `G1` element.
pub fn encode_g1(p: &G1) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(48);
    p.serialize_compressed(&mut bytes).expect("serialize G1");
    bytes
}

/// Decode a `G1` element; validates curve and subgroup membership.
pub fn decode_g1(bytes: &[u8]) -> Result<G1, CodecError> {
    G1::deserialize_compressed(bytes).map_err(|e| CodecError(format!("G1: {e}")))
}

/// Canonical compressed encoding of a `G2` element.
pub fn encode_g2(p: &G2) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(96);
    p.serialize_compressed(&mut bytes).expect("serialize G2");
    bytes
}

/// Decode a `G2` element; validates curve and subgroup membership.
pub fn decode_g2(bytes: &[u8]) -> Result<G2, CodecError> {
    G2::deserialize_compressed(bytes).map_err(|e| CodecError(format!("G2: {e}")))
}
