//! Deterministic randomness keyed by scenario names.
//!
//! Every random draw made while building a graph instance comes from a
//! [`ChaCha20Rng`] seeded with
//!
//! ```text
//! BLAKE3("msf-harness/graph-seed/v1" || 0x00 || utf8(key))
//! ```
//!
//! where `key` is the canonical scenario name. Integers are drawn with
//! [`uniform_below`] and lists are permuted with [`shuffle`]; both only consume
//! `next_u64` outputs, so an independent implementation of ChaCha20, BLAKE3 and
//! the two procedures below reproduces the same instances byte for byte.
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Domain separation prefix hashed in front of every seed key.
const SEED_DOMAIN: &[u8] = b"msf-harness/graph-seed/v1";

/// Derives the 32 byte ChaCha20 key for `key`.
pub fn seed_bytes(key: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(&[0]);
    hasher.update(key.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Creates the generator for `key`.
///
/// Identical keys always yield identical streams, independent of process,
/// platform or the order in which scenarios are generated.
pub fn deterministic_seed(key: &str) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed_bytes(key))
}

/// Draws an integer uniformly from `0..bound`.
///
/// Draws of `next_u64` below `(2^64 - bound) mod bound` are rejected, the
/// first accepted draw is reduced modulo `bound`.
///
/// # Panics
/// If `bound` is zero.
pub fn uniform_below<R: RngCore + ?Sized>(rng: &mut R, bound: u64) -> u64 {
    assert!(bound > 0, "uniform_below requires a positive bound");
    let threshold = bound.wrapping_neg() % bound;
    loop {
        let draw = rng.next_u64();
        if draw >= threshold {
            return draw % bound;
        }
    }
}

/// Fisher-Yates shuffle walking from the last index down to 1.
pub fn shuffle<T, R: RngCore + ?Sized>(rng: &mut R, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = uniform_below(rng, i as u64 + 1) as usize;
        items.swap(i, j);
    }
}
