//! Deterministic randomness for episode generation.
//!
//! Every seed is a pure function of its inputs: episode seeds hash the
//! `(date, subject kind, slug)` tuple, child seeds are HMAC-derived from a
//! parent seed and an ordered label tuple, and all sampling runs on
//! independently seeded ChaCha streams. Nothing here reads the clock.

use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::constants::SEED_DOMAIN;

fn length_prefix(bytes: &[u8]) -> [u8; 8] {
    u64::try_from(bytes.len()).unwrap_or(u64::MAX).to_le_bytes()
}

/// Hash an ordered tuple of string parts into a seed.
///
/// Parts are length-prefixed, so `["ab", "c"]` and `["a", "bc"]` never collide.
#[must_use]
pub fn seed_from_parts<S: AsRef<str>>(parts: &[S]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(SEED_DOMAIN);
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.write(&length_prefix(bytes));
        hasher.write(bytes);
    }
    hasher.finish()
}

/// Derive a child seed from a parent seed and an ordered label tuple.
#[must_use]
pub fn derive_seed(base: u64, labels: &[&str]) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&base.to_le_bytes()).expect("HMAC accepts any key length");
    for label in labels {
        let bytes = label.as_bytes();
        mac.update(&length_prefix(bytes));
        mac.update(bytes);
    }
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Reproducible random stream seeded from a single `u64`.
#[derive(Debug, Clone)]
pub struct SeededRng {
    rng: ChaCha20Rng,
}

impl SeededRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Next float in `[0, 1)`.
    pub fn next_float(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    /// Uniform index in `0..upper`; returns 0 when `upper` is 0.
    pub fn next_below(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        self.rng.gen_range(0..upper)
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Permuted copy of `items`; identical `(items, seed)` always yields the same order.
#[must_use]
pub fn shuffle<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(&mut SeededRng::new(seed));
    out
}

/// Deterministic sample of up to `count` items without replacement.
#[must_use]
pub fn sample<T: Clone>(items: &[T], count: usize, seed: u64) -> Vec<T> {
    let mut out = shuffle(items, seed);
    out.truncate(count);
    out
}

/// Deterministic pick of one element.
#[must_use]
pub fn pick<T>(items: &[T], seed: u64) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let idx = SeededRng::new(seed).next_below(items.len());
    items.get(idx)
}
