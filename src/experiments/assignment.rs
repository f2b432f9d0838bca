//! Sticky weighted assignment of users to variants.
//!
//! The first successful assignment of a `(test, user)` pair is written to the
//! [`AssignmentTable`]; every later lookup returns the stored variant, so
//! editing the traffic split never moves users who were already bucketed.

use std::collections::HashMap;

use dashmap::DashMap;
use rand::Rng;

use crate::config::AssignmentStrategy;

/// Picks a variant index for a draw `r` in `[0, 100)`: walk the weights in
/// declaration order and take the first whose cumulative weight reaches `r`.
/// Falls back to the first variant if the weights never get there.
pub fn pick_variant(traffic_split: &[u32], r: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, &weight) in traffic_split.iter().enumerate() {
        cumulative += weight as f64;
        if cumulative >= r {
            return i;
        }
    }
    0
}

/// Uniform draw in `[0, 100)`.
pub fn random_draw() -> f64 {
    rand::thread_rng().gen_range(0.0..100.0)
}

const HASH_BUCKETS: u64 = 10_000;

/// Draw in `(0, 100)` derived from MurmurHash3 of `test_id:user_id`. The same
/// pair always lands in the same bucket, with 0.01-point resolution.
pub fn hashed_draw(test_id: &str, user_id: &str, seed: u64) -> f64 {
    let key = format!("{}:{}", test_id, user_id);
    let (h1, _) = murmurhash3_128(key.as_bytes(), seed);
    bucket_midpoint(h1 % HASH_BUCKETS)
}

/// Centre of a 0.01-point bucket, so an integer split of `w` points owns
/// exactly `w * 100` buckets under the cumulative `>=` walk.
fn bucket_midpoint(bucket: u64) -> f64 {
    (bucket as f64 + 0.5) / 100.0
}

pub fn draw(strategy: AssignmentStrategy, test_id: &str, user_id: &str, seed: u64) -> f64 {
    match strategy {
        AssignmentStrategy::Random => random_draw(),
        AssignmentStrategy::Hashed => hashed_draw(test_id, user_id, seed),
    }
}

/// user id → (test id → variant id).
#[derive(Debug, Default)]
pub struct AssignmentTable {
    users: DashMap<String, HashMap<String, String>>,
}

impl AssignmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, test_id: &str, user_id: &str) -> Option<String> {
        self.users
            .get(user_id)
            .and_then(|tests| tests.get(test_id).cloned())
    }

    /// Returns the stored variant for the pair, or stores and returns the one
    /// produced by `choose`. The user's entry stays locked for the duration,
    /// so concurrent first contacts cannot disagree.
    pub fn get_or_assign(
        &self,
        test_id: &str,
        user_id: &str,
        choose: impl FnOnce() -> String,
    ) -> (String, bool) {
        if let Some(existing) = self.get(test_id, user_id) {
            return (existing, false);
        }
        let mut tests = self.users.entry(user_id.to_string()).or_default();
        match tests.get(test_id) {
            Some(existing) => (existing.clone(), false),
            None => {
                let variant_id = choose();
                tests.insert(test_id.to_string(), variant_id.clone());
                (variant_id, true)
            }
        }
    }

    pub fn for_user(&self, user_id: &str) -> HashMap<String, String> {
        self.users
            .get(user_id)
            .map(|tests| tests.clone())
            .unwrap_or_default()
    }

    /// Drops every assignment to `test_id`, and users left with none.
    /// Returns how many assignments were removed.
    pub fn purge_test(&self, test_id: &str) -> usize {
        let mut removed = 0;
        self.users.retain(|_, tests| {
            if tests.remove(test_id).is_some() {
                removed += 1;
            }
            !tests.is_empty()
        });
        removed
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub(crate) fn export(&self) -> HashMap<String, HashMap<String, String>> {
        self.users
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub(crate) fn import(&self, users: HashMap<String, HashMap<String, String>>) {
        for (user, tests) in users {
            if !tests.is_empty() {
                self.users.insert(user, tests);
            }
        }
    }
}

/// MurmurHash3_x64_128. Returns (h1, h2); h1 is used for bucketing.
pub(crate) fn murmurhash3_128(data: &[u8], seed: u64) -> (u64, u64) {
    const C1: u64 = 0x87c37b91114253d5;
    const C2: u64 = 0x4cf5ad432745937f;

    let len = data.len();
    let mut h1 = seed;
    let mut h2 = seed;

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let k1 = read_u64_le(&block[..8]);
        let k2 = read_u64_le(&block[8..]);

        h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    // Tail: up to 15 bytes, low 8 into k1 and the rest into k2.
    let tail = blocks.remainder();
    if tail.len() > 8 {
        let k2 = read_u64_le(&tail[8..]);
        h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
    }
    if !tail.is_empty() {
        let k1 = read_u64_le(&tail[..tail.len().min(8)]);
        h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
    }

    h1 ^= len as u64;
    h2 ^= len as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Little-endian read of up to 8 bytes, zero-padded.
fn read_u64_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)))
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}
