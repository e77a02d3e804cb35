//! Simhash: a 64-bit locality-sensitive fingerprint used for idempotent
//! dedup on `(simhash, tenant)`.

use std::collections::HashMap;

/// Canonicalize and tokenize content into lowercase alphanumeric runs.
/// Shared with the query path's Jaccard token-overlap score so both sides
/// of a comparison use the same notion of a token.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Deterministic 64-bit fingerprint of `content`. Identical content always
/// produces the same hash; changing content changes the hash with high
/// probability proportional to how much of the token multiset changed.
pub fn simhash(content: &str) -> u64 {
    let tokens = tokenize(content);
    if tokens.is_empty() {
        return 0;
    }

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for t in &tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut bit_weights = [0i64; 64];
    for (token, weight) in counts {
        let hash = token_hash(token);
        for (bit, slot) in bit_weights.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *slot += weight as i64;
            } else {
                *slot -= weight as i64;
            }
        }
    }

    let mut result: u64 = 0;
    for (bit, weight) in bit_weights.iter().enumerate() {
        if *weight > 0 {
            result |= 1 << bit;
        }
    }
    result
}

fn token_hash(token: &str) -> u64 {
    let digest = blake3::hash(token.as_bytes());
    u64::from_le_bytes(digest.as_bytes()[..8].try_into().unwrap())
}

/// Hamming distance between two fingerprints, for callers that want a
/// near-duplicate threshold rather than exact equality.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
