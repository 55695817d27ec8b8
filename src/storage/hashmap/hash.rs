//! Two-stage key hashing and prefix-bit helpers.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Folds a deterministic 64-bit digest of `key` down to 32 bits.
///
/// The digest must not vary between processes because routing decisions
/// are persisted alongside the tree, so a randomly seeded hasher is not an
/// option here.
pub fn native_hash<K: Hash + ?Sized>(key: &K) -> u32 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    let digest = hasher.finish();
    (digest ^ (digest >> 32)) as u32
}

/// Diffuses low-order differences into the high-order bits that routing
/// consumes first.
pub fn spread(hash: u32) -> u32 {
    let mut h = hash;
    h ^= h << 20;
    h ^= h << 12;
    h ^ (h << 7) ^ (h << 4)
}

/// The routing hash of `key`.
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> u32 {
    spread(native_hash(key))
}

/// The top `bits` bits of `value`.
pub(crate) fn high_bits(value: u32, bits: u32) -> u32 {
    if bits == 0 {
        0
    } else {
        value >> (32 - bits)
    }
}

/// `bits` bits of `hash` starting after the first `depth` consumed bits,
/// zero-filled past the end of the hash.
pub(crate) fn prefix_bits(hash: u32, depth: u32, bits: u32) -> u32 {
    high_bits(hash.checked_shl(depth).unwrap_or(0), bits)
}

/// Bit `depth` of `hash`, counting from the most significant bit.
pub(crate) fn bit_at(hash: u32, depth: u32) -> bool {
    debug_assert!(depth < 32);
    (hash >> (31 - depth)) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_key("alpha"), hash_key("alpha"));
        assert_eq!(hash_key(&42u64), hash_key(&42u64));
        assert_eq!(hash_key("alpha"), hash_key(&String::from("alpha")));
        assert_eq!(spread(0), 0);
    }

    #[test]
    fn spread_reaches_high_bits() {
        let prefixes: HashSet<u32> = (0..1024)
            .map(|i| high_bits(hash_key(&format!("key-{i}")), 4))
            .collect();
        assert_eq!(prefixes.len(), 16);
    }

    #[test]
    fn prefix_helpers_consume_from_the_top() {
        let hash = 0b1011_0000_0000_0000_0000_0000_0000_0001u32;
        assert_eq!(high_bits(hash, 0), 0);
        assert_eq!(high_bits(hash, 4), 0b1011);
        assert_eq!(prefix_bits(hash, 1, 3), 0b011);
        assert_eq!(prefix_bits(hash, 30, 4), 0b0100);
        assert_eq!(prefix_bits(hash, 32, 4), 0);
        assert!(bit_at(hash, 0));
        assert!(!bit_at(hash, 1));
        assert!(bit_at(hash, 31));
    }
}
