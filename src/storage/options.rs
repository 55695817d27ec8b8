use serde::{Deserialize, Serialize};

use crate::types::{MapError, Result};

/// Largest depth a leaf may reach; every bit of the 32-bit hash is consumed.
pub const MAX_DEPTH: u32 = 32;

/// Largest depth the minimum-concurrency floor may request.
pub const MAX_MIN_DEPTH: u32 = MAX_DEPTH - 1;

/// Entries a leaf holds before it splits. Sized so a leaf fits a 4K page.
pub const DEFAULT_SPLIT_THRESHOLD: u32 = 98;

/// Entries at or below which a leaf tries to fold into its sibling.
pub const DEFAULT_MERGE_THRESHOLD: u32 = 16;

/// Maximum slots in a directory node.
pub const DEFAULT_DIRECTORY_SIZE: u32 = 32;

/// Leaves the map exposes up front.
pub const DEFAULT_MIN_CONCURRENCY: u32 = DEFAULT_DIRECTORY_SIZE;

/// Buckets per leaf; must be a power of two.
pub const DEFAULT_LEAF_CAPACITY: u32 = 1 << 8;

/// Configuration knobs for a [`super::ScalableHashMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapOptions {
    /// Number of concurrent writers the fresh map should accommodate without
    /// touching shared nodes. Determines the minimum leaf depth.
    pub min_concurrency: u32,
    /// Buckets per leaf table (power of two).
    pub leaf_capacity: u32,
    /// Leaf size that triggers a split.
    pub split_threshold: u32,
    /// Leaf size at or below which a merge is attempted.
    pub merge_threshold: u32,
    /// Maximum slots per directory node (power of two, at least two).
    pub directory_size: u32,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            min_concurrency: DEFAULT_MIN_CONCURRENCY,
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            directory_size: DEFAULT_DIRECTORY_SIZE,
        }
    }
}

impl MapOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum concurrency.
    pub fn min_concurrency(mut self, writers: u32) -> Self {
        self.min_concurrency = writers;
        self
    }

    /// Sets the number of buckets per leaf.
    pub fn leaf_capacity(mut self, buckets: u32) -> Self {
        self.leaf_capacity = buckets;
        self
    }

    /// Sets the split threshold.
    pub fn split_threshold(mut self, entries: u32) -> Self {
        self.split_threshold = entries;
        self
    }

    /// Sets the merge threshold.
    pub fn merge_threshold(mut self, entries: u32) -> Self {
        self.merge_threshold = entries;
        self
    }

    /// Sets the maximum directory width in slots.
    pub fn directory_size(mut self, slots: u32) -> Self {
        self.directory_size = slots;
        self
    }

    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: MapOptions =
            toml::from_str(text).map_err(|err| MapError::Config(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Checks every parameter before any node is created.
    pub fn validate(&self) -> Result<()> {
        if self.min_concurrency == 0 {
            return Err(MapError::InvalidConfig(
                "minimum concurrency must be greater than zero",
            ));
        }
        if self.leaf_capacity == 0 || !self.leaf_capacity.is_power_of_two() {
            return Err(MapError::InvalidConfig(
                "leaf capacity must be a power of two",
            ));
        }
        if self.split_threshold == 0 {
            return Err(MapError::InvalidConfig(
                "split threshold must be greater than zero",
            ));
        }
        if self.merge_threshold >= self.split_threshold {
            return Err(MapError::InvalidConfig(
                "merge threshold must be below the split threshold",
            ));
        }
        if self.directory_size < 2 || !self.directory_size.is_power_of_two() {
            return Err(MapError::InvalidConfig(
                "directory size must be a power of two of at least two",
            ));
        }
        Ok(())
    }

    /// Depth every leaf must reach so the map exposes at least
    /// `min_concurrency` leaves.
    pub fn min_depth(&self) -> u32 {
        required_bits(self.min_concurrency).min(MAX_MIN_DEPTH)
    }

    /// Bits a full directory resolves in one hop.
    pub fn dir_bits(&self) -> u32 {
        required_bits(self.directory_size)
    }

    /// Bits used to index a leaf's bucket table.
    pub fn leaf_bits(&self) -> u32 {
        required_bits(self.leaf_capacity)
    }
}

/// Smallest `b` with `2^b >= n`.
pub(crate) fn required_bits(n: u32) -> u32 {
    debug_assert!(n > 0);
    32 - (n - 1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = MapOptions::default();
        options.validate().unwrap();
        assert_eq!(options.min_depth(), 5);
        assert_eq!(options.dir_bits(), 5);
        assert_eq!(options.leaf_bits(), 8);
    }

    #[test]
    fn required_bits_rounds_up() {
        assert_eq!(required_bits(1), 0);
        assert_eq!(required_bits(2), 1);
        assert_eq!(required_bits(3), 2);
        assert_eq!(required_bits(32), 5);
        assert_eq!(required_bits(33), 6);
        assert_eq!(required_bits(u32::MAX), 32);
    }

    #[test]
    fn min_depth_is_capped() {
        let options = MapOptions::new().min_concurrency(u32::MAX);
        assert_eq!(options.min_depth(), MAX_MIN_DEPTH);
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        let bad = [
            MapOptions::new().min_concurrency(0),
            MapOptions::new().leaf_capacity(0),
            MapOptions::new().leaf_capacity(12),
            MapOptions::new().split_threshold(0).merge_threshold(0),
            MapOptions::new().split_threshold(8).merge_threshold(8),
            MapOptions::new().directory_size(1),
            MapOptions::new().directory_size(24),
        ];
        for options in bad {
            assert!(
                matches!(options.validate(), Err(MapError::InvalidConfig(_))),
                "{options:?} should be rejected"
            );
        }
    }

    #[test]
    fn toml_overrides_defaults() {
        let options = MapOptions::from_toml_str(
            r#"
            split_threshold = 3
            merge_threshold = 1
            leaf_capacity = 4
            "#,
        )
        .unwrap();
        assert_eq!(options.split_threshold, 3);
        assert_eq!(options.merge_threshold, 1);
        assert_eq!(options.leaf_capacity, 4);
        assert_eq!(options.directory_size, DEFAULT_DIRECTORY_SIZE);
    }

    #[test]
    fn toml_errors_are_reported() {
        assert!(matches!(
            MapOptions::from_toml_str("split_threshold = \"many\""),
            Err(MapError::Config(_))
        ));
        assert!(matches!(
            MapOptions::from_toml_str("leaf_capacity = 3"),
            Err(MapError::InvalidConfig(_))
        ));
    }
}
