//! Bloom pre-filter

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sizing parameters for the pre-filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomConfig {
    /// Expected number of identifiers
    pub capacity: usize,
    /// Target false-positive rate at `capacity`
    pub false_positive_rate: f64,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000_000,
            false_positive_rate: 0.001,
        }
    }
}

impl BloomConfig {
    /// Bit count and probe count for this configuration.
    ///
    /// m = -n ln(p) / ln(2)^2, k = (m / n) ln(2)
    pub fn dimensions(&self) -> (u64, u32) {
        let n = self.capacity.max(1) as f64;
        let p = self.false_positive_rate.clamp(1e-12, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let bits = (-n * p.ln() / (ln2 * ln2)).ceil().max(64.0) as u64;
        let hashes = ((bits as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;
        (bits, hashes)
    }
}

/// A classic Bloom filter over string identifiers.
///
/// Probes use Kirsch-Mitzenmacher double hashing over the two halves of a
/// SHA-256 digest prefix.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    count: usize,
}

impl BloomFilter {
    /// Create an empty filter sized for `config`
    pub fn new(config: &BloomConfig) -> Self {
        let (num_bits, num_hashes) = config.dimensions();
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: vec![0u64; words],
            num_bits,
            num_hashes,
            count: 0,
        }
    }

    /// Build a filter holding every item. Sized for at least `items.len()`.
    pub fn from_items(items: &[String], config: &BloomConfig) -> Self {
        let sized = BloomConfig {
            capacity: config.capacity.max(items.len()),
            ..*config
        };
        let mut filter = Self::new(&sized);

        // Digesting dominates, bit-setting is cheap
        let digests: Vec<(u64, u64)> = items.par_iter().map(|item| digest(item)).collect();
        for (h1, h2) in digests {
            filter.set_probes(h1, h2);
        }
        filter.count = items.len();
        filter
    }

    /// Add an identifier
    pub fn insert(&mut self, item: &str) {
        let (h1, h2) = digest(item);
        self.set_probes(h1, h2);
        self.count += 1;
    }

    /// `false` means definitely absent; `true` means possibly present
    pub fn may_contain(&self, item: &str) -> bool {
        let (h1, h2) = digest(item);
        (0..self.num_hashes).all(|i| {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    /// Number of insertions
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Memory used by the bit array
    pub fn size_bytes(&self) -> usize {
        self.bits.len() * 8
    }

    fn set_probes(&mut self, h1: u64, h2: u64) {
        for i in 0..self.num_hashes {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

fn digest(item: &str) -> (u64, u64) {
    let hash = Sha256::digest(item.as_bytes());
    let mut lo = [0u8; 8];
    let mut hi = [0u8; 8];
    lo.copy_from_slice(&hash[..8]);
    hi.copy_from_slice(&hash[8..16]);
    // Odd stride so probes never collapse onto one bit
    (u64::from_le_bytes(lo), u64::from_le_bytes(hi) | 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> BloomConfig {
        BloomConfig {
            capacity: 1_000,
            false_positive_rate: 0.01,
        }
    }

    #[test]
    fn test_dimensions() {
        let (bits, hashes) = BloomConfig::default().dimensions();
        // 10M at 0.1% is roughly 14.4 bits per element and 10 probes
        assert!((143_000_000..145_000_000).contains(&bits));
        assert_eq!(hashes, 10);
    }

    #[test]
    fn test_degenerate_config_is_usable() {
        let config = BloomConfig {
            capacity: 0,
            false_positive_rate: 0.0,
        };
        let mut filter = BloomFilter::new(&config);
        filter.insert("a");
        assert!(filter.may_contain("a"));
    }

    #[test]
    fn test_no_false_negatives() {
        let items: Vec<String> = (0..1_000).map(|i| format!("addr-{i}")).collect();
        let filter = BloomFilter::from_items(&items, &small());

        assert_eq!(filter.len(), 1_000);
        assert!(items.iter().all(|item| filter.may_contain(item)));
    }

    #[test]
    fn test_overfull_filter_grows() {
        let items: Vec<String> = (0..5_000).map(|i| format!("addr-{i}")).collect();
        let filter = BloomFilter::from_items(&items, &small());

        assert!(filter.num_bits() > small().dimensions().0);
        assert!(items.iter().all(|item| filter.may_contain(item)));
    }

    #[test]
    fn test_false_positive_rate_is_near_target() {
        let items: Vec<String> = (0..1_000).map(|i| format!("in-{i}")).collect();
        let filter = BloomFilter::from_items(&items, &small());

        let false_positives = (0..10_000)
            .filter(|i| filter.may_contain(&format!("out-{i}")))
            .count();
        // 1% target; allow generous slack
        assert!(false_positives < 300, "{} false positives", false_positives);
    }

    #[test]
    fn test_empty_filter_rejects() {
        let filter = BloomFilter::new(&small());
        assert!(filter.is_empty());
        assert!(!filter.may_contain("anything"));
    }
}
