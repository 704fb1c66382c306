// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lock-free probabilistic set membership.

use std::f64::consts::LN_2;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::fast::FixedState;

const MIN_BITS: usize = 64;

/// A Bloom filter sized from an expected item count and a target false-positive rate.
///
/// Bit positions come from a single 64-bit hash using Kirsch-Mitzenmacher double hashing,
/// `h_i(x) = h1(x) + i * h2(x)`. Insertions and queries are lock-free and can run concurrently.
/// Items cannot be removed, so the filter never reports a false negative.
///
/// The default hasher is seeded with a fixed value, which makes two filters built with the same
/// parameters agree bit for bit.
///
/// # Examples
///
/// ```
/// use peercache::BloomFilter;
///
/// let filter = BloomFilter::with_rate(1_000, 0.01);
/// filter.insert(&"alice");
///
/// assert!(filter.might_contain(&"alice"));
/// ```
pub struct BloomFilter<S = FixedState> {
    words: Box<[AtomicU64]>,
    bits: usize,
    hashes: u32,
    hasher: S,
}

impl BloomFilter {
    /// Creates a filter expected to hold `expected_items` with a false-positive rate of about
    /// `false_positive_rate` once full.
    #[must_use]
    pub fn with_rate(expected_items: usize, false_positive_rate: f64) -> Self {
        Self::with_rate_and_hasher(expected_items, false_positive_rate, FixedState::default())
    }
}

impl<S: BuildHasher> BloomFilter<S> {
    /// Like [`with_rate`](BloomFilter::with_rate), hashing items with `hasher`.
    ///
    /// The filter uses `m = ceil(-n ln p / ln² 2)` bits and `k = round(m / n · ln 2)` hash
    /// functions, at least one. The rate is clamped into the open interval `(0, 1)`.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "sizing is approximate and the results are clamped to valid ranges"
    )]
    pub fn with_rate_and_hasher(expected_items: usize, false_positive_rate: f64, hasher: S) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);

        let bits = ((-n * p.ln() / (LN_2 * LN_2)).ceil() as usize).max(MIN_BITS);
        let hashes = ((bits as f64 / n) * LN_2).round().max(1.0) as u32;

        let words: Vec<AtomicU64> = (0..bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();

        Self {
            words: words.into_boxed_slice(),
            bits,
            hashes,
            hasher,
        }
    }

    /// Adds `item` to the set.
    pub fn insert<T: Hash + ?Sized>(&self, item: &T) {
        let (h1, h2) = self.hash_pair(item);
        for i in 0..self.hashes {
            let (word, mask) = self.locate(h1, h2, i);
            self.words[word].fetch_or(mask, Ordering::Relaxed);
        }
    }

    /// Returns `false` if `item` was certainly never inserted, `true` if it may have been.
    #[must_use]
    pub fn might_contain<T: Hash + ?Sized>(&self, item: &T) -> bool {
        let (h1, h2) = self.hash_pair(item);
        (0..self.hashes).all(|i| {
            let (word, mask) = self.locate(h1, h2, i);
            self.words[word].load(Ordering::Relaxed) & mask != 0
        })
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Returns the number of hash functions applied per item.
    #[must_use]
    pub fn hashes(&self) -> u32 {
        self.hashes
    }

    fn hash_pair<T: Hash + ?Sized>(&self, item: &T) -> (u64, u64) {
        let hash = self.hasher.hash_one(item);
        (hash, hash.rotate_left(32))
    }

    #[expect(clippy::cast_possible_truncation, reason = "the remainder is below the bit count, a usize")]
    fn locate(&self, h1: u64, h2: u64, i: u32) -> (usize, u64) {
        let bit = (h1.wrapping_add(h2.wrapping_mul(u64::from(i))) % self.bits as u64) as usize;
        (bit / 64, 1 << (bit % 64))
    }
}

impl<S> fmt::Debug for BloomFilter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bits", &self.bits)
            .field("hashes", &self.hashes)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn sizing_follows_rate() {
        // n = 1000, p = 0.01: m = 9586 bits, k = 7.
        let filter = BloomFilter::with_rate(1_000, 0.01);
        assert_eq!(filter.bits(), 9_586);
        assert_eq!(filter.hashes(), 7);
    }

    #[test]
    fn tiny_filters_have_a_floor() {
        let filter = BloomFilter::with_rate(0, 0.5);
        assert_eq!(filter.bits(), 64);
        assert!(filter.hashes() >= 1);
    }

    #[test]
    fn out_of_range_rates_are_clamped() {
        let certain = BloomFilter::with_rate(100, 1.5);
        assert!(certain.hashes() >= 1);

        let impossible = BloomFilter::with_rate(100, 0.0);
        assert!(impossible.bits() > 100);
    }

    #[test]
    fn no_false_negatives() {
        let filter = BloomFilter::with_rate(10_000, 0.01);
        for i in 0..10_000 {
            filter.insert(&i);
        }
        for i in 0..10_000 {
            assert!(filter.might_contain(&i), "item {i} must be reported");
        }
    }

    #[test]
    fn false_positive_rate_is_close_to_target() {
        let filter = BloomFilter::with_rate(10_000, 0.01);
        for i in 0..10_000 {
            filter.insert(&format!("present-{i}"));
        }

        let false_positives = (0..10_000).filter(|i| filter.might_contain(&format!("absent-{i}"))).count();

        // Target is 1%; allow for variance.
        assert!(false_positives < 300, "{false_positives} false positives out of 10000");
    }

    #[test]
    fn unsized_items() {
        let filter = BloomFilter::with_rate(10, 0.01);
        filter.insert("key");
        assert!(filter.might_contain("key"));
        assert!(filter.might_contain(&String::from("key")));
    }

    #[test]
    fn concurrent_inserts() {
        let filter = BloomFilter::with_rate(40_000, 0.01);
        thread::scope(|s| {
            for t in 0..4_u64 {
                let filter = &filter;
                s.spawn(move || {
                    for i in 0..10_000 {
                        filter.insert(&(t * 100_000 + i));
                    }
                });
            }
        });

        for t in 0..4_u64 {
            for i in 0..10_000 {
                assert!(filter.might_contain(&(t * 100_000 + i)));
            }
        }
    }

    #[test]
    fn same_parameters_same_bits() {
        let a = BloomFilter::with_rate(100, 0.01);
        let b = BloomFilter::with_rate(100, 0.01);
        a.insert("x");
        b.insert("x");
        assert!(b.might_contain("x"));
        for (wa, wb) in a.words.iter().zip(b.words.iter()) {
            assert_eq!(wa.load(Ordering::Relaxed), wb.load(Ordering::Relaxed));
        }
    }
}
