//! Mergeable single-pass accumulators.
//!
//! Every accumulator here has a `merge` that is associative, so row
//! partitions can be summarized independently and combined in partition
//! order. Memory is bounded by caps, never by row count.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Running count, extremes, mean and sum of squared deviations (Welford).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Moments {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Moments {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Chan et al. pairwise combination.
    pub fn merge(&mut self, other: &Moments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;
        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Sample standard deviation (n - 1 denominator).
    pub fn sample_std_dev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

/// Distinct value count: exact up to a cap, then saturated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DistinctCounter {
    cap: usize,
    seen: BTreeSet<u64>,
    saturated: bool,
}

impl DistinctCounter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            seen: BTreeSet::new(),
            saturated: false,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.saturated {
            return;
        }
        // -0.0 and 0.0 are the same value.
        let canonical = if value == 0.0 { 0.0f64 } else { value };
        self.seen.insert(canonical.to_bits());
        self.check_cap();
    }

    pub fn merge(&mut self, other: &DistinctCounter) {
        if self.saturated {
            return;
        }
        if other.saturated {
            self.saturate();
            return;
        }
        self.seen.extend(other.seen.iter().copied());
        self.check_cap();
    }

    pub fn cardinality(&self) -> Cardinality {
        if self.saturated {
            Cardinality::AtLeast(self.cap as u64)
        } else {
            Cardinality::Exact(self.seen.len() as u64)
        }
    }

    fn check_cap(&mut self) {
        if self.seen.len() > self.cap {
            self.saturate();
        }
    }

    fn saturate(&mut self) {
        self.saturated = true;
        self.seen.clear();
    }
}

/// Number of distinct values in a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exact distinct count.
    Exact(u64),
    /// More distinct values than the tracking cap.
    AtLeast(u64),
}

/// Frequency of each code of a folded group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodeCounter {
    pub counts: Vec<u64>,
    pub sentinel: u64,
}

impl CodeCounter {
    pub fn new(members: usize) -> Self {
        Self {
            counts: vec![0; members],
            sentinel: 0,
        }
    }

    pub fn merge(&mut self, other: &CodeCounter) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.sentinel += other.sentinel;
    }
}

/// Label frequencies keeping the `cap` smallest labels; the rest go to `other`.
///
/// Keeping the smallest labels (not the first seen) makes the result
/// independent of row order and partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelCounter {
    cap: usize,
    pub counts: BTreeMap<i64, u64>,
    pub other: u64,
    pub missing: u64,
}

impl LabelCounter {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            counts: BTreeMap::new(),
            other: 0,
            missing: 0,
        }
    }

    pub fn push(&mut self, label: i64) {
        self.add(label, 1);
    }

    pub fn merge(&mut self, other: &LabelCounter) {
        for (&label, &count) in &other.counts {
            self.add(label, count);
        }
        self.other += other.other;
        self.missing += other.missing;
    }

    fn add(&mut self, label: i64, count: u64) {
        if let Some(c) = self.counts.get_mut(&label) {
            *c += count;
            return;
        }
        if self.counts.len() < self.cap {
            self.counts.insert(label, count);
            return;
        }
        match self.counts.last_key_value() {
            Some((&largest, _)) if label < largest => {
                if let Some(evicted) = self.counts.remove(&largest) {
                    self.other += evicted;
                }
                self.counts.insert(label, count);
            }
            _ => self.other += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_moments_match_single_pass() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin() * 100.0).collect();
        let mut whole = Moments::default();
        values.iter().for_each(|&v| whole.push(v));

        let mut merged = Moments::default();
        for chunk in values.chunks(77) {
            let mut part = Moments::default();
            chunk.iter().for_each(|&v| part.push(v));
            merged.merge(&part);
        }
        assert_eq!(merged.count, whole.count);
        assert_eq!(merged.min, whole.min);
        assert_eq!(merged.max, whole.max);
        assert!((merged.mean - whole.mean).abs() < 1e-9);
        assert!((merged.m2 - whole.m2).abs() / whole.m2 < 1e-9);
    }

    #[test]
    fn sample_std_dev_uses_n_minus_one() {
        let mut m = Moments::default();
        [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .iter()
            .for_each(|&v| m.push(v));
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((m.sample_std_dev().unwrap() - expected).abs() < 1e-12);

        let mut single = Moments::default();
        single.push(1.0);
        assert_eq!(single.sample_std_dev(), None);
    }

    #[test]
    fn distinct_counter_saturates_at_cap() {
        let mut d = DistinctCounter::new(3);
        [1.0, 2.0, 2.0, -0.0, 0.0].iter().for_each(|&v| d.push(v));
        assert_eq!(d.cardinality(), Cardinality::Exact(3));
        d.push(5.0);
        assert_eq!(d.cardinality(), Cardinality::AtLeast(3));
    }

    #[test]
    fn label_counter_is_order_independent() {
        let labels = [7, 1, 5, 3, 3, 9, 1, 2, 8, 5];
        let mut forward = LabelCounter::new(3);
        labels.iter().for_each(|&l| forward.push(l));
        let mut backward = LabelCounter::new(3);
        labels.iter().rev().for_each(|&l| backward.push(l));

        assert_eq!(forward, backward);
        assert_eq!(
            forward.counts.into_iter().collect::<Vec<_>>(),
            vec![(1, 2), (2, 1), (3, 2)]
        );
        assert_eq!(forward.other, 5);
    }
}
