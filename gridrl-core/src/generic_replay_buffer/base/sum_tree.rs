//! Sum tree for prioritized sampling.
//!
//! Code is adapted from <https://github.com/jaromiru/AI-blog/blob/master/SumTree.py> and
//! <https://github.com/openai/baselines/blob/master/baselines/deepq/replay_buffer.py>
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};
use serde::{Deserialize, Serialize};

/// How importance sampling weights are normalized.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Normalize by the maximal weight over all stored samples.
    All,

    /// Normalize by the maximal weight within the batch.
    Batch,
}

/// Sum tree of priorities with min/max side trees.
///
/// Priorities are stored to the power `alpha`; the running maximum of raw
/// priorities is kept for initializing fresh entries.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_samples: usize,
    tree: Vec<f32>,
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
    max_raw_tree: SegmentPoint<f32, MaxIgnoreNaN>,
    normalize: WeightNormalizer,
}

impl SumTree {
    /// Creates a sum tree with the given capacity and priority exponent.
    pub fn new(capacity: usize, alpha: f32, normalize: WeightNormalizer) -> Self {
        Self {
            eps: 1e-8,
            alpha,
            capacity,
            n_samples: 0,
            tree: vec![0f32; 2 * capacity - 1],
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_raw_tree: SegmentPoint::build(vec![1e-8f32; capacity], MaxIgnoreNaN),
            normalize,
        }
    }

    fn propagate(&mut self, ix: usize, change: f32) {
        let parent = (ix - 1) / 2;
        self.tree[parent] += change;
        if parent != 0 {
            self.propagate(parent, change);
        }
    }

    fn retrieve(&self, ix: usize, s: f32) -> usize {
        let left = 2 * ix + 1;
        let right = left + 1;

        if left >= self.tree.len() {
            return ix;
        }

        if s <= self.tree[left] || self.tree[right] == 0f32 {
            self.retrieve(left, s)
        } else {
            self.retrieve(right, s - self.tree[left])
        }
    }

    /// Sum of the stored (exponentiated) priorities.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Maximum raw priority currently stored, used for fresh entries.
    ///
    /// Defaults to 1.0 while the tree is empty, so the first transitions
    /// start at a full priority.
    pub fn max(&self) -> f32 {
        if self.n_samples == 0 {
            1.0
        } else {
            self.max_raw_tree.query(0, self.n_samples)
        }
    }

    /// Adds the priority value `p` at the `ix`-th element.
    ///
    /// The alpha-th power of the priority value is stored.
    pub fn add(&mut self, ix: usize, p: f32) {
        debug_assert!(ix <= self.n_samples);

        self.update(ix, p);

        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority value at the `ix`-th element.
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);

        self.max_raw_tree.modify(ix, p);
        let p = (p + self.eps).powf(self.alpha);
        self.min_tree.modify(ix, p);
        let ix = ix + self.capacity - 1;
        let change = p - self.tree[ix];
        self.tree[ix] = p;
        if ix != 0 {
            self.propagate(ix, change);
        }
    }

    /// Gets the maximal index where the prefix sum of priorities is below `s`.
    pub fn get(&self, s: f32) -> usize {
        let ix = self.retrieve(0, s);
        debug_assert!(ix >= (self.capacity - 1));
        ix + 1 - self.capacity
    }

    /// Samples `batch_size` indices and returns normalized weights.
    ///
    /// The weight is `w_i = (N * P(i))^(-beta)`, normalized by the maximal
    /// weight within the batch or over all stored samples.
    pub fn sample(&self, batch_size: usize, beta: f32) -> (Vec<usize>, Vec<f32>) {
        let p_sum = self.total();
        let ps = (0..batch_size)
            .map(|_| p_sum * fastrand::f32())
            .collect::<Vec<_>>();
        let ixs = ps.iter().map(|&p| self.get(p)).collect::<Vec<_>>();

        let n = self.n_samples as f32 / p_sum;
        let ws = ixs
            .iter()
            .map(|ix| self.tree[ix + self.capacity - 1])
            .map(|p| (n * p).powf(-beta))
            .collect::<Vec<_>>();

        let w_max_inv = match self.normalize {
            WeightNormalizer::All => (n * self.min_tree.query(0, self.n_samples)).powf(beta),
            WeightNormalizer::Batch => 1f32 / ws.iter().fold(f32::MIN, |m, v| v.max(m)),
        };

        let ws = ws.iter().map(|w| w * w_max_inv).collect::<Vec<f32>>();

        (ixs, ws)
    }
}

#[cfg(test)]
mod tests {
    use super::{SumTree, WeightNormalizer::Batch};

    #[test]
    fn test_prefix_sum_lookup() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut sum_tree = SumTree::new(8, 1.0, Batch);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(ix, p);
        }

        assert_eq!(sum_tree.get(0.0), 0);
        assert_eq!(sum_tree.get(0.4), 0);
        assert_eq!(sum_tree.get(0.6), 1);
        assert_eq!(sum_tree.get(1.2), 2);
        assert_eq!(sum_tree.get(1.6), 3);
        assert_eq!(sum_tree.get(2.0), 4);
        assert_eq!(sum_tree.get(2.8), 4);
    }

    #[test]
    fn test_max_tracks_raw_priorities() {
        let mut sum_tree = SumTree::new(4, 0.6, Batch);
        assert_eq!(sum_tree.max(), 1.0);

        sum_tree.add(0, 1.0);
        sum_tree.add(1, 3.5);
        sum_tree.add(2, 0.7);
        assert!((sum_tree.max() - 3.5).abs() < 1e-6);

        sum_tree.update(1, 0.1);
        assert!((sum_tree.max() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sampled_indices_in_range() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1];
        let mut sum_tree = SumTree::new(8, 1.0, Batch);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(ix, p);
        }

        let (ixs, ws) = sum_tree.sample(64, 0.4);
        assert_eq!(ixs.len(), 64);
        assert!(ixs.iter().all(|&ix| ix < data.len()));
        assert!(ws.iter().all(|&w| w.is_finite() && w > 0.0 && w <= 1.0 + 1e-6));
    }
}
