//! Ring-buffer replay store with optional prioritized sampling.
mod iw_scheduler;
mod sum_tree;
use super::{config::PerConfig, BatchBase, GenericTransitionBatch, SimpleReplayBufferConfig};
use crate::{error::GridRlError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::Result;
pub use iw_scheduler::IwScheduler;
use rand::{rngs::StdRng, Rng, SeedableRng};
pub use sum_tree::{SumTree, WeightNormalizer};

/// State of prioritized experience replay: the sum tree of priorities and
/// the scheduler of the importance-weight exponent.
struct PerState {
    sum_tree: SumTree,
    iw_scheduler: IwScheduler,
}

impl PerState {
    fn new(capacity: usize, per_config: &PerConfig) -> Self {
        Self {
            sum_tree: SumTree::new(capacity, per_config.alpha, per_config.normalize),
            iw_scheduler: IwScheduler::new(
                per_config.beta_0,
                per_config.beta_final,
                per_config.n_opts_final,
            ),
        }
    }
}

/// A fixed-capacity replay store of transitions.
///
/// The store is a ring buffer: pushes are O(1) and evict the oldest entries
/// once the capacity is exceeded. Sampling is uniform without prioritization;
/// with a [`PerConfig`] the sampling probability is proportional to
/// `priority^alpha` and batches carry importance sampling weights.
pub struct SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    capacity: usize,

    /// Write cursor.
    i: usize,

    /// Current number of stored transitions.
    size: usize,

    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    is_truncated: Vec<i8>,

    /// Random number generator for uniform sampling.
    rng: StdRng,

    /// State of prioritized sampling, if enabled.
    per_state: Option<PerState>,
}

impl<O, A> SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    #[inline]
    fn push_reward(&mut self, i: usize, b: &[f32]) {
        let mut j = i;
        for r in b.iter() {
            self.reward[j] = *r;
            j += 1;
            if j == self.capacity {
                j = 0;
            }
        }
    }

    #[inline]
    fn push_is_terminated(&mut self, i: usize, b: &[i8]) {
        let mut j = i;
        for d in b.iter() {
            self.is_terminated[j] = *d;
            j += 1;
            if j == self.capacity {
                j = 0;
            }
        }
    }

    #[inline]
    fn push_is_truncated(&mut self, i: usize, b: &[i8]) {
        let mut j = i;
        for d in b.iter() {
            self.is_truncated[j] = *d;
            j += 1;
            if j == self.capacity {
                j = 0;
            }
        }
    }

    fn sample_reward(&self, ixs: &[usize]) -> Vec<f32> {
        ixs.iter().map(|ix| self.reward[*ix]).collect()
    }

    fn sample_is_terminated(&self, ixs: &[usize]) -> Vec<i8> {
        ixs.iter().map(|ix| self.is_terminated[*ix]).collect()
    }

    fn sample_is_truncated(&self, ixs: &[usize]) -> Vec<i8> {
        ixs.iter().map(|ix| self.is_truncated[*ix]).collect()
    }

    /// Fresh entries receive the maximum priority seen so far, ensuring they
    /// are sampled promptly.
    fn set_priority(&mut self, batch_size: usize) {
        let sum_tree = &mut self.per_state.as_mut().unwrap().sum_tree;
        let max_p = sum_tree.max();

        for j in 0..batch_size {
            let i = (self.i + j) % self.capacity;
            sum_tree.add(i, max_p);
        }
    }

    /// Returns `true` if the buffer holds at least `batch_size` transitions.
    pub fn is_ready(&self, batch_size: usize) -> bool {
        self.size >= batch_size
    }

    /// Returns the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the sum of all stored rewards.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }
}

impl<O, A> ExperienceBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    /// Stores a transition, evicting the oldest entry if at capacity.
    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let len = tr.len(); // batch size
        let (obs, act, next_obs, reward, is_terminated, is_truncated, _, _) = tr.unpack();
        self.obs.push(self.i, obs);
        self.act.push(self.i, act);
        self.next_obs.push(self.i, next_obs);
        self.push_reward(self.i, &reward);
        self.push_is_terminated(self.i, &is_terminated);
        self.push_is_truncated(self.i, &is_truncated);

        if self.per_state.is_some() {
            self.set_priority(len)
        };

        self.i = (self.i + len) % self.capacity;
        self.size += len;
        if self.size >= self.capacity {
            self.size = self.capacity;
        }

        Ok(())
    }
}

impl<O, A> ReplayBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = SimpleReplayBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity;
        let per_state = config
            .per_config
            .as_ref()
            .map(|per_config| PerState::new(capacity, per_config));
        if config.per_config.is_some() {
            fastrand::seed(config.seed);
        }

        Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            is_truncated: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
            per_state,
        }
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if size > self.size {
            return Err(GridRlError::InsufficientData {
                requested: size,
                stored: self.size,
            }
            .into());
        }

        let (ixs, weight) = if let Some(per_state) = &self.per_state {
            let sum_tree = &per_state.sum_tree;
            let beta = per_state.iw_scheduler.beta();
            let (ixs, weight) = sum_tree.sample(size, beta);
            (ixs, Some(weight))
        } else {
            let ixs = (0..size)
                .map(|_| self.rng.gen_range(0..self.size))
                .collect::<Vec<_>>();
            (ixs, None)
        };

        Ok(Self::Batch {
            obs: self.obs.sample(&ixs),
            act: self.act.sample(&ixs),
            next_obs: self.next_obs.sample(&ixs),
            reward: self.sample_reward(&ixs),
            is_terminated: self.sample_is_terminated(&ixs),
            is_truncated: self.sample_is_truncated(&ixs),
            ix_sample: Some(ixs),
            weight,
        })
    }

    /// Overwrites priorities from observed TD errors.
    ///
    /// A small positive floor inside the sum tree keeps every entry at a
    /// non-zero sampling probability. Beta is annealed after each call.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_errs: &Option<Vec<f32>>) {
        if let Some(per_state) = &mut self.per_state {
            let ixs = ixs
                .as_ref()
                .expect("ixs should be Some(_) in update_priority()");
            let td_errs = td_errs
                .as_ref()
                .expect("td_errs should be Some(_) in update_priority()");
            for (&ix, &td_err) in ixs.iter().zip(td_errs.iter()) {
                per_state.sum_tree.update(ix, td_err.abs());
            }
            per_state.iw_scheduler.add_n_opts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic_replay_buffer::PerConfig;

    /// Minimal storage of scalar observations for buffer tests.
    #[derive(Clone, Debug)]
    struct VecBatch(Vec<f32>);

    impl BatchBase for VecBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.0; capacity])
        }

        fn push(&mut self, index: usize, data: Self) {
            let capacity = self.0.len();
            for (j, v) in data.0.iter().enumerate() {
                self.0[(index + j) % capacity] = *v;
            }
        }

        fn sample(&self, ixs: &[usize]) -> Self {
            Self(ixs.iter().map(|&ix| self.0[ix]).collect())
        }
    }

    fn transition(v: f32) -> GenericTransitionBatch<VecBatch, VecBatch> {
        GenericTransitionBatch {
            obs: VecBatch(vec![v]),
            act: VecBatch(vec![0.0]),
            next_obs: VecBatch(vec![v + 1.0]),
            reward: vec![v],
            is_terminated: vec![0],
            is_truncated: vec![0],
            ix_sample: None,
            weight: None,
        }
    }

    #[test]
    fn test_ring_eviction_oldest_first() {
        let config = SimpleReplayBufferConfig::default().capacity(3);
        let mut buffer = SimpleReplayBuffer::<VecBatch, VecBatch>::build(&config);

        for v in 0..5 {
            buffer.push(transition(v as f32)).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        // Entries 0 and 1 were evicted; the ring now holds 3, 4 at the
        // wrapped cursor positions and 2 in place.
        assert_eq!(buffer.reward[0], 3.0);
        assert_eq!(buffer.reward[1], 4.0);
        assert_eq!(buffer.reward[2], 2.0);
    }

    #[test]
    fn test_batch_requires_enough_data() {
        let config = SimpleReplayBufferConfig::default().capacity(16);
        let mut buffer = SimpleReplayBuffer::<VecBatch, VecBatch>::build(&config);

        buffer.push(transition(1.0)).unwrap();
        assert!(!buffer.is_ready(2));
        assert!(buffer.batch(2).is_err());

        buffer.push(transition(2.0)).unwrap();
        assert!(buffer.is_ready(2));
        let batch = buffer.batch(2).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_per_batch_carries_weights_and_anneals_beta() {
        let per_config = PerConfig::default().beta_0(0.4).n_opts_final(10);
        let config = SimpleReplayBufferConfig::default()
            .capacity(8)
            .per_config(Some(per_config));
        let mut buffer = SimpleReplayBuffer::<VecBatch, VecBatch>::build(&config);

        for v in 0..4 {
            buffer.push(transition(v as f32)).unwrap();
        }

        let batch = buffer.batch(2).unwrap();
        let ixs = batch.ix_sample.clone().unwrap();
        assert!(batch.weight.is_some());

        let beta_before = buffer.per_state.as_ref().unwrap().iw_scheduler.beta();
        buffer.update_priority(&Some(ixs), &Some(vec![0.5, -1.5]));
        let beta_after = buffer.per_state.as_ref().unwrap().iw_scheduler.beta();
        assert!(beta_after > beta_before);
    }
}
