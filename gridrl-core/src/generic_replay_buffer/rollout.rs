//! On-policy rollout store.
use super::{BatchBase, GenericTransitionBatch};
use crate::{error::GridRlError, ExperienceBufferBase, OnPolicyBuffer, ReplayBufferBase, TransitionBatch};
use anyhow::Result;

/// Configuration of [`RolloutBuffer`].
#[derive(Clone, Debug, Default)]
pub struct RolloutBufferConfig {}

/// An ordered store of on-policy transitions.
///
/// Pushes append without eviction; the whole buffer is consumed at update
/// time via [`OnPolicyBuffer::drain`], which returns all transitions in
/// insertion order and leaves the store empty. No entry outlives the rollout
/// that produced it. Random-access sampling is an error for this store.
pub struct RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    entries: Vec<GenericTransitionBatch<O, A>>,
    size: usize,
}

impl<O, A> ExperienceBufferBase for RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.size += tr.len();
        self.entries.push(tr);
        Ok(())
    }
}

impl<O, A> ReplayBufferBase for RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = RolloutBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            entries: Vec::new(),
            size: 0,
        }
    }

    fn batch(&mut self, _size: usize) -> Result<Self::Batch> {
        Err(GridRlError::OnPolicySampling.into())
    }

    fn update_priority(&mut self, _ixs: &Option<Vec<usize>>, _td_errs: &Option<Vec<f32>>) {}
}

impl<O, A> OnPolicyBuffer for RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Batch = GenericTransitionBatch<O, A>;

    fn drain(&mut self) -> Result<<Self as OnPolicyBuffer>::Batch> {
        let n = self.size;
        if n == 0 {
            return Err(GridRlError::InsufficientData {
                requested: 1,
                stored: 0,
            }
            .into());
        }

        let mut obs = O::new(n);
        let mut act = A::new(n);
        let mut next_obs = O::new(n);
        let mut reward = Vec::with_capacity(n);
        let mut is_terminated = Vec::with_capacity(n);
        let mut is_truncated = Vec::with_capacity(n);

        let mut i = 0;
        for entry in self.entries.drain(..) {
            let len = entry.len();
            let (o, a, o_next, r, term, trunc, _, _) = entry.unpack();
            obs.push(i, o);
            act.push(i, a);
            next_obs.push(i, o_next);
            reward.extend(r);
            is_terminated.extend(term);
            is_truncated.extend(trunc);
            i += len;
        }
        self.size = 0;

        Ok(GenericTransitionBatch {
            obs,
            act,
            next_obs,
            reward,
            is_terminated,
            is_truncated,
            ix_sample: None,
            weight: None,
        })
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct VecBatch(Vec<f32>);

    impl BatchBase for VecBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.0; capacity])
        }

        fn push(&mut self, index: usize, data: Self) {
            for (j, v) in data.0.iter().enumerate() {
                self.0[index + j] = *v;
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
    fn test_drain_preserves_order_and_empties() {
        let mut buffer = RolloutBuffer::<VecBatch, VecBatch>::build(&RolloutBufferConfig {});
        for v in 0..5 {
            buffer.push(transition(v as f32)).unwrap();
        }
        assert_eq!(buffer.len(), 5);

        let batch = buffer.drain().unwrap();
        assert_eq!(batch.reward, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(batch.obs.0, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.drain().is_err());
    }

    #[test]
    fn test_random_access_is_rejected() {
        let mut buffer = RolloutBuffer::<VecBatch, VecBatch>::build(&RolloutBufferConfig {});
        buffer.push(transition(0.0)).unwrap();
        assert!(buffer.batch(1).is_err());
    }
}
