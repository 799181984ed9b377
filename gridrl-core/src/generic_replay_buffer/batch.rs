//! Batch storage and the generic transition batch.
use crate::TransitionBatch;

/// Fixed-capacity storage of observation or action batches.
///
/// Implementations own a contiguous buffer of `capacity` rows; `push` writes
/// rows starting at an index with wrap-around, `sample` gathers rows at the
/// given indices into a new object.
pub trait BatchBase {
    /// Creates an empty storage with the given capacity.
    fn new(capacity: usize) -> Self;

    /// Writes the rows of `data` starting at `index`, wrapping around.
    fn push(&mut self, index: usize, data: Self);

    /// Gathers the rows at the given indices.
    fn sample(&self, ixs: &[usize]) -> Self;
}

/// A generic batch of transitions `(o_t, a_t, o_t+1, r_t, flags)`.
///
/// Produced both by [`SimpleStepProcessor`](super::SimpleStepProcessor) (with
/// batch size 1) and by the buffers when sampling or draining.
pub struct GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: A,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags.
    pub is_terminated: Vec<i8>,

    /// Truncation flags.
    pub is_truncated: Vec<i8>,

    /// Indices of the sampled transitions, for priority updates.
    pub ix_sample: Option<Vec<usize>>,

    /// Importance sampling weights of a prioritized buffer.
    pub weight: Option<Vec<f32>>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
        Option<Vec<usize>>,
        Option<Vec<f32>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
            self.ix_sample,
            self.weight,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }
}
