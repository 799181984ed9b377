//! Batch of transitions.

/// A batch of transitions sampled from a buffer.
pub trait TransitionBatch {
    /// A set of observations in a batch.
    type ObsBatch;

    /// A set of actions in a batch.
    type ActBatch;

    /// Unpacks the batch into
    /// `(o_t, a_t, o_t+1, r_t, is_terminated_t, is_truncated_t, ixs, weights)`.
    ///
    /// The last two elements are the sampled indices and the importance
    /// weights, present only for prioritized buffers.
    #[allow(clippy::type_complexity)]
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
    );

    /// Returns the number of transitions in the batch.
    fn len(&self) -> usize;

    /// Returns `true` if the batch is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
