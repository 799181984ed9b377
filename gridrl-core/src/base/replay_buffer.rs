//! Buffer interfaces.
//!
//! Two concerns are split across two traits: storing experiences pushed by
//! the sampling process ([`ExperienceBufferBase`]) and producing batches for
//! optimization ([`ReplayBufferBase`]). Off-policy stores implement both with
//! random-access sampling; on-policy stores add [`OnPolicyBuffer`], which is
//! consumed wholesale.
use anyhow::Result;

/// Interface of buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// Items stored in the buffer.
    type Item;

    /// Pushes an item into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// The number of items in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no item.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface of buffers from which batches are drawn for optimization.
pub trait ReplayBufferBase {
    /// Configuration of the buffer.
    type Config: Clone;

    /// Batch generated from the buffer.
    type Batch;

    /// Builds the buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Constructs a batch of the given size.
    ///
    /// Fails when the buffer holds fewer items than requested; callers can
    /// check [`ExperienceBufferBase::len`] first.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates priorities of the items at the given indices.
    ///
    /// Used by prioritized replay; non-prioritized buffers ignore the call.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_errs: &Option<Vec<f32>>);
}

/// Interface of buffers that are consumed wholesale, in insertion order.
///
/// On-policy algorithms collect a rollout, use every stored item exactly once
/// and discard the data afterwards. Draining preserves insertion order, which
/// the advantage computation depends on.
pub trait OnPolicyBuffer: ExperienceBufferBase {
    /// Batch holding the whole rollout.
    type Batch;

    /// Takes all stored items in insertion order, leaving the buffer empty.
    fn drain(&mut self) -> Result<<Self as OnPolicyBuffer>::Batch>;

    /// Discards all stored items.
    fn clear(&mut self);
}
