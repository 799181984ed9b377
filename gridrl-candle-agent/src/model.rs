//! Interface of function approximators.
use candle_nn::VarBuilder;

/// A neural network taking a single input.
///
/// Agents are generic over this seam, so the same learner runs with a plain
/// MLP, a dueling network or an actor-critic trunk.
pub trait SubModel1 {
    /// Configuration of the network.
    type Config;

    /// Input of the network.
    type Input;

    /// Output of the network.
    type Output;

    /// Builds the network with its variables registered in `vs`.
    fn build(vs: VarBuilder, config: Self::Config) -> Self;

    /// Performs a forward pass.
    fn forward(&self, input: &Self::Input) -> Self::Output;
}
