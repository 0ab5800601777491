//! Capability traits for the (external, un-trained-here) neural network
//! backends. Both are synchronous and batched: the scheduler's GPU phase
//! calls each exactly once per cycle with every leaf collected during the
//! preceding CPU phase.

/// Policy (one weight per legal action slot) plus a state-value estimate,
/// both from `Player1`'s point of view.
#[derive(Debug, Clone)]
pub struct PolicyValue {
    /// Un-normalized policy logits, one per action slot.
    pub policy_logits: Vec<f32>,
    /// Value head output, in `[-1, 1]`.
    pub value: f32,
}

/// Opaque MuZero hidden state, carried on tree edges via the extra-data
/// side table rather than inline on `TreeNode`.
#[derive(Debug, Clone)]
pub struct HiddenState(pub Vec<f32>);

/// Output of one MuZero recurrent (dynamics + prediction) step.
#[derive(Debug, Clone)]
pub struct RecurrentOutput {
    /// Hidden state produced by the dynamics function.
    pub hidden_state: HiddenState,
    /// Predicted immediate reward for the transition.
    pub reward: f32,
    /// Policy/value at the resulting hidden state.
    pub policy_value: PolicyValue,
}

/// AlphaZero-style network: one forward pass maps board features directly
/// to policy + value.
pub trait AlphaZeroEvaluator: Send + Sync {
    /// Evaluate a batch of board feature vectors.
    fn forward(&self, batch: &[Vec<f32>]) -> Vec<PolicyValue>;
}

/// MuZero-style network: a representation function maps observations to a
/// hidden state, and a dynamics function unrolls hidden states forward
/// under a chosen action, each step also producing policy/value via the
/// prediction function.
pub trait MuZeroEvaluator: Send + Sync {
    /// Representation + prediction: observation features to (hidden state,
    /// policy, value).
    fn initial_inference(&self, batch: &[Vec<f32>]) -> Vec<(HiddenState, PolicyValue)>;

    /// Dynamics + prediction: (hidden state, action features) to
    /// (next hidden state, reward, policy, value).
    fn recurrent_inference(&self, batch: &[(HiddenState, Vec<f32>)]) -> Vec<RecurrentOutput>;
}
