//! Tree node layout.

use crate::game::Action;

/// Outcome a solver (e.g. a Benson/seki proof-number search, out of scope
/// for this crate) could attach to a node. Never set by anything in this
/// crate; the field exists so the layout doesn't change if one is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverResult {
    /// Proven win for the player to move at this node.
    Win,
    /// Proven loss for the player to move at this node.
    Loss,
    /// Proven draw.
    Draw,
    /// Not (yet) proven either way.
    Unknown,
}

/// One arena slot.
///
/// `mean`/`count` are always from `Player1`'s point of view; `value` is the
/// raw network (or terminal) evaluation stored once at expansion time,
/// whereas `mean` is the running backed-up average over the node's subtree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Move that led to this node from its parent. `None` only at the root.
    pub action: Option<Action>,
    /// Number of children, contiguously allocated starting at `first_child_index`.
    pub num_children: usize,
    /// Arena index of the first child, valid only if `num_children > 0`.
    pub first_child_index: usize,
    /// Visit count. Never observed negative: a virtual-loss release that
    /// would drive it below zero instead resets the node (see [`TreeNode::remove`]).
    pub count: i32,
    /// Running backed-up value average, `Player1`-relative.
    pub mean: f32,
    /// Raw leaf evaluation stored at expansion time, `Player1`-relative.
    pub value: f32,
    /// Prior probability assigned by the parent's policy head.
    pub policy: f32,
    /// Raw policy logit (pre-softmax), used by Gumbel's completed-Q transform.
    pub policy_logit: f32,
    /// Root-exploration noise folded into this node's effective prior.
    /// Dirichlet and Gumbel noise are mutually exclusive; whichever is
    /// active is recorded here, `0.` otherwise.
    pub policy_noise: f32,
    /// In-flight evaluations pending on this node's subtree, added before
    /// dispatch and released after the corresponding backup.
    pub virtual_loss: i32,
    /// Index into the MuZero hidden-state side table, if this edge carries one.
    pub extra_data_index: Option<usize>,
    /// Never set by this crate; see [`SolverResult`].
    pub solver_result: SolverResult,
}

impl TreeNode {
    /// A freshly allocated, unexpanded node for `action` with prior `policy`.
    pub fn new(action: Option<Action>, policy: f32, policy_logit: f32) -> Self {
        TreeNode {
            action,
            num_children: 0,
            first_child_index: 0,
            count: 0,
            mean: 0.,
            value: 0.,
            policy,
            policy_logit,
            policy_noise: 0.,
            virtual_loss: 0,
            extra_data_index: None,
            solver_result: SolverResult::Unknown,
        }
    }

    /// True once this node has been expanded (children allocated).
    pub fn is_leaf(&self) -> bool {
        self.num_children == 0
    }

    /// Fold `value` into the running average with signed weight `weight`
    /// (`1.` for an ordinary backup, negative to undo one). If the update
    /// would drive `count` to zero or below, the node resets instead of
    /// going negative. Mirrors `MCTSTreeNode::add`/`remove` in the reference
    /// implementation, which are the same formula called with opposite
    /// signs.
    pub fn update(&mut self, value: f32, weight: f32) {
        let new_count = self.count + weight.round() as i32;
        if new_count <= 0 {
            self.count = 0;
            self.mean = 0.;
            return;
        }
        self.count = new_count;
        self.mean += weight * (value - self.mean) / (self.count as f32);
    }

    /// Ordinary backup of one full-weight visit.
    pub fn add(&mut self, value: f32) {
        self.update(value, 1.);
    }
}
