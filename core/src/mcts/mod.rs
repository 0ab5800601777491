//! PUCT search engine operating over an arena-allocated tree.
//!
//! This module knows nothing about neural networks or game rules: it is
//! handed priors/values by the caller (the [`crate::actor::Actor`] state
//! machine, which owns the NN round-trip) and only ever manipulates
//! [`TreeNode`] bookkeeping. The MuZero variant reuses the exact same
//! `select`/`expand`/`backup` primitives; the only difference is that its
//! edges carry a hidden state and a discounted per-edge reward via the
//! extra-data side table instead of a plain `Action`.

pub mod gumbel;

use crate::config::ActorConfig;
use crate::game::Action;
use crate::player::Player;
use crate::tree::{ExtraData, TreeArena, TreeNode};

/// Hidden state and discounted reward attached to a MuZero edge.
#[derive(Debug, Clone)]
pub struct EdgeData {
    /// Dynamics-function output for this edge.
    pub hidden_state: crate::network::HiddenState,
    /// Reward predicted for the transition into this edge's child.
    pub reward: f32,
}

/// One child's prior, as produced by a network policy head.
#[derive(Debug, Clone, Copy)]
pub struct ChildPrior {
    /// Action this child represents.
    pub action: Action,
    /// Normalized prior probability.
    pub policy: f32,
    /// Raw pre-softmax logit (Gumbel needs this).
    pub policy_logit: f32,
}

/// A PUCT search tree plus the bookkeeping [`crate::mcts::gumbel`] needs on top.
pub struct Mcts {
    arena: TreeArena<TreeNode>,
    hidden_states: ExtraData<EdgeData>,
    root_turn: Player,
    value_bound: Option<(f32, f32)>,
}

/// Result of one `select()` descent.
pub struct Selection {
    /// Arena indices visited, root first, leaf last.
    pub path: Vec<usize>,
    /// Whose turn it is to move at the leaf.
    pub leaf_turn: Player,
    /// True if the leaf already had an in-flight evaluation pending
    /// (`virtual_loss > 0` before this selection); the caller should still
    /// honor the virtual loss bookkeeping but must not request a second NN
    /// evaluation nor double-count this path on backup.
    pub is_duplicate: bool,
}

impl Mcts {
    /// Build an engine with room for `capacity` non-root nodes and
    /// `capacity` extra-data entries (an upper bound: at most one hidden
    /// state per node).
    pub fn new(capacity: usize) -> Self {
        Mcts {
            arena: TreeArena::new(TreeNode::new(None, 1., 0.), TreeNode::new(None, 0., 0.), capacity),
            hidden_states: ExtraData::with_capacity(capacity),
            root_turn: Player::Player1,
            value_bound: None,
        }
    }

    /// Rewind the tree to a single root node for `root_turn`.
    pub fn reset(&mut self, root_turn: Player) {
        self.arena.reset(TreeNode::new(None, 1., 0.));
        self.hidden_states.reset();
        self.root_turn = root_turn;
        self.value_bound = None;
    }

    /// Root arena index, always `0`.
    pub const ROOT: usize = 0;

    /// Read-only access to a node.
    pub fn node(&self, index: usize) -> &TreeNode {
        &self.arena[index]
    }

    /// Mutable access to a node. Exposed so the actor can apply root noise.
    pub fn node_mut(&mut self, index: usize) -> &mut TreeNode {
        &mut self.arena[index]
    }

    /// Edge data (MuZero hidden state + reward) for a node, if any.
    pub fn edge_data(&self, index: usize) -> Option<&EdgeData> {
        self.node(index).extra_data_index.map(|i| self.hidden_states.get(i))
    }

    /// Whose turn it is at the root.
    pub fn root_turn(&self) -> Player {
        self.root_turn
    }

    /// Whose turn it is to move at arena index `index`, given it is at
    /// `depth` plies below the root (children always belong to the other
    /// player than their parent).
    pub fn turn_at_depth(&self, depth: usize) -> Player {
        if depth % 2 == 0 {
            self.root_turn
        } else {
            self.root_turn.opponent()
        }
    }

    /// PUCT exploration coefficient for a parent with `parent_count` visits.
    fn puct_bias(parent_count: i32, config: &ActorConfig) -> f32 {
        config.mcts_puct_init
            + ((1. + parent_count as f32 + config.mcts_puct_base) / config.mcts_puct_base).ln()
    }

    /// First-play-urgency value for the as-yet-unvisited children of
    /// `parent_index`: the average Q of the parent's *visited* children,
    /// from the mover-at-parent's point of view, smoothed by one assumed
    /// loss (`calculateInitQValue`). With no visited children yet this
    /// reduces to `-1` — a deliberately pessimistic push toward exploring
    /// untried moves first.
    fn fpu(&self, parent_index: usize, mover: Player) -> f32 {
        let parent = self.node(parent_index);
        let first = parent.first_child_index;
        let mut visited_mean_sum = 0.;
        let mut visited = 0;
        for i in first..first + parent.num_children {
            let child = self.node(i);
            if child.count > 0 {
                visited_mean_sum += mover.sign() * child.mean;
                visited += 1;
            }
        }
        (visited_mean_sum - 1.) / (visited as f32 + 1.)
    }

    fn puct_score(parent_count: i32, fpu_value: f32, child: &TreeNode, mover: Player, config: &ActorConfig) -> f32 {
        let effective_count = child.count + child.virtual_loss;
        let exploration = Self::puct_bias(parent_count, config)
            * (child.policy + child.policy_noise)
            * (parent_count as f32).max(0.).sqrt()
            / (1. + effective_count as f32);
        let exploitation = if child.count == 0 { fpu_value } else { mover.sign() * child.mean };
        exploration + exploitation
    }

    /// Pick the best child of `parent_index` by PUCT score. First-indexed
    /// tiebreak: later children only replace the incumbent on a strictly
    /// greater score.
    pub(crate) fn select_child(&self, parent_index: usize, mover: Player, config: &ActorConfig) -> usize {
        let parent = self.node(parent_index);
        let first = parent.first_child_index;
        let num_children = parent.num_children;
        let parent_count = parent.count;
        let fpu_value = self.fpu(parent_index, mover);
        let mut best = first;
        let mut best_score = f32::NEG_INFINITY;
        for i in first..first + num_children {
            let score = Self::puct_score(parent_count, fpu_value, self.node(i), mover, config);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    /// Descend from the root to a leaf via PUCT, applying virtual loss to
    /// every node visited along the way.
    pub fn select(&mut self, config: &ActorConfig) -> Selection {
        let mut path = vec![Self::ROOT];
        let mut depth = 0;
        let mut current = Self::ROOT;
        while !self.node(current).is_leaf() {
            let mover = self.turn_at_depth(depth);
            current = self.select_child(current, mover, config);
            path.push(current);
            depth += 1;
        }
        let leaf_turn = self.turn_at_depth(depth);
        let is_duplicate = self.node(current).virtual_loss > 0;
        for &idx in &path {
            self.node_mut(idx).virtual_loss += 1;
        }
        Selection {
            path,
            leaf_turn,
            is_duplicate,
        }
    }

    /// Allocate `priors.len()` children under `index` and record the leaf's
    /// own raw evaluation.
    pub fn expand(
        &mut self,
        index: usize,
        leaf_value: f32,
        priors: &[ChildPrior],
    ) -> Result<(), crate::error::ArenaError> {
        let range = self.arena.allocate(priors.len())?;
        self.arena[index].value = leaf_value;
        self.arena[index].first_child_index = range.start;
        self.arena[index].num_children = priors.len();
        for (slot, prior) in range.zip(priors.iter()) {
            self.arena[slot] = TreeNode::new(Some(prior.action), prior.policy, prior.policy_logit);
        }
        Ok(())
    }

    /// Attach a MuZero hidden state + edge reward to `index`.
    pub fn set_edge_data(
        &mut self,
        index: usize,
        edge: EdgeData,
    ) -> Result<(), crate::error::ArenaError> {
        let data_index = self.hidden_states.store(edge)?;
        self.arena[index].extra_data_index = Some(data_index);
        Ok(())
    }

    /// Back up `leaf_value` along `path`, applying per-edge discounted
    /// rewards where present (MuZero) and none otherwise (AlphaZero, where
    /// `discount` is `1.` and no edge carries a reward). Releases the
    /// virtual loss `select()` applied to this path.
    pub fn backup(&mut self, path: &[usize], leaf_value: f32, discount: f32) {
        let mut value = leaf_value;
        self.observe_value_bound(value);
        for &idx in path.iter().rev() {
            if let Some(edge) = self.edge_data(idx) {
                value = edge.reward + discount * value;
            }
            self.node_mut(idx).add(value);
            self.node_mut(idx).virtual_loss -= 1;
        }
    }

    /// Undo a duplicate selection's virtual loss without backing up a value
    /// (used when the caller decided not to re-evaluate a leaf it had
    /// already dispatched).
    pub fn release_virtual_loss_only(&mut self, path: &[usize]) {
        for &idx in path {
            self.node_mut(idx).virtual_loss -= 1;
        }
    }

    fn observe_value_bound(&mut self, value: f32) {
        self.value_bound = Some(match self.value_bound {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }

    /// Running `(min, max)` backed-up value bound, used by Gumbel's
    /// normalized-Q transform. `None` before the first backup.
    pub fn value_bound(&self) -> Option<(f32, f32)> {
        self.value_bound
    }

    /// Children of `index`, as an index range.
    pub fn children_of(&self, index: usize) -> std::ops::Range<usize> {
        let node = self.node(index);
        node.first_child_index..node.first_child_index + node.num_children
    }

    /// Child index with the most visits under `index`. First-indexed
    /// tiebreak.
    pub fn select_by_max_count(&self, index: usize) -> usize {
        let mut best = self.node(index).first_child_index;
        let mut best_count = i32::MIN;
        for i in self.children_of(index) {
            let count = self.node(i).count;
            if count > best_count {
                best_count = count;
                best = i;
            }
        }
        best
    }

    /// Sample a child under `index` with probability proportional to
    /// `count^(1/temperature)`.
    pub fn select_by_softmax_count(&self, index: usize, temperature: f32, rng: &mut impl rand::Rng) -> usize {
        let children: Vec<usize> = self.children_of(index).collect();
        let weights: Vec<f32> = children
            .iter()
            .map(|&c| (self.node(c).count.max(0) as f32).powf(1. / temperature))
            .collect();
        let total: f32 = weights.iter().sum();
        if total <= 0. {
            return children[0];
        }
        let mut pick = rng.gen::<f32>() * total;
        for (child, weight) in children.iter().zip(weights.iter()) {
            if pick < *weight {
                return *child;
            }
            pick -= weight;
        }
        *children.last().unwrap()
    }

    /// Resignation check: both the root and the would-be-selected child
    /// fall below `threshold`, from the mover's own point of view.
    pub fn is_resign(&self, selected_child: usize, threshold: f32) -> bool {
        let mover = self.root_turn;
        let root = self.node(Self::ROOT);
        let child = self.node(selected_child);
        let root_rate = if root.count == 0 { 0. } else { mover.sign() * root.mean };
        let child_rate = if child.count == 0 { 0. } else { mover.sign() * child.mean };
        root_rate < threshold && child_rate < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priors(actions: &[usize]) -> Vec<ChildPrior> {
        let n = actions.len() as f32;
        actions
            .iter()
            .map(|&id| ChildPrior {
                action: Action { id, player: Player::Player2 },
                policy: 1. / n,
                policy_logit: 0.,
            })
            .collect()
    }

    #[test]
    fn root_count_after_one_root_expansion_and_n_simulations() {
        let config = ActorConfig::default();
        let mut mcts = Mcts::new(64);
        mcts.reset(Player::Player1);

        // simulation 0: expand + back up the root itself.
        mcts.expand(Mcts::ROOT, 0.1, &priors(&[0, 1, 2])).unwrap();
        mcts.node_mut(Mcts::ROOT).add(0.1);

        for _ in 0..16 {
            let selection = mcts.select(&config);
            let leaf = *selection.path.last().unwrap();
            if mcts.node(leaf).is_leaf() && leaf != Mcts::ROOT {
                mcts.expand(leaf, 0., &priors(&[0, 1])).unwrap();
            }
            mcts.backup(&selection.path, 0., 1.0);
        }

        assert_eq!(mcts.node(Mcts::ROOT).count, 17);
        assert_eq!(mcts.node(Mcts::ROOT).virtual_loss, 0);
    }

    #[test]
    fn virtual_loss_is_balanced_after_backup() {
        let config = ActorConfig::default();
        let mut mcts = Mcts::new(64);
        mcts.reset(Player::Player1);
        mcts.expand(Mcts::ROOT, 0., &priors(&[0, 1])).unwrap();

        let selection = mcts.select(&config);
        assert!(mcts.node(Mcts::ROOT).virtual_loss > 0);
        mcts.backup(&selection.path, 0.5, 1.0);
        for idx in 0..mcts.node(Mcts::ROOT).num_children + 1 {
            assert_eq!(mcts.node(idx).virtual_loss, 0);
        }
    }

    #[test]
    fn count_never_goes_negative_on_underflowing_update() {
        let mut node = TreeNode::new(None, 1., 0.);
        node.add(1.0);
        node.update(1.0, -5.0);
        assert_eq!(node.count, 0);
        assert_eq!(node.mean, 0.);
    }
}
