//! The per-game search driver: owns one [`Mcts`] tree and one environment
//! instance, and exposes the `before_nn_evaluation`/`after_nn_evaluation`
//! pair the scheduler's two-phase cycle calls once per actor per cycle.
//! `think()` is a convenience wrapper around that same pair for solo use
//! (tests, or a single-actor search with no scheduler), batching up to
//! `think_batch_size` leaves per network call exactly as a standalone
//! search would.

pub mod record;

use crate::config::ActorConfig;
use crate::game::{Action, Environment, Rotation};
use crate::mcts::gumbel::GumbelSearch;
use crate::mcts::{ChildPrior, EdgeData, Mcts};
use crate::network::{AlphaZeroEvaluator, HiddenState, MuZeroEvaluator, PolicyValue};
use crate::player::Player;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Dirichlet, Distribution};
use record::{ActionInfo, Record};
use std::sync::Arc;

/// One pending leaf awaiting a network response.
struct Pending {
    path: Vec<usize>,
}

/// Board features to submit for the next network call, or `None` if the
/// selected leaf resolved immediately (terminal) without needing one.
pub struct NnRequest {
    /// Flat feature buffer, shape is a network concern.
    pub features: Vec<f32>,
}

fn softmax_policy(env: &impl Environment, output: &PolicyValue, rotation: Rotation) -> Vec<ChildPrior> {
    let legal = env.legal_actions();
    let logits: Vec<f32> = legal
        .iter()
        .map(|a| *output.policy_logits.get(a.id).unwrap_or(&0.))
        .collect();
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let _ = rotation;
    legal
        .into_iter()
        .zip(logits.into_iter())
        .zip(exps.into_iter())
        .map(|((action, logit), exp)| ChildPrior {
            action,
            policy: if sum > 0. { exp / sum } else { 0. },
            policy_logit: logit,
        })
        .collect()
}

/// Replay the actions recorded on `path` (skipping the root sentinel) onto
/// a clone of `base`.
fn env_at_path<E: Environment>(base: &E, mcts: &Mcts, path: &[usize]) -> E {
    let mut env = base.clone();
    for &idx in &path[1..] {
        if let Some(action) = mcts.node(idx).action {
            env.act(action);
        }
    }
    env
}

fn apply_root_noise(mcts: &mut Mcts, config: &ActorConfig, rng: &mut StdRng) {
    if !config.use_dirichlet_noise {
        return;
    }
    let n = mcts.node(Mcts::ROOT).num_children;
    if n == 0 {
        return;
    }
    let dirichlet = Dirichlet::new(vec![config.dirichlet_alpha; n]).unwrap();
    let sample = dirichlet.sample(rng);
    for (i, idx) in mcts.children_of(Mcts::ROOT).enumerate() {
        let eps = config.dirichlet_epsilon;
        let node = mcts.node_mut(idx);
        node.policy_noise = eps * sample[i];
        node.policy *= 1. - eps;
    }
}

/// AlphaZero-family actor: one direct network call per leaf evaluation.
pub struct AlphaZeroActor<E: Environment> {
    /// Live game state.
    pub env: E,
    mcts: Mcts,
    gumbel: Option<GumbelSearch>,
    config: ActorConfig,
    network: Arc<dyn AlphaZeroEvaluator>,
    rng: StdRng,
    history: Record,
    resign_enabled: bool,
    pending: Option<Pending>,
    pending_resign: bool,
    simulations_done: usize,
}

impl<E: Environment> AlphaZeroActor<E> {
    /// Build a fresh actor over `env`, immediately starting its first search.
    pub fn new(env: E, network: Arc<dyn AlphaZeroEvaluator>, config: ActorConfig, seed: u64) -> Self {
        let capacity = (config.num_simulation + 1) * 16;
        let mut actor = AlphaZeroActor {
            env,
            mcts: Mcts::new(capacity),
            gumbel: None,
            config,
            network,
            rng: StdRng::seed_from_u64(seed),
            history: Record::default(),
            resign_enabled: true,
            pending: None,
            pending_resign: false,
            simulations_done: 0,
        };
        actor.reset_game();
        actor
    }

    /// Reset the whole game (new environment, fresh history), then start a
    /// fresh search over the initial position.
    pub fn reset_game(&mut self) {
        self.env.reset();
        self.history = Record::default();
        self.resign_enabled = !self.rng.gen_bool(self.config.disable_resign_ratio as f64);
        self.reset_search();
    }

    /// Expand the root (simulation 0) and start a new search for the move
    /// about to be decided, without touching the environment or history.
    pub fn reset_search(&mut self) {
        self.mcts.reset(self.env.turn());
        self.simulations_done = 0;
        self.pending = None;
        self.pending_resign = false;
        self.gumbel = None;

        let rotation = if self.config.use_random_rotation_features {
            Rotation(self.rng.gen_range(0..4))
        } else {
            Rotation::IDENTITY
        };
        let features = self.env.features(self.env.turn(), rotation);
        let output = &self.network.forward(&[features])[0];
        let priors = softmax_policy(&self.env, output, rotation);
        self.mcts.expand(Mcts::ROOT, output.value, &priors).unwrap();
        self.mcts.node_mut(Mcts::ROOT).add(output.value);
        self.simulations_done = 1;

        if self.config.use_gumbel {
            self.gumbel = Some(GumbelSearch::new(&self.mcts, &self.config, self.config.num_simulation, &mut self.rng));
        } else {
            apply_root_noise(&mut self.mcts, &self.config, &mut self.rng);
        }
    }

    /// True once this actor's current search has run its full simulation
    /// budget (or Gumbel has narrowed to one surviving candidate).
    pub fn is_search_done(&self) -> bool {
        if let Some(gumbel) = &self.gumbel {
            gumbel.is_done(&self.mcts)
        } else {
            self.simulations_done > self.config.num_simulation
        }
    }

    /// Select the next leaf to evaluate. Terminal leaves are backed up
    /// immediately and `None` is returned (no network call needed this
    /// cycle); otherwise the leaf's features are returned for the caller
    /// to batch into one network call alongside other actors.
    pub fn before_nn_evaluation(&mut self) -> Option<NnRequest> {
        if self.is_search_done() {
            return None;
        }
        let selection = match &self.gumbel {
            Some(gumbel) => gumbel.select(&mut self.mcts, &self.config),
            None => self.mcts.select(&self.config),
        };
        let leaf_env = env_at_path(&self.env, &self.mcts, &selection.path);

        if leaf_env.is_terminal() && !selection.is_duplicate {
            let value = leaf_env.eval_score(false);
            self.mcts.backup(&selection.path, value, self.config.mcts_reward_discount);
            self.simulations_done += 1;
            return None;
        }
        if selection.is_duplicate {
            self.mcts.release_virtual_loss_only(&selection.path);
            return None;
        }

        let rotation = if self.config.use_random_rotation_features {
            Rotation(self.rng.gen_range(0..4))
        } else {
            Rotation::IDENTITY
        };
        let features = leaf_env.features(selection.leaf_turn, rotation);
        self.pending = Some(Pending { path: selection.path });
        Some(NnRequest { features })
    }

    /// Apply a network response to the leaf queued by the last
    /// `before_nn_evaluation` call.
    pub fn after_nn_evaluation(&mut self, output: &PolicyValue) {
        let pending = match self.pending.take() {
            Some(p) => p,
            None => return,
        };
        let leaf = *pending.path.last().unwrap();
        let leaf_env = env_at_path(&self.env, &self.mcts, &pending.path);
        let priors = softmax_policy(&leaf_env, output, Rotation::IDENTITY);
        self.mcts.expand(leaf, output.value, &priors).unwrap();
        self.mcts.backup(&pending.path, output.value, self.config.mcts_reward_discount);
        self.simulations_done += 1;

        if let Some(gumbel) = &mut self.gumbel {
            gumbel.advance(&self.mcts, &self.config);
        }
    }

    /// Run a whole search to completion by itself, calling the network
    /// directly in batches of `think_batch_size` (no scheduler involved).
    pub fn think(&mut self) {
        while !self.is_search_done() {
            let mut batch_paths = Vec::new();
            let mut batch_features = Vec::new();
            for _ in 0..self.config.think_batch_size.max(1) {
                if self.is_search_done() {
                    break;
                }
                match self.before_nn_evaluation() {
                    Some(req) => {
                        batch_features.push(req.features);
                        batch_paths.push(self.pending.take().unwrap());
                    }
                    None => continue,
                }
            }
            if batch_features.is_empty() {
                continue;
            }
            let outputs = self.network.forward(&batch_features);
            for (pending, output) in batch_paths.into_iter().zip(outputs.into_iter()) {
                self.pending = Some(pending);
                self.after_nn_evaluation(&output);
            }
        }
    }

    /// Decide on a move from the completed search (max-count or
    /// softmax-count), check for resignation, and return it alongside the
    /// [`ActionInfo`] to be logged.
    pub fn decide_action(&mut self) -> (Action, ActionInfo) {
        let selected = if let Some(gumbel) = &self.gumbel {
            gumbel.final_candidate()
        } else if self.config.select_action_by_softmax_count {
            self.mcts
                .select_by_softmax_count(Mcts::ROOT, self.config.select_action_softmax_temperature, &mut self.rng)
        } else {
            self.mcts.select_by_max_count(Mcts::ROOT)
        };

        let resign = self.resign_enabled && self.mcts.is_resign(selected, self.config.resign_threshold);

        let policy: Vec<(Action, f32)> = self
            .mcts
            .children_of(Mcts::ROOT)
            .map(|c| (self.mcts.node(c).action.unwrap(), self.mcts.node(c).count as f32))
            .collect();
        let total: f32 = policy.iter().map(|(_, p)| p).sum();
        let policy = policy
            .into_iter()
            .map(|(a, p)| (a, if total > 0. { p / total } else { 0. }))
            .collect();

        let action = self.mcts.node(selected).action.unwrap();
        let info = ActionInfo {
            action,
            policy,
            mean_value: self.mcts.node(Mcts::ROOT).mean,
            reward: 0.,
        };
        self.pending_resign = resign;
        (action, info)
    }

    /// Whether the most recent `decide_action` call chose to resign.
    pub fn is_resigned(&self) -> bool {
        self.pending_resign
    }

    /// Play the decided action, append it to the recorded history, and
    /// start the next move's search (unless the game just ended).
    pub fn act(&mut self, action: Action, mut info: ActionInfo) -> bool {
        self.env.act(action);
        info.reward = self.env.reward();
        self.history.history.push(info);
        let done = self.env.is_terminal() || self.pending_resign;
        if !done {
            self.reset_search();
        }
        done
    }

    /// Moves played so far in this game.
    pub fn game_length(&self) -> usize {
        self.history.history.len()
    }

    /// The recorded action-info history for the current game.
    pub fn record(&self) -> &Record {
        &self.history
    }

    /// Final (or current, for the resignation case) evaluation from
    /// `Player1`'s point of view.
    pub fn eval_score(&self) -> f32 {
        self.env.eval_score(self.pending_resign)
    }
}

/// MuZero-family actor. Below the root, nodes never touch the real
/// environment: edges carry a hidden state and a predicted reward produced
/// by the dynamics function, per [`crate::mcts::EdgeData`].
pub struct MuZeroActor<E: Environment> {
    /// Live game state (only ever queried at the root).
    pub env: E,
    mcts: Mcts,
    gumbel: Option<GumbelSearch>,
    config: ActorConfig,
    network: Arc<dyn MuZeroEvaluator>,
    rng: StdRng,
    history: Record,
    resign_enabled: bool,
    pending_recurrent: Option<Vec<usize>>,
    pending_resign: bool,
    simulations_done: usize,
}

impl<E: Environment> MuZeroActor<E> {
    /// Build a fresh actor over `env`, immediately starting its first search.
    pub fn new(env: E, network: Arc<dyn MuZeroEvaluator>, config: ActorConfig, seed: u64) -> Self {
        let capacity = (config.num_simulation + 1) * 16;
        let mut actor = MuZeroActor {
            env,
            mcts: Mcts::new(capacity),
            gumbel: None,
            config,
            network,
            rng: StdRng::seed_from_u64(seed),
            history: Record::default(),
            resign_enabled: true,
            pending_recurrent: None,
            pending_resign: false,
            simulations_done: 0,
        };
        actor.reset_game();
        actor
    }

    /// Reset the whole game and start a fresh search.
    pub fn reset_game(&mut self) {
        self.env.reset();
        self.history = Record::default();
        self.resign_enabled = !self.rng.gen_bool(self.config.disable_resign_ratio as f64);
        self.reset_search();
    }

    /// Initial inference at the root, then start the search.
    pub fn reset_search(&mut self) {
        self.mcts.reset(self.env.turn());
        self.simulations_done = 0;
        self.pending_recurrent = None;
        self.pending_resign = false;
        self.gumbel = None;

        let features = self.env.features(self.env.turn(), Rotation::IDENTITY);
        let (hidden, output) = self.network.initial_inference(&[features]).remove(0);
        let priors = softmax_policy(&self.env, &output, Rotation::IDENTITY);
        self.mcts.expand(Mcts::ROOT, output.value, &priors).unwrap();
        self.mcts
            .set_edge_data(Mcts::ROOT, EdgeData { hidden_state: hidden, reward: 0. })
            .unwrap();
        self.mcts.node_mut(Mcts::ROOT).add(output.value);
        self.simulations_done = 1;

        if self.config.use_gumbel {
            self.gumbel = Some(GumbelSearch::new(&self.mcts, &self.config, self.config.num_simulation, &mut self.rng));
        } else {
            apply_root_noise(&mut self.mcts, &self.config, &mut self.rng);
        }
    }

    /// See [`AlphaZeroActor::is_search_done`].
    pub fn is_search_done(&self) -> bool {
        if let Some(gumbel) = &self.gumbel {
            gumbel.is_done(&self.mcts)
        } else {
            self.simulations_done > self.config.num_simulation
        }
    }

    /// Select the next leaf. Unlike AlphaZero, MuZero leaves below the
    /// root are never terminal in the environment's sense (the dynamics
    /// network models transitions, including game-over, implicitly), so
    /// this always produces a recurrent-inference request once the tree
    /// has more than the root.
    pub fn before_nn_evaluation(&mut self) -> Option<(HiddenState, Vec<f32>)> {
        if self.is_search_done() {
            return None;
        }
        let selection = match &self.gumbel {
            Some(gumbel) => gumbel.select(&mut self.mcts, &self.config),
            None => self.mcts.select(&self.config),
        };
        if selection.is_duplicate {
            self.mcts.release_virtual_loss_only(&selection.path);
            return None;
        }
        let leaf = *selection.path.last().unwrap();
        let parent = *selection.path[..selection.path.len() - 1].last().unwrap_or(&Mcts::ROOT);
        let parent_hidden = self.mcts.edge_data(parent).map(|e| e.hidden_state.clone()).unwrap_or_else(|| {
            self.mcts.edge_data(Mcts::ROOT).unwrap().hidden_state.clone()
        });
        let action = self.mcts.node(leaf).action.unwrap();
        let action_features = self.env.action_features(action, Rotation::IDENTITY);
        self.pending_recurrent = Some(selection.path);
        Some((parent_hidden, action_features))
    }

    /// Apply a recurrent-inference response to the pending leaf.
    pub fn after_nn_evaluation(&mut self, output: crate::network::RecurrentOutput) {
        let path = match self.pending_recurrent.take() {
            Some(p) => p,
            None => return,
        };
        let leaf = *path.last().unwrap();
        let mover = self.mcts.turn_at_depth(path.len() - 1);
        let priors = pseudo_priors_from_logits(&output.policy_value, mover);
        self.mcts.expand(leaf, output.policy_value.value, &priors).unwrap();
        self.mcts
            .set_edge_data(
                leaf,
                EdgeData {
                    hidden_state: output.hidden_state,
                    reward: output.reward,
                },
            )
            .unwrap();
        self.mcts.backup(&path, output.policy_value.value, self.config.mcts_reward_discount);
        self.simulations_done += 1;
        if let Some(gumbel) = &mut self.gumbel {
            gumbel.advance(&self.mcts, &self.config);
        }
    }

    /// Solo convenience loop, mirroring [`AlphaZeroActor::think`].
    pub fn think(&mut self) {
        while !self.is_search_done() {
            match self.before_nn_evaluation() {
                Some((hidden, action_features)) => {
                    let output = self.network.recurrent_inference(&[(hidden, action_features)]).remove(0);
                    self.after_nn_evaluation(output);
                }
                None => continue,
            }
        }
    }

    /// See [`AlphaZeroActor::decide_action`].
    pub fn decide_action(&mut self) -> (Action, ActionInfo) {
        let selected = if let Some(gumbel) = &self.gumbel {
            gumbel.final_candidate()
        } else if self.config.select_action_by_softmax_count {
            self.mcts
                .select_by_softmax_count(Mcts::ROOT, self.config.select_action_softmax_temperature, &mut self.rng)
        } else {
            self.mcts.select_by_max_count(Mcts::ROOT)
        };
        let resign = self.resign_enabled && self.mcts.is_resign(selected, self.config.resign_threshold);
        let policy: Vec<(Action, f32)> = self
            .mcts
            .children_of(Mcts::ROOT)
            .map(|c| (self.mcts.node(c).action.unwrap(), self.mcts.node(c).count as f32))
            .collect();
        let total: f32 = policy.iter().map(|(_, p)| p).sum();
        let policy = policy
            .into_iter()
            .map(|(a, p)| (a, if total > 0. { p / total } else { 0. }))
            .collect();
        let action = self.mcts.node(selected).action.unwrap();
        let info = ActionInfo {
            action,
            policy,
            mean_value: self.mcts.node(Mcts::ROOT).mean,
            reward: 0.,
        };
        self.pending_resign = resign;
        (action, info)
    }

    /// Whether the most recent `decide_action` call chose to resign.
    pub fn is_resigned(&self) -> bool {
        self.pending_resign
    }

    /// See [`AlphaZeroActor::act`].
    pub fn act(&mut self, action: Action, mut info: ActionInfo) -> bool {
        self.env.act(action);
        info.reward = self.env.reward();
        self.history.history.push(info);
        let done = self.env.is_terminal() || self.pending_resign;
        if !done {
            self.reset_search();
        }
        done
    }

    /// See [`AlphaZeroActor::game_length`].
    pub fn game_length(&self) -> usize {
        self.history.history.len()
    }

    /// See [`AlphaZeroActor::record`].
    pub fn record(&self) -> &Record {
        &self.history
    }

    /// See [`AlphaZeroActor::eval_score`].
    pub fn eval_score(&self) -> f32 {
        self.env.eval_score(self.pending_resign)
    }
}

/// MuZero children below the root have no legal-action mask to apply
/// against (no real environment to ask), so every policy-head output slot
/// becomes a child, labeled with the player to move at the node being
/// expanded.
fn pseudo_priors_from_logits(output: &PolicyValue, mover: Player) -> Vec<ChildPrior> {
    let max_logit = output.policy_logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = output.policy_logits.iter().map(|&l| (l - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    output
        .policy_logits
        .iter()
        .enumerate()
        .zip(exps.iter())
        .map(|((id, &logit), &exp)| ChildPrior {
            action: Action { id, player: mover },
            policy: if sum > 0. { exp / sum } else { 0. },
            policy_logit: logit,
        })
        .collect()
}
