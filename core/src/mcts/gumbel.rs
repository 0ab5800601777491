//! Gumbel sequential-halving root selection, as an alternative to plain
//! PUCT descent. Everything below the root still uses ordinary PUCT
//! (`Mcts::select_child`); only *which root child to visit next*, and how
//! the final move is chosen, differ.

use super::Mcts;
use crate::config::ActorConfig;
use crate::player::Player;
use rand::Rng;
use rand_distr::{Distribution, Gumbel};

/// Tracks root-candidate bookkeeping across a sequential-halving search.
pub struct GumbelSearch {
    /// Root children still in contention, most-promising-known first.
    candidates: Vec<usize>,
    /// Per-child Gumbel noise sampled once, indexed like `candidates`
    /// before any halving (kept as a side map from arena index).
    noise: std::collections::HashMap<usize, f32>,
    sample_size: usize,
    simulation_budget: usize,
    num_simulation: usize,
}

fn sigma(config: &ActorConfig, max_child_count: i32) -> f32 {
    (config.gumbel_sigma_visit_c + max_child_count as f32) * config.gumbel_sigma_scale_c
}

impl GumbelSearch {
    /// Start a new halving schedule once the root has been expanded.
    /// `num_simulation` is the total simulation budget for this move.
    pub fn new(mcts: &Mcts, config: &ActorConfig, num_simulation: usize, rng: &mut impl Rng) -> Self {
        let gumbel = Gumbel::new(0., 1.).unwrap();
        let mut children: Vec<usize> = mcts.children_of(Mcts::ROOT).collect();
        let mut noise = std::collections::HashMap::new();
        for &c in &children {
            noise.insert(c, gumbel.sample(rng));
        }
        children.sort_by(|&a, &b| {
            let sa = mcts.node(a).policy_logit + noise[&a];
            let sb = mcts.node(b).policy_logit + noise[&b];
            sb.partial_cmp(&sa).unwrap()
        });
        let sample_size = config.gumbel_sample_size.min(children.len()).max(1);
        children.truncate(sample_size);

        let simulation_budget = Self::budget_for(num_simulation, sample_size);
        GumbelSearch {
            candidates: children,
            noise,
            sample_size,
            simulation_budget,
            num_simulation,
        }
    }

    fn budget_for(num_simulation: usize, sample_size: usize) -> usize {
        if sample_size <= 1 {
            return num_simulation.max(1);
        }
        let denom = (sample_size as f32).log2() * sample_size as f32;
        ((num_simulation as f32 / denom).floor() as usize).max(1)
    }

    /// Gumbel noise applied to root child `index` (`0.` if halved away or
    /// never a root child).
    pub fn noise_for(&self, index: usize) -> f32 {
        *self.noise.get(&index).unwrap_or(&0.)
    }

    /// Pick the next candidate to descend from and run one ordinary PUCT
    /// descent below it, prepending the root. Mirrors `GumbelZero::selection`.
    pub fn select(&self, mcts: &mut Mcts, config: &ActorConfig) -> super::Selection {
        // Round-robin: always feed simulations to the least-visited candidate,
        // ties broken by logit (descending) as in the reference implementation.
        let mut ordered = self.candidates.clone();
        ordered.sort_by(|&a, &b| {
            let ca = mcts.node(a).count;
            let cb = mcts.node(b).count;
            ca.cmp(&cb).then_with(|| {
                mcts.node(b)
                    .policy_logit
                    .partial_cmp(&mcts.node(a).policy_logit)
                    .unwrap()
            })
        });
        let start = ordered[0];

        let mut path = vec![Mcts::ROOT, start];
        let root_turn = mcts.root_turn();
        let mut depth = 1;
        let mut current = start;
        while !mcts.node(current).is_leaf() {
            let mover = if depth % 2 == 0 { root_turn } else { root_turn.opponent() };
            current = mcts.select_child(current, mover, config);
            path.push(current);
            depth += 1;
        }
        let leaf_turn = if depth % 2 == 0 { root_turn } else { root_turn.opponent() };
        let is_duplicate = mcts.node(current).virtual_loss > 0;
        for &idx in &path {
            mcts.node_mut(idx).virtual_loss += 1;
        }
        super::Selection {
            path,
            leaf_turn,
            is_duplicate,
        }
    }

    /// Whether it's time to halve the candidate set, and do so if so.
    /// Mirrors `GumbelZero::sequentialHalving`. Returns `true` if the
    /// schedule is complete (`sample_size == 1` and budget reached).
    pub fn advance(&mut self, mcts: &Mcts, config: &ActorConfig) -> bool {
        let all_reached_budget = self
            .candidates
            .iter()
            .all(|&c| mcts.node(c).count as usize >= self.simulation_budget);
        if !all_reached_budget {
            return false;
        }
        if self.sample_size == 1 {
            return true;
        }
        let next_sample_size = (self.sample_size / 2).max(1);
        let next_budget = Self::budget_for(self.num_simulation, next_sample_size);
        self.sort_candidates_by_score(mcts, config);
        self.candidates.truncate(next_sample_size);
        self.sample_size = next_sample_size;
        self.simulation_budget = mcts.node(self.candidates[0]).count as usize + next_budget;
        false
    }

    fn sort_candidates_by_score(&mut self, mcts: &Mcts, config: &ActorConfig) {
        let max_child_count = self.candidates.iter().map(|&c| mcts.node(c).count).max().unwrap_or(0);
        let s = sigma(config, max_child_count);
        let mover = mcts.root_turn();
        self.candidates.sort_by(|&a, &b| {
            let score = |idx: usize| -> f32 {
                let node = mcts.node(idx);
                if node.count == 0 {
                    f32::NEG_INFINITY
                } else {
                    node.policy_logit + self.noise_for(idx) + s * mover.sign() * node.mean
                }
            };
            score(b).partial_cmp(&score(a)).unwrap()
        });
    }

    /// True once sequential halving has narrowed down to a single candidate
    /// that has reached its simulation budget.
    pub fn is_done(&self, mcts: &Mcts) -> bool {
        self.sample_size == 1
            && mcts.node(self.candidates[0]).count as usize >= self.simulation_budget
    }

    /// The single surviving candidate, once `is_done`.
    pub fn final_candidate(&self) -> usize {
        self.candidates[0]
    }

    /// Exported improved policy over every root child (not just surviving
    /// candidates): each weight is `exp(completed_logit - max)`, i.e. a
    /// softmax over Gumbel-MuZero's "completed Q-values". Mirrors
    /// `GumbelZero::getMCTSPolicy`.
    pub fn completed_policy(&self, mcts: &Mcts, config: &ActorConfig) -> Vec<(usize, f32)> {
        let root = mcts.node(Mcts::ROOT);
        let mover = mcts.root_turn();
        let children: Vec<usize> = mcts.children_of(Mcts::ROOT).collect();
        let max_child_count = children.iter().map(|&c| mcts.node(c).count).max().unwrap_or(0);
        let s = sigma(config, max_child_count);

        let visited: Vec<usize> = children.iter().copied().filter(|&c| mcts.node(c).count > 0).collect();
        let sum_pi_visited: f32 = visited.iter().map(|&c| mcts.node(c).policy).sum();
        let v_root = if root.count == 0 { 0. } else { mover.sign() * root.mean };
        let v_mix = if sum_pi_visited > 0. {
            let sum_pi_q: f32 = visited
                .iter()
                .map(|&c| mcts.node(c).policy * mover.sign() * mcts.node(c).mean)
                .sum();
            (v_root + sum_pi_q) / (1. + sum_pi_visited)
        } else {
            v_root
        };

        let completed_logits: Vec<f32> = children
            .iter()
            .map(|&c| {
                let node = mcts.node(c);
                let q = if node.count > 0 { mover.sign() * node.mean } else { v_mix };
                node.policy_logit + s * q
            })
            .collect();
        let max_logit = completed_logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = completed_logits.iter().map(|&l| (l - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        children
            .into_iter()
            .zip(exps.into_iter())
            .map(|(c, e)| (c, e / sum))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Action;
    use crate::mcts::ChildPrior;
    use rand::SeedableRng;

    fn priors(n: usize) -> Vec<ChildPrior> {
        (0..n)
            .map(|id| ChildPrior {
                action: Action { id, player: Player::Player2 },
                policy: 1. / n as f32,
                policy_logit: 0.,
            })
            .collect()
    }

    #[test]
    fn sequential_halving_converges_to_one_candidate() {
        let config = ActorConfig {
            gumbel_sample_size: 4,
            ..ActorConfig::default()
        };
        let mut mcts = Mcts::new(128);
        mcts.reset(Player::Player1);
        mcts.expand(Mcts::ROOT, 0., &priors(4)).unwrap();
        mcts.node_mut(Mcts::ROOT).add(0.);

        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut search = GumbelSearch::new(&mcts, &config, 16, &mut rng);

        let mut total_root_visits = 1;
        while !search.is_done(&mcts) {
            let selection = search.select(&mut mcts, &config);
            let leaf = *selection.path.last().unwrap();
            if mcts.node(leaf).is_leaf() {
                mcts.expand(leaf, 0., &priors(2)).unwrap();
            }
            mcts.backup(&selection.path, 0., 1.0);
            total_root_visits += 1;
            search.advance(&mcts, &config);
        }

        assert_eq!(search.sample_size, 1);
        assert_eq!(total_root_visits, 41);
    }
}
