//! Global configuration.
//!
//! The wire format is the flat `key=value` registry described by the CLI
//! surface (`-conf_str "k1=v1:k2=v2"`, `-conf_file <path>`, `-gen <path>`):
//! there is no nested/structured format to deserialize, so `CoreConfig` is
//! built by applying key/value pairs onto [`CoreConfig::default()`] rather
//! than through `serde`.

use crate::error::ConfigError;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Process-wide knobs that aren't specific to search or orchestration.
#[derive(Debug, Clone, Copy)]
pub struct ProgramConfig {
    /// RNG seed used when `auto_seed` is false.
    pub seed: u64,
    /// Draw a fresh seed from OS entropy instead of `seed`.
    pub auto_seed: bool,
    /// Suppress informational stdout/stderr chatter.
    pub quiet: bool,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        ProgramConfig {
            seed: 0,
            auto_seed: true,
            quiet: false,
        }
    }
}

/// Knobs for the MCTS engine and the actor driving it.
#[derive(Debug, Clone, Copy)]
pub struct ActorConfig {
    /// Total simulations run per move decision.
    pub num_simulation: usize,
    /// PUCT exploration base (`c_base` in the selection formula).
    pub mcts_puct_base: f32,
    /// PUCT exploration init constant (`c_init`).
    pub mcts_puct_init: f32,
    /// Per-edge reward discount applied on backup (1.0 = no discount).
    pub mcts_reward_discount: f32,
    /// Rescale Q-values by the tree's running min/max bound (used by Gumbel).
    pub mcts_value_rescale: bool,
    /// Leaves batched together before one NN evaluation call.
    pub think_batch_size: usize,
    /// Optional wall-clock budget for a single `think()` call.
    pub think_time_limit: Option<Duration>,
    /// Pick the final move by visit-count softmax instead of arg-max.
    pub select_action_by_softmax_count: bool,
    /// Temperature for the visit-count softmax.
    pub select_action_softmax_temperature: f32,
    /// Present the board under a random symmetry at each evaluation.
    pub use_random_rotation_features: bool,
    /// Perturb root priors with Dirichlet noise.
    pub use_dirichlet_noise: bool,
    /// Dirichlet concentration parameter.
    pub dirichlet_alpha: f32,
    /// Mixing fraction between prior and Dirichlet noise.
    pub dirichlet_epsilon: f32,
    /// Use Gumbel sequential halving at the root instead of plain PUCT.
    pub use_gumbel: bool,
    /// Perturb root logits with Gumbel noise (mutually exclusive with Dirichlet).
    pub use_gumbel_noise: bool,
    /// Candidates considered by sequential halving.
    pub gumbel_sample_size: usize,
    /// `sigma` visit constant in the completed-Q transform.
    pub gumbel_sigma_visit_c: f32,
    /// `sigma` scale constant in the completed-Q transform.
    pub gumbel_sigma_scale_c: f32,
    /// Resign when both the root and the selected child fall below this win rate.
    pub resign_threshold: f32,
    /// Fraction of games where resignation is disabled, to measure false positives.
    pub disable_resign_ratio: f32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        ActorConfig {
            num_simulation: 200,
            mcts_puct_base: 19652.,
            mcts_puct_init: 1.25,
            mcts_reward_discount: 1.0,
            mcts_value_rescale: false,
            think_batch_size: 1,
            think_time_limit: None,
            select_action_by_softmax_count: false,
            select_action_softmax_temperature: 1.0,
            use_random_rotation_features: false,
            use_dirichlet_noise: true,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            use_gumbel: false,
            use_gumbel_noise: false,
            gumbel_sample_size: 16,
            gumbel_sigma_visit_c: 50.,
            gumbel_sigma_scale_c: 1.,
            resign_threshold: 0.05,
            disable_resign_ratio: 0.1,
        }
    }
}

/// Knobs for the distributed orchestration layer (scheduler + server).
#[derive(Debug, Clone)]
pub struct ZeroConfig {
    /// OS threads driving the two-phase actor group cycle.
    pub num_threads: usize,
    /// Concurrent game instances managed by the scheduler.
    pub num_parallel_games: usize,
    /// TCP port the server listens on.
    pub server_port: u16,
    /// Directory the server writes checkpoints, sgf files and logs to.
    pub training_directory: String,
    /// Self-play records accepted before an iteration closes.
    pub num_games_per_iteration: usize,
    /// First iteration number to run.
    pub start_iteration: usize,
    /// Last iteration number to run (inclusive).
    pub end_iteration: usize,
    /// How many past iterations' data feed one optimization step.
    pub replay_buffer: usize,
    /// Intermediate record emission window, in actions (0 disables windowing).
    pub actor_intermediate_sequence_length: usize,
    /// Command prefixes the scheduler silently ignores.
    pub actor_ignored_command: Vec<String>,
    /// Stop resetting an actor once its per-actor game quota is reached.
    pub actor_stop_after_enough_games: bool,
    /// Accept self-play records produced under a stale model iteration.
    pub server_accept_different_model_games: bool,
}

impl Default for ZeroConfig {
    fn default() -> Self {
        ZeroConfig {
            num_threads: 1,
            num_parallel_games: 1,
            server_port: 9999,
            training_directory: "./train".into(),
            num_games_per_iteration: 100,
            start_iteration: 1,
            end_iteration: 100,
            replay_buffer: 20,
            actor_intermediate_sequence_length: 0,
            actor_ignored_command: Vec::new(),
            actor_stop_after_enough_games: false,
            server_accept_different_model_games: false,
        }
    }
}

/// Knobs that configure the (external) learner, carried here only because
/// the server needs them to build optimization job commands.
#[derive(Debug, Clone, Copy)]
pub struct LearnerConfig {
    /// Use prioritized experience replay.
    pub use_per: bool,
    /// PER alpha.
    pub per_alpha: f32,
    /// PER initial importance-sampling beta.
    pub per_init_beta: f32,
    /// Anneal PER beta towards 1 over training.
    pub per_beta_anneal: bool,
    /// Optimizer steps per call.
    pub training_step: usize,
    /// Steps between progress logging.
    pub training_display_step: usize,
    /// Minibatch size.
    pub batch_size: usize,
    /// MuZero unroll length during training.
    pub muzero_unrolling_step: usize,
    /// n-step return horizon used both in training and in windowing self-play records.
    pub n_step_return: usize,
    /// Learning rate.
    pub learning_rate: f32,
    /// Momentum.
    pub momentum: f32,
    /// Weight decay.
    pub weight_decay: f32,
    /// Value loss scale relative to policy loss.
    pub value_loss_scale: f32,
    /// Data-loader thread count.
    pub num_thread: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            use_per: false,
            per_alpha: 1.0,
            per_init_beta: 1.0,
            per_beta_anneal: false,
            training_step: 1000,
            training_display_step: 100,
            batch_size: 256,
            muzero_unrolling_step: 5,
            n_step_return: 5,
            learning_rate: 0.02,
            momentum: 0.9,
            weight_decay: 1e-4,
            value_loss_scale: 1.0,
            num_thread: 8,
        }
    }
}

/// Global, immutable configuration threaded through every component.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Program-wide settings.
    pub program: ProgramConfig,
    /// Actor/MCTS settings.
    pub actor: ActorConfig,
    /// Scheduler/server settings.
    pub zero: ZeroConfig,
    /// Learner settings (consumed by the server, not by core itself).
    pub learner: LearnerConfig,
}

impl CoreConfig {
    /// Parse `-conf_str "k1=v1:k2=v2"` and apply the overrides on top of
    /// `self`.
    pub fn apply_conf_str(&mut self, conf_str: &str) -> Result<(), ConfigError> {
        for entry in conf_str.split(':') {
            if entry.is_empty() {
                continue;
            }
            self.apply_entry(entry)?;
        }
        Ok(())
    }

    /// Parse a `-conf_file` (one `key=value` per line, `#` comments, blank
    /// lines ignored) and apply it on top of `self`.
    pub fn apply_conf_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidEntry {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.apply_entry(line)?;
        }
        Ok(())
    }

    fn apply_entry(&mut self, entry: &str) -> Result<(), ConfigError> {
        let mut parts = entry.splitn(2, '=');
        let key = parts.next().ok_or_else(|| ConfigError::MalformedLine(entry.into()))?;
        let value = parts
            .next()
            .ok_or_else(|| ConfigError::MalformedLine(entry.into()))?;
        self.set(key.trim(), value.trim())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        macro_rules! parse {
            ($v:expr) => {
                $v.parse().map_err(|_| ConfigError::InvalidEntry {
                    key: key.to_string(),
                    reason: format!("cannot parse '{}'", $v),
                })?
            };
        }
        match key {
            "program_seed" => self.program.seed = parse!(value),
            "program_auto_seed" => self.program.auto_seed = parse!(value),
            "program_quiet" => self.program.quiet = parse!(value),

            "actor_num_simulation" => self.actor.num_simulation = parse!(value),
            "actor_mcts_puct_base" => self.actor.mcts_puct_base = parse!(value),
            "actor_mcts_puct_init" => self.actor.mcts_puct_init = parse!(value),
            "actor_mcts_reward_discount" => self.actor.mcts_reward_discount = parse!(value),
            "actor_mcts_value_rescale" => self.actor.mcts_value_rescale = parse!(value),
            "actor_mcts_think_batch_size" => self.actor.think_batch_size = parse!(value),
            "actor_mcts_think_time_limit_ms" => {
                let ms: u64 = parse!(value);
                self.actor.think_time_limit = if ms == 0 { None } else { Some(Duration::from_millis(ms)) };
            }
            "actor_select_action_by_softmax_count" => {
                self.actor.select_action_by_softmax_count = parse!(value)
            }
            "actor_select_action_softmax_temperature" => {
                self.actor.select_action_softmax_temperature = parse!(value)
            }
            "actor_use_random_rotation_features" => {
                self.actor.use_random_rotation_features = parse!(value)
            }
            "actor_use_dirichlet_noise" => self.actor.use_dirichlet_noise = parse!(value),
            "actor_dirichlet_alpha" => self.actor.dirichlet_alpha = parse!(value),
            "actor_dirichlet_epsilon" => self.actor.dirichlet_epsilon = parse!(value),
            "actor_use_gumbel" => self.actor.use_gumbel = parse!(value),
            "actor_use_gumbel_noise" => self.actor.use_gumbel_noise = parse!(value),
            "actor_gumbel_sample_size" => self.actor.gumbel_sample_size = parse!(value),
            "actor_gumbel_sigma_visit_c" => self.actor.gumbel_sigma_visit_c = parse!(value),
            "actor_gumbel_sigma_scale_c" => self.actor.gumbel_sigma_scale_c = parse!(value),
            "actor_resign_threshold" => self.actor.resign_threshold = parse!(value),
            "zero_actor_disable_resign_ratio" => self.actor.disable_resign_ratio = parse!(value),

            "zero_num_threads" => self.zero.num_threads = parse!(value),
            "zero_num_parallel_games" => self.zero.num_parallel_games = parse!(value),
            "zero_server_port" => self.zero.server_port = parse!(value),
            "zero_training_directory" => self.zero.training_directory = value.to_string(),
            "zero_num_games_per_iteration" => self.zero.num_games_per_iteration = parse!(value),
            "zero_start_iteration" => self.zero.start_iteration = parse!(value),
            "zero_end_iteration" => self.zero.end_iteration = parse!(value),
            "zero_replay_buffer" => self.zero.replay_buffer = parse!(value),
            "zero_actor_intermediate_sequence_length" => {
                self.zero.actor_intermediate_sequence_length = parse!(value)
            }
            "zero_actor_ignored_command" => {
                self.zero.actor_ignored_command =
                    value.split(',').filter(|s| !s.is_empty()).map(String::from).collect()
            }
            "zero_actor_stop_after_enough_games" => {
                self.zero.actor_stop_after_enough_games = parse!(value)
            }
            "zero_server_accept_different_model_games" => {
                self.zero.server_accept_different_model_games = parse!(value)
            }

            "learner_use_per" => self.learner.use_per = parse!(value),
            "learner_per_alpha" => self.learner.per_alpha = parse!(value),
            "learner_per_init_beta" => self.learner.per_init_beta = parse!(value),
            "learner_per_beta_anneal" => self.learner.per_beta_anneal = parse!(value),
            "learner_training_step" => self.learner.training_step = parse!(value),
            "learner_training_display_step" => self.learner.training_display_step = parse!(value),
            "learner_batch_size" => self.learner.batch_size = parse!(value),
            "learner_muzero_unrolling_step" => self.learner.muzero_unrolling_step = parse!(value),
            "learner_n_step_return" => self.learner.n_step_return = parse!(value),
            "learner_learning_rate" => self.learner.learning_rate = parse!(value),
            "learner_momentum" => self.learner.momentum = parse!(value),
            "learner_weight_decay" => self.learner.weight_decay = parse!(value),
            "learner_value_loss_scale" => self.learner.value_loss_scale = parse!(value),
            "learner_num_thread" => self.learner.num_thread = parse!(value),

            other => {
                return Err(ConfigError::InvalidEntry {
                    key: other.to_string(),
                    reason: "unknown key".into(),
                })
            }
        }
        Ok(())
    }

    /// Render the configuration back to the `key=value` file format accepted
    /// by `apply_conf_file`, for `-gen`.
    pub fn to_kv_string(&self) -> String {
        let mut out = String::new();
        macro_rules! line {
            ($k:expr, $v:expr) => {
                out.push_str(&format!("{}={}\n", $k, $v))
            };
        }
        line!("program_seed", self.program.seed);
        line!("program_auto_seed", self.program.auto_seed);
        line!("program_quiet", self.program.quiet);

        line!("actor_num_simulation", self.actor.num_simulation);
        line!("actor_mcts_puct_base", self.actor.mcts_puct_base);
        line!("actor_mcts_puct_init", self.actor.mcts_puct_init);
        line!("actor_mcts_reward_discount", self.actor.mcts_reward_discount);
        line!("actor_mcts_value_rescale", self.actor.mcts_value_rescale);
        line!("actor_mcts_think_batch_size", self.actor.think_batch_size);
        line!(
            "actor_mcts_think_time_limit_ms",
            self.actor.think_time_limit.map(|d| d.as_millis()).unwrap_or(0)
        );
        line!(
            "actor_select_action_by_softmax_count",
            self.actor.select_action_by_softmax_count
        );
        line!(
            "actor_select_action_softmax_temperature",
            self.actor.select_action_softmax_temperature
        );
        line!(
            "actor_use_random_rotation_features",
            self.actor.use_random_rotation_features
        );
        line!("actor_use_dirichlet_noise", self.actor.use_dirichlet_noise);
        line!("actor_dirichlet_alpha", self.actor.dirichlet_alpha);
        line!("actor_dirichlet_epsilon", self.actor.dirichlet_epsilon);
        line!("actor_use_gumbel", self.actor.use_gumbel);
        line!("actor_use_gumbel_noise", self.actor.use_gumbel_noise);
        line!("actor_gumbel_sample_size", self.actor.gumbel_sample_size);
        line!("actor_gumbel_sigma_visit_c", self.actor.gumbel_sigma_visit_c);
        line!("actor_gumbel_sigma_scale_c", self.actor.gumbel_sigma_scale_c);
        line!("actor_resign_threshold", self.actor.resign_threshold);
        line!("zero_actor_disable_resign_ratio", self.actor.disable_resign_ratio);

        line!("zero_num_threads", self.zero.num_threads);
        line!("zero_num_parallel_games", self.zero.num_parallel_games);
        line!("zero_server_port", self.zero.server_port);
        line!("zero_training_directory", self.zero.training_directory);
        line!("zero_num_games_per_iteration", self.zero.num_games_per_iteration);
        line!("zero_start_iteration", self.zero.start_iteration);
        line!("zero_end_iteration", self.zero.end_iteration);
        line!("zero_replay_buffer", self.zero.replay_buffer);
        line!(
            "zero_actor_intermediate_sequence_length",
            self.zero.actor_intermediate_sequence_length
        );
        line!("zero_actor_ignored_command", self.zero.actor_ignored_command.join(","));
        line!(
            "zero_actor_stop_after_enough_games",
            self.zero.actor_stop_after_enough_games
        );
        line!(
            "zero_server_accept_different_model_games",
            self.zero.server_accept_different_model_games
        );

        line!("learner_use_per", self.learner.use_per);
        line!("learner_per_alpha", self.learner.per_alpha);
        line!("learner_per_init_beta", self.learner.per_init_beta);
        line!("learner_per_beta_anneal", self.learner.per_beta_anneal);
        line!("learner_training_step", self.learner.training_step);
        line!("learner_training_display_step", self.learner.training_display_step);
        line!("learner_batch_size", self.learner.batch_size);
        line!("learner_muzero_unrolling_step", self.learner.muzero_unrolling_step);
        line!("learner_n_step_return", self.learner.n_step_return);
        line!("learner_learning_rate", self.learner.learning_rate);
        line!("learner_momentum", self.learner.momentum);
        line!("learner_weight_decay", self.learner.weight_decay);
        line!("learner_value_loss_scale", self.learner.value_loss_scale);
        line!("learner_num_thread", self.learner.num_thread);
        out
    }

    /// Infer the server's starting model iteration from a checkpoint
    /// filename shaped `weight_iter_<n>.pt`.
    pub fn parse_model_iteration(filename: &str) -> Result<usize, ConfigError> {
        filename
            .rsplit('_')
            .next()
            .and_then(|tail| tail.split('.').next())
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ConfigError::UnparsableModelFilename(filename.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_kv_string() {
        let mut cfg = CoreConfig::default();
        cfg.apply_conf_str("actor_num_simulation=16:zero_server_port=4242")
            .unwrap();
        assert_eq!(cfg.actor.num_simulation, 16);
        assert_eq!(cfg.zero.server_port, 4242);

        let rendered = cfg.to_kv_string();
        let mut reloaded = CoreConfig::default();
        for line in rendered.lines() {
            reloaded.apply_entry(line).unwrap();
        }
        assert_eq!(reloaded.actor.num_simulation, 16);
        assert_eq!(reloaded.zero.server_port, 4242);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut cfg = CoreConfig::default();
        assert!(cfg.apply_conf_str("not_a_real_key=1").is_err());
    }

    #[test]
    fn model_iteration_parses_checkpoint_name() {
        assert_eq!(CoreConfig::parse_model_iteration("weight_iter_42.pt").unwrap(), 42);
        assert!(CoreConfig::parse_model_iteration("garbage").is_err());
    }
}
