//! Game- and network-agnostic search machinery: arena-allocated MCTS with
//! PUCT and Gumbel sequential-halving selection, the `Actor` state machine
//! that drives a search to a move decision, and the self-play record
//! format actors hand off to the scheduler.
//!
//! This crate never implements a game's rules or a network's forward
//! pass; callers plug those in via [`game::Environment`] and
//! [`network::AlphaZeroEvaluator`]/[`network::MuZeroEvaluator`].

pub mod actor;
pub mod config;
pub mod error;
pub mod game;
pub mod mcts;
pub mod network;
pub mod player;
pub mod tree;

pub use actor::{AlphaZeroActor, MuZeroActor};
pub use config::CoreConfig;
pub use error::{ArenaError, ConfigError};
pub use game::{Action, Environment, Rotation};
pub use mcts::Mcts;
pub use network::{AlphaZeroEvaluator, HiddenState, MuZeroEvaluator, PolicyValue, RecurrentOutput};
pub use player::Player;
