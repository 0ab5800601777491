//! Capability trait implemented by game-rule crates external to this one.
//!
//! `zero-core` never implements a game: it only ever holds a `Box<dyn
//! Environment>` (or a generic `E: Environment`) and calls these methods.

use crate::player::Player;
use std::fmt::Debug;

/// A single legal move, tagged with the player who owns it.
///
/// `id` is an opaque, environment-defined encoding (column index, point on
/// a board, Atari joystick code, ...); the tree never interprets it beyond
/// equality and use as a map key into `TreeNode::action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    /// Environment-defined move identifier.
    pub id: usize,
    /// Player this move belongs to.
    pub player: Player,
}

/// Board symmetry index used to vary the features presented to the network
/// across visits to the same state (`actor_use_random_rotation_features`).
/// `Rotation(0)` is always the identity transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation(pub u8);

impl Rotation {
    /// No transform applied.
    pub const IDENTITY: Rotation = Rotation(0);
}

/// The external game-rule engine the search machinery drives.
///
/// Implementations own their own board representation; the only thing this
/// crate requires is the ability to clone a state (used to replay a node
/// path when an environment transition is needed) and to answer the
/// questions below.
pub trait Environment: Clone + Debug + Send {
    /// Reset to the initial position.
    fn reset(&mut self);

    /// Apply `action`. Returns `false` (and leaves the state unchanged) if
    /// the action was illegal.
    fn act(&mut self, action: Action) -> bool;

    /// Whether the game has ended (win, loss, draw, or no legal moves left).
    fn is_terminal(&self) -> bool;

    /// Player to move.
    fn turn(&self) -> Player;

    /// Whether `action` is currently legal.
    fn is_legal_action(&self, action: Action) -> bool;

    /// All currently legal actions.
    fn legal_actions(&self) -> Vec<Action>;

    /// Terminal evaluation from `Player1`'s point of view, in `[-1, 1]`.
    /// `resigned` distinguishes an actual resignation from a natural
    /// terminal state, since some environments score them differently.
    fn eval_score(&self, resigned: bool) -> f32;

    /// Immediate reward emitted by the most recent `act()` call. Always
    /// `0.` for board games; meaningful for reward-bearing environments
    /// such as Atari.
    fn reward(&self) -> f32;

    /// Feature-encode the current state under the given symmetry, from
    /// `pov`'s point of view. Flat row-major buffer; shape is a network
    /// concern, not this crate's.
    fn features(&self, pov: Player, rotation: Rotation) -> Vec<f32>;

    /// Feature-encode a single action under the given symmetry (used by the
    /// MuZero dynamics network, which consumes state features concatenated
    /// with an action encoding).
    fn action_features(&self, action: Action, rotation: Rotation) -> Vec<f32>;

    /// Actions played so far, in order.
    fn action_history(&self) -> &[Action];

    /// Human-readable board rendering, used only for optional diagnostic
    /// logging around endgame.
    fn render(&self) -> String;
}
