//! Two-player zero-sum turn representation.

use std::fmt;

/// Which of the two players owns a turn or a subtree edge.
///
/// Values throughout the tree (`TreeNode::mean`) are always stored from
/// `Player1`'s point of view; callers flip the sign when scoring from
/// `Player2`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    /// First player to move in a fresh game.
    Player1,
    /// Second player.
    Player2,
}

impl Player {
    /// The other player.
    pub fn opponent(self) -> Player {
        match self {
            Player::Player1 => Player::Player2,
            Player::Player2 => Player::Player1,
        }
    }

    /// +1. for `Player1`, -1. for `Player2`. Used to flip a `Player1`-relative
    /// value into a given player's point of view.
    pub fn sign(self) -> f32 {
        match self {
            Player::Player1 => 1.,
            Player::Player2 => -1.,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Player1 => write!(f, "1"),
            Player::Player2 => write!(f, "2"),
        }
    }
}
