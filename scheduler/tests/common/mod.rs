//! Minimal Tic-Tac-Toe fixture for exercising the scheduler end to end.
//! Deliberately independent from `zero-core`'s own test fixture: this crate
//! only depends on `zero-core`'s public API, not its test-only internals.

use std::sync::Arc;
use zero_core::{Action, Environment, Player, PolicyValue, Rotation};

#[derive(Debug, Clone)]
pub struct TicTacToe {
    board: [Option<Player>; 9],
    turn: Player,
    history: Vec<Action>,
}

impl TicTacToe {
    pub fn new() -> Self {
        TicTacToe {
            board: [None; 9],
            turn: Player::Player1,
            history: Vec::new(),
        }
    }

    fn winner(&self) -> Option<Player> {
        const LINES: [[usize; 3]; 8] = [
            [0, 1, 2], [3, 4, 5], [6, 7, 8],
            [0, 3, 6], [1, 4, 7], [2, 5, 8],
            [0, 4, 8], [2, 4, 6],
        ];
        for line in LINES.iter() {
            if let Some(p) = self.board[line[0]] {
                if self.board[line[1]] == Some(p) && self.board[line[2]] == Some(p) {
                    return Some(p);
                }
            }
        }
        None
    }
}

impl Environment for TicTacToe {
    fn reset(&mut self) {
        *self = TicTacToe::new();
    }

    fn act(&mut self, action: Action) -> bool {
        if !self.is_legal_action(action) {
            return false;
        }
        self.board[action.id] = Some(action.player);
        self.history.push(action);
        self.turn = self.turn.opponent();
        true
    }

    fn is_terminal(&self) -> bool {
        self.winner().is_some() || self.board.iter().all(|c| c.is_some())
    }

    fn turn(&self) -> Player {
        self.turn
    }

    fn is_legal_action(&self, action: Action) -> bool {
        action.player == self.turn && self.board[action.id].is_none()
    }

    fn legal_actions(&self) -> Vec<Action> {
        (0..9)
            .filter(|&id| self.board[id].is_none())
            .map(|id| Action { id, player: self.turn })
            .collect()
    }

    fn eval_score(&self, resigned: bool) -> f32 {
        let _ = resigned;
        match self.winner() {
            Some(Player::Player1) => 1.,
            Some(Player::Player2) => -1.,
            None => 0.,
        }
    }

    fn reward(&self) -> f32 {
        0.
    }

    fn features(&self, pov: Player, rotation: Rotation) -> Vec<f32> {
        let _ = rotation;
        self.board
            .iter()
            .map(|c| match c {
                Some(p) if *p == pov => 1.,
                Some(_) => -1.,
                None => 0.,
            })
            .collect()
    }

    fn action_features(&self, action: Action, rotation: Rotation) -> Vec<f32> {
        let _ = rotation;
        let mut v = vec![0.; 9];
        v[action.id] = 1.;
        v
    }

    fn action_history(&self) -> &[Action] {
        &self.history
    }

    fn render(&self) -> String {
        self.board
            .iter()
            .map(|c| match c {
                Some(Player::Player1) => 'X',
                Some(Player::Player2) => 'O',
                None => '.',
            })
            .collect()
    }
}

pub struct UniformAlphaZero;

impl zero_core::AlphaZeroEvaluator for UniformAlphaZero {
    fn forward(&self, batch: &[Vec<f32>]) -> Vec<PolicyValue> {
        batch
            .iter()
            .map(|_| PolicyValue {
                policy_logits: vec![0.; 9],
                value: 0.,
            })
            .collect()
    }
}

pub fn uniform_alphazero() -> Arc<dyn zero_core::AlphaZeroEvaluator> {
    Arc::new(UniformAlphaZero)
}
