//! Self-play record construction and the exact wire format the scheduler
//! emits on stdout for the server to consume.

use crate::game::Action;
use std::fmt;

/// Everything logged about one decided move, used both to build the
/// emitted record string and (eventually) as training targets.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    /// The move actually played.
    pub action: Action,
    /// Root policy distribution at decision time, one weight per child.
    pub policy: Vec<(Action, f32)>,
    /// Root's backed-up mean value at decision time (`Player1`-relative).
    pub mean_value: f32,
    /// Environment reward yielded by playing `action`.
    pub reward: f32,
}

impl fmt::Display for ActionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy_str = self
            .policy
            .iter()
            .map(|(a, p)| format!("{}:{:.4}", a.id, p))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "{}|P:{}|V:{:.4}|R:{:.4}",
            self.action.id, policy_str, self.mean_value, self.reward
        )
    }
}

/// The full action-info history of one game, as accumulated by an actor.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// One entry per decided move, in play order.
    pub history: Vec<ActionInfo>,
}

impl Record {
    /// Serialize the whole history as the `<record>` field of the
    /// `SelfPlay` line.
    pub fn serialize(&self) -> String {
        self.history
            .iter()
            .map(ActionInfo::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Serialize only `[start, end]` (inclusive) of the history, used for
    /// the windowed intermediate emissions.
    pub fn serialize_window(&self, start: usize, end: usize) -> String {
        self.history[start..=end]
            .iter()
            .map(ActionInfo::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Training-data window `[start, end]` (inclusive, 0-indexed into the
/// action history) for one record emission. Mirrors
/// `ActorGroup::calculateTrainingDataRange`.
pub fn training_data_range(
    game_length: usize,
    is_terminal: bool,
    n_step_return: usize,
    sequence_length: usize,
) -> (usize, usize) {
    if game_length == 0 {
        return (0, 0);
    }
    if sequence_length == 0 {
        // seq_len == 0 means "no windowing": the whole game is one record.
        return (0, game_length - 1);
    }
    let data_end = if is_terminal {
        game_length - 1
    } else {
        game_length.saturating_sub(n_step_return.saturating_sub(1))
    };
    let data_start = if is_terminal {
        data_end - data_end % sequence_length
    } else {
        data_end.saturating_sub(sequence_length.saturating_sub(1))
    };
    (data_start, data_end)
}

/// Build the exact `SelfPlay <terminal?> <data_length> <game_length>
/// <return> <record> #` line the scheduler writes to stdout.
pub fn format_selfplay_line(
    is_terminal: bool,
    data_range: (usize, usize),
    game_length: usize,
    eval_return: f32,
    record: &str,
) -> String {
    let data_length = data_range.1 - data_range.0 + 1;
    format!(
        "SelfPlay {} {} {} {} {} #",
        is_terminal, data_length, game_length, eval_return, record
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_window_aligns_to_sequence_boundary() {
        let (start, end) = training_data_range(10, true, 5, 4);
        assert_eq!(end, 9);
        assert_eq!(start, 8); // 9 - 9%4
    }

    #[test]
    fn non_terminal_window_uses_n_step_horizon() {
        let (start, end) = training_data_range(10, false, 5, 4);
        assert_eq!(end, 6); // 10 - (5-1)
        assert_eq!(start, 3); // 6 - (4-1)
    }

    #[test]
    fn selfplay_line_has_exact_shape() {
        let line = format_selfplay_line(true, (0, 2), 3, 1.0, "a;b;c");
        assert_eq!(line, "SelfPlay true 3 3 1 a;b;c #");
    }
}
