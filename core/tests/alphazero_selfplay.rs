mod common;

use common::{uniform_alphazero, TicTacToe};
use zero_core::actor::record::{format_selfplay_line, training_data_range};
use zero_core::actor::AlphaZeroActor;
use zero_core::config::ActorConfig;

fn small_config() -> ActorConfig {
    ActorConfig {
        num_simulation: 12,
        use_dirichlet_noise: false,
        disable_resign_ratio: 1.0, // never resign, so games always run to a natural terminal
        ..ActorConfig::default()
    }
}

#[test]
fn self_play_game_runs_to_a_natural_terminal_state() {
    let env = TicTacToe::new();
    let mut actor = AlphaZeroActor::new(env, uniform_alphazero(), small_config(), 7);

    let mut done = false;
    let mut moves = 0;
    while !done {
        actor.think();
        let (action, info) = actor.decide_action();
        done = actor.act(action, info);
        moves += 1;
        assert!(moves <= 9, "tic-tac-toe cannot run longer than 9 plies");
    }

    assert_eq!(actor.game_length(), moves);
    assert!(actor.env.is_terminal());
}

#[test]
fn decided_policy_sums_to_one_over_root_children() {
    let env = TicTacToe::new();
    let mut actor = AlphaZeroActor::new(env, uniform_alphazero(), small_config(), 11);
    actor.think();
    let (_, info) = actor.decide_action();
    let total: f32 = info.policy.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-4, "policy should normalize to 1, got {}", total);
}

#[test]
fn recorded_selfplay_line_has_the_expected_wire_shape() {
    let env = TicTacToe::new();
    let mut actor = AlphaZeroActor::new(env, uniform_alphazero(), small_config(), 3);

    let mut done = false;
    while !done {
        actor.think();
        let (action, info) = actor.decide_action();
        done = actor.act(action, info);
    }

    let record = actor.record();
    let game_length = actor.game_length();
    let (start, end) = training_data_range(game_length, true, 1, 4);
    let window = record.serialize_window(start, end);
    let line = format_selfplay_line(true, (start, end), game_length, actor.eval_score(), &window);

    assert!(line.starts_with("SelfPlay true "));
    assert!(line.ends_with(" #"));
    let fields: Vec<&str> = line.split(' ').collect();
    assert_eq!(fields[0], "SelfPlay");
    assert_eq!(fields.last().copied(), Some("#"));
}
