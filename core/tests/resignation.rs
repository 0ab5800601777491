mod common;

use common::{uniform_alphazero, TicTacToe};
use zero_core::actor::AlphaZeroActor;
use zero_core::config::ActorConfig;

/// With a uniform network, every win-rate estimate sits at (or very near)
/// `0.`, so a resign threshold above zero should trigger resignation on the
/// very first move whenever resignation isn't disabled for this game.
#[test]
fn resignation_threshold_above_zero_win_rate_triggers_immediately() {
    let env = TicTacToe::new();
    let config = ActorConfig {
        num_simulation: 8,
        use_dirichlet_noise: false,
        resign_threshold: 0.5,
        disable_resign_ratio: 0.0,
        ..ActorConfig::default()
    };
    let mut actor = AlphaZeroActor::new(env, uniform_alphazero(), config, 42);
    actor.think();
    let (action, info) = actor.decide_action();
    assert!(actor.is_resigned());
    let done = actor.act(action, info);
    assert!(done);
    assert_eq!(actor.game_length(), 1);
}

/// `disable_resign_ratio: 1.0` means resignation is disabled for every
/// game, so the actor must play to a natural terminal state even under a
/// threshold that would otherwise trigger resignation immediately.
#[test]
fn disabled_resignation_always_plays_to_a_natural_terminal() {
    let env = TicTacToe::new();
    let config = ActorConfig {
        num_simulation: 8,
        use_dirichlet_noise: false,
        resign_threshold: 0.5,
        disable_resign_ratio: 1.0,
        ..ActorConfig::default()
    };
    let mut actor = AlphaZeroActor::new(env, uniform_alphazero(), config, 42);

    let mut done = false;
    while !done {
        actor.think();
        let (action, info) = actor.decide_action();
        assert!(!actor.is_resigned());
        done = actor.act(action, info);
    }
    assert!(actor.env.is_terminal());
}
