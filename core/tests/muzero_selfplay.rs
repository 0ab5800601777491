mod common;

use common::{uniform_muzero, TicTacToe};
use zero_core::actor::MuZeroActor;
use zero_core::config::ActorConfig;

fn small_config() -> ActorConfig {
    ActorConfig {
        num_simulation: 12,
        use_dirichlet_noise: false,
        disable_resign_ratio: 1.0,
        ..ActorConfig::default()
    }
}

#[test]
fn muzero_self_play_game_runs_to_a_natural_terminal_state() {
    let env = TicTacToe::new();
    let mut actor = MuZeroActor::new(env, uniform_muzero(), small_config(), 5);

    let mut done = false;
    let mut moves = 0;
    while !done {
        actor.think();
        let (action, info) = actor.decide_action();
        done = actor.act(action, info);
        moves += 1;
        assert!(moves <= 9);
    }
    assert!(actor.env.is_terminal());
}

#[test]
fn gumbel_search_also_converges_for_muzero() {
    let env = TicTacToe::new();
    let config = ActorConfig {
        use_gumbel: true,
        gumbel_sample_size: 4,
        num_simulation: 16,
        disable_resign_ratio: 1.0,
        ..ActorConfig::default()
    };
    let mut actor = MuZeroActor::new(env, uniform_muzero(), config, 9);
    actor.think();
    let (_, info) = actor.decide_action();
    assert!(!info.policy.is_empty());
}
