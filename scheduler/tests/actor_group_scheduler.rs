mod common;

use common::{uniform_alphazero, TicTacToe};
use crossbeam_channel::unbounded;
use std::sync::{Arc, Mutex};
use zero_core::config::{ActorConfig, ZeroConfig};
use zero_scheduler::{ActorGroupScheduler, Command};

fn small_config() -> (ActorConfig, ZeroConfig) {
    let actor_config = ActorConfig {
        num_simulation: 8,
        use_dirichlet_noise: false,
        disable_resign_ratio: 1.0,
        ..ActorConfig::default()
    };
    let zero_config = ZeroConfig {
        num_parallel_games: 2,
        num_games_per_iteration: 1,
        actor_stop_after_enough_games: true,
        ..ZeroConfig::default()
    };
    (actor_config, zero_config)
}

#[test]
fn actor_pool_plays_its_quota_and_goes_idle() {
    let (actor_config, zero_config) = small_config();
    let (tx, rx) = unbounded();
    tx.send(Command::Start).unwrap();

    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);
    let sink = Arc::new(move |line: &str| sink_lines.lock().unwrap().push(line.to_string()));

    let scheduler = Arc::new(ActorGroupScheduler::new(
        TicTacToe::new,
        Some(uniform_alphazero()),
        None,
        actor_config,
        zero_config,
        1,
        0,
        rx,
        sink,
    ));

    for _ in 0..2000 {
        scheduler.step();
        if (0..scheduler.num_actors()).all(|i| scheduler.is_idle(i)) {
            break;
        }
    }

    for i in 0..scheduler.num_actors() {
        assert!(scheduler.is_idle(i), "actor {} should have gone idle after its quota", i);
        assert_eq!(scheduler.games_done(i), 1);
    }

    let lines = lines.lock().unwrap();
    assert!(!lines.is_empty(), "scheduler should have emitted self-play lines");
    assert!(lines.iter().any(|l| l.starts_with("SelfPlay true ")));
}

#[test]
fn stop_command_pauses_actors_without_losing_progress() {
    let (actor_config, zero_config) = small_config();
    let (tx, rx) = unbounded();
    tx.send(Command::Stop).unwrap();

    let sink = Arc::new(|_line: &str| {});
    let scheduler = Arc::new(ActorGroupScheduler::new(
        TicTacToe::new,
        Some(uniform_alphazero()),
        None,
        actor_config,
        zero_config,
        1,
        0,
        rx,
        sink,
    ));

    for _ in 0..5 {
        scheduler.step();
    }
    for i in 0..scheduler.num_actors() {
        assert_eq!(scheduler.games_done(i), 0, "a stopped pool must not advance any game");
    }
}
