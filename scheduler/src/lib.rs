//! Actor Group Scheduler: drives `num_parallel_games` actors through the
//! two-phase CPU/GPU cycle described in the search core's concurrency
//! model, emitting finished self-play records and reacting to a small
//! command vocabulary read from stdin.
//!
//! One phase claims actors round-robin and does tree work (`before_nn_evaluation`
//! / `after_nn_evaluation`); the other collects every actor's pending request
//! into a single batched network call. Threads rendezvous at a
//! [`std::sync::Barrier`] between phases, mirroring "T preemptive OS threads
//! synchronizing through two barrier points per cycle".

use crossbeam_channel::{unbounded, Receiver};
use log::{info, warn};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use zero_core::actor::record::{format_selfplay_line, training_data_range};
use zero_core::actor::{AlphaZeroActor, MuZeroActor};
use zero_core::config::{ActorConfig, ZeroConfig};
use zero_core::network::{AlphaZeroEvaluator, MuZeroEvaluator, PolicyValue, RecurrentOutput};
use zero_core::{Environment, HiddenState};

/// Either family of actor, so one scheduler instance can drive a uniform
/// pool regardless of which network architecture is configured.
pub enum ActorSlot<E: Environment> {
    /// Direct-inference search.
    AlphaZero(AlphaZeroActor<E>),
    /// Hidden-state search with a learned dynamics function.
    MuZero(MuZeroActor<E>),
}

enum PendingRequest {
    AlphaZero(Vec<f32>),
    MuZero(HiddenState, Vec<f32>),
}

enum NnOutput {
    AlphaZero(PolicyValue),
    MuZero(RecurrentOutput),
}

struct ActorState<E: Environment> {
    actor: ActorSlot<E>,
    pending: Option<PendingRequest>,
    response: Option<NnOutput>,
    games_done: usize,
    idle: bool,
}

impl<E: Environment> ActorSlot<E> {
    fn is_search_done(&self) -> bool {
        match self {
            ActorSlot::AlphaZero(a) => a.is_search_done(),
            ActorSlot::MuZero(a) => a.is_search_done(),
        }
    }
}

/// Commands recognized on the stdin control channel; anything else is
/// logged as unknown and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    ResetActors,
    LoadModel(String),
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let mut parts = line.trim().splitn(2, ' ');
    let head = parts.next().unwrap_or("");
    let rest = parts.next();
    match head {
        "start" if rest.is_none() => Command::Start,
        "stop" if rest.is_none() => Command::Stop,
        "reset_actors" if rest.is_none() => Command::ResetActors,
        "load_model" => Command::LoadModel(rest.unwrap_or("").to_string()),
        "quit" if rest.is_none() => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Spawn a background thread that blocks reading lines from `reader` and
/// forwards parsed commands into the returned channel, exactly as
/// `ActorGroup`'s dedicated I/O thread feeds its command queue.
pub fn spawn_command_reader<R: BufRead + Send + 'static>(reader: R) -> Receiver<Command> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) if !line.is_empty() => {
                    if tx.send(parse_command(&line)).is_err() {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });
    rx
}

/// A finished or intermediate self-play line, ready to be written by
/// whatever transport the caller wires up (stdout for a standalone
/// worker process, a channel for an in-process harness, ...).
pub type RecordSink = dyn Fn(&str) + Send + Sync;

/// Drives a pool of actors through the CPU/GPU cycle until told to quit.
pub struct ActorGroupScheduler<E: Environment + 'static> {
    actors: Vec<Mutex<ActorState<E>>>,
    next_actor: AtomicUsize,
    running: AtomicBool,
    quit: AtomicBool,
    alpha_network: Option<Arc<dyn AlphaZeroEvaluator>>,
    mu_network: Option<Arc<dyn MuZeroEvaluator>>,
    actor_config: ActorConfig,
    zero_config: ZeroConfig,
    /// `learner_n_step_return` from `LearnerConfig`, needed only for the
    /// non-terminal record-windowing formula.
    n_step_return: usize,
    program_seed: u64,
    command_rx: Receiver<Command>,
    record_sink: Arc<RecordSink>,
    actor_ignored_command_prefixes: Vec<String>,
}

fn make_actor<E: Environment + Clone + 'static>(
    env: E,
    alpha: &Option<Arc<dyn AlphaZeroEvaluator>>,
    mu: &Option<Arc<dyn MuZeroEvaluator>>,
    config: ActorConfig,
    seed: u64,
) -> ActorSlot<E> {
    match (alpha, mu) {
        (Some(net), _) => ActorSlot::AlphaZero(AlphaZeroActor::new(env, Arc::clone(net), config, seed)),
        (None, Some(net)) => ActorSlot::MuZero(MuZeroActor::new(env, Arc::clone(net), config, seed)),
        (None, None) => panic!("scheduler requires at least one network family configured"),
    }
}

impl<E: Environment + Clone + 'static> ActorGroupScheduler<E> {
    /// Build a scheduler with `zero_config.num_parallel_games` freshly
    /// reset actors, exactly one of `alpha_network`/`mu_network` set.
    pub fn new(
        env_factory: impl Fn() -> E,
        alpha_network: Option<Arc<dyn AlphaZeroEvaluator>>,
        mu_network: Option<Arc<dyn MuZeroEvaluator>>,
        actor_config: ActorConfig,
        zero_config: ZeroConfig,
        n_step_return: usize,
        program_seed: u64,
        command_rx: Receiver<Command>,
        record_sink: Arc<RecordSink>,
    ) -> Self {
        let actors = (0..zero_config.num_parallel_games)
            .map(|i| {
                let actor = make_actor(
                    env_factory(),
                    &alpha_network,
                    &mu_network,
                    actor_config.clone(),
                    program_seed + i as u64,
                );
                Mutex::new(ActorState {
                    actor,
                    pending: None,
                    response: None,
                    games_done: 0,
                    idle: false,
                })
            })
            .collect();
        let actor_ignored_command_prefixes = zero_config.actor_ignored_command.clone();
        ActorGroupScheduler {
            actors,
            next_actor: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            alpha_network,
            mu_network,
            actor_config,
            zero_config,
            n_step_return,
            program_seed,
            command_rx,
            record_sink,
            actor_ignored_command_prefixes,
        }
    }

    /// Run `num_threads` worker threads until a `quit` command arrives,
    /// blocking the caller. Each thread executes the CPU phase, then the
    /// GPU phase (only the thread with id `0` actually touches the
    /// network, matching "id < number-of-networks" for our single-network
    /// configuration), rendezvousing at a barrier between the two.
    pub fn run(self: Arc<Self>, num_threads: usize) {
        let barrier = Arc::new(Barrier::new(num_threads.max(1)));
        let handles: Vec<_> = (0..num_threads.max(1))
            .map(|thread_id| {
                let scheduler = Arc::clone(&self);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || scheduler.worker_loop(thread_id, barrier))
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn worker_loop(&self, thread_id: usize, barrier: Arc<Barrier>) {
        loop {
            if thread_id == 0 {
                self.drain_commands();
            }
            barrier.wait();
            if self.quit.load(Ordering::Acquire) {
                break;
            }
            self.next_actor.store(0, Ordering::SeqCst);
            barrier.wait();

            self.do_cpu_phase();
            barrier.wait();
            if thread_id == 0 {
                self.do_gpu_phase();
            }
            barrier.wait();
        }
    }

    /// Run a single CPU/GPU cycle on the calling thread, with no barrier
    /// and no background threads. Exercises the same phase logic
    /// `worker_loop` drives, useful for tests and single-threaded callers.
    pub fn step(&self) {
        self.drain_commands();
        self.next_actor.store(0, Ordering::SeqCst);
        self.do_cpu_phase();
        self.do_gpu_phase();
    }

    pub fn num_actors(&self) -> usize {
        self.actors.len()
    }

    pub fn games_done(&self, index: usize) -> usize {
        self.actors[index].lock().unwrap().games_done
    }

    pub fn is_idle(&self, index: usize) -> bool {
        self.actors[index].lock().unwrap().idle
    }

    fn drain_commands(&self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match &command {
                Command::Start => {
                    info!("command: start");
                    self.running.store(true, Ordering::SeqCst);
                }
                Command::Stop => {
                    info!("command: stop");
                    self.running.store(false, Ordering::SeqCst);
                }
                Command::ResetActors => {
                    info!("command: reset_actors");
                    for slot in &self.actors {
                        let mut state = slot.lock().unwrap();
                        state.idle = false;
                        state.games_done = 0;
                        state.pending = None;
                        state.response = None;
                        match &mut state.actor {
                            ActorSlot::AlphaZero(a) => a.reset_game(),
                            ActorSlot::MuZero(a) => a.reset_game(),
                        }
                    }
                }
                Command::LoadModel(path) => {
                    info!("command: load_model {}", path);
                    // Reloading weights in-place is a network-framework concern
                    // external to this crate; the network `Arc`s are shared with
                    // every actor, so a caller-supplied evaluator that hot-swaps
                    // its own internal weights on a side channel picks this up
                    // for free. Nothing to do here beyond logging the request.
                }
                Command::Quit => {
                    info!("command: quit");
                    self.quit.store(true, Ordering::SeqCst);
                }
                Command::Unknown(line) => {
                    if self
                        .actor_ignored_command_prefixes
                        .iter()
                        .any(|prefix| line.starts_with(prefix.as_str()))
                    {
                        continue;
                    }
                    warn!("unrecognized command: {}", line);
                }
            }
        }
    }

    fn do_cpu_phase(&self) {
        loop {
            let index = self.next_actor.fetch_add(1, Ordering::SeqCst);
            if index >= self.actors.len() {
                break;
            }
            let mut state = self.actors[index].lock().unwrap();
            if !self.running.load(Ordering::SeqCst) || state.idle {
                continue;
            }

            if let Some(response) = state.response.take() {
                self.apply_response(&mut state, response);
                if state.actor.is_search_done() {
                    self.handle_search_done(index, &mut state);
                }
            }

            if !state.idle {
                self.enqueue_request(&mut state);
            }
        }
    }

    fn apply_response(&self, state: &mut ActorState<E>, response: NnOutput) {
        match (&mut state.actor, response) {
            (ActorSlot::AlphaZero(a), NnOutput::AlphaZero(output)) => a.after_nn_evaluation(&output),
            (ActorSlot::MuZero(a), NnOutput::MuZero(output)) => a.after_nn_evaluation(output),
            _ => unreachable!("actor family and network response family always match"),
        }
    }

    fn enqueue_request(&self, state: &mut ActorState<E>) {
        state.pending = match &mut state.actor {
            ActorSlot::AlphaZero(a) => a.before_nn_evaluation().map(|req| PendingRequest::AlphaZero(req.features)),
            ActorSlot::MuZero(a) => a
                .before_nn_evaluation()
                .map(|(hidden, features)| PendingRequest::MuZero(hidden, features)),
        };
    }

    /// Whether a non-terminal move falls on an intermediate recording
    /// boundary. `seq_len == 0` means "terminal records only" — matches
    /// `ActorGroup`'s one-record-per-game default for board games.
    fn is_sequence_boundary(game_length: usize, n_step_return: usize, seq_len: usize) -> bool {
        if seq_len == 0 {
            return false;
        }
        let base = game_length as isize - n_step_return as isize + 1;
        base >= 0 && (base as usize) % seq_len == seq_len - 1
    }

    fn handle_search_done(&self, index: usize, state: &mut ActorState<E>) {
        let (action, info) = match &mut state.actor {
            ActorSlot::AlphaZero(a) => a.decide_action(),
            ActorSlot::MuZero(a) => a.decide_action(),
        };
        let (game_over, game_length, eval_score, record_line) = match &mut state.actor {
            ActorSlot::AlphaZero(a) => {
                let done = a.act(action, info);
                (done, a.game_length(), a.eval_score(), a.record().serialize())
            }
            ActorSlot::MuZero(a) => {
                let done = a.act(action, info);
                (done, a.game_length(), a.eval_score(), a.record().serialize())
            }
        };

        let seq_len = self.zero_config.actor_intermediate_sequence_length;
        let should_emit = game_over || Self::is_sequence_boundary(game_length, self.n_step_return, seq_len);
        if should_emit {
            let (start, end) = training_data_range(game_length, game_over, self.n_step_return, seq_len);
            let window = record_line.split(';').collect::<Vec<_>>()[start..=end].join(";");
            let line = format_selfplay_line(game_over, (start, end), game_length, eval_score, &window);
            (self.record_sink)(&line);
        }

        if game_over {
            state.games_done += 1;
            let quota_reached = self.zero_config.actor_stop_after_enough_games
                && state.games_done >= self.zero_config.num_games_per_iteration.max(1);
            if quota_reached {
                info!("actor {} idle: reached its game quota", index);
                state.idle = true;
            } else {
                match &mut state.actor {
                    ActorSlot::AlphaZero(a) => a.reset_game(),
                    ActorSlot::MuZero(a) => a.reset_game(),
                }
            }
        }
    }

    fn do_gpu_phase(&self) {
        let mut alpha_batch = Vec::new();
        let mut alpha_indices = Vec::new();
        let mut mu_batch = Vec::new();
        let mut mu_indices = Vec::new();

        for (index, slot) in self.actors.iter().enumerate() {
            let mut state = slot.lock().unwrap();
            match state.pending.take() {
                Some(PendingRequest::AlphaZero(features)) => {
                    alpha_batch.push(features);
                    alpha_indices.push(index);
                }
                Some(PendingRequest::MuZero(hidden, features)) => {
                    mu_batch.push((hidden, features));
                    mu_indices.push(index);
                }
                None => {}
            }
        }

        if !alpha_batch.is_empty() {
            if let Some(network) = &self.alpha_network {
                let outputs = network.forward(&alpha_batch);
                for (index, output) in alpha_indices.into_iter().zip(outputs.into_iter()) {
                    self.actors[index].lock().unwrap().response = Some(NnOutput::AlphaZero(output));
                }
            }
        }
        if !mu_batch.is_empty() {
            if let Some(network) = &self.mu_network {
                let outputs = network.recurrent_inference(&mu_batch);
                for (index, output) in mu_indices.into_iter().zip(outputs.into_iter()) {
                    self.actors[index].lock().unwrap().response = Some(NnOutput::MuZero(output));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_command_line_is_not_misparsed_as_a_known_one() {
        assert_eq!(parse_command("quit now"), Command::Unknown("quit now".to_string()));
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("load_model /tmp/w.pt"), Command::LoadModel("/tmp/w.pt".to_string()));
        assert_eq!(parse_command("start"), Command::Start);
    }
}
