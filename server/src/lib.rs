//! Zero Server: the TCP line-protocol coordinator. Tracks self-play and
//! optimization workers, drives one `self_play(); optimization()` pass per
//! configured iteration, collects self-play records into `sgf/<iter>.sgf`,
//! and enforces the configured model-freshness policy.
//!
//! Library crates never initialize a logger (`zero-cli` wires `flexi_logger`
//! at startup); this crate additionally writes the two append-only
//! `Worker.log`/`Training.log` streams operators tail directly.

pub mod error;
pub mod logger;
pub mod protocol;

use log::{info, warn};
use logger::ZeroLogger;
use protocol::{parse_handshake, parse_worker_message, WorkerKind, WorkerMessage};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::stream::StreamExt;
use tokio::sync::mpsc;
use zero_core::config::CoreConfig;
use zero_core::error::ConfigError;

struct ConnectionHandle {
    kind: WorkerKind,
    sender: mpsc::UnboundedSender<String>,
}

type Connections = Arc<Mutex<HashMap<u64, ConnectionHandle>>>;

fn broadcast(connections: &Connections, kind: Option<WorkerKind>, line: &str) {
    let connections = connections.lock().unwrap();
    for handle in connections.values() {
        if kind.map_or(true, |k| handle.kind == k) {
            let _ = handle.sender.send(line.to_string());
        }
    }
}

/// The coordinator itself. Built once from a resolved [`CoreConfig`] and the
/// checkpoint filename the process was started with, then consumed by
/// [`ZeroServer::run`].
pub struct ZeroServer {
    config: CoreConfig,
    model_iteration: usize,
    logger: Arc<ZeroLogger>,
}

impl ZeroServer {
    /// `checkpoint_filename` is the `weight_iter_<n>.pt` basename the
    /// server starts from; pass an empty string to start fresh at
    /// iteration `0`.
    pub fn new(config: CoreConfig, checkpoint_filename: &str) -> Result<Self, ConfigError> {
        let model_iteration = if checkpoint_filename.is_empty() {
            0
        } else {
            CoreConfig::parse_model_iteration(checkpoint_filename)?
        };
        let logger = ZeroLogger::open(Path::new(&config.zero.training_directory)).map_err(|e| {
            ConfigError::InvalidEntry {
                key: "zero_training_directory".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(ZeroServer {
            config,
            model_iteration,
            logger: Arc::new(logger),
        })
    }

    fn checkpoint_path(&self) -> String {
        format!("{}/model/weight_iter_{}.pt", self.config.zero.training_directory, self.model_iteration)
    }

    /// Accept connections and run `self_play(); optimization()` for every
    /// iteration in `[start_iteration, end_iteration]`, then broadcast
    /// `quit` and return.
    pub async fn run(mut self) -> io::Result<()> {
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let listener = TcpListener::bind(("0.0.0.0", self.config.zero.server_port)).await?;
        info!("zero server listening on port {}", self.config.zero.server_port);

        let (records_tx, mut records_rx) = mpsc::unbounded_channel::<String>();
        let (opt_done_tx, mut opt_done_rx) = mpsc::unbounded_channel::<usize>();
        let next_id = Arc::new(AtomicU64::new(0));
        let config_kv = self.config.to_kv_string().replace('\n', ":");
        let training_directory = self.config.zero.training_directory.clone();

        {
            let connections = Arc::clone(&connections);
            let logger = Arc::clone(&self.logger);
            let records_tx = records_tx.clone();
            let opt_done_tx = opt_done_tx.clone();
            tokio::spawn(async move {
                loop {
                    let (socket, addr) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(handle_connection(
                        id,
                        socket,
                        addr,
                        Arc::clone(&connections),
                        Arc::clone(&logger),
                        records_tx.clone(),
                        opt_done_tx.clone(),
                        training_directory.clone(),
                        config_kv.clone(),
                    ));
                }
            });
        }

        {
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(60));
                loop {
                    ticker.tick().await;
                    broadcast(&connections, None, "keep_alive");
                }
            });
        }

        for iteration in self.config.zero.start_iteration..=self.config.zero.end_iteration {
            self.logger.iteration_started(iteration);
            self.self_play(iteration, &connections, &mut records_rx).await?;
            self.optimization(iteration, &connections, &mut opt_done_rx).await;
            self.logger.iteration_finished(iteration);
        }

        broadcast(&connections, None, "quit");
        Ok(())
    }

    async fn self_play(
        &self,
        iteration: usize,
        connections: &Connections,
        records_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> io::Result<()> {
        let sgf_dir = Path::new(&self.config.zero.training_directory).join("sgf");
        std::fs::create_dir_all(&sgf_dir)?;
        let mut sgf_file = File::create(sgf_dir.join(format!("{}.sgf", iteration)))?;

        broadcast(connections, Some(WorkerKind::SelfPlay), &format!("load_model {}", self.checkpoint_path()));
        broadcast(connections, Some(WorkerKind::SelfPlay), "reset_actors");
        broadcast(connections, Some(WorkerKind::SelfPlay), "start");

        let quota = self.config.zero.num_games_per_iteration.max(1);
        let progress_step = (quota / 4).max(1);
        let mut games_done = 0usize;
        let mut lengths = Vec::new();
        let mut returns = Vec::new();

        while games_done < quota {
            let line = match records_rx.recv().await {
                Some(line) => line,
                None => break,
            };
            let fields: Vec<&str> = line.split(' ').collect();
            let terminal = fields.get(1).copied() == Some("true");
            let _ = writeln!(sgf_file, "{}", line);

            if terminal {
                games_done += 1;
                if let (Some(game_length), Some(eval_return)) = (
                    fields.get(3).and_then(|s| s.parse::<usize>().ok()),
                    fields.get(4).and_then(|s| s.parse::<f32>().ok()),
                ) {
                    lengths.push(game_length);
                    returns.push(eval_return);
                }
                if games_done % progress_step == 0 {
                    self.logger.self_play_progress(games_done, quota);
                }
            }
        }

        broadcast(connections, Some(WorkerKind::SelfPlay), "stop");

        if !lengths.is_empty() {
            let avg_len = lengths.iter().sum::<usize>() as f32 / lengths.len() as f32;
            let avg_return = returns.iter().sum::<f32>() / returns.len() as f32;
            self.logger.self_play_summary(
                lengths.len(),
                avg_len,
                *lengths.iter().min().unwrap(),
                *lengths.iter().max().unwrap(),
                avg_return,
            );
        }
        Ok(())
    }

    async fn optimization(
        &mut self,
        iteration: usize,
        connections: &Connections,
        opt_done_rx: &mut mpsc::UnboundedReceiver<usize>,
    ) {
        self.logger.optimization_started(iteration);
        let start_window = (iteration + 1).saturating_sub(self.config.zero.replay_buffer).max(1);
        broadcast(
            connections,
            Some(WorkerKind::Optimization),
            &protocol::job_optimization(&self.config.zero.training_directory),
        );
        broadcast(
            connections,
            Some(WorkerKind::Optimization),
            &protocol::optimization_window(&self.checkpoint_path(), start_window, iteration),
        );

        if let Some(new_model_iteration) = opt_done_rx.recv().await {
            self.model_iteration = new_model_iteration;
            self.logger.optimization_finished(new_model_iteration);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    id: u64,
    socket: TcpStream,
    addr: SocketAddr,
    connections: Connections,
    logger: Arc<ZeroLogger>,
    records_tx: mpsc::UnboundedSender<String>,
    opt_done_tx: mpsc::UnboundedSender<usize>,
    training_directory: String,
    config_kv: String,
) {
    let (reader, mut writer) = tokio::io::split(socket);
    let mut lines = BufReader::new(reader).lines();

    let first_line = match lines.next().await {
        Some(Ok(line)) => line,
        _ => return,
    };
    let (name, kind) = match parse_handshake(&first_line) {
        Ok(pair) => pair,
        Err(e) => {
            logger.protocol_error(&addr.to_string(), &e.to_string());
            return;
        }
    };
    logger.worker_connected(&name, &addr.to_string());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    connections.lock().unwrap().insert(id, ConnectionHandle { kind, sender: out_tx.clone() });

    let writer_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if writer.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let greeting = match kind {
        WorkerKind::SelfPlay => protocol::job_self_play(&training_directory, &config_kv),
        WorkerKind::Optimization => protocol::job_optimization(&training_directory),
    };
    let _ = out_tx.send(greeting);

    while let Some(result) = lines.next().await {
        let line = match result {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.is_empty() {
            continue;
        }
        match parse_worker_message(&line) {
            Ok(WorkerMessage::SelfPlay { line }) if kind == WorkerKind::SelfPlay => {
                let _ = records_tx.send(line);
            }
            Ok(WorkerMessage::OptimizationDone { model_iteration }) if kind == WorkerKind::Optimization => {
                let _ = opt_done_tx.send(model_iteration);
            }
            Ok(_) => {
                logger.protocol_error(&addr.to_string(), &format!("unexpected message from {}: {}", name, line));
            }
            Err(e) => {
                logger.protocol_error(&addr.to_string(), &e.to_string());
            }
        }
    }

    connections.lock().unwrap().remove(&id);
    logger.worker_disconnected(&name);
    drop(out_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(training_directory: &str) -> CoreConfig {
        let mut config = CoreConfig::default();
        config.zero.training_directory = training_directory.to_string();
        config.zero.num_games_per_iteration = 3;
        config.zero.replay_buffer = 1;
        config
    }

    #[tokio::test]
    async fn self_play_stops_consuming_records_once_the_quota_is_met() {
        let dir = std::env::temp_dir().join("zero-server-unit-test-self-play");
        let _ = std::fs::remove_dir_all(&dir);
        let server = ZeroServer::new(test_config(dir.to_str().unwrap()), "").unwrap();
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let (records_tx, mut records_rx) = mpsc::unbounded_channel::<String>();

        for _ in 0..3 {
            records_tx.send("SelfPlay true 0 9 1 a;b;c #".to_string()).unwrap();
        }
        // a 4th, unconsumed record proves the quota check actually stops the loop
        records_tx.send("SelfPlay true 0 9 1 d;e;f #".to_string()).unwrap();

        server.self_play(1, &connections, &mut records_rx).await.unwrap();

        let contents = std::fs::read_to_string(dir.join("sgf").join("1.sgf")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(records_rx.try_recv().is_ok(), "the 4th record should still be sitting in the channel");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn handshake_greets_a_self_play_worker_with_its_job() {
        let dir = std::env::temp_dir().join("zero-server-unit-test-handshake");
        let _ = std::fs::remove_dir_all(&dir);
        let logger = Arc::new(ZeroLogger::open(&dir).unwrap());
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));
        let (records_tx, _records_rx) = mpsc::unbounded_channel::<String>();
        let (opt_done_tx, _opt_done_rx) = mpsc::unbounded_channel::<usize>();

        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_connections = Arc::clone(&connections);
        tokio::spawn(async move {
            let (socket, peer) = listener.accept().await.unwrap();
            handle_connection(
                0,
                socket,
                peer,
                accept_connections,
                logger,
                records_tx,
                opt_done_tx,
                "train".to_string(),
                "actor_num_simulation=16".to_string(),
            )
            .await;
        });

        let client = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = tokio::io::split(client);
        write_half.write_all(b"Info fake-worker sp\n").await.unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let greeting = lines.next().await.unwrap().unwrap();

        assert!(greeting.starts_with("Job_SelfPlay train "));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
