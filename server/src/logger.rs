//! `Worker.log`/`Training.log`: two append-only, timestamped log files the
//! server maintains alongside the `log` facade output, since operators
//! tail these files directly rather than the process's stderr.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

struct LogFile(Mutex<File>);

impl LogFile {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogFile(Mutex::new(file)))
    }

    fn write_line(&self, message: &str) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"), message);
        let mut file = self.0.lock().unwrap();
        let _ = file.write_all(line.as_bytes());
    }
}

/// The two log streams `ZeroServer` writes to, rooted under the
/// configured training directory.
pub struct ZeroLogger {
    worker_log: LogFile,
    training_log: LogFile,
}

impl ZeroLogger {
    pub fn open(training_directory: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(training_directory)?;
        Ok(ZeroLogger {
            worker_log: LogFile::open(&training_directory.join("Worker.log"))?,
            training_log: LogFile::open(&training_directory.join("Training.log"))?,
        })
    }

    pub fn worker_connected(&self, name: &str, addr: &str) {
        self.worker_log.write_line(&format!("connected: {} ({})", name, addr));
    }

    pub fn worker_disconnected(&self, name: &str) {
        self.worker_log.write_line(&format!("disconnected: {}", name));
    }

    pub fn protocol_error(&self, addr: &str, reason: &str) {
        self.worker_log.write_line(&format!("protocol error from {}: {}", addr, reason));
    }

    pub fn iteration_started(&self, iteration: usize) {
        self.training_log.write_line(&format!("iteration {} started", iteration));
    }

    pub fn iteration_finished(&self, iteration: usize) {
        self.training_log.write_line(&format!("iteration {} finished", iteration));
    }

    pub fn self_play_progress(&self, done: usize, total: usize) {
        self.training_log
            .write_line(&format!("self-play progress: {}/{} games", done, total));
    }

    pub fn self_play_summary(&self, games: usize, avg_len: f32, min_len: usize, max_len: usize, avg_return: f32) {
        self.training_log.write_line(&format!(
            "self-play done: {} games, length avg={:.1} min={} max={}, return avg={:.3}",
            games, avg_len, min_len, max_len, avg_return
        ));
    }

    pub fn optimization_started(&self, iteration: usize) {
        self.training_log.write_line(&format!("optimization for iteration {} started", iteration));
    }

    pub fn optimization_finished(&self, new_model_iteration: usize) {
        self.training_log
            .write_line(&format!("optimization finished, model iteration now {}", new_model_iteration));
    }
}
