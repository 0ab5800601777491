//! Newline-delimited, space-separated wire protocol between the server
//! and its self-play/optimization workers.

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    SelfPlay,
    Optimization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Info { name: String, kind: WorkerKind },
    SelfPlay { line: String },
    OptimizationDone { model_iteration: usize },
}

/// Parse one line received from a worker. The handshake line, self-play
/// records and `Optimization_Done` are the only messages a worker ever
/// sends; anything else is a protocol error.
pub fn parse_worker_message(line: &str) -> Result<WorkerMessage, ProtocolError> {
    let mut parts = line.splitn(2, ' ');
    match parts.next().unwrap_or("") {
        "Info" => {
            let rest = parts.next().ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            let mut rest_parts = rest.trim().splitn(2, ' ');
            let name = rest_parts
                .next()
                .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?
                .to_string();
            let kind = match rest_parts.next() {
                Some("sp") => WorkerKind::SelfPlay,
                Some("op") => WorkerKind::Optimization,
                _ => return Err(ProtocolError::UnknownWorkerType(line.to_string())),
            };
            Ok(WorkerMessage::Info { name, kind })
        }
        "SelfPlay" => {
            if line.matches("SelfPlay").count() != 1 || !line.trim_end().ends_with('#') {
                return Err(ProtocolError::Malformed(line.to_string()));
            }
            Ok(WorkerMessage::SelfPlay { line: line.to_string() })
        }
        "Optimization_Done" => {
            let model_iteration = parts
                .next()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            Ok(WorkerMessage::OptimizationDone { model_iteration })
        }
        _ => Err(ProtocolError::Malformed(line.to_string())),
    }
}

/// Require the first line from a freshly accepted connection to be a
/// handshake, closing the connection (by returning an error) on anything
/// else.
pub fn parse_handshake(line: &str) -> Result<(String, WorkerKind), ProtocolError> {
    match parse_worker_message(line)? {
        WorkerMessage::Info { name, kind } => Ok((name, kind)),
        _ => Err(ProtocolError::NotAHandshake(line.to_string())),
    }
}

/// Sent once to a freshly handshaken `sp` worker, carrying its configuration
/// as the same `key=value` pairs `-conf_str` accepts.
pub fn job_self_play(training_dir: &str, config_kv: &str) -> String {
    format!("Job_SelfPlay {} {}", training_dir, config_kv)
}

/// Sent once to a freshly handshaken `op` worker.
pub fn job_optimization(training_dir: &str) -> String {
    format!("Job_Optimization {}", training_dir)
}

/// Second line of an optimization job: checkpoint to load plus the replay
/// window `[start_iteration, current_iteration]`.
pub fn optimization_window(checkpoint_path: &str, start_iteration: usize, current_iteration: usize) -> String {
    format!("{} {} {}", checkpoint_path, start_iteration, current_iteration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_accepts_both_worker_types() {
        assert_eq!(
            parse_handshake("Info worker-1 sp").unwrap(),
            ("worker-1".to_string(), WorkerKind::SelfPlay)
        );
        assert_eq!(
            parse_handshake("Info worker-2 op").unwrap(),
            ("worker-2".to_string(), WorkerKind::Optimization)
        );
    }

    #[test]
    fn handshake_rejects_unknown_type() {
        assert!(parse_handshake("Info worker-3 bogus").is_err());
    }

    #[test]
    fn self_play_line_requires_exactly_one_token_and_trailing_hash() {
        assert!(parse_worker_message("SelfPlay true 0 9 1 a;b;c #").is_ok());
        assert!(parse_worker_message("SelfPlay true 0 9 1 a;b;c").is_err());
        assert!(parse_worker_message("SelfPlay true SelfPlay 9 1 a;b;c #").is_err());
    }

    #[test]
    fn optimization_done_carries_the_new_model_iteration() {
        assert_eq!(
            parse_worker_message("Optimization_Done 42").unwrap(),
            WorkerMessage::OptimizationDone { model_iteration: 42 }
        );
    }
}
