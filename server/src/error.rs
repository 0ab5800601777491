use thiserror::Error;

/// Malformed or unexpected worker input. Always logged and the offending
/// line dropped or the connection closed; never propagated to the caller
/// of [`crate::ZeroServer::run`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("unknown worker type in: {0}")]
    UnknownWorkerType(String),
    #[error("first message was not a handshake: {0}")]
    NotAHandshake(String),
}
