//! Error taxonomy shared by the search engine and its configuration surface.

use thiserror::Error;

/// Errors raised while building or reading a [`crate::config::CoreConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `key=value` entry didn't parse (unknown key, or value of the wrong type).
    #[error("invalid configuration entry '{key}': {reason}")]
    InvalidEntry {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A `-conf_str`/`-conf_file` line was not `key=value`.
    #[error("malformed configuration line: '{0}'")]
    MalformedLine(String),
    /// The configured checkpoint filename didn't encode an iteration number.
    #[error("cannot infer model iteration from filename '{0}'")]
    UnparsableModelFilename(String),
}

/// Errors raised by [`crate::tree::TreeArena`].
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Requested allocation would exceed the arena's fixed capacity.
    #[error("tree arena exhausted: requested {requested} nodes, {remaining} remaining")]
    Overflow {
        /// Nodes requested.
        requested: usize,
        /// Nodes still available.
        remaining: usize,
    },
}
