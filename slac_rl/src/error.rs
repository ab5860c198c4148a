//! Error types for the training engine.
//!
//! Three failure families exist and none of them is retried:
//!
//! - [`StoreError`]: structural misuse of the sequence store (sampling before a
//!   full window exists, appending outside an open episode).
//! - [`ConfigError`]: invalid hyperparameters, detected before training starts.
//! - [`SlacError`]: everything a training step can surface, including
//!   non-finite losses which must stop training instead of corrupting weights.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Errors raised by the sequence store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No end position yields a complete window of the requested length.
    #[error("store holds no valid window of length {window} ({written} records written)")]
    InsufficientData { window: usize, written: usize },

    /// `append` was called before `reset_episode` or after the episode ended.
    #[error("append called without an open episode")]
    EpisodeNotStarted,

    /// A record had the wrong width.
    #[error("{field} has length {actual}, expected {expected}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Window length of zero, or a window longer than the store can retain.
    #[error("window length {window} is invalid for capacity {capacity}")]
    InvalidWindow { window: usize, capacity: usize },
}

/// Errors raised while validating a configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A size-like hyperparameter was zero.
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    /// A hyperparameter was outside its admissible range.
    #[error("`{name}` = {value} is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// The actor-critic window must fit inside the latent-model window.
    #[error("ac_sequence_length ({ac}) must not exceed num_sequences ({latent})")]
    WindowLength { ac: usize, latent: usize },

    /// JSON could not be parsed into a configuration.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Top-level error for the training engine.
#[derive(Debug, Error)]
pub enum SlacError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A loss or density term became NaN or infinite.
    #[error("non-finite value in `{term}` at latent step {step}")]
    NonFinite { term: &'static str, step: usize },

    /// Network widths disagree with the declared latent dimensionality.
    #[error("shape mismatch in {component}: expected {expected}, found {actual}")]
    ShapeMismatch {
        component: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A named parameter artifact is unknown or failed to decode.
    #[error("cannot restore artifact `{name}`: {reason}")]
    Restore { name: String, reason: String },

    /// The environment rejected an action or produced a malformed observation.
    #[error("environment error: {0}")]
    Environment(String),
}

pub type Result<T, E = SlacError> = std::result::Result<T, E>;
