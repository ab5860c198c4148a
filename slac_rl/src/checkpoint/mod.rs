//! Parameter snapshots.
//!
//! Saves the named artifacts of an agent (`encoder`, `decoder`,
//! `latent_model`, `actor`, `critic`) into `model_dir/step{N}` after each
//! evaluation, with optional retention and best-return tracking.
//!
//! ## Example
//!
//! ```rust,ignore
//! use slac_rl::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let mut checkpointer = Checkpointer::new(CheckpointerConfig::new("./model"))?;
//! checkpointer.save(&agent.snapshot()?, step, Some(mean_return))?;
//!
//! let (snapshot, step) = checkpointer.load_latest()?;
//! agent.restore_snapshot(&snapshot)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{
    module_from_bytes, module_to_bytes, read_artifact, CheckpointError, CheckpointInfo,
    Checkpointer, CheckpointerConfig, ParameterSnapshot,
};
