//! Tests for the training entry points.
//!
//! - `config_tests`: defaults, builders, JSON and validation
//! - `agent_tests`: acting, actor-critic batch assembly, snapshots
//! - `trainer_tests`: phase ordering, env rotation, masks, evaluation and
//!   snapshots on the linear-Gaussian toy environment
//!
//! # Invariants exercised
//!
//! 1. **Terminal vs Truncated**: time-limit ends are stored as non-terminal
//!    so the critic keeps bootstrapping.
//! 2. **History alignment**: the acting history and the actor-critic window
//!    produce actor inputs of the same width.
//! 3. **Latent warmup learns**: reconstruction loss falls on the toy system.

mod agent_tests;

use crate::runners::SlacConfig;

/// Small networks and short windows for fast CPU tests.
pub(crate) fn tiny_config(log_dir: &std::path::Path) -> SlacConfig {
    SlacConfig::default()
        .with_log_dir(log_dir)
        .with_seed(11)
        .with_schedule(40, 30, 5)
        .with_action_repeat(2)
        .with_evaluation(20, 2)
        .with_log_interval(1)
        .with_buffer_size(1_000)
        .with_sequence_lengths(4, 2)
        .with_batch_sizes(8, 8)
        .with_network_dims(8, 4, 8, 32)
        .with_learning_rates(1e-3, 1e-3)
}
