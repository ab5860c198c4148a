//! Training entry points.
//!
//! - [`SlacConfig`]: flat hyperparameters with validation
//! - [`SlacAgent`]: latent model + actor-critic and the glue between them
//! - [`Trainer`]: the single-threaded Prefill → LatentWarmup → JointTraining
//!   loop with periodic evaluation and snapshots
//!
//! # Example
//!
//! ```ignore
//! use slac_rl::environment::LinearGaussianEnv;
//! use slac_rl::metrics::LogSink;
//! use slac_rl::runners::{SlacConfig, Trainer};
//!
//! type B = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
//!
//! let config = SlacConfig::default().with_log_dir("runs/toy");
//! let envs: Vec<Box<dyn slac_rl::environment::Environment>> =
//!     vec![Box::new(LinearGaussianEnv::new(16, 200, 0))];
//! let test_env = Box::new(LinearGaussianEnv::new(16, 200, 0));
//! let mut trainer = Trainer::<B>::new(config, envs, test_env, LogSink::new(), &Default::default())?;
//! trainer.run()?;
//! ```

pub mod agent;
pub mod config;
pub mod trainer;

#[cfg(test)]
mod tests;

pub use agent::{actor_input_dim, SlacAgent};
pub use config::{LatentVariant, SlacConfig, SwitchingParams};
pub use trainer::{Phase, Trainer};
