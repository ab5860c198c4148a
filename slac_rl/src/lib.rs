//! # SLAC: Stochastic Latent Actor-Critic
//!
//! Training engine for control from high-dimensional sequential
//! observations. A stochastic latent-dynamics model is learned by
//! variational inference, and a soft actor-critic is optimized on its
//! latent states.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Trainer                                 │
//! │  Prefill ──► LatentWarmup ──► JointTraining ──► Finished         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Environment ──step──► SequenceStore (circular, episode-aware)   │
//! │                            │                    │                │
//! │             latent window (L+1 obs)   ac window (L'+1 obs)       │
//! │                            ▼                    ▼                │
//! │              ┌──────────────────┐   ┌─────────────────────────┐  │
//! │              │ LatentDynamics   │──►│ ActorCriticLearner      │  │
//! │              │ encoder/decoder  │ z │ actor (feature history) │  │
//! │              │ prior/posterior  │   │ twin critic + target    │  │
//! │              │ (continuous or   │   │ entropy tuner           │  │
//! │              │  switching)      │   └─────────────────────────┘  │
//! │              └──────────────────┘                                │
//! │  every eval_interval env steps: evaluate + snapshot step{N}/     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one thread. All randomness flows through an explicit
//! [`TrainRng`](core::TrainRng).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use slac_rl::{LinearGaussianEnv, LogSink, SlacConfig, Trainer};
//!
//! type B = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
//!
//! let config = SlacConfig::default()
//!     .with_schedule(100_000, 1_000, 10_000)
//!     .with_action_repeat(2);
//! let envs: Vec<Box<dyn slac_rl::Environment>> = vec![Box::new(LinearGaussianEnv::new(16, 200, 0))];
//! let mut trainer = Trainer::<B>::new(
//!     config,
//!     envs,
//!     Box::new(LinearGaussianEnv::new(16, 200, 1)),
//!     LogSink::new(),
//!     &Default::default(),
//! )?;
//! trainer.run()?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod checkpoint;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod nn;
pub mod runners;

// Re-export commonly used types
pub use algorithms::latent::{
    ContinuousLatent, ContinuousLatentConfig, LatentDynamics, LatentLossInfo, SwitchingLatent,
    SwitchingLatentConfig,
};
pub use algorithms::sac::{ActorCriticConfig, ActorCriticLearner, SacLossInfo};
pub use buffers::{ObservationHistory, SequenceStore, WindowBatch};
pub use checkpoint::{Checkpointer, CheckpointerConfig, ParameterSnapshot};
pub use core::TrainRng;
pub use environment::{ActionSpace, Environment, LinearGaussianEnv, StepResult};
pub use error::{ConfigError, Result, SlacError, StoreError};
pub use metrics::{CsvSink, LogSink, MemorySink, MetricsSink, MultiSink};
pub use runners::{LatentVariant, Phase, SlacAgent, SlacConfig, Trainer};
