//! Core utilities shared by the latent model and actor-critic learners.

pub mod optimizer;
pub mod rng;
pub mod target_network;
pub mod tensor_ops;

pub use optimizer::ModuleOptimizer;
pub use rng::TrainRng;
pub use target_network::{hard_copy, soft_update};
