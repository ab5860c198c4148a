//! Neural network building blocks shared by the latent model and the
//! actor-critic networks.
//!
//! - [`mlp`]: leaky-ReLU MLP with a forward-mode tangent pass
//! - [`gaussian`]: MLP head producing a diagonal Gaussian

pub mod gaussian;
pub mod mlp;

pub use gaussian::{GaussianHead, STD_FLOOR};
pub use mlp::{Mlp, MlpConfig};
