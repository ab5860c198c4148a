//! Switching latent model with a causal nonlinear transition prior.
//!
//! - [`regime`]: HMM over discrete regimes, scored by forward-backward
//! - [`transition_prior`]: per-dimension residual MLPs with a Laplace base
//!   density and a log-Jacobian correction
//! - [`model`]: encoder, per-frame posterior, decoder and the two optimizer
//!   groups
//!
//! Training objective:
//!
//! ```text
//! total = recon + β · KL(q(z_{<lags}) || N(0, I)) + γ · (log q(z_t) - log p(z_t | z_{t-lags..t-1}, s_t))
//! ```
//!
//! where `s_t` is the MAP regime under the HMM. The HMM itself is fitted on
//! detached emissions by its own optimizer before the network step.

pub mod model;
pub mod regime;
pub mod transition_prior;

pub use model::{SwitchingLatent, SwitchingLatentConfig};
pub use regime::RegimeModel;
pub use transition_prior::{TransitionDensity, TransitionPrior};
