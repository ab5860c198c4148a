//! Learning components.
//!
//! - `latent`: sequential latent-variable models (continuous SLAC model and
//!   the regime-switching variant) behind the [`LatentDynamics`] trait
//! - `sac`: actor, twin critic, entropy tuning and the update that ties them
//!   to latent samples

pub mod latent;
pub mod sac;

pub use latent::{
    ContinuousLatent, ContinuousLatentConfig, LatentDynamics, LatentLoss, LatentLossInfo,
    PosteriorSample, SwitchingLatent, SwitchingLatentConfig,
};
pub use sac::{ActorCriticBatch, ActorCriticConfig, ActorCriticLearner, SacLossInfo};
