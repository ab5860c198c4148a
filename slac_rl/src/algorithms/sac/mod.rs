//! Latent actor-critic.
//!
//! The critic scores `(z_t, a_t)` pairs sampled from the latent model while
//! the actor only sees the encoder-feature history, so the policy can run on
//! observations alone at test time:
//!
//! ```text
//! history (f_1..f_L, a_1..a_{L-1}) ──► Actor ──► tanh Gaussian action
//! latent z_t, action a_t          ──► Q1, Q2   (target copy lags by τ)
//! ```
//!
//! All latent inputs arrive detached: gradients from these losses never reach
//! the latent model.

mod actor;
mod critic;
mod entropy_tuning;
mod learner;
mod losses;

pub use actor::{binarize_first, SquashedGaussianActor, LOG_STD_MAX, LOG_STD_MIN};
pub use critic::TwinCritic;
pub use entropy_tuning::{target_entropy_continuous, AlphaUpdate, EntropyTuner};
pub use learner::{
    ActorCriticBatch, ActorCriticConfig, ActorCriticLearner, SacLossInfo, ACTOR_ARTIFACT,
    CRITIC_ARTIFACT,
};
pub use losses::{actor_loss, critic_loss, td_targets};
