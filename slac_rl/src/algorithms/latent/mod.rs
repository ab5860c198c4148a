//! Sequential latent-dynamics models.
//!
//! Two interchangeable variants sit behind [`LatentDynamics`]:
//!
//! - [`continuous::ContinuousLatent`]: Gaussian state-space model with a
//!   two-level latent `z = [z1, z2]`
//! - [`switching::SwitchingLatent`]: per-frame posterior with a regime-switching
//!   nonlinear transition prior scored by a change of variables
//!
//! Both own their encoder, decoder and optimizers. The orchestrator only sees
//! the trait object.

pub mod continuous;
pub mod distributions;
pub mod encoder;
pub mod switching;

#[cfg(test)]
mod tests;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::buffers::WindowBatch;
use crate::core::tensor_ops::scalar;
use crate::core::TrainRng;
use crate::error::{Result, SlacError};

pub use continuous::{ContinuousLatent, ContinuousLatentConfig};
pub use encoder::{EncodedFeatures, ObservationDecoder, ObservationEncoder};
pub use switching::{SwitchingLatent, SwitchingLatentConfig};

/// Artifact name of the encoder parameters.
pub const ENCODER_ARTIFACT: &str = "encoder";
/// Artifact name of the decoder parameters.
pub const DECODER_ARTIFACT: &str = "decoder";
/// Artifact name of the transition/inference networks.
pub const LATENT_ARTIFACT: &str = "latent_model";

/// Posterior latents for a window plus the statistics they were drawn from.
#[derive(Debug, Clone)]
pub struct PosteriorSample<B: Backend> {
    /// `[batch, steps, latent_dim]`
    pub latents: Tensor<B, 3>,
    /// Mean of the inferred component, `[batch, steps, d]`.
    pub mean: Tensor<B, 3>,
    /// Std of the inferred component, `[batch, steps, d]`.
    pub std: Tensor<B, 3>,
}

/// Differentiable latent objective with its named components.
#[derive(Debug, Clone)]
pub struct LatentLoss<B: Backend> {
    /// Quantity the main optimizer minimizes.
    pub total: Tensor<B, 1>,
    /// Individual terms, each a single-element tensor, under their metric names.
    pub terms: Vec<(&'static str, Tensor<B, 1>)>,
}

impl<B: Backend> LatentLoss<B> {
    /// Copy every term to the host, failing on the first non-finite value.
    pub fn info(&self, step: usize) -> Result<LatentLossInfo> {
        let mut terms = Vec::with_capacity(self.terms.len());
        for (name, value) in &self.terms {
            let value = scalar(value.clone());
            if !value.is_finite() {
                return Err(SlacError::NonFinite { term: name, step });
            }
            terms.push((*name, value));
        }
        Ok(LatentLossInfo { terms })
    }
}

/// Host-side copy of a [`LatentLoss`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatentLossInfo {
    terms: Vec<(&'static str, f32)>,
}

impl LatentLossInfo {
    pub fn get(&self, name: &str) -> Option<f32> {
        self.terms.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    /// `(metric name, value)` pairs in reporting order.
    pub fn metrics(&self) -> &[(&'static str, f32)] {
        &self.terms
    }
}

/// Latent-dynamics model used by the training orchestrator.
///
/// Observation tensors are `[batch, steps + 1, observation_dim]`, action
/// tensors `[batch, steps, action_dim]` and feature tensors
/// `[batch, steps + 1, feature_dim]`.
pub trait LatentDynamics<B: AutodiffBackend> {
    /// Short variant name for logs.
    fn name(&self) -> &'static str;

    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Width of one encoded frame.
    fn feature_dim(&self) -> usize;

    /// Width of the latent state handed to the critic.
    fn latent_dim(&self) -> usize;

    /// Per-frame stochastic encoding.
    fn encode(&self, observations: Tensor<B, 3>, rng: &mut TrainRng) -> EncodedFeatures<B>;

    /// Latents drawn from the inference network.
    fn sample_posterior(
        &self,
        features: Tensor<B, 3>,
        actions: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> PosteriorSample<B>;

    /// Latents conditioned only on causal history, for the actor-critic.
    ///
    /// `[batch, steps, latent_dim]`. Each `z_t` may depend on frames and
    /// actions up to `t` only. A model whose inference network is already
    /// causal returns its posterior samples here.
    fn sample_prior(
        &self,
        features: Tensor<B, 3>,
        actions: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> Tensor<B, 3>;

    /// Observation means for a latent sequence.
    fn decode(&self, latents: Tensor<B, 3>) -> Tensor<B, 3>;

    /// Objective for a latent window without touching the parameters.
    fn calculate_loss(&self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLoss<B>>;

    /// One optimizer step on a latent window.
    fn update(&mut self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLossInfo>;

    /// Number of completed [`update`](Self::update) calls.
    fn update_steps(&self) -> usize;

    /// Serialized parameters keyed by artifact name.
    fn snapshot(&self) -> Result<Vec<(&'static str, Vec<u8>)>>;

    /// Replace one artifact's parameters. Unknown names and blobs whose shapes
    /// disagree with the configured model are rejected.
    fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Take `[batch, steps, width]` at step `t` as `[batch, width]`.
pub(crate) fn step_slice<B: Backend>(x: &Tensor<B, 3>, t: usize) -> Tensor<B, 2> {
    let [batch, _, width] = x.dims();
    x.clone().slice([0..batch, t..t + 1, 0..width]).reshape([batch, width])
}
