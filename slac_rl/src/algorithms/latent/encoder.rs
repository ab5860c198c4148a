//! Per-frame observation encoder and decoder.
//!
//! Frames arrive flattened (`[batch, steps, observation_dim]`); both networks
//! operate on every frame independently.

use burn::module::Module;
use burn::prelude::*;

use crate::core::TrainRng;
use crate::nn::{Mlp, MlpConfig};

use super::distributions::reparameterize;

/// Output of [`ObservationEncoder::forward`], all `[batch, steps, feature_dim]`.
#[derive(Debug, Clone)]
pub struct EncodedFeatures<B: Backend> {
    /// Reparameterized sample.
    pub features: Tensor<B, 3>,
    pub mean: Tensor<B, 3>,
    pub log_var: Tensor<B, 3>,
}

#[derive(Module, Debug)]
pub struct ObservationEncoder<B: Backend> {
    net: Mlp<B>,
    feature_dim: usize,
    log_var_bias: f32,
}

impl<B: Backend> ObservationEncoder<B> {
    pub fn new(
        observation_dim: usize,
        feature_dim: usize,
        hidden: usize,
        log_var_bias: f32,
        device: &B::Device,
    ) -> Self {
        Self {
            net: MlpConfig::new(observation_dim, hidden, 2 * feature_dim).init(device),
            feature_dim,
            log_var_bias,
        }
    }

    /// Mean and log-variance per frame. The log-variance is shifted down by
    /// `log_var_bias` so fresh encoders start with a narrow posterior.
    pub fn moments(&self, observations: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let out = self.net.forward_seq(observations);
        let [batch, steps, _] = out.dims();
        let f = self.feature_dim;
        let mean = out.clone().slice([0..batch, 0..steps, 0..f]);
        let log_var = out
            .slice([0..batch, 0..steps, f..2 * f])
            .sub_scalar(self.log_var_bias);
        (mean, log_var)
    }

    pub fn forward(&self, observations: Tensor<B, 3>, rng: &mut TrainRng) -> EncodedFeatures<B> {
        let (mean, log_var) = self.moments(observations);
        let std = log_var.clone().mul_scalar(0.5).exp();
        EncodedFeatures {
            features: reparameterize(mean.clone(), std, rng),
            mean,
            log_var,
        }
    }

    pub fn observation_dim(&self) -> usize {
        self.net.weight_input_dim()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }
}

/// Maps latent states back to observation means. The observation std is a
/// fixed hyperparameter held by the owning model.
#[derive(Module, Debug)]
pub struct ObservationDecoder<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> ObservationDecoder<B> {
    pub fn new(latent_dim: usize, observation_dim: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            net: MlpConfig::new(latent_dim, hidden, observation_dim).init(device),
        }
    }

    pub fn forward(&self, latents: Tensor<B, 3>) -> Tensor<B, 3> {
        self.net.forward_seq(latents)
    }

    pub fn latent_dim(&self) -> usize {
        self.net.weight_input_dim()
    }
}
