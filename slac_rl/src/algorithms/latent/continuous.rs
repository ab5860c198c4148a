//! Continuous Gaussian state-space model with a two-level latent.
//!
//! ```text
//! prior        p(z1_0) = N(0, I)          p(z1_t | z2_{t-1}, a_{t-1})
//!              p(z2_0 | z1_0)             p(z2_t | z1_t, z2_{t-1}, a_{t-1})
//! posterior    q(z1_0 | f_0)              q(z1_t | f_t, z2_{t-1}, a_{t-1})
//!              z2 shares the prior networks
//! decoder      p(x_t | z_t) = N(dec(z_t), σ_x²)
//! reward       p(r_t | z_t, a_t, z_{t+1})
//! ```
//!
//! Objective per window: `kl + image + reward`, each summed over time and
//! dimensions and averaged over the batch.

use burn::module::Module;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::buffers::WindowBatch;
use crate::checkpoint::{module_from_bytes, module_to_bytes};
use crate::core::{ModuleOptimizer, TrainRng};
use crate::error::{Result, SlacError};
use crate::nn::GaussianHead;

use super::distributions::{gaussian_kl, gaussian_log_prob, reparameterize};
use super::encoder::{EncodedFeatures, ObservationDecoder, ObservationEncoder};
use super::{
    step_slice, LatentDynamics, LatentLoss, LatentLossInfo, PosteriorSample, DECODER_ARTIFACT,
    ENCODER_ARTIFACT, LATENT_ARTIFACT,
};

/// Sizes and optimizer settings for [`ContinuousLatent`].
#[derive(Debug, Clone)]
pub struct ContinuousLatentConfig {
    pub observation_dim: usize,
    pub action_dim: usize,
    pub feature_dim: usize,
    pub z1_dim: usize,
    pub z2_dim: usize,
    pub hidden_units: usize,
    /// Subtracted from the encoder log-variance.
    pub log_var_bias: f32,
    /// Fixed observation std of the decoder.
    pub decoder_std: f32,
    pub learning_rate: f64,
    pub grad_clip: Option<f32>,
}

impl ContinuousLatentConfig {
    pub fn new(observation_dim: usize, action_dim: usize) -> Self {
        Self {
            observation_dim,
            action_dim,
            feature_dim: 256,
            z1_dim: 32,
            z2_dim: 256,
            hidden_units: 256,
            log_var_bias: 2.0,
            decoder_std: 0.1f32.sqrt(),
            learning_rate: 1e-4,
            grad_clip: None,
        }
    }

    pub fn with_feature_dim(mut self, feature_dim: usize) -> Self {
        self.feature_dim = feature_dim;
        self
    }

    pub fn with_latent_dims(mut self, z1_dim: usize, z2_dim: usize) -> Self {
        self.z1_dim = z1_dim;
        self.z2_dim = z2_dim;
        self
    }

    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_grad_clip(mut self, grad_clip: Option<f32>) -> Self {
        self.grad_clip = grad_clip;
        self
    }
}

// ============================================================================
// Transition and inference networks
// ============================================================================

/// The `latent_model` artifact: priors, z1 posteriors and the reward head.
#[derive(Module, Debug)]
pub struct TransitionNetworks<B: Backend> {
    z1_prior: GaussianHead<B>,
    z2_prior_init: GaussianHead<B>,
    z2_prior: GaussianHead<B>,
    z1_posterior_init: GaussianHead<B>,
    z1_posterior: GaussianHead<B>,
    reward: GaussianHead<B>,
    z1_dim: usize,
    z2_dim: usize,
}

impl<B: Backend> TransitionNetworks<B> {
    fn new(config: &ContinuousLatentConfig, device: &B::Device) -> Self {
        let (f, a, z1, z2, h) = (
            config.feature_dim,
            config.action_dim,
            config.z1_dim,
            config.z2_dim,
            config.hidden_units,
        );
        Self {
            z1_prior: GaussianHead::new(z2 + a, z1, h, device),
            z2_prior_init: GaussianHead::new(z1, z2, h, device),
            z2_prior: GaussianHead::new(z1 + z2 + a, z2, h, device),
            z1_posterior_init: GaussianHead::new(f, z1, h, device),
            z1_posterior: GaussianHead::new(f + z2 + a, z1, h, device),
            reward: GaussianHead::new(2 * (z1 + z2) + a, 1, h, device),
            z1_dim: z1,
            z2_dim: z2,
        }
    }

    /// Causal filter over a window.
    ///
    /// Returns `(z1_mean, z1_std, z1, z2)`, each `[batch, steps + 1, ·]`.
    fn posterior(
        &self,
        features: &Tensor<B, 3>,
        actions: &Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> (Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>) {
        let steps = features.dims()[1];
        let mut means = Vec::with_capacity(steps);
        let mut stds = Vec::with_capacity(steps);
        let mut z1s = Vec::with_capacity(steps);
        let mut z2s: Vec<Tensor<B, 2>> = Vec::with_capacity(steps);

        for t in 0..steps {
            let feature = step_slice(features, t);
            let (mean, std) = match z2s.last() {
                None => self.z1_posterior_init.forward(feature),
                Some(z2_prev) => {
                    let action = step_slice(actions, t - 1);
                    self.z1_posterior
                        .forward(Tensor::cat(vec![feature, z2_prev.clone(), action], 1))
                }
            };
            let z1 = reparameterize(mean.clone(), std.clone(), rng);

            let (z2_mean, z2_std) = match z2s.last() {
                None => self.z2_prior_init.forward(z1.clone()),
                Some(z2_prev) => {
                    let action = step_slice(actions, t - 1);
                    self.z2_prior
                        .forward(Tensor::cat(vec![z1.clone(), z2_prev.clone(), action], 1))
                }
            };
            let z2 = reparameterize(z2_mean, z2_std, rng);

            means.push(mean);
            stds.push(std);
            z1s.push(z1);
            z2s.push(z2);
        }

        (
            Tensor::stack(means, 1),
            Tensor::stack(stds, 1),
            Tensor::stack(z1s, 1),
            Tensor::stack(z2s, 1),
        )
    }

    /// One-step z1 prior given posterior z2: `N(0, I)` at `t = 0`.
    fn z1_prior_given(&self, z2: &Tensor<B, 3>, actions: &Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch, steps, _] = z2.dims();
        let device = z2.device();
        let mut means = vec![Tensor::zeros([batch, self.z1_dim], &device)];
        let mut stds = vec![Tensor::ones([batch, self.z1_dim], &device)];

        for t in 1..steps {
            let input = Tensor::cat(vec![step_slice(z2, t - 1), step_slice(actions, t - 1)], 1);
            let (mean, std) = self.z1_prior.forward(input);
            means.push(mean);
            stds.push(std);
        }

        (Tensor::stack(means, 1), Tensor::stack(stds, 1))
    }

    /// Reward distribution for each transition `(z_t, a_t, z_{t+1})`.
    fn reward_distribution(&self, latents: &Tensor<B, 3>, actions: &Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch, steps_plus_one, width] = latents.dims();
        let steps = steps_plus_one - 1;
        let current = latents.clone().slice([0..batch, 0..steps, 0..width]);
        let next = latents.clone().slice([0..batch, 1..steps_plus_one, 0..width]);
        let input = Tensor::cat(vec![current, actions.clone(), next], 2);
        let input_width = input.dims()[2];

        let (mean, std) = self.reward.forward(input.reshape([batch * steps, input_width]));
        (mean.reshape([batch, steps, 1]), std.reshape([batch, steps, 1]))
    }

    fn latent_dim(&self) -> usize {
        self.z1_dim + self.z2_dim
    }
}

/// Everything one optimizer updates.
#[derive(Module, Debug)]
pub struct ContinuousModules<B: Backend> {
    encoder: ObservationEncoder<B>,
    decoder: ObservationDecoder<B>,
    transition: TransitionNetworks<B>,
}

// ============================================================================
// Model
// ============================================================================

/// Continuous latent model with its Adam optimizer.
pub struct ContinuousLatent<B: AutodiffBackend> {
    modules: ContinuousModules<B>,
    optimizer: ModuleOptimizer<ContinuousModules<B>>,
    config: ContinuousLatentConfig,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> ContinuousLatent<B> {
    pub fn new(config: ContinuousLatentConfig, device: &B::Device) -> Self {
        Self {
            modules: Self::build(&config, device),
            optimizer: ModuleOptimizer::adam::<B>(config.learning_rate, config.grad_clip),
            config,
            device: device.clone(),
            updates: 0,
        }
    }

    fn build(config: &ContinuousLatentConfig, device: &B::Device) -> ContinuousModules<B> {
        let latent_dim = config.z1_dim + config.z2_dim;
        ContinuousModules {
            encoder: ObservationEncoder::new(
                config.observation_dim,
                config.feature_dim,
                config.hidden_units,
                config.log_var_bias,
                device,
            ),
            decoder: ObservationDecoder::new(latent_dim, config.observation_dim, config.hidden_units, device),
            transition: TransitionNetworks::new(config, device),
        }
    }

    pub fn config(&self) -> &ContinuousLatentConfig {
        &self.config
    }

    fn loss_from_tensors(
        &self,
        observations: Tensor<B, 3>,
        actions: Tensor<B, 3>,
        rewards: Tensor<B, 3>,
        terminals: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> LatentLoss<B> {
        let batch = observations.dims()[0] as f32;
        let features = self.modules.encoder.forward(observations.clone(), rng).features;
        let (post_mean, post_std, z1, z2) = self.modules.transition.posterior(&features, &actions, rng);
        let (prior_mean, prior_std) = self.modules.transition.z1_prior_given(&z2, &actions);

        let kl = gaussian_kl(post_mean, post_std, prior_mean, prior_std).sum().div_scalar(batch);

        let latents = Tensor::cat(vec![z1, z2], 2);
        let reconstruction = self.modules.decoder.forward(latents.clone());
        let image = ((observations - reconstruction).div_scalar(self.config.decoder_std))
            .powf_scalar(2.0)
            .mul_scalar(0.5)
            .sum()
            .div_scalar(batch);

        let (reward_mean, reward_std) = self.modules.transition.reward_distribution(&latents, &actions);
        let reward = (gaussian_log_prob(rewards, reward_mean, reward_std) * terminals.neg().add_scalar(1.0))
            .sum()
            .neg()
            .div_scalar(batch);

        LatentLoss {
            total: kl.clone() + image.clone() + reward.clone(),
            terms: vec![("loss/kld", kl), ("loss/image", image), ("loss/reward", reward)],
        }
    }
}

impl<B: AutodiffBackend> LatentDynamics<B> for ContinuousLatent<B> {
    fn name(&self) -> &'static str {
        "continuous"
    }

    fn observation_dim(&self) -> usize {
        self.config.observation_dim
    }

    fn action_dim(&self) -> usize {
        self.config.action_dim
    }

    fn feature_dim(&self) -> usize {
        self.config.feature_dim
    }

    fn latent_dim(&self) -> usize {
        self.modules.transition.latent_dim()
    }

    fn encode(&self, observations: Tensor<B, 3>, rng: &mut TrainRng) -> EncodedFeatures<B> {
        self.modules.encoder.forward(observations, rng)
    }

    fn sample_posterior(
        &self,
        features: Tensor<B, 3>,
        actions: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> PosteriorSample<B> {
        let (mean, std, z1, z2) = self.modules.transition.posterior(&features, &actions, rng);
        PosteriorSample {
            latents: Tensor::cat(vec![z1, z2], 2),
            mean,
            std,
        }
    }

    /// The filtering posterior `q(z_t | x_{0..t}, a_{0..t-1})` is already
    /// causal, so the actor-critic latents are exactly its samples. No
    /// separate one-step prior rollout is taken.
    fn sample_prior(
        &self,
        features: Tensor<B, 3>,
        actions: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> Tensor<B, 3> {
        self.sample_posterior(features, actions, rng).latents
    }

    fn decode(&self, latents: Tensor<B, 3>) -> Tensor<B, 3> {
        self.modules.decoder.forward(latents)
    }

    fn calculate_loss(&self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLoss<B>> {
        if batch.observation_dim != self.config.observation_dim {
            return Err(SlacError::ShapeMismatch {
                component: "latent batch observations",
                expected: self.config.observation_dim,
                actual: batch.observation_dim,
            });
        }
        Ok(self.loss_from_tensors(
            batch.observations_tensor(&self.device),
            batch.actions_tensor(&self.device),
            batch.rewards_tensor(&self.device),
            batch.terminals_tensor(&self.device),
            rng,
        ))
    }

    fn update(&mut self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLossInfo> {
        let loss = self.calculate_loss(batch, rng)?;
        let info = loss.info(self.updates)?;

        let grads = GradientsParams::from_grads(loss.total.backward(), &self.modules);
        self.modules = self.optimizer.step(self.modules.clone(), grads);
        self.updates += 1;

        Ok(info)
    }

    fn update_steps(&self) -> usize {
        self.updates
    }

    fn snapshot(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        Ok(vec![
            (ENCODER_ARTIFACT, module_to_bytes(&self.modules.encoder)?),
            (DECODER_ARTIFACT, module_to_bytes(&self.modules.decoder)?),
            (LATENT_ARTIFACT, module_to_bytes(&self.modules.transition)?),
        ])
    }

    fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let fresh = Self::build(&self.config, &self.device);
        match name {
            ENCODER_ARTIFACT => {
                self.modules.encoder = module_from_bytes(fresh.encoder, name, bytes, &self.device)?;
            }
            DECODER_ARTIFACT => {
                self.modules.decoder = module_from_bytes(fresh.decoder, name, bytes, &self.device)?;
            }
            LATENT_ARTIFACT => {
                self.modules.transition = module_from_bytes(fresh.transition, name, bytes, &self.device)?;
            }
            other => {
                return Err(SlacError::Restore {
                    name: other.to_string(),
                    reason: "not an artifact of the continuous latent model".to_string(),
                })
            }
        }
        Ok(())
    }
}
