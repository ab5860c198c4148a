use burn::module::{Module, Param};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Distribution;

use crate::algorithms::latent::distributions::{gaussian_log_prob, reparameterize, standard_normal_kl};
use crate::algorithms::latent::encoder::{EncodedFeatures, ObservationDecoder, ObservationEncoder};
use crate::algorithms::latent::{
    LatentDynamics, LatentLoss, LatentLossInfo, PosteriorSample, DECODER_ARTIFACT, ENCODER_ARTIFACT,
    LATENT_ARTIFACT,
};
use crate::buffers::WindowBatch;
use crate::checkpoint::{module_from_bytes, module_to_bytes};
use crate::core::tensor_ops::all_finite;
use crate::core::{ModuleOptimizer, TrainRng};
use crate::error::{Result, SlacError};

use super::regime::{one_hot, RegimeModel};
use super::transition_prior::{check_sequence, TransitionPrior};

/// Sizes, loss weights and optimizer settings for [`SwitchingLatent`].
#[derive(Debug, Clone)]
pub struct SwitchingLatentConfig {
    pub observation_dim: usize,
    pub action_dim: usize,
    pub feature_dim: usize,
    pub z_dim: usize,
    /// Number of past latents each transition conditions on.
    pub lags: usize,
    pub n_regimes: usize,
    pub embedding_dim: usize,
    /// Width of the encoder, decoder and posterior networks.
    pub hidden_dim: usize,
    /// Width of the transition-prior MLPs.
    pub prior_hidden_dim: usize,
    pub prior_layers: usize,
    pub log_var_bias: f32,
    pub lr_net: f64,
    pub lr_regime: f64,
    pub weight_decay: f32,
    /// Weight of the initial-latent KL.
    pub beta: f32,
    /// Weight of the transition KL.
    pub gamma: f32,
    pub grad_clip: Option<f32>,
}

impl SwitchingLatentConfig {
    pub fn new(observation_dim: usize, action_dim: usize) -> Self {
        Self {
            observation_dim,
            action_dim,
            feature_dim: 64,
            z_dim: 32,
            lags: 2,
            n_regimes: 4,
            embedding_dim: 8,
            hidden_dim: 256,
            prior_hidden_dim: 64,
            prior_layers: 3,
            log_var_bias: 2.0,
            lr_net: 5e-4,
            lr_regime: 1e-3,
            weight_decay: 1e-4,
            beta: 2e-3,
            gamma: 2e-3,
            grad_clip: None,
        }
    }

    pub fn with_feature_dim(mut self, feature_dim: usize) -> Self {
        self.feature_dim = feature_dim;
        self
    }

    pub fn with_z_dim(mut self, z_dim: usize) -> Self {
        self.z_dim = z_dim;
        self
    }

    pub fn with_lags(mut self, lags: usize) -> Self {
        self.lags = lags;
        self
    }

    pub fn with_regimes(mut self, n_regimes: usize, embedding_dim: usize) -> Self {
        self.n_regimes = n_regimes;
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn with_hidden(mut self, hidden_dim: usize, prior_hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self.prior_hidden_dim = prior_hidden_dim;
        self
    }

    pub fn with_learning_rates(mut self, lr_net: f64, lr_regime: f64) -> Self {
        self.lr_net = lr_net;
        self.lr_regime = lr_regime;
        self
    }

    pub fn with_loss_weights(mut self, beta: f32, gamma: f32) -> Self {
        self.beta = beta;
        self.gamma = gamma;
        self
    }
}

// ============================================================================
// Parameter groups
// ============================================================================

/// Posterior, transition prior and regime embeddings.
#[derive(Module, Debug)]
pub struct DynamicsNetworks<B: Backend> {
    posterior: ObservationEncoder<B>,
    prior: TransitionPrior<B>,
    embeddings: Param<Tensor<B, 2>>,
}

impl<B: Backend> DynamicsNetworks<B> {
    fn new(config: &SwitchingLatentConfig, device: &B::Device) -> Self {
        Self {
            posterior: ObservationEncoder::new(
                config.feature_dim,
                config.z_dim,
                config.hidden_dim,
                config.log_var_bias,
                device,
            ),
            prior: TransitionPrior::new(
                config.lags,
                config.z_dim,
                config.embedding_dim,
                config.prior_hidden_dim,
                config.prior_layers,
                device,
            ),
            embeddings: Param::from_tensor(Tensor::random(
                [config.n_regimes, config.embedding_dim],
                Distribution::Normal(0.0, 1.0),
                device,
            )),
        }
    }
}

/// Updated by the AdamW group.
#[derive(Module, Debug)]
pub struct NetModules<B: Backend> {
    encoder: ObservationEncoder<B>,
    decoder: ObservationDecoder<B>,
    dynamics: DynamicsNetworks<B>,
}

/// Layout of the `latent_model` artifact.
#[derive(Module, Debug)]
struct LatentModelArtifact<B: Backend> {
    dynamics: DynamicsNetworks<B>,
    regime: RegimeModel<B>,
}

struct SwitchingLosses<B: Backend> {
    total: Tensor<B, 1>,
    recon: Tensor<B, 1>,
    regime: Tensor<B, 1>,
    kld_normal: Tensor<B, 1>,
    kld_laplace: Tensor<B, 1>,
}

impl<B: Backend> SwitchingLosses<B> {
    fn into_latent_loss(self) -> LatentLoss<B> {
        LatentLoss {
            total: self.total.clone(),
            terms: vec![
                ("loss/elbo_loss", self.total),
                ("loss/recon_loss", self.recon),
                ("loss/hmm_loss", self.regime),
                ("loss/kld_normal", self.kld_normal),
                ("loss/kld_laplace", self.kld_laplace),
            ],
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Switching latent model with separate regime and network optimizers.
pub struct SwitchingLatent<B: AutodiffBackend> {
    net: NetModules<B>,
    regime: RegimeModel<B>,
    net_optimizer: ModuleOptimizer<NetModules<B>>,
    regime_optimizer: ModuleOptimizer<RegimeModel<B>>,
    config: SwitchingLatentConfig,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> SwitchingLatent<B> {
    pub fn new(config: SwitchingLatentConfig, device: &B::Device) -> Self {
        let (net, regime) = Self::build(&config, device);
        Self {
            net,
            regime,
            net_optimizer: ModuleOptimizer::adamw::<B>(config.lr_net, config.weight_decay, config.grad_clip),
            regime_optimizer: ModuleOptimizer::adam_with_decay::<B>(
                config.lr_regime,
                config.weight_decay,
                config.grad_clip,
            ),
            config,
            device: device.clone(),
            updates: 0,
        }
    }

    fn build(config: &SwitchingLatentConfig, device: &B::Device) -> (NetModules<B>, RegimeModel<B>) {
        let net = NetModules {
            encoder: ObservationEncoder::new(
                config.observation_dim,
                config.feature_dim,
                config.hidden_dim,
                config.log_var_bias,
                device,
            ),
            decoder: ObservationDecoder::new(config.z_dim, config.observation_dim, config.hidden_dim, device),
            dynamics: DynamicsNetworks::new(config, device),
        };
        (net, RegimeModel::new(config.n_regimes, device))
    }

    pub fn config(&self) -> &SwitchingLatentConfig {
        &self.config
    }

    pub fn transition_prior(&self) -> &TransitionPrior<B> {
        &self.net.dynamics.prior
    }

    /// Per-step posterior over regimes for a latent sequence,
    /// `[batch, steps - lags, n_regimes]`.
    pub fn regime_posteriors(&self, latents: &Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let (emissions, _) = self.emissions(latents)?;
        Ok(self.regime.posteriors(&emissions.detach()))
    }

    /// Transition log-density of `latents` under every regime,
    /// `[batch, steps - lags, K]`, plus the matching log-Jacobians.
    fn emissions(&self, latents: &Tensor<B, 3>) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let [batch, steps, z] = latents.dims();
        check_sequence(steps, z, self.config.lags, self.config.z_dim)?;
        let length = steps - self.config.lags;
        let rows = batch * length;
        let k = self.config.n_regimes;
        let features = self
            .net
            .dynamics
            .prior
            .regime_features(self.net.dynamics.embeddings.val());

        let mut log_probs = Vec::with_capacity(k);
        let mut log_dets = Vec::with_capacity(k);
        for regime in 0..k {
            let conditioning = one_hot(&vec![regime; rows], k, &self.device).matmul(features.clone());
            let density = self.net.dynamics.prior.log_density(latents, conditioning)?;
            log_probs.push(density.log_prob);
            log_dets.push(density.log_abs_det);
        }

        let log_dets: Tensor<B, 3> = Tensor::stack(log_dets, 2);
        if !all_finite(log_dets.clone().detach()) {
            return Err(SlacError::NonFinite {
                term: "log_jacobian",
                step: self.updates,
            });
        }
        Ok((Tensor::stack(log_probs, 2), log_dets))
    }

    fn losses(&self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<SwitchingLosses<B>> {
        let lags = self.config.lags;
        let steps = batch.window + 1;
        if steps <= lags {
            return Err(SlacError::ShapeMismatch {
                component: "switching latent window",
                expected: lags + 1,
                actual: steps,
            });
        }
        if batch.observation_dim != self.config.observation_dim {
            return Err(SlacError::ShapeMismatch {
                component: "latent batch observations",
                expected: self.config.observation_dim,
                actual: batch.observation_dim,
            });
        }

        let observations = batch.observations_tensor::<B>(&self.device);
        let [n, _, _] = observations.dims();
        let z_dim = self.config.z_dim;
        let length = steps - lags;
        let k = self.config.n_regimes;

        let features = self.net.encoder.forward(observations.clone(), rng).features;
        let (mean, log_var) = self.net.dynamics.posterior.moments(features);
        let std = log_var.clone().mul_scalar(0.5).exp();
        let latents = reparameterize(mean.clone(), std.clone(), rng);

        let reconstruction = self.net.decoder.forward(latents.clone());
        let recon = (observations - reconstruction)
            .powf_scalar(2.0)
            .sum()
            .div_scalar(n as f32);

        let kld_normal = standard_normal_kl(
            mean.clone().slice([0..n, 0..lags, 0..z_dim]),
            log_var.slice([0..n, 0..lags, 0..z_dim]),
        )
        .sum()
        .div_scalar(n as f32);

        let (emissions, _) = self.emissions(&latents)?;
        let detached = emissions.clone().detach();
        let regime = self.regime.log_likelihood(&detached).mean().neg();

        let map = self.regime.map_regimes(&detached);
        let selector = one_hot::<B>(&map, k, &self.device).reshape([n, length, k]);
        let log_p = (emissions * selector).sum();

        let log_q = gaussian_log_prob(latents, mean, std)
            .slice([0..n, lags..steps, 0..z_dim])
            .sum();
        let kld_laplace = (log_q - log_p).div_scalar((n * length) as f32);

        let total = recon.clone()
            + kld_normal.clone().mul_scalar(self.config.beta)
            + kld_laplace.clone().mul_scalar(self.config.gamma);

        Ok(SwitchingLosses {
            total,
            recon,
            regime,
            kld_normal,
            kld_laplace,
        })
    }
}

impl<B: AutodiffBackend> LatentDynamics<B> for SwitchingLatent<B> {
    fn name(&self) -> &'static str {
        "switching"
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
        self.config.z_dim
    }

    fn encode(&self, observations: Tensor<B, 3>, rng: &mut TrainRng) -> EncodedFeatures<B> {
        self.net.encoder.forward(observations, rng)
    }

    fn sample_posterior(
        &self,
        features: Tensor<B, 3>,
        _actions: Tensor<B, 3>,
        rng: &mut TrainRng,
    ) -> PosteriorSample<B> {
        let (mean, log_var) = self.net.dynamics.posterior.moments(features);
        let std = log_var.mul_scalar(0.5).exp();
        PosteriorSample {
            latents: reparameterize(mean.clone(), std.clone(), rng),
            mean,
            std,
        }
    }

    /// Per-frame posterior mean: depends only on `f_t`.
    fn sample_prior(
        &self,
        features: Tensor<B, 3>,
        _actions: Tensor<B, 3>,
        _rng: &mut TrainRng,
    ) -> Tensor<B, 3> {
        self.net.dynamics.posterior.moments(features).0
    }

    fn decode(&self, latents: Tensor<B, 3>) -> Tensor<B, 3> {
        self.net.decoder.forward(latents)
    }

    fn calculate_loss(&self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLoss<B>> {
        Ok(self.losses(batch, rng)?.into_latent_loss())
    }

    fn update(&mut self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLossInfo> {
        let losses = self.losses(batch, rng)?;
        let regime_loss = losses.regime.clone();
        let total = losses.total.clone();
        let info = losses.into_latent_loss().info(self.updates)?;

        // Regime group first, on detached emissions.
        let grads = GradientsParams::from_grads(regime_loss.backward(), &self.regime);
        self.regime = self.regime_optimizer.step(self.regime.clone(), grads);

        let grads = GradientsParams::from_grads(total.backward(), &self.net);
        self.net = self.net_optimizer.step(self.net.clone(), grads);

        self.updates += 1;
        Ok(info)
    }

    fn update_steps(&self) -> usize {
        self.updates
    }

    fn snapshot(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let latent = LatentModelArtifact {
            dynamics: self.net.dynamics.clone(),
            regime: self.regime.clone(),
        };
        Ok(vec![
            (ENCODER_ARTIFACT, module_to_bytes(&self.net.encoder)?),
            (DECODER_ARTIFACT, module_to_bytes(&self.net.decoder)?),
            (LATENT_ARTIFACT, module_to_bytes(&latent)?),
        ])
    }

    fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let (fresh, regime) = Self::build(&self.config, &self.device);
        match name {
            ENCODER_ARTIFACT => {
                self.net.encoder = module_from_bytes(fresh.encoder, name, bytes, &self.device)?;
            }
            DECODER_ARTIFACT => {
                self.net.decoder = module_from_bytes(fresh.decoder, name, bytes, &self.device)?;
            }
            LATENT_ARTIFACT => {
                let template = LatentModelArtifact {
                    dynamics: fresh.dynamics,
                    regime,
                };
                let loaded = module_from_bytes(template, name, bytes, &self.device)?;
                self.net.dynamics = loaded.dynamics;
                self.regime = loaded.regime;
            }
            other => {
                return Err(SlacError::Restore {
                    name: other.to_string(),
                    reason: "not an artifact of the switching latent model".to_string(),
                })
            }
        }
        Ok(())
    }
}
