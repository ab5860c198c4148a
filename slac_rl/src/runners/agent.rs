//! SLAC agent: a latent-dynamics model plus the latent actor-critic.
//!
//! The agent owns every trainable component and the glue between them:
//!
//! - acting: encoder means of the observation history, concatenated with the
//!   past actions, feed the actor;
//! - actor-critic batches: the latent model turns a short window into
//!   `(z_t, z_{t+1})` and the matching feature-action histories;
//! - snapshots: all named artifacts of both halves.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::latent::{
    ContinuousLatent, LatentDynamics, LatentLossInfo, SwitchingLatent, DECODER_ARTIFACT,
    ENCODER_ARTIFACT, LATENT_ARTIFACT,
};
use crate::algorithms::sac::{
    binarize_first, ActorCriticBatch, ActorCriticConfig, ActorCriticLearner, SacLossInfo,
    ACTOR_ARTIFACT, CRITIC_ARTIFACT,
};
use crate::buffers::{ObservationHistory, WindowBatch};
use crate::checkpoint::{read_artifact, ParameterSnapshot};
use crate::core::tensor_ops::{from_vec, to_vec};
use crate::core::TrainRng;
use crate::environment::ActionSpace;
use crate::error::{Result, SlacError};

use super::config::{LatentVariant, SlacConfig};

/// Threshold applied to the first action component in discrete spaces.
const DISCRETE_THRESHOLD: f32 = 0.5;

/// Latent model and actor-critic learner sharing one encoder.
pub struct SlacAgent<B: AutodiffBackend> {
    latent: Box<dyn LatentDynamics<B>>,
    learner: ActorCriticLearner<B>,
    /// Frames in the acting history and in actor-critic windows.
    history_length: usize,
    discrete: bool,
    device: B::Device,
}

impl<B: AutodiffBackend> SlacAgent<B> {
    /// Build the latent model selected by `config` and a matching learner.
    pub fn new(
        config: &SlacConfig,
        observation_dim: usize,
        action_space: &ActionSpace,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let action_dim = action_space.dim();
        let latent: Box<dyn LatentDynamics<B>> = match config.latent_variant {
            LatentVariant::Continuous => Box::new(ContinuousLatent::<B>::new(
                config.continuous_latent(observation_dim, action_dim),
                device,
            )),
            LatentVariant::Switching => Box::new(SwitchingLatent::<B>::new(
                config.switching_latent(observation_dim, action_dim),
                device,
            )),
        };
        Self::with_latent(latent, config, action_space, device)
    }

    /// Wrap an already-built latent model.
    pub fn with_latent(
        latent: Box<dyn LatentDynamics<B>>,
        config: &SlacConfig,
        action_space: &ActionSpace,
        device: &B::Device,
    ) -> Result<Self> {
        let action_dim = action_space.dim();
        if latent.action_dim() != action_dim {
            return Err(SlacError::ShapeMismatch {
                component: "latent model action width",
                expected: action_dim,
                actual: latent.action_dim(),
            });
        }

        let history_length = config.ac_sequence_length;
        let history_dim = actor_input_dim(history_length, latent.feature_dim(), action_dim);
        let ac_config = ActorCriticConfig::new(latent.latent_dim(), action_dim, history_dim)
            .with_hidden_units(config.hidden_units)
            .with_learning_rate(config.lr_sac)
            .with_alpha_learning_rate(config.lr_sac as f32)
            .with_gamma(config.gamma)
            .with_tau(config.tau);
        let ac_config = ActorCriticConfig {
            initial_alpha: config.initial_alpha,
            grad_clip: config.max_grad_norm,
            ..ac_config
        };

        log::info!(
            "{} latent model: feature {} latent {}, actor input {}",
            latent.name(),
            latent.feature_dim(),
            latent.latent_dim(),
            history_dim
        );

        Ok(Self {
            learner: ActorCriticLearner::new(ac_config, device),
            latent,
            history_length,
            discrete: action_space.is_discrete(),
            device: device.clone(),
        })
    }

    pub fn latent(&self) -> &dyn LatentDynamics<B> {
        self.latent.as_ref()
    }

    pub fn learner(&self) -> &ActorCriticLearner<B> {
        &self.learner
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Fresh acting history for one environment.
    pub fn new_history(&self) -> ObservationHistory {
        ObservationHistory::new(
            self.history_length,
            self.latent.observation_dim(),
            self.latent.action_dim(),
        )
    }

    // ========================================================================
    // Acting
    // ========================================================================

    /// Stochastic policy action for the current history.
    pub fn explore(&self, history: &ObservationHistory, rng: &mut TrainRng) -> Result<Vec<f32>> {
        let input = self.actor_input(history, rng)?;
        let action = to_vec(self.learner.explore(input.inner(), rng));
        Ok(self.postprocess(action))
    }

    /// Deterministic policy action for evaluation.
    pub fn exploit(&self, history: &ObservationHistory, rng: &mut TrainRng) -> Result<Vec<f32>> {
        let input = self.actor_input(history, rng)?;
        let action = to_vec(self.learner.exploit(input.inner()));
        Ok(self.postprocess(action))
    }

    fn postprocess(&self, mut action: Vec<f32>) -> Vec<f32> {
        if self.discrete {
            binarize_first(&mut action, DISCRETE_THRESHOLD);
        }
        action
    }

    /// `[1, L·F + (L-1)·A]` from encoder means of the history frames.
    fn actor_input(&self, history: &ObservationHistory, rng: &mut TrainRng) -> Result<Tensor<B, 2>> {
        let length = history.length();
        let obs_dim = self.latent.observation_dim();
        let action_dim = self.latent.action_dim();
        if length != self.history_length || history.observation_dim() != obs_dim {
            return Err(SlacError::ShapeMismatch {
                component: "observation history",
                expected: self.history_length * obs_dim,
                actual: length * history.observation_dim(),
            });
        }

        let observations: Tensor<B, 3> =
            from_vec(history.observations(), [1, length, obs_dim], &self.device);
        let features = self.latent.encode(observations, rng).mean.detach();
        let features = features.reshape([1, length * self.latent.feature_dim()]);
        if length == 1 {
            return Ok(features);
        }
        let actions: Tensor<B, 2> =
            from_vec(history.actions(), [1, (length - 1) * action_dim], &self.device);
        Ok(Tensor::cat(vec![features, actions], 1))
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// One latent-model step on a `num_sequences` window.
    pub fn update_latent(&mut self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<LatentLossInfo> {
        self.latent.update(batch, rng)
    }

    /// One actor-critic step on an `ac_sequence_length` window.
    pub fn update_actor_critic(&mut self, batch: &WindowBatch, rng: &mut TrainRng) -> Result<SacLossInfo> {
        let ac_batch = self.prepare_actor_critic_batch(batch, rng)?;
        self.learner.update(&ac_batch, rng)
    }

    /// Detached latents and histories for a window of length `L`:
    ///
    /// ```text
    /// z_t = z[L-1], z_{t+1} = z[L], a_t = a[L-1]
    /// history      = (f[0..L],   a[0..L-1])
    /// next_history = (f[1..L+1], a[1..L])
    /// ```
    pub fn prepare_actor_critic_batch(
        &self,
        batch: &WindowBatch,
        rng: &mut TrainRng,
    ) -> Result<ActorCriticBatch<B>> {
        let window = batch.window;
        if window != self.history_length {
            return Err(SlacError::ShapeMismatch {
                component: "actor-critic window",
                expected: self.history_length,
                actual: window,
            });
        }
        if batch.observation_dim != self.latent.observation_dim() {
            return Err(SlacError::ShapeMismatch {
                component: "actor-critic observations",
                expected: self.latent.observation_dim(),
                actual: batch.observation_dim,
            });
        }

        let n = batch.batch_size;
        let feature_dim = self.latent.feature_dim();
        let action_dim = batch.action_dim;
        let observations = batch.observations_tensor::<B>(&self.device);
        let actions = batch.actions_tensor::<B>(&self.device);

        let features = self.latent.encode(observations, rng).mean.detach();
        let latents = self
            .latent
            .sample_prior(features.clone(), actions.clone(), rng)
            .detach();
        let [_, steps, latent_dim] = latents.dims();
        let expected = self.learner.config().latent_dim;
        if latent_dim != expected || steps != window + 1 {
            return Err(SlacError::ShapeMismatch {
                component: "critic latent input",
                expected,
                actual: latent_dim,
            });
        }

        let flatten = |x: Tensor<B, 3>, from: usize, to: usize, width: usize| -> Tensor<B, 2> {
            x.slice([0..n, from..to, 0..width]).reshape([n, (to - from) * width])
        };
        let history_of = |offset: usize| -> Tensor<B, 2> {
            let f = flatten(features.clone(), offset, offset + window, feature_dim);
            if window == 1 {
                f
            } else {
                let a = flatten(actions.clone(), offset, offset + window - 1, action_dim);
                Tensor::cat(vec![f, a], 1)
            }
        };

        let rewards = batch.rewards_tensor::<B>(&self.device);
        let terminals = batch.terminals_tensor::<B>(&self.device);

        Ok(ActorCriticBatch {
            latent: flatten(latents.clone(), window - 1, window, latent_dim),
            next_latent: flatten(latents, window, window + 1, latent_dim),
            action: flatten(actions.clone(), window - 1, window, action_dim),
            history: history_of(0),
            next_history: history_of(1),
            reward: flatten(rewards, window - 1, window, 1),
            terminal: flatten(terminals, window - 1, window, 1),
        })
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Every named artifact: encoder, decoder, latent model, actor, critic.
    pub fn snapshot(&self) -> Result<ParameterSnapshot> {
        let mut snapshot = ParameterSnapshot::new();
        for (name, bytes) in self.latent.snapshot()?.into_iter().chain(self.learner.snapshot()?) {
            snapshot.insert(name, bytes);
        }
        Ok(snapshot)
    }

    /// Route one artifact to the component that owns it.
    pub fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        match name {
            ACTOR_ARTIFACT | CRITIC_ARTIFACT => self.learner.restore(name, bytes),
            _ => self.latent.restore(name, bytes),
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        for (name, bytes) in snapshot.iter() {
            self.restore(name, bytes)?;
        }
        Ok(())
    }

    /// Load the warm-start artifacts named in `config`, if any.
    pub fn warm_start(&mut self, config: &SlacConfig) -> Result<()> {
        if let Some(dir) = &config.latent_path {
            for name in [ENCODER_ARTIFACT, DECODER_ARTIFACT, LATENT_ARTIFACT] {
                let path = dir.join(name).with_extension("bin");
                self.restore_file(name, &path)?;
            }
        }
        if let Some(path) = &config.actor_path {
            self.restore_file(ACTOR_ARTIFACT, path)?;
        }
        if let Some(path) = &config.critic_path {
            self.restore_file(CRITIC_ARTIFACT, path)?;
        }
        Ok(())
    }

    fn restore_file(&mut self, name: &str, path: &Path) -> Result<()> {
        let bytes = read_artifact(path)?;
        self.restore(name, &bytes)?;
        log::info!("warm-started `{}` from {}", name, path.display());
        Ok(())
    }
}

/// Actor input width for a history of `length` frames.
pub fn actor_input_dim(length: usize, feature_dim: usize, action_dim: usize) -> usize {
    length * feature_dim + length.saturating_sub(1) * action_dim
}
