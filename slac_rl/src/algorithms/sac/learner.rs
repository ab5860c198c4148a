//! Latent actor-critic learner.
//!
//! One [`ActorCriticLearner::update`] performs, in order:
//!
//! 1. critic regression toward `r + γ(1-d)(min Q'(z', a') - α log π(a'))`,
//!    with `a'` sampled from the current actor at the next history and `Q'`
//!    the target critic;
//! 2. actor step on `E[α log π - min Q(z, a)]` using the updated critic;
//! 3. temperature step from the entropy of the same actor sample;
//! 4. Polyak update of the target critic.
//!
//! The target critic lives on the inner backend and never records gradients.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::checkpoint::{module_from_bytes, module_to_bytes};
use crate::core::tensor_ops::scalar;
use crate::core::{hard_copy, soft_update, ModuleOptimizer, TrainRng};
use crate::error::{Result, SlacError};

use super::actor::SquashedGaussianActor;
use super::critic::TwinCritic;
use super::entropy_tuning::{target_entropy_continuous, EntropyTuner};
use super::losses::{actor_loss, critic_loss, td_targets};

/// Artifact name of the actor parameters.
pub const ACTOR_ARTIFACT: &str = "actor";
/// Artifact name of the (online) critic parameters.
pub const CRITIC_ARTIFACT: &str = "critic";

/// Sizes and optimization settings for [`ActorCriticLearner`].
#[derive(Debug, Clone)]
pub struct ActorCriticConfig {
    /// Width of the latent state fed to the critic.
    pub latent_dim: usize,
    pub action_dim: usize,
    /// Width of the flattened feature-action history fed to the actor.
    pub history_dim: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub alpha_learning_rate: f32,
    pub initial_alpha: f32,
    pub gamma: f32,
    pub tau: f32,
    pub grad_clip: Option<f32>,
}

impl ActorCriticConfig {
    pub fn new(latent_dim: usize, action_dim: usize, history_dim: usize) -> Self {
        Self {
            latent_dim,
            action_dim,
            history_dim,
            hidden_units: 256,
            learning_rate: 3e-4,
            alpha_learning_rate: 3e-4,
            initial_alpha: 1.0,
            gamma: 0.99,
            tau: 5e-3,
            grad_clip: None,
        }
    }

    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_alpha_learning_rate(mut self, alpha_learning_rate: f32) -> Self {
        self.alpha_learning_rate = alpha_learning_rate;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }
}

/// Detached inputs for one update, all `[batch, ·]`.
#[derive(Debug, Clone)]
pub struct ActorCriticBatch<B: Backend> {
    /// `z_t`
    pub latent: Tensor<B, 2>,
    /// `z_{t+1}`
    pub next_latent: Tensor<B, 2>,
    /// `a_t`
    pub action: Tensor<B, 2>,
    /// `(f_{1..t}, a_{1..t-1})`
    pub history: Tensor<B, 2>,
    /// `(f_{2..t+1}, a_{2..t})`
    pub next_history: Tensor<B, 2>,
    /// `[batch, 1]`
    pub reward: Tensor<B, 2>,
    /// `[batch, 1]`
    pub terminal: Tensor<B, 2>,
}

/// Scalars from one actor-critic update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SacLossInfo {
    pub critic_loss: f32,
    pub actor_loss: f32,
    pub alpha_loss: f32,
    pub alpha: f32,
    pub entropy: f32,
    pub mean_q: f32,
}

impl SacLossInfo {
    /// `(metric name, value)` pairs in reporting order.
    pub fn metrics(&self) -> [(&'static str, f32); 5] {
        [
            ("loss/critic", self.critic_loss),
            ("loss/actor", self.actor_loss),
            ("loss/alpha", self.alpha_loss),
            ("stats/alpha", self.alpha),
            ("stats/entropy", self.entropy),
        ]
    }
}

/// Actor, twin critic, target critic and temperature with their optimizers.
pub struct ActorCriticLearner<B: AutodiffBackend> {
    actor: SquashedGaussianActor<B>,
    critic: TwinCritic<B>,
    target_critic: TwinCritic<B::InnerBackend>,
    actor_optimizer: ModuleOptimizer<SquashedGaussianActor<B>>,
    critic_optimizer: ModuleOptimizer<TwinCritic<B>>,
    entropy: EntropyTuner,
    config: ActorCriticConfig,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> ActorCriticLearner<B> {
    pub fn new(config: ActorCriticConfig, device: &B::Device) -> Self {
        let actor = Self::build_actor(&config, device);
        let critic = Self::build_critic(&config, device);
        let target_critic = hard_copy::<B::InnerBackend, _>(&critic.valid());

        Self {
            actor,
            critic,
            target_critic,
            actor_optimizer: ModuleOptimizer::adam::<B>(config.learning_rate, config.grad_clip),
            critic_optimizer: ModuleOptimizer::adam::<B>(config.learning_rate, config.grad_clip),
            entropy: EntropyTuner::new(
                config.initial_alpha,
                target_entropy_continuous(config.action_dim),
                config.alpha_learning_rate,
            ),
            config,
            device: device.clone(),
            updates: 0,
        }
    }

    fn build_actor(config: &ActorCriticConfig, device: &B::Device) -> SquashedGaussianActor<B> {
        SquashedGaussianActor::new(config.history_dim, config.action_dim, config.hidden_units, device)
    }

    fn build_critic(config: &ActorCriticConfig, device: &B::Device) -> TwinCritic<B> {
        TwinCritic::new(config.latent_dim, config.action_dim, config.hidden_units, device)
    }

    pub fn actor(&self) -> &SquashedGaussianActor<B> {
        &self.actor
    }

    pub fn critic(&self) -> &TwinCritic<B> {
        &self.critic
    }

    pub fn target_critic(&self) -> &TwinCritic<B::InnerBackend> {
        &self.target_critic
    }

    pub fn entropy_tuner(&self) -> &EntropyTuner {
        &self.entropy
    }

    pub fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    pub fn update_steps(&self) -> usize {
        self.updates
    }

    /// Stochastic action for exploration, `[batch, A]`.
    pub fn explore(&self, history: Tensor<B::InnerBackend, 2>, rng: &mut TrainRng) -> Tensor<B::InnerBackend, 2> {
        self.actor.valid().sample(history, rng).0
    }

    /// `tanh(μ)` for evaluation, `[batch, A]`.
    pub fn exploit(&self, history: Tensor<B::InnerBackend, 2>) -> Tensor<B::InnerBackend, 2> {
        self.actor.valid().deterministic(history)
    }

    pub fn update(&mut self, batch: &ActorCriticBatch<B>, rng: &mut TrainRng) -> Result<SacLossInfo> {
        let step = self.updates;
        let alpha = self.entropy.alpha();

        // ====================================================================
        // Critic
        // ====================================================================

        let targets = {
            let actor = self.actor.valid();
            let (next_action, next_log_prob) = actor.sample(batch.next_history.clone().inner(), rng);
            let min_q_next = self
                .target_critic
                .min_q(batch.next_latent.clone().inner(), next_action);
            td_targets(
                batch.reward.clone().inner(),
                batch.terminal.clone().inner(),
                min_q_next,
                next_log_prob,
                self.config.gamma,
                alpha,
            )
        };
        let targets = Tensor::<B, 2>::from_inner(targets);

        let (q1, q2) = self.critic.forward(batch.latent.clone(), batch.action.clone());
        let mean_q = scalar(q1.clone().detach().mean());
        let loss = critic_loss(q1, q2, targets);
        let critic_loss_val = finite(scalar(loss.clone().detach()), "loss/critic", step)?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.critic);
        self.critic = self.critic_optimizer.step(self.critic.clone(), grads);

        // ====================================================================
        // Actor and temperature, from one sample
        // ====================================================================

        let (action, log_prob) = self.actor.sample(batch.history.clone(), rng);
        let min_q = self.critic.min_q(batch.latent.clone(), action);
        let entropy = -scalar(log_prob.clone().detach().mean());
        let loss = actor_loss(min_q, log_prob, alpha);
        let actor_loss_val = finite(scalar(loss.clone().detach()), "loss/actor", step)?;
        finite(entropy, "stats/entropy", step)?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.actor);
        self.actor = self.actor_optimizer.step(self.actor.clone(), grads);

        let alpha_update = self.entropy.step(entropy);

        // ====================================================================
        // Target critic
        // ====================================================================

        self.target_critic = soft_update::<B::InnerBackend, _>(
            &self.critic.valid(),
            self.target_critic.clone(),
            self.config.tau,
        );
        self.updates += 1;

        Ok(SacLossInfo {
            critic_loss: critic_loss_val,
            actor_loss: actor_loss_val,
            alpha_loss: alpha_update.loss,
            alpha: alpha_update.alpha,
            entropy,
            mean_q,
        })
    }

    /// Serialized actor and critic. The target critic is not saved.
    pub fn snapshot(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        Ok(vec![
            (ACTOR_ARTIFACT, module_to_bytes(&self.actor)?),
            (CRITIC_ARTIFACT, module_to_bytes(&self.critic)?),
        ])
    }

    /// Restore the actor or the critic. Restoring the critic also resets the
    /// target critic to an exact copy.
    pub fn restore(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        match name {
            ACTOR_ARTIFACT => {
                let template = Self::build_actor(&self.config, &self.device);
                self.actor = module_from_bytes(template, name, bytes, &self.device)?;
            }
            CRITIC_ARTIFACT => {
                let template = Self::build_critic(&self.config, &self.device);
                self.critic = module_from_bytes(template, name, bytes, &self.device)?;
                self.target_critic = hard_copy::<B::InnerBackend, _>(&self.critic.valid());
            }
            other => {
                return Err(SlacError::Restore {
                    name: other.to_string(),
                    reason: "not an actor-critic artifact".to_string(),
                })
            }
        }
        Ok(())
    }
}

fn finite(value: f32, term: &'static str, step: usize) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SlacError::NonFinite { term, step })
    }
}
