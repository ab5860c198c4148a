//! Configuration for SLAC training.
//!
//! A flat set of named hyperparameters. [`SlacConfig::default`] follows the
//! published SLAC settings. JSON input must name every schedule, size,
//! network and learning-rate key; only bookkeeping keys (seed, paths,
//! logging, resume and retention), `initial_alpha`, `max_grad_norm` and the
//! warm-start paths may be left out. The `switching` section is required when
//! the switching model is selected. [`SlacConfig::validate`] runs before any
//! network is built.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::algorithms::latent::{ContinuousLatentConfig, SwitchingLatentConfig};
use crate::error::ConfigError;

/// Which latent-dynamics model to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatentVariant {
    /// Gaussian state-space model with `z = [z1, z2]`.
    Continuous,
    /// Regime-switching model with per-dimension transition priors.
    Switching,
}

/// Hyperparameters of the switching latent model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingParams {
    pub z_dim: usize,
    pub lags: usize,
    pub n_regimes: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub lr_net: f64,
    pub lr_regime: f64,
    pub weight_decay: f32,
    /// Weight of the initial-latent KL.
    pub beta: f32,
    /// Weight of the transition KL.
    pub gamma: f32,
}

impl Default for SwitchingParams {
    fn default() -> Self {
        Self {
            z_dim: 32,
            lags: 2,
            n_regimes: 4,
            embedding_dim: 8,
            hidden_dim: 256,
            lr_net: 5e-4,
            lr_regime: 1e-3,
            weight_decay: 1e-4,
            beta: 2e-3,
            gamma: 2e-3,
        }
    }
}

/// Configuration for [`Trainer`](super::Trainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlacConfig {
    // Run
    #[serde(default)]
    pub seed: u64,
    /// Root for `log.csv` and `model/step{N}` snapshots.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    pub latent_variant: LatentVariant,

    // Schedule (env steps count `action_repeat`)
    pub num_steps: usize,
    pub initial_collection_steps: usize,
    pub initial_learning_steps: usize,
    pub action_repeat: usize,
    pub eval_interval: usize,
    pub num_eval_episodes: usize,
    /// Update steps between loss reports.
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    /// Resume offset for the joint-training counter.
    #[serde(default)]
    pub current_step: usize,
    /// Pick the next collection env at random instead of round-robin.
    #[serde(default)]
    pub random_env_selection: bool,
    /// Snapshots kept on disk (0 keeps all).
    #[serde(default)]
    pub keep_last_n: usize,

    // Store
    pub buffer_size: usize,
    /// Window length of latent-model batches.
    pub num_sequences: usize,
    /// Window length of actor-critic batches and the acting history.
    pub ac_sequence_length: usize,
    pub batch_size_latent: usize,
    pub batch_size_sac: usize,

    // Continuous latent model
    pub feature_dim: usize,
    pub z1_dim: usize,
    pub z2_dim: usize,
    pub hidden_units: usize,
    pub lr_latent: f64,

    /// Only read by the switching model.
    #[serde(default)]
    pub switching: SwitchingParams,

    // Actor-critic
    pub lr_sac: f64,
    pub gamma: f32,
    pub tau: f32,
    #[serde(default = "default_initial_alpha")]
    pub initial_alpha: f32,
    /// Gradient-norm clip for every optimizer (None = no clipping).
    #[serde(default)]
    pub max_grad_norm: Option<f32>,

    // Warm start
    /// Directory holding `encoder.bin`, `decoder.bin` and `latent_model.bin`.
    #[serde(default)]
    pub latent_path: Option<PathBuf>,
    #[serde(default)]
    pub actor_path: Option<PathBuf>,
    #[serde(default)]
    pub critic_path: Option<PathBuf>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_interval() -> usize {
    1000
}

fn default_initial_alpha() -> f32 {
    1.0
}

impl Default for SlacConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            log_dir: default_log_dir(),
            latent_variant: LatentVariant::Continuous,

            num_steps: 2_000_000,
            initial_collection_steps: 10_000,
            initial_learning_steps: 100_000,
            action_repeat: 4,
            eval_interval: 10_000,
            num_eval_episodes: 5,
            log_interval: default_log_interval(),
            current_step: 0,
            random_env_selection: false,
            keep_last_n: 0,

            buffer_size: 100_000,
            num_sequences: 8,
            ac_sequence_length: 8,
            batch_size_latent: 32,
            batch_size_sac: 256,

            feature_dim: 256,
            z1_dim: 32,
            z2_dim: 256,
            hidden_units: 256,
            lr_latent: 1e-4,

            switching: SwitchingParams::default(),

            lr_sac: 3e-4,
            gamma: 0.99,
            tau: 5e-3,
            initial_alpha: default_initial_alpha(),
            max_grad_norm: None,

            latent_path: None,
            actor_path: None,
            critic_path: None,
        }
    }
}

impl SlacConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object. A missing required key is a
    /// [`ConfigError::Parse`] naming the key.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(parse_error)?;
        let has_switching = value.get("switching").is_some();
        let config: Self = serde_json::from_value(value).map_err(parse_error)?;
        if config.latent_variant == LatentVariant::Switching && !has_switching {
            return Err(ConfigError::Parse(
                "missing field `switching` for the switching latent model".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(parse_error)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_latent_variant(mut self, variant: LatentVariant) -> Self {
        self.latent_variant = variant;
        self
    }

    /// Total env steps, prefill steps and latent warmup updates.
    pub fn with_schedule(
        mut self,
        num_steps: usize,
        initial_collection_steps: usize,
        initial_learning_steps: usize,
    ) -> Self {
        self.num_steps = num_steps;
        self.initial_collection_steps = initial_collection_steps;
        self.initial_learning_steps = initial_learning_steps;
        self
    }

    pub fn with_action_repeat(mut self, action_repeat: usize) -> Self {
        self.action_repeat = action_repeat;
        self
    }

    pub fn with_evaluation(mut self, eval_interval: usize, num_eval_episodes: usize) -> Self {
        self.eval_interval = eval_interval;
        self.num_eval_episodes = num_eval_episodes;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_current_step(mut self, current_step: usize) -> Self {
        self.current_step = current_step;
        self
    }

    pub fn with_random_env_selection(mut self, random: bool) -> Self {
        self.random_env_selection = random;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_sequence_lengths(mut self, num_sequences: usize, ac_sequence_length: usize) -> Self {
        self.num_sequences = num_sequences;
        self.ac_sequence_length = ac_sequence_length;
        self
    }

    pub fn with_batch_sizes(mut self, latent: usize, sac: usize) -> Self {
        self.batch_size_latent = latent;
        self.batch_size_sac = sac;
        self
    }

    /// Feature, `z1`, `z2` and hidden widths of the continuous model; the
    /// hidden width is shared with the actor and critic.
    pub fn with_network_dims(
        mut self,
        feature_dim: usize,
        z1_dim: usize,
        z2_dim: usize,
        hidden_units: usize,
    ) -> Self {
        self.feature_dim = feature_dim;
        self.z1_dim = z1_dim;
        self.z2_dim = z2_dim;
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_switching(mut self, switching: SwitchingParams) -> Self {
        self.switching = switching;
        self
    }

    pub fn with_learning_rates(mut self, lr_latent: f64, lr_sac: f64) -> Self {
        self.lr_latent = lr_latent;
        self.lr_sac = lr_sac;
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

    pub fn with_max_grad_norm(mut self, max_grad_norm: Option<f32>) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    pub fn with_warm_start(
        mut self,
        latent_path: Option<PathBuf>,
        actor_path: Option<PathBuf>,
        critic_path: Option<PathBuf>,
    ) -> Self {
        self.latent_path = latent_path;
        self.actor_path = actor_path;
        self.critic_path = critic_path;
        self
    }

    /// Joint-training iterations: one env step of `action_repeat` frames each.
    pub fn joint_iterations(&self) -> usize {
        self.num_steps / self.action_repeat.max(1)
    }

    /// Directory holding `step{N}` snapshots.
    pub fn model_dir(&self) -> PathBuf {
        self.log_dir.join("model")
    }

    /// Evaluation CSV path.
    pub fn eval_csv_path(&self) -> PathBuf {
        self.log_dir.join("log.csv")
    }

    /// Continuous latent-model settings for the given environment sizes.
    pub fn continuous_latent(&self, observation_dim: usize, action_dim: usize) -> ContinuousLatentConfig {
        ContinuousLatentConfig::new(observation_dim, action_dim)
            .with_feature_dim(self.feature_dim)
            .with_latent_dims(self.z1_dim, self.z2_dim)
            .with_hidden_units(self.hidden_units)
            .with_learning_rate(self.lr_latent)
            .with_grad_clip(self.max_grad_norm)
    }

    /// Switching latent-model settings for the given environment sizes.
    pub fn switching_latent(&self, observation_dim: usize, action_dim: usize) -> SwitchingLatentConfig {
        let s = &self.switching;
        let mut config = SwitchingLatentConfig::new(observation_dim, action_dim)
            .with_feature_dim(self.feature_dim)
            .with_z_dim(s.z_dim)
            .with_lags(s.lags)
            .with_regimes(s.n_regimes, s.embedding_dim)
            .with_learning_rates(s.lr_net, s.lr_regime)
            .with_loss_weights(s.beta, s.gamma);
        config.hidden_dim = s.hidden_dim;
        config.weight_decay = s.weight_decay;
        config.grad_clip = self.max_grad_norm;
        config
    }

    /// Check every field before training starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts: [(&'static str, usize); 15] = [
            ("num_steps", self.num_steps),
            ("action_repeat", self.action_repeat),
            ("eval_interval", self.eval_interval),
            ("num_eval_episodes", self.num_eval_episodes),
            ("log_interval", self.log_interval),
            ("buffer_size", self.buffer_size),
            ("num_sequences", self.num_sequences),
            ("ac_sequence_length", self.ac_sequence_length),
            ("batch_size_latent", self.batch_size_latent),
            ("batch_size_sac", self.batch_size_sac),
            ("feature_dim", self.feature_dim),
            ("z1_dim", self.z1_dim),
            ("z2_dim", self.z2_dim),
            ("hidden_units", self.hidden_units),
            ("initial_collection_steps", self.initial_collection_steps),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.ac_sequence_length > self.num_sequences {
            return Err(ConfigError::WindowLength {
                ac: self.ac_sequence_length,
                latent: self.num_sequences,
            });
        }
        if self.buffer_size <= self.num_sequences + 1 {
            return Err(ConfigError::OutOfRange {
                name: "buffer_size",
                value: self.buffer_size as f64,
                reason: "must exceed num_sequences + 1",
            });
        }

        check_range("gamma", self.gamma as f64, 0.0, 1.0, "must be in [0, 1]")?;
        check_range("tau", self.tau as f64, 0.0, 1.0, "must be in [0, 1]")?;
        check_positive("lr_latent", self.lr_latent)?;
        check_positive("lr_sac", self.lr_sac)?;
        check_positive("initial_alpha", self.initial_alpha as f64)?;
        if let Some(norm) = self.max_grad_norm {
            check_positive("max_grad_norm", norm as f64)?;
        }

        if self.latent_variant == LatentVariant::Switching {
            let s = &self.switching;
            let counts: [(&'static str, usize); 5] = [
                ("switching.z_dim", s.z_dim),
                ("switching.lags", s.lags),
                ("switching.n_regimes", s.n_regimes),
                ("switching.embedding_dim", s.embedding_dim),
                ("switching.hidden_dim", s.hidden_dim),
            ];
            for (name, value) in counts {
                if value == 0 {
                    return Err(ConfigError::Zero(name));
                }
            }
            // The transition KL needs at least one step past the lags.
            if s.lags >= self.num_sequences + 1 {
                return Err(ConfigError::OutOfRange {
                    name: "switching.lags",
                    value: s.lags as f64,
                    reason: "must be at most num_sequences",
                });
            }
            check_positive("switching.lr_net", s.lr_net)?;
            check_positive("switching.lr_regime", s.lr_regime)?;
        }

        Ok(())
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    low: f64,
    high: f64,
    reason: &'static str,
) -> Result<(), ConfigError> {
    if value.is_finite() && (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, reason })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            reason: "must be positive",
        })
    }
}

fn parse_error(err: serde_json::Error) -> ConfigError {
    ConfigError::Parse(err.to_string())
}
