//! Training orchestrator.
//!
//! Drives the phases in order:
//!
//! ```text
//! Prefill ──► LatentWarmup ──► JointTraining ──► Finished
//!                                   │
//!                                   └─ every eval_interval env steps:
//!                                      Evaluate + Checkpoint
//! ```
//!
//! - Prefill: random actions fill the store.
//! - LatentWarmup: latent-model updates only, so the actor-critic starts from
//!   a useful representation.
//! - JointTraining: per iteration one env step, one latent update and one
//!   actor-critic update.
//!
//! Everything runs on the calling thread. Environments are used one at a
//! time. When an episode ends the next collection env is picked round-robin
//! (or at random when configured).

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;

use crate::buffers::{ObservationHistory, SequenceStore};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::core::TrainRng;
use crate::environment::Environment;
use crate::error::{ConfigError, Result, SlacError};
use crate::metrics::{CsvSink, MetricsSink, MultiSink, TrainingProgress, EVAL_RETURN};

use super::agent::SlacAgent;
use super::config::SlacConfig;

/// Upper bound on evaluation episode length for envs without a step limit.
const MAX_EVAL_EPISODE_STEPS: usize = 100_000;

/// Current stage of [`Trainer::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prefill,
    LatentWarmup,
    JointTraining,
    Finished,
}

/// Single-threaded SLAC training loop.
pub struct Trainer<B: AutodiffBackend> {
    config: SlacConfig,
    agent: SlacAgent<B>,

    envs: Vec<Box<dyn Environment>>,
    env_test: Box<dyn Environment>,
    env_id: usize,
    /// Steps taken in the current collection episode.
    episode_step: usize,
    episode_return: f32,

    store: SequenceStore,
    history: ObservationHistory,
    test_history: ObservationHistory,

    checkpointer: Checkpointer,
    sink: MultiSink,
    progress: TrainingProgress,
    phase: Phase,
    /// Joint-training iteration reached, for resuming.
    current_step: usize,

    rng: TrainRng,
    /// Separate stream so evaluation never shifts the training noise.
    eval_rng: TrainRng,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Validate `config`, build the agent and store, and seed every env.
    ///
    /// All collection envs must share the observation width and action space
    /// of the first one, and the test env must match them too.
    pub fn new(
        config: SlacConfig,
        mut envs: Vec<Box<dyn Environment>>,
        mut env_test: Box<dyn Environment>,
        sink: impl MetricsSink + 'static,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let first = envs.first().ok_or(ConfigError::Zero("envs"))?;
        let observation_dim = first.observation_dim();
        let action_space = first.action_space();
        let action_dim = action_space.dim();

        for env in envs.iter().chain(std::iter::once(&env_test)) {
            check_width("environment observation", observation_dim, env.observation_dim())?;
            check_width("environment action", action_dim, env.action_space().dim())?;
        }

        let mut agent = SlacAgent::<B>::new(&config, observation_dim, &action_space, device)?;
        agent.warm_start(&config)?;

        let store = SequenceStore::new(
            config.buffer_size,
            observation_dim,
            action_dim,
            config.num_sequences,
            config.ac_sequence_length,
        )?;
        let history = agent.new_history();
        let test_history = agent.new_history();

        let checkpointer = Checkpointer::new(
            CheckpointerConfig::new(config.model_dir()).with_keep_last_n(config.keep_last_n),
        )?;
        let mut sinks = MultiSink::new().add(sink);
        match CsvSink::evaluation(config.eval_csv_path()) {
            Ok(csv) => sinks = sinks.add(csv),
            Err(err) => log::warn!(
                "evaluation CSV {} unavailable: {}",
                config.eval_csv_path().display(),
                err
            ),
        }

        for env in envs.iter_mut() {
            env.reset(Some(config.seed));
        }
        env_test.reset(Some((1u64 << 31).wrapping_sub(config.seed)));

        let mut rng = TrainRng::seed_from(config.seed);
        let eval_rng = rng.fork();

        Ok(Self {
            current_step: config.current_step,
            config,
            agent,
            envs,
            env_test,
            env_id: 0,
            episode_step: 0,
            episode_return: 0.0,
            store,
            history,
            test_history,
            checkpointer,
            sink: sinks,
            progress: TrainingProgress::new(),
            phase: Phase::Prefill,
            rng,
            eval_rng,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> &TrainingProgress {
        &self.progress
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn agent(&self) -> &SlacAgent<B> {
        &self.agent
    }

    pub fn config(&self) -> &SlacConfig {
        &self.config
    }

    /// Index of the env currently collecting.
    pub fn active_env(&self) -> usize {
        self.env_id
    }

    /// Last joint-training iteration at which a snapshot was taken.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Run every phase to completion.
    pub fn run(&mut self) -> Result<()> {
        self.prefill()?;
        self.warmup()?;
        self.train_joint()?;
        self.sink.flush();
        Ok(())
    }

    // ========================================================================
    // Phases
    // ========================================================================

    /// Open the first episode and collect `initial_collection_steps` random
    /// transitions.
    pub fn prefill(&mut self) -> Result<()> {
        self.phase = Phase::Prefill;
        log::info!(
            "collecting {} transitions with a random policy",
            self.config.initial_collection_steps
        );

        self.start_episode()?;
        for _ in 0..self.config.initial_collection_steps {
            self.collect_step(true)?;
        }
        Ok(())
    }

    /// Latent-model updates only.
    pub fn warmup(&mut self) -> Result<()> {
        self.phase = Phase::LatentWarmup;
        let updates = self
            .config
            .initial_learning_steps
            .saturating_sub(self.config.current_step);
        log::info!("warming up the latent model for {} updates", updates);

        for _ in 0..updates {
            self.update_latent()?;
        }
        Ok(())
    }

    /// Interleaved collection and updates with periodic evaluation.
    pub fn train_joint(&mut self) -> Result<()> {
        self.phase = Phase::JointTraining;
        let start = if self.config.current_step == 0 {
            self.config.initial_collection_steps + 1
        } else {
            self.config.current_step
        };
        let end = start + self.config.joint_iterations();
        log::info!("joint training for iterations {}..{}", start, end);

        for step in start..end {
            self.collect_step(false)?;
            self.update_latent()?;
            self.update_actor_critic()?;

            let step_env = step * self.config.action_repeat;
            if step_env % self.config.eval_interval == 0 {
                self.evaluate_and_checkpoint(step_env);
                self.current_step = step;
            }
        }

        self.phase = Phase::Finished;
        log::info!(
            "finished after {} env steps and {} episodes",
            self.progress.env_steps(),
            self.progress.episodes()
        );
        Ok(())
    }

    // ========================================================================
    // Collection
    // ========================================================================

    fn start_episode(&mut self) -> Result<()> {
        let observation = self.envs[self.env_id].reset(None);
        self.history.reset_episode(&observation)?;
        self.store.reset_episode(&observation)?;
        self.episode_step = 0;
        self.episode_return = 0.0;
        Ok(())
    }

    /// One env step in the active env. Closes the episode and rotates envs
    /// when it ends.
    fn collect_step(&mut self, random: bool) -> Result<()> {
        let id = self.env_id;
        self.episode_step += 1;

        let action = if random {
            self.envs[id].sample_action(&mut self.rng)
        } else {
            self.agent.explore(&self.history, &mut self.rng)?
        };

        let result = self.envs[id].step(&action)?;
        let done = result.done();
        // Time-limit ends keep bootstrapping.
        let at_limit = self.envs[id].max_episode_steps() == Some(self.episode_step);
        let terminal_mask = result.terminated && !at_limit;

        self.history.append(&result.observation, &action)?;
        self.store
            .append(&action, result.reward, terminal_mask, &result.observation, done)?;
        self.episode_return += result.reward;
        self.progress.add_env_steps(self.config.action_repeat);

        if done {
            self.progress.record_episode(self.episode_return);
            log::debug!(
                "env {} episode finished: {} steps, return {:.3}",
                id,
                self.episode_step,
                self.episode_return
            );
            self.env_id = self.next_env();
            self.start_episode()?;
        }
        Ok(())
    }

    fn next_env(&mut self) -> usize {
        let n = self.envs.len();
        if self.config.random_env_selection {
            self.rng.index(n)
        } else {
            (self.env_id + 1) % n
        }
    }

    // ========================================================================
    // Updates
    // ========================================================================

    fn update_latent(&mut self) -> Result<()> {
        let batch = self
            .store
            .sample_latent_window(self.config.batch_size_latent, &mut self.rng)?;
        let info = self.agent.update_latent(&batch, &mut self.rng)?;
        self.progress.increment_latent_updates();

        let step = self.progress.latent_updates();
        if step % self.config.log_interval == 0 {
            for &(name, value) in info.metrics() {
                self.sink.scalar(name, value, step);
            }
        }
        Ok(())
    }

    fn update_actor_critic(&mut self) -> Result<()> {
        let batch = self
            .store
            .sample_actor_critic_window(self.config.batch_size_sac, &mut self.rng)?;
        let info = self.agent.update_actor_critic(&batch, &mut self.rng)?;
        self.progress.increment_actor_critic_updates();

        let step = self.progress.actor_critic_updates();
        if step % self.config.log_interval == 0 {
            for (name, value) in info.metrics() {
                self.sink.scalar(name, value, step);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Evaluation / Checkpoint
    // ========================================================================

    /// Failures here are logged and training continues.
    fn evaluate_and_checkpoint(&mut self, step_env: usize) {
        let mean_return = match self.evaluate(step_env) {
            Ok(mean_return) => {
                log::info!("env step {}: mean test return {:.3}", step_env, mean_return);
                Some(mean_return)
            }
            Err(err) => {
                log::warn!("evaluation at env step {} failed: {}", step_env, err);
                None
            }
        };

        if let Err(err) = self.checkpoint(step_env, mean_return) {
            log::warn!("checkpoint at env step {} failed: {}", step_env, err);
        }
    }

    /// Mean return of `num_eval_episodes` deterministic episodes on the test
    /// env, reported as `return/test` at `step_env`.
    pub fn evaluate(&mut self, step_env: usize) -> Result<f32> {
        let episodes = self.config.num_eval_episodes;
        let limit = self
            .env_test
            .max_episode_steps()
            .unwrap_or(MAX_EVAL_EPISODE_STEPS);
        let mut mean_return = 0.0;

        for _ in 0..episodes {
            let observation = self.env_test.reset(None);
            self.test_history.reset_episode(&observation)?;
            let mut episode_return = 0.0;

            for _ in 0..limit {
                let action = self.agent.exploit(&self.test_history, &mut self.eval_rng)?;
                let result = self.env_test.step(&action)?;
                self.test_history.append(&result.observation, &action)?;
                episode_return += result.reward;
                if result.done() {
                    break;
                }
            }
            mean_return += episode_return / episodes as f32;
        }

        if !mean_return.is_finite() {
            return Err(SlacError::NonFinite {
                term: EVAL_RETURN,
                step: step_env,
            });
        }
        self.sink.scalar(EVAL_RETURN, mean_return, step_env);
        Ok(mean_return)
    }

    /// Write all artifacts to `model_dir/step{step_env}`.
    pub fn checkpoint(&mut self, step_env: usize, metric: Option<f32>) -> Result<PathBuf> {
        let snapshot = self.agent.snapshot()?;
        Ok(self.checkpointer.save(&snapshot, step_env, metric)?)
    }
}

fn check_width(component: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SlacError::ShapeMismatch {
            component,
            expected,
            actual,
        })
    }
}
