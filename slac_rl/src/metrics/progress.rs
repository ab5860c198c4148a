//! Counters for training progress.

use std::collections::VecDeque;

/// Number of recent episode returns kept for the running mean.
const RETURN_WINDOW: usize = 100;

/// Progress counters owned by the trainer.
#[derive(Debug, Clone, Default)]
pub struct TrainingProgress {
    /// Environment steps, counting `action_repeat`.
    env_steps: usize,
    latent_updates: usize,
    actor_critic_updates: usize,
    episodes: usize,
    recent_returns: VecDeque<f32>,
}

impl TrainingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_env_steps(&mut self, steps: usize) {
        self.env_steps += steps;
    }

    pub fn increment_latent_updates(&mut self) {
        self.latent_updates += 1;
    }

    pub fn increment_actor_critic_updates(&mut self) {
        self.actor_critic_updates += 1;
    }

    /// Record a finished training episode.
    pub fn record_episode(&mut self, episode_return: f32) {
        self.episodes += 1;
        if self.recent_returns.len() == RETURN_WINDOW {
            self.recent_returns.pop_front();
        }
        self.recent_returns.push_back(episode_return);
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    pub fn latent_updates(&self) -> usize {
        self.latent_updates
    }

    pub fn actor_critic_updates(&self) -> usize {
        self.actor_critic_updates
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Mean of the last episode returns, 0 before the first episode ends.
    pub fn avg_return(&self) -> f32 {
        if self.recent_returns.is_empty() {
            return 0.0;
        }
        self.recent_returns.iter().sum::<f32>() / self.recent_returns.len() as f32
    }
}
