//! Circular experience store that serves fixed-length sequence windows.
//!
//! Records are written one per environment step into a ring of `capacity`
//! slots. Two kinds of record exist:
//!
//! - an **episode-opening** record, written by [`SequenceStore::reset_episode`],
//!   holding the first observation with zero action/reward/terminal;
//! - a **transition** record, written by [`SequenceStore::append`], holding the
//!   action taken, the reward and terminal mask it produced, and the next
//!   observation.
//!
//! A window of length `L` ending at transition record `g` contains the
//! observations of records `g-L ..= g` and the actions/rewards/terminals of
//! records `g-L+1 ..= g`:
//!
//! ```text
//! records:   [start] [t1] [t2] [t3] [t4]        window L = 3 ending at t4
//! obs:               o1   o2   o3   o4          4 observations
//! act/rew:                a2   a3   a4          3 actions, rewards, masks
//! ```
//!
//! Records older than the episode-opening record are never read. They are
//! replaced by zeros, which is the same padding a fresh observation history
//! starts with. A window is only drawn when every record it reads is still
//! retained by the ring.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::core::tensor_ops::from_vec;
use crate::core::TrainRng;
use crate::error::StoreError;

/// Rejection-sampling attempts per requested window before enumerating.
const REJECTION_ATTEMPTS_PER_SAMPLE: usize = 32;

/// A batch of sequence windows in host memory.
///
/// Layouts are row-major:
/// - `observations`: `[batch, window + 1, observation_dim]`
/// - `actions`: `[batch, window, action_dim]`
/// - `rewards`, `terminals`: `[batch, window, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    pub batch_size: usize,
    pub window: usize,
    pub observation_dim: usize,
    pub action_dim: usize,
    pub observations: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub terminals: Vec<f32>,
}

impl WindowBatch {
    /// Observation window `j` of batch element `b`.
    pub fn observation(&self, b: usize, j: usize) -> &[f32] {
        let start = (b * (self.window + 1) + j) * self.observation_dim;
        &self.observations[start..start + self.observation_dim]
    }

    /// Action `j` of batch element `b`.
    pub fn action(&self, b: usize, j: usize) -> &[f32] {
        let start = (b * self.window + j) * self.action_dim;
        &self.actions[start..start + self.action_dim]
    }

    pub fn observations_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        from_vec(
            self.observations.clone(),
            [self.batch_size, self.window + 1, self.observation_dim],
            device,
        )
    }

    pub fn actions_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        from_vec(
            self.actions.clone(),
            [self.batch_size, self.window, self.action_dim],
            device,
        )
    }

    pub fn rewards_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        from_vec(self.rewards.clone(), [self.batch_size, self.window, 1], device)
    }

    pub fn terminals_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        from_vec(self.terminals.clone(), [self.batch_size, self.window, 1], device)
    }
}

/// Fixed-capacity ring of episode records.
#[derive(Debug, Clone)]
pub struct SequenceStore {
    capacity: usize,
    observation_dim: usize,
    action_dim: usize,
    latent_window: usize,
    actor_critic_window: usize,

    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    terminals: Vec<f32>,
    /// Global index of the episode-opening record for each slot.
    origins: Vec<u64>,
    /// Whether the slot holds an episode-opening record.
    opens_episode: Vec<bool>,

    /// Total records ever written; the next record's global index.
    written: u64,
    /// Origin of the episode currently accepting appends.
    open_episode: Option<u64>,
}

impl SequenceStore {
    /// Create a store with both window lengths.
    ///
    /// `latent_window` is `num_sequences`; `actor_critic_window` is the shorter
    /// trailing window consumed by the actor-critic learner.
    pub fn new(
        capacity: usize,
        observation_dim: usize,
        action_dim: usize,
        latent_window: usize,
        actor_critic_window: usize,
    ) -> Result<Self, StoreError> {
        for window in [latent_window, actor_critic_window] {
            if window == 0 || window + 1 > capacity {
                return Err(StoreError::InvalidWindow { window, capacity });
            }
        }

        Ok(Self {
            capacity,
            observation_dim,
            action_dim,
            latent_window,
            actor_critic_window,
            observations: vec![0.0; capacity * observation_dim],
            actions: vec![0.0; capacity * action_dim],
            rewards: vec![0.0; capacity],
            terminals: vec![0.0; capacity],
            origins: vec![0; capacity],
            opens_episode: vec![false; capacity],
            written: 0,
            open_episode: None,
        })
    }

    /// Seed a fresh episode with its first observation.
    pub fn reset_episode(&mut self, observation: &[f32]) -> Result<(), StoreError> {
        self.check_len("observation", self.observation_dim, observation.len())?;

        let global = self.written;
        let slot = self.slot(global);
        self.write_observation(slot, observation);
        self.actions[slot * self.action_dim..(slot + 1) * self.action_dim].fill(0.0);
        self.rewards[slot] = 0.0;
        self.terminals[slot] = 0.0;
        self.origins[slot] = global;
        self.opens_episode[slot] = true;

        self.written += 1;
        self.open_episode = Some(global);
        Ok(())
    }

    /// Record one transition of the open episode.
    ///
    /// `terminal_mask` is what the critic bootstraps against (false on
    /// time-limit truncation); `done` closes the episode so the next call must
    /// be [`reset_episode`](Self::reset_episode).
    pub fn append(
        &mut self,
        action: &[f32],
        reward: f32,
        terminal_mask: bool,
        next_observation: &[f32],
        done: bool,
    ) -> Result<(), StoreError> {
        let origin = self.open_episode.ok_or(StoreError::EpisodeNotStarted)?;
        self.check_len("action", self.action_dim, action.len())?;
        self.check_len("observation", self.observation_dim, next_observation.len())?;

        let global = self.written;
        let slot = self.slot(global);
        self.write_observation(slot, next_observation);
        self.actions[slot * self.action_dim..(slot + 1) * self.action_dim].copy_from_slice(action);
        self.rewards[slot] = reward;
        self.terminals[slot] = if terminal_mask { 1.0 } else { 0.0 };
        self.origins[slot] = origin;
        self.opens_episode[slot] = false;

        self.written += 1;
        if done {
            self.open_episode = None;
        }
        Ok(())
    }

    /// Sample windows of length `num_sequences` for the latent model.
    pub fn sample_latent_window(
        &self,
        batch_size: usize,
        rng: &mut TrainRng,
    ) -> Result<WindowBatch, StoreError> {
        self.sample_window(self.latent_window, batch_size, rng)
    }

    /// Sample the shorter windows consumed by the actor-critic learner.
    pub fn sample_actor_critic_window(
        &self,
        batch_size: usize,
        rng: &mut TrainRng,
    ) -> Result<WindowBatch, StoreError> {
        self.sample_window(self.actor_critic_window, batch_size, rng)
    }

    /// Sample `batch_size` windows of arbitrary length `window`.
    ///
    /// End positions are uniform over the valid ones. Fails with
    /// [`StoreError::InsufficientData`] when none exist.
    pub fn sample_window(
        &self,
        window: usize,
        batch_size: usize,
        rng: &mut TrainRng,
    ) -> Result<WindowBatch, StoreError> {
        if window == 0 || window + 1 > self.capacity {
            return Err(StoreError::InvalidWindow {
                window,
                capacity: self.capacity,
            });
        }

        let oldest = self.oldest();
        let span = (self.written - oldest) as usize;
        let mut ends = Vec::with_capacity(batch_size);
        let mut fallback: Option<Vec<u64>> = None;

        for _ in 0..batch_size {
            let mut chosen = None;
            if span > 0 {
                for _ in 0..REJECTION_ATTEMPTS_PER_SAMPLE {
                    let candidate = oldest + rng.index(span) as u64;
                    if self.is_valid_end(candidate, window) {
                        chosen = Some(candidate);
                        break;
                    }
                }
            }

            let end = match chosen {
                Some(end) => end,
                None => {
                    let valid = fallback.get_or_insert_with(|| self.valid_ends(window));
                    if valid.is_empty() {
                        return Err(StoreError::InsufficientData {
                            window,
                            written: self.written as usize,
                        });
                    }
                    valid[rng.index(valid.len())]
                }
            };
            ends.push(end);
        }

        Ok(self.gather(&ends, window))
    }

    /// Whether at least one window of length `window` can be drawn.
    pub fn can_sample(&self, window: usize) -> bool {
        window > 0 && window < self.capacity && !self.valid_ends(window).is_empty()
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        (self.written as usize).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records ever written, including overwritten ones.
    pub fn total_written(&self) -> u64 {
        self.written
    }

    pub fn latent_window(&self) -> usize {
        self.latent_window
    }

    pub fn actor_critic_window(&self) -> usize {
        self.actor_critic_window
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Whether an episode is currently accepting appends.
    pub fn episode_open(&self) -> bool {
        self.open_episode.is_some()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn slot(&self, global: u64) -> usize {
        (global % self.capacity as u64) as usize
    }

    fn oldest(&self) -> u64 {
        self.written.saturating_sub(self.capacity as u64)
    }

    fn check_len(&self, field: &'static str, expected: usize, actual: usize) -> Result<(), StoreError> {
        if expected == actual {
            Ok(())
        } else {
            Err(StoreError::DimensionMismatch {
                field,
                expected,
                actual,
            })
        }
    }

    fn write_observation(&mut self, slot: usize, observation: &[f32]) {
        let start = slot * self.observation_dim;
        self.observations[start..start + self.observation_dim].copy_from_slice(observation);
    }

    fn is_valid_end(&self, end: u64, window: usize) -> bool {
        let oldest = self.oldest();
        if end < oldest || end >= self.written {
            return false;
        }
        let slot = self.slot(end);
        if self.opens_episode[slot] {
            return false;
        }
        let first_read = end.saturating_sub(window as u64).max(self.origins[slot]);
        first_read >= oldest
    }

    fn valid_ends(&self, window: usize) -> Vec<u64> {
        (self.oldest()..self.written)
            .filter(|&end| self.is_valid_end(end, window))
            .collect()
    }

    fn gather(&self, ends: &[u64], window: usize) -> WindowBatch {
        let (od, ad) = (self.observation_dim, self.action_dim);
        let batch_size = ends.len();
        let mut observations = vec![0.0; batch_size * (window + 1) * od];
        let mut actions = vec![0.0; batch_size * window * ad];
        let mut rewards = vec![0.0; batch_size * window];
        let mut terminals = vec![0.0; batch_size * window];

        for (b, &end) in ends.iter().enumerate() {
            let origin = self.origins[self.slot(end)];
            let first = end as i64 - window as i64;

            for j in 0..=window {
                let record = first + j as i64;
                if record < origin as i64 {
                    continue;
                }
                let slot = self.slot(record as u64);
                let dst = (b * (window + 1) + j) * od;
                observations[dst..dst + od].copy_from_slice(&self.observations[slot * od..(slot + 1) * od]);

                // Action j leads from observation j to j + 1.
                if j > 0 {
                    let k = b * window + (j - 1);
                    actions[k * ad..(k + 1) * ad].copy_from_slice(&self.actions[slot * ad..(slot + 1) * ad]);
                    rewards[k] = self.rewards[slot];
                    terminals[k] = self.terminals[slot];
                }
            }
        }

        WindowBatch {
            batch_size,
            window,
            observation_dim: od,
            action_dim: ad,
            observations,
            actions,
            rewards,
            terminals,
        }
    }
}
