//! Rolling per-episode history used to build actor inputs.
//!
//! Holds the last `length` observations and the `length - 1` actions between
//! them. A reset pads both with zeros, matching the padding the sequence
//! store applies to windows that start before their episode.

use std::collections::VecDeque;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct ObservationHistory {
    length: usize,
    observation_dim: usize,
    action_dim: usize,
    observations: VecDeque<Vec<f32>>,
    actions: VecDeque<Vec<f32>>,
}

impl ObservationHistory {
    /// Create an empty history holding `length` observations.
    ///
    /// Call [`reset_episode`](Self::reset_episode) before reading from it.
    pub fn new(length: usize, observation_dim: usize, action_dim: usize) -> Self {
        let length = length.max(1);
        Self {
            length,
            observation_dim,
            action_dim,
            observations: VecDeque::with_capacity(length),
            actions: VecDeque::with_capacity(length.saturating_sub(1)),
        }
    }

    /// Zero-pad the history and push the first observation of an episode.
    pub fn reset_episode(&mut self, observation: &[f32]) -> Result<(), StoreError> {
        self.check("observation", self.observation_dim, observation.len())?;

        self.observations.clear();
        self.actions.clear();
        for _ in 0..self.length - 1 {
            self.observations.push_back(vec![0.0; self.observation_dim]);
            self.actions.push_back(vec![0.0; self.action_dim]);
        }
        self.observations.push_back(observation.to_vec());
        Ok(())
    }

    /// Push the observation reached by taking `action`.
    pub fn append(&mut self, observation: &[f32], action: &[f32]) -> Result<(), StoreError> {
        self.check("observation", self.observation_dim, observation.len())?;
        self.check("action", self.action_dim, action.len())?;
        if self.observations.is_empty() {
            return Err(StoreError::EpisodeNotStarted);
        }

        self.observations.push_back(observation.to_vec());
        if self.observations.len() > self.length {
            self.observations.pop_front();
        }
        if self.length > 1 {
            self.actions.push_back(action.to_vec());
            if self.actions.len() > self.length - 1 {
                self.actions.pop_front();
            }
        }
        Ok(())
    }

    /// Observations flattened oldest-first: `length * observation_dim` values.
    pub fn observations(&self) -> Vec<f32> {
        self.observations.iter().flatten().copied().collect()
    }

    /// Actions flattened oldest-first: `(length - 1) * action_dim` values.
    pub fn actions(&self) -> Vec<f32> {
        self.actions.iter().flatten().copied().collect()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn check(&self, field: &'static str, expected: usize, actual: usize) -> Result<(), StoreError> {
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
}
