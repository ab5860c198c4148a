//! Environment interface for the training loop.
//!
//! The trainer drives one environment at a time through [`Environment`].
//! Observations are flat `f32` frames (pixel environments flatten in their
//! adapter) and actions are flat `f32` vectors. Discrete spaces take the
//! binarized first component.

use crate::core::TrainRng;
use crate::error::{Result, SlacError};

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Observation after the step, flattened.
    pub observation: Vec<f32>,
    pub reward: f32,
    /// Episode ended due to goal/failure.
    pub terminated: bool,
    /// Episode ended due to the time limit.
    pub truncated: bool,
}

impl StepResult {
    pub fn new(observation: Vec<f32>, reward: f32, terminated: bool, truncated: bool) -> Self {
        Self {
            observation,
            reward,
            terminated,
            truncated,
        }
    }

    /// Terminal OR truncated.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Shape of the action space.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpace {
    /// Box space with per-dimension bounds.
    Continuous {
        dim: usize,
        low: Vec<f32>,
        high: Vec<f32>,
    },
    /// `n` choices, carried as a single `f32` component.
    Discrete { n: usize },
}

impl ActionSpace {
    /// Symmetric box `[-bound, bound]^dim`.
    pub fn symmetric(dim: usize, bound: f32) -> Self {
        ActionSpace::Continuous {
            dim,
            low: vec![-bound; dim],
            high: vec![bound; dim],
        }
    }

    /// Width of the stored action vector.
    pub fn dim(&self) -> usize {
        match self {
            ActionSpace::Continuous { dim, .. } => *dim,
            ActionSpace::Discrete { .. } => 1,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, ActionSpace::Discrete { .. })
    }

    /// Uniform sample from the space.
    pub fn sample(&self, rng: &mut TrainRng) -> Vec<f32> {
        match self {
            ActionSpace::Continuous { low, high, .. } => low
                .iter()
                .zip(high)
                .map(|(&l, &h)| if h > l { rng.uniform(l, h) } else { l })
                .collect(),
            ActionSpace::Discrete { n } => vec![rng.index((*n).max(1)) as f32],
        }
    }
}

/// A single (non-vectorized) episodic environment.
pub trait Environment {
    /// Start a new episode and return its first observation.
    fn reset(&mut self, seed: Option<u64>) -> Vec<f32>;

    /// Apply `action` and advance one step.
    fn step(&mut self, action: &[f32]) -> Result<StepResult>;

    fn action_space(&self) -> ActionSpace;

    /// Shape of one observation before flattening.
    fn observation_shape(&self) -> Vec<usize>;

    /// Step limit after which episodes are truncated, if any.
    fn max_episode_steps(&self) -> Option<usize>;

    /// Random action for prefill.
    fn sample_action(&mut self, rng: &mut TrainRng) -> Vec<f32> {
        self.action_space().sample(rng)
    }

    /// Flattened observation width.
    fn observation_dim(&self) -> usize {
        self.observation_shape().iter().product()
    }
}

// ============================================================================
// Linear-Gaussian toy environment
// ============================================================================

/// Hidden linear-Gaussian system observed through a fixed random projection.
///
/// ```text
/// s' = 0.9 R(θ) s + 0.5 a + σ_s ε        (2D hidden state)
/// o  = C s + σ_o η                       (C: observation_dim × 2)
/// r  = -|s|² - 0.1 |a|²
/// ```
///
/// Episodes terminate when `|s|` leaves `[0, termination_radius]` and are
/// truncated at `max_episode_steps`. Everything is drawn from an internal
/// generator reseeded by `reset(Some(seed))`.
#[derive(Debug, Clone)]
pub struct LinearGaussianEnv {
    observation_dim: usize,
    projection: Vec<f32>,
    state: [f32; 2],
    steps: usize,
    max_episode_steps: usize,
    termination_radius: f32,
    state_noise: f32,
    observation_noise: f32,
    rng: TrainRng,
}

const HIDDEN_DIM: usize = 2;
const ROTATION: f32 = 0.3;
const DECAY: f32 = 0.9;
const ACTION_GAIN: f32 = 0.5;

impl LinearGaussianEnv {
    /// `observation_dim` noisy projections of the hidden state, 1D action.
    pub fn new(observation_dim: usize, max_episode_steps: usize, seed: u64) -> Self {
        let mut rng = TrainRng::seed_from(seed);
        let projection = rng.standard_normal_vec(observation_dim * HIDDEN_DIM);
        Self {
            observation_dim,
            projection,
            state: [0.0; 2],
            steps: 0,
            max_episode_steps,
            termination_radius: 10.0,
            state_noise: 0.05,
            observation_noise: 0.01,
            rng,
        }
    }

    pub fn with_termination_radius(mut self, radius: f32) -> Self {
        self.termination_radius = radius;
        self
    }

    pub fn with_noise(mut self, state_noise: f32, observation_noise: f32) -> Self {
        self.state_noise = state_noise;
        self.observation_noise = observation_noise;
        self
    }

    pub fn hidden_state(&self) -> [f32; 2] {
        self.state
    }

    fn observe(&mut self) -> Vec<f32> {
        let noise = self.rng.standard_normal_vec(self.observation_dim);
        (0..self.observation_dim)
            .map(|i| {
                let row = &self.projection[i * HIDDEN_DIM..(i + 1) * HIDDEN_DIM];
                row[0] * self.state[0] + row[1] * self.state[1] + self.observation_noise * noise[i]
            })
            .collect()
    }
}

impl Environment for LinearGaussianEnv {
    fn reset(&mut self, seed: Option<u64>) -> Vec<f32> {
        if let Some(seed) = seed {
            // The projection is part of the system, only the noise is reseeded.
            self.rng = TrainRng::seed_from(seed);
        }
        self.state = [self.rng.uniform(-1.0, 1.0), self.rng.uniform(-1.0, 1.0)];
        self.steps = 0;
        self.observe()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let a = match action {
            [a] if a.is_finite() => a.clamp(-1.0, 1.0),
            [a] => return Err(SlacError::Environment(format!("non-finite action {}", a))),
            _ => {
                return Err(SlacError::Environment(format!(
                    "expected 1 action component, got {}",
                    action.len()
                )))
            }
        };

        let [x, y] = self.state;
        let (sin, cos) = ROTATION.sin_cos();
        let noise = self.rng.standard_normal_vec(HIDDEN_DIM);
        self.state = [
            DECAY * (cos * x - sin * y) + ACTION_GAIN * a + self.state_noise * noise[0],
            DECAY * (sin * x + cos * y) + self.state_noise * noise[1],
        ];
        self.steps += 1;

        let norm_sq = self.state[0].powi(2) + self.state[1].powi(2);
        let reward = -norm_sq - 0.1 * a * a;
        let terminated = norm_sq.sqrt() > self.termination_radius;
        let truncated = !terminated && self.steps >= self.max_episode_steps;

        Ok(StepResult::new(self.observe(), reward, terminated, truncated))
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::symmetric(1, 1.0)
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![self.observation_dim]
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(self.max_episode_steps)
    }
}
