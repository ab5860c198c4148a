//! Twin Q-networks over `(latent state, action)`.
//!
//! The learner keeps a second copy on the inner backend as the target critic,
//! so the same module type serves both roles.

use burn::module::Module;
use burn::prelude::*;

use crate::nn::{Mlp, MlpConfig};

#[derive(Module, Debug)]
pub struct TwinCritic<B: Backend> {
    q1: Mlp<B>,
    q2: Mlp<B>,
    latent_dim: usize,
    action_dim: usize,
}

impl<B: Backend> TwinCritic<B> {
    /// Two independent ReLU MLPs with `hidden` units per layer.
    pub fn new(latent_dim: usize, action_dim: usize, hidden: usize, device: &B::Device) -> Self {
        let config = MlpConfig::new(latent_dim + action_dim, hidden, 1).relu();
        Self {
            q1: config.init(device),
            q2: config.init(device),
            latent_dim,
            action_dim,
        }
    }

    /// `(Q1, Q2)`, each `[batch, 1]`.
    pub fn forward(&self, latent: Tensor<B, 2>, action: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let input = Tensor::cat(vec![latent, action], 1);
        (self.q1.forward(input.clone()), self.q2.forward(input))
    }

    /// Pessimistic estimate `min(Q1, Q2)`, `[batch, 1]`.
    pub fn min_q(&self, latent: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        let (q1, q2) = self.forward(latent, action);
        q1.min_pair(q2)
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Input width read from the first layer of Q1.
    pub fn input_dim(&self) -> usize {
        self.q1.weight_input_dim()
    }
}
