//! Squashed Gaussian policy over a feature-action history.
//!
//! The input is the flattened history `[f_1..f_L, a_1..a_{L-1}]` built from
//! encoder means. Sampling uses the reparameterization trick so the actor
//! loss can backpropagate through the action:
//!
//! ```text
//! u = μ + σ ⊙ ε,  a = tanh(u)
//! log π(a) = Σ_d [-ε_d²/2 - log σ_d - log(2π)/2] - Σ_d log(1 - a_d² + 1e-6)
//! ```

use burn::module::Module;
use burn::prelude::*;

use crate::algorithms::latent::distributions::HALF_LOG_2PI;
use crate::core::TrainRng;
use crate::nn::{Mlp, MlpConfig};

/// Log standard deviation bounds.
pub const LOG_STD_MIN: f32 = -20.0;
pub const LOG_STD_MAX: f32 = 2.0;

const TANH_EPSILON: f32 = 1e-6;

#[derive(Module, Debug)]
pub struct SquashedGaussianActor<B: Backend> {
    net: Mlp<B>,
    action_dim: usize,
}

impl<B: Backend> SquashedGaussianActor<B> {
    /// Two ReLU hidden layers of `hidden` units.
    pub fn new(input_dim: usize, action_dim: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            net: MlpConfig::new(input_dim, hidden, 2 * action_dim).relu().init(device),
            action_dim,
        }
    }

    /// Mean and clamped log-std, each `[batch, action_dim]`.
    pub fn forward(&self, history: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let out = self.net.forward(history);
        let [batch, _] = out.dims();
        let a = self.action_dim;
        let mean = out.clone().slice([0..batch, 0..a]);
        let log_std = out.slice([0..batch, a..2 * a]).clamp(LOG_STD_MIN, LOG_STD_MAX);
        (mean, log_std)
    }

    /// Reparameterized tanh sample: `(action [batch, A], log_prob [batch, 1])`.
    pub fn sample(&self, history: Tensor<B, 2>, rng: &mut TrainRng) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (mean, log_std) = self.forward(history);
        let noise = rng.normal_tensor::<B, 2>(mean.dims(), &mean.device());
        let action = (mean + log_std.clone().exp() * noise.clone()).tanh();

        let gaussian = (noise.powf_scalar(2.0).mul_scalar(-0.5) - log_std)
            .sum_dim(1)
            .sub_scalar(HALF_LOG_2PI * self.action_dim as f32);
        let squash = action
            .clone()
            .powf_scalar(2.0)
            .neg()
            .add_scalar(1.0 + TANH_EPSILON)
            .log()
            .sum_dim(1);
        (action, gaussian - squash)
    }

    /// Mode of the squashed distribution: `tanh(μ)`.
    pub fn deterministic(&self, history: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(history).0.tanh()
    }

    pub fn input_dim(&self) -> usize {
        self.net.weight_input_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }
}

/// Replace the first action component by `1.0` or `0.0` against `threshold`.
///
/// Discrete environments take the binarized first component as their action.
pub fn binarize_first(action: &mut [f32], threshold: f32) {
    if let Some(first) = action.first_mut() {
        *first = if *first > threshold { 1.0 } else { 0.0 };
    }
}
