//! Diagonal Gaussian head: an MLP emitting mean and standard deviation.
//!
//! The raw second half of the output passes through softplus with a small
//! floor, so the standard deviation is always strictly positive.

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::softplus;

use super::mlp::{Mlp, MlpConfig};

/// Lower bound added to every standard deviation.
pub const STD_FLOOR: f32 = 1e-5;

#[derive(Module, Debug)]
pub struct GaussianHead<B: Backend> {
    net: Mlp<B>,
    output_dim: usize,
}

impl<B: Backend> GaussianHead<B> {
    /// Two hidden layers of `hidden` units with leaky ReLU.
    pub fn new(input_dim: usize, output_dim: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            net: MlpConfig::new(input_dim, hidden, 2 * output_dim).init(device),
            output_dim,
        }
    }

    /// Returns `(mean, std)`, each `[batch, output_dim]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let out = self.net.forward(input);
        let [batch, _] = out.dims();
        let d = self.output_dim;
        let mean = out.clone().slice([0..batch, 0..d]);
        let std = softplus(out.slice([0..batch, d..2 * d]), 1.0).add_scalar(STD_FLOOR);
        (mean, std)
    }

    pub fn input_dim(&self) -> usize {
        self.net.weight_input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }
}
