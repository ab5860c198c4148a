//! Multi-layer perceptron with an optional forward-mode tangent pass.
//!
//! Hidden layers use leaky ReLU (`slope = 0` gives plain ReLU). The output
//! layer is linear.
//!
//! [`Mlp::forward_with_tangent`] propagates the directional derivative with
//! respect to the *last* input column alongside the activations:
//!
//! ```text
//! h_{k+1} = act(h_k W_k + b_k)          t_{k+1} = act'(h_k W_k + b_k) ⊙ (t_k W_k)
//! t_0     = e_last                      ∂y/∂x_last = t_K
//! ```
//!
//! This yields one Jacobian column in a single pass and stays differentiable
//! with respect to the weights, which is what the per-dimension transition
//! prior needs for its log-determinant.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;
use burn::tensor::TensorData;

/// Configuration for [`Mlp`].
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub d_output: usize,
    /// Number of hidden layers (each followed by the activation).
    pub n_hidden: usize,
    /// Negative slope of the leaky ReLU.
    pub slope: f32,
}

impl MlpConfig {
    pub fn new(d_input: usize, d_hidden: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            d_output,
            n_hidden: 2,
            slope: 0.2,
        }
    }

    pub fn with_hidden_layers(mut self, n_hidden: usize) -> Self {
        self.n_hidden = n_hidden;
        self
    }

    pub fn with_slope(mut self, slope: f32) -> Self {
        self.slope = slope;
        self
    }

    /// Plain ReLU hidden activations.
    pub fn relu(self) -> Self {
        self.with_slope(0.0)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut hidden = Vec::with_capacity(self.n_hidden);
        let mut width = self.d_input;
        for _ in 0..self.n_hidden {
            hidden.push(LinearConfig::new(width, self.d_hidden).init(device));
            width = self.d_hidden;
        }

        Mlp {
            hidden,
            output: LinearConfig::new(width, self.d_output).init(device),
            slope: self.slope,
            d_input: self.d_input,
            d_output: self.d_output,
        }
    }
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    slope: f32,
    d_input: usize,
    d_output: usize,
}

impl<B: Backend> Mlp<B> {
    /// Forward pass for `[batch, d_input]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.hidden {
            x = leaky_relu(layer.forward(x), self.slope as f64);
        }
        self.output.forward(x)
    }

    /// Forward pass for `[batch, seq, d_input]`.
    pub fn forward_seq(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq, width] = input.dims();
        self.forward(input.reshape([batch * seq, width]))
            .reshape([batch, seq, self.d_output])
    }

    /// Forward pass plus `∂output/∂input[:, last]`, both `[batch, d_output]`.
    pub fn forward_with_tangent(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, width] = input.dims();
        let device = input.device();
        let mut seed = vec![0.0f32; batch * width];
        for row in 0..batch {
            seed[row * width + width - 1] = 1.0;
        }
        let mut tangent: Tensor<B, 2> = Tensor::from_data(TensorData::new(seed, [batch, width]), &device);
        let mut x = input;

        for layer in &self.hidden {
            let pre = layer.forward(x);
            let derivative = pre
                .clone()
                .greater_elem(0.0)
                .float()
                .mul_scalar(1.0 - self.slope)
                .add_scalar(self.slope);
            tangent = tangent.matmul(layer.weight.val()) * derivative;
            x = leaky_relu(pre, self.slope as f64);
        }

        let output = self.output.forward(x);
        let tangent = tangent.matmul(self.output.weight.val());
        (output, tangent)
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_output(&self) -> usize {
        self.d_output
    }

    /// Input width of the first layer, read from the weights.
    pub fn weight_input_dim(&self) -> usize {
        self.hidden
            .first()
            .unwrap_or(&self.output)
            .weight
            .val()
            .dims()[0]
    }
}
