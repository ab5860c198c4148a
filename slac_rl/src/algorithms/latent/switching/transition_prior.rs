//! Per-dimension nonlinear transition prior with a change of variables.
//!
//! For each latent dimension `i` a separate MLP maps
//! `(h(regime), z_{t-lags..t-1}, z_{t,i})` to a residual `ε_{t,i}`. Since each
//! residual depends on `z_t` only through `z_{t,i}`, the Jacobian
//! `∂ε_t/∂z_t` is diagonal and
//!
//! ```text
//! log p(z_t | history, regime) = Σ_i log p_base(ε_{t,i}) + Σ_i log |∂ε_{t,i}/∂z_{t,i}|
//! ```
//!
//! with a standard Laplace base density. The diagonal entries come from a
//! forward-mode tangent through each MLP.

use burn::module::Module;
use burn::prelude::*;

use crate::algorithms::latent::distributions::standard_laplace_log_prob;
use crate::error::{Result, SlacError};
use crate::nn::{Mlp, MlpConfig};

/// Log-density of the current latents plus its log-Jacobian part.
#[derive(Debug, Clone)]
pub struct TransitionDensity<B: Backend> {
    /// `[batch, steps - lags]`
    pub log_prob: Tensor<B, 2>,
    /// `Σ_i log |∂ε_i/∂z_i|`, `[batch, steps - lags]`
    pub log_abs_det: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct TransitionPrior<B: Backend> {
    /// Regime embedding to conditioning features.
    fc: Mlp<B>,
    gs: Vec<Mlp<B>>,
    lags: usize,
    z_dim: usize,
}

impl<B: Backend> TransitionPrior<B> {
    pub fn new(
        lags: usize,
        z_dim: usize,
        embedding_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        device: &B::Device,
    ) -> Self {
        let g_input = hidden_dim + lags * z_dim + 1;
        Self {
            fc: MlpConfig::new(embedding_dim, hidden_dim, hidden_dim)
                .with_hidden_layers(num_layers)
                .init(device),
            gs: (0..z_dim)
                .map(|_| {
                    MlpConfig::new(g_input, hidden_dim, 1)
                        .with_hidden_layers(num_layers)
                        .init(device)
                })
                .collect(),
            lags,
            z_dim,
        }
    }

    pub fn lags(&self) -> usize {
        self.lags
    }

    pub fn z_dim(&self) -> usize {
        self.z_dim
    }

    /// Conditioning features for every regime embedding, `[K, hidden]`.
    pub fn regime_features(&self, embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc.forward(embeddings)
    }

    /// Density of `z_t` for `t ≥ lags`.
    ///
    /// `latents` is `[batch, steps, z_dim]`; `conditioning` holds one feature
    /// row per scored step, `[batch * (steps - lags), hidden]`, batch-major.
    /// Sequences must be longer than `lags`.
    pub fn log_density(
        &self,
        latents: &Tensor<B, 3>,
        conditioning: Tensor<B, 2>,
    ) -> Result<TransitionDensity<B>> {
        let [batch, steps, z] = latents.dims();
        check_sequence(steps, z, self.lags, self.z_dim)?;
        let length = steps - self.lags;
        let rows = batch * length;

        // (batch, length, lags * z), oldest lag first
        let lagged: Vec<Tensor<B, 3>> = (0..self.lags)
            .map(|l| latents.clone().slice([0..batch, l..l + length, 0..z]))
            .collect();
        let lagged = Tensor::cat(lagged, 2).reshape([rows, self.lags * z]);
        let current = latents
            .clone()
            .slice([0..batch, self.lags..steps, 0..z])
            .reshape([rows, z]);

        let mut log_base = Vec::with_capacity(z);
        let mut log_det = Vec::with_capacity(z);
        for (i, g) in self.gs.iter().enumerate() {
            let input = Tensor::cat(
                vec![
                    conditioning.clone(),
                    lagged.clone(),
                    current.clone().slice([0..rows, i..i + 1]),
                ],
                1,
            );
            let (residual, tangent) = g.forward_with_tangent(input);
            log_base.push(standard_laplace_log_prob(residual));
            log_det.push(tangent.abs().log());
        }

        let log_abs_det = Tensor::cat(log_det, 1).sum_dim(1).reshape([batch, length]);
        let log_base = Tensor::cat(log_base, 1).sum_dim(1).reshape([batch, length]);
        Ok(TransitionDensity {
            log_prob: log_base + log_abs_det.clone(),
            log_abs_det,
        })
    }
}

/// A latent sequence of `steps` frames of width `z` can be scored with `lags`
/// lags.
pub fn check_sequence(steps: usize, z: usize, lags: usize, z_dim: usize) -> Result<()> {
    if steps <= lags {
        return Err(SlacError::ShapeMismatch {
            component: "transition prior sequence",
            expected: lags + 1,
            actual: steps,
        });
    }
    if z != z_dim {
        return Err(SlacError::ShapeMismatch {
            component: "transition prior latent width",
            expected: z_dim,
            actual: z,
        });
    }
    Ok(())
}
