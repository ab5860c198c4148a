//! Closed-form densities and divergences used by the latent models.
//!
//! All functions are elementwise unless stated otherwise; reductions are left
//! to the caller so each loss can choose its own averaging.

use burn::prelude::*;

use crate::core::TrainRng;

/// `0.5 * ln(2π)`
pub const HALF_LOG_2PI: f32 = 0.918_938_5;

/// Analytic `KL(p || q)` between diagonal Gaussians, elementwise.
///
/// ```text
/// KL = 0.5 * (σp²/σq² + ((μp - μq)/σq)² - 1 - ln(σp²/σq²))
/// ```
pub fn gaussian_kl<B: Backend, const D: usize>(
    mean_p: Tensor<B, D>,
    std_p: Tensor<B, D>,
    mean_q: Tensor<B, D>,
    std_q: Tensor<B, D>,
) -> Tensor<B, D> {
    let var_ratio = (std_p / std_q.clone()).powf_scalar(2.0);
    let mean_term = ((mean_p - mean_q) / std_q).powf_scalar(2.0);
    (var_ratio.clone() + mean_term - var_ratio.log()).sub_scalar(1.0).mul_scalar(0.5)
}

/// KL of `N(μ, σ²)` against the standard normal, from mean and log-variance.
pub fn standard_normal_kl<B: Backend, const D: usize>(
    mean: Tensor<B, D>,
    log_var: Tensor<B, D>,
) -> Tensor<B, D> {
    (mean.powf_scalar(2.0) + log_var.clone().exp() - log_var)
        .sub_scalar(1.0)
        .mul_scalar(0.5)
}

/// Log-density of a diagonal Gaussian, elementwise.
pub fn gaussian_log_prob<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    mean: Tensor<B, D>,
    std: Tensor<B, D>,
) -> Tensor<B, D> {
    let z = (x - mean) / std.clone();
    z.powf_scalar(2.0).mul_scalar(-0.5) - std.log() - HALF_LOG_2PI
}

/// Log-density of the standard Laplace distribution, elementwise.
pub fn standard_laplace_log_prob<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.abs().neg().sub_scalar(std::f32::consts::LN_2)
}

/// Numerically stable `ln Σ exp(x)` along `dim`, keeping the dimension.
pub fn log_sum_exp<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let max = x.clone().max_dim(dim).detach();
    (x - max.clone()).exp().sum_dim(dim).log() + max
}

/// Reparameterized draw `mean + std * ε` with host-side noise from `rng`.
pub fn reparameterize<B: Backend, const D: usize>(
    mean: Tensor<B, D>,
    std: Tensor<B, D>,
    rng: &mut TrainRng,
) -> Tensor<B, D> {
    let noise = rng.normal_tensor::<B, D>(mean.dims(), &mean.device());
    mean + std * noise
}
