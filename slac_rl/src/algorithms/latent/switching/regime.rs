//! Discrete regime process: an HMM over `n_regimes` categories.
//!
//! Initial and transition distributions are learned logits. Emissions are
//! supplied by the caller as `[batch, steps, n_regimes]` log-likelihoods; all
//! recursions run in log space.
//!
//! ```text
//! α_0(k)  = log π(k) + e_0(k)
//! α_t(k)  = LSE_j(α_{t-1}(j) + log A(j, k)) + e_t(k)
//! β_T(k)  = 0
//! β_t(j)  = LSE_k(log A(j, k) + e_{t+1}(k) + β_{t+1}(k))
//! log p   = LSE_k α_T(k)
//! ```

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use crate::algorithms::latent::distributions::log_sum_exp;
use crate::core::tensor_ops::to_vec;

#[derive(Module, Debug)]
pub struct RegimeModel<B: Backend> {
    initial_logits: Param<Tensor<B, 1>>,
    transition_logits: Param<Tensor<B, 2>>,
    n_regimes: usize,
}

impl<B: Backend> RegimeModel<B> {
    /// Uniform initial and transition distributions.
    pub fn new(n_regimes: usize, device: &B::Device) -> Self {
        Self {
            initial_logits: Param::from_tensor(Tensor::zeros([n_regimes], device)),
            transition_logits: Param::from_tensor(Tensor::zeros([n_regimes, n_regimes], device)),
            n_regimes,
        }
    }

    pub fn n_regimes(&self) -> usize {
        self.n_regimes
    }

    /// `log π`, `[K]`.
    pub fn log_initial(&self) -> Tensor<B, 1> {
        log_softmax(self.initial_logits.val(), 0)
    }

    /// `log A` with rows summing to one in probability space, `[K, K]`.
    pub fn log_transition(&self) -> Tensor<B, 2> {
        log_softmax(self.transition_logits.val(), 1)
    }

    /// Forward messages `α`, one `[batch, K]` tensor per step.
    fn forward_messages(&self, emissions: &Tensor<B, 3>) -> Vec<Tensor<B, 2>> {
        let [batch, steps, k] = emissions.dims();
        let log_a = self.log_transition().reshape([1, k, k]);
        let mut alphas = Vec::with_capacity(steps);

        let first = self.log_initial().reshape([1, k]) + step(emissions, 0);
        alphas.push(first);
        for t in 1..steps {
            let prev = alphas[t - 1].clone().reshape([batch, k, 1]);
            let carried = log_sum_exp(prev + log_a.clone(), 1).reshape([batch, k]);
            alphas.push(carried + step(emissions, t));
        }
        alphas
    }

    /// `log p(z_{0..T})` per sequence, `[batch]`.
    pub fn log_likelihood(&self, emissions: &Tensor<B, 3>) -> Tensor<B, 1> {
        let batch = emissions.dims()[0];
        let alphas = self.forward_messages(emissions);
        match alphas.last() {
            Some(last) => log_sum_exp(last.clone(), 1).reshape([batch]),
            None => Tensor::zeros([batch], &emissions.device()),
        }
    }

    /// Regime posteriors `p(s_t = k | z)`, `[batch, steps, K]`.
    pub fn posteriors(&self, emissions: &Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, steps, k] = emissions.dims();
        let alphas = self.forward_messages(emissions);
        let log_a = self.log_transition().reshape([1, k, k]);

        let mut betas = vec![Tensor::zeros([batch, k], &emissions.device()); steps];
        for t in (0..steps.saturating_sub(1)).rev() {
            let next = (step(emissions, t + 1) + betas[t + 1].clone()).reshape([batch, 1, k]);
            betas[t] = log_sum_exp(log_a.clone() + next, 2).reshape([batch, k]);
        }

        let gammas: Vec<Tensor<B, 2>> = alphas
            .into_iter()
            .zip(betas)
            .map(|(alpha, beta)| {
                let joint = alpha + beta;
                let norm = log_sum_exp(joint.clone(), 1);
                (joint - norm).exp()
            })
            .collect();
        Tensor::stack(gammas, 1)
    }

    /// Most probable regime per `(batch, step)`, flattened batch-major.
    pub fn map_regimes(&self, emissions: &Tensor<B, 3>) -> Vec<usize> {
        let k = self.n_regimes;
        to_vec(self.posteriors(emissions))
            .chunks(k)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                    .0
            })
            .collect()
    }
}

fn step<B: Backend>(emissions: &Tensor<B, 3>, t: usize) -> Tensor<B, 2> {
    let [batch, _, k] = emissions.dims();
    emissions.clone().slice([0..batch, t..t + 1, 0..k]).reshape([batch, k])
}

/// One-hot rows for a list of regime indices, `[len, n_regimes]`.
pub fn one_hot<B: Backend>(regimes: &[usize], n_regimes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; regimes.len() * n_regimes];
    for (row, &regime) in regimes.iter().enumerate() {
        values[row * n_regimes + regime] = 1.0;
    }
    crate::core::tensor_ops::from_vec(values, [regimes.len(), n_regimes], device)
}
