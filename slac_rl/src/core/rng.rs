//! Explicit random number handle.
//!
//! Every stochastic operation in the engine (store sampling, policy noise,
//! latent reparameterization, random prefill actions) draws from a
//! [`TrainRng`] passed in by the caller. There is no process-wide seeding, so
//! two runs with the same seed produce identical batches and noise.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Seeded random generator threaded through the training loop.
#[derive(Debug, Clone)]
pub struct TrainRng {
    inner: StdRng,
}

impl TrainRng {
    /// Create a generator from a seed.
    pub fn seed_from(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive an independent child generator (used for per-env seeds).
    pub fn fork(&mut self) -> Self {
        Self::seed_from(self.inner.gen())
    }

    /// Next raw `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }

    /// Uniform index in `0..upper`. `upper` must be non-zero.
    pub fn index(&mut self, upper: usize) -> usize {
        self.inner.gen_range(0..upper)
    }

    /// Uniform float in `[low, high)`.
    pub fn uniform(&mut self, low: f32, high: f32) -> f32 {
        self.inner.gen_range(low..high)
    }

    /// `n` independent standard-normal draws.
    pub fn standard_normal_vec(&mut self, n: usize) -> Vec<f32> {
        (0..n)
            .map(|_| self.inner.sample::<f32, _>(StandardNormal))
            .collect()
    }

    /// Standard-normal noise tensor with the given shape, built host-side.
    pub fn normal_tensor<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let n = shape.iter().product();
        let values = self.standard_normal_vec(n);
        Tensor::from_data(TensorData::new(values, shape), device)
    }
}
