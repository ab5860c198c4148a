//! Type-erased optimizer handle.
//!
//! Burn optimizers are generic over the module they update
//! (`OptimizerAdaptor<Adam, M, B>`), which makes them awkward to store next to
//! trait objects. [`ModuleOptimizer`] boxes the optimizer behind a single step
//! closure so components own "an optimizer for `M`" without naming the
//! concrete algorithm.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;

type StepFn<M> = Box<dyn FnMut(f64, M, GradientsParams) -> M>;

/// Optimizer bound to one module type with a fixed learning rate.
pub struct ModuleOptimizer<M> {
    step_fn: StepFn<M>,
    learning_rate: f64,
    steps: usize,
}

impl<M: 'static> ModuleOptimizer<M> {
    /// Adam with `epsilon = 1e-5` and optional gradient-norm clipping.
    pub fn adam<B>(learning_rate: f64, grad_clip: Option<f32>) -> Self
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let config = AdamConfig::new()
            .with_epsilon(1e-5)
            .with_grad_clipping(grad_clip.map(GradientClippingConfig::Norm));
        Self::from_optimizer(config.init::<B, M>(), learning_rate)
    }

    /// Adam with L2 weight decay.
    pub fn adam_with_decay<B>(learning_rate: f64, weight_decay: f32, grad_clip: Option<f32>) -> Self
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let config = AdamConfig::new()
            .with_epsilon(1e-5)
            .with_weight_decay(Some(WeightDecayConfig::new(weight_decay)))
            .with_grad_clipping(grad_clip.map(GradientClippingConfig::Norm));
        Self::from_optimizer(config.init::<B, M>(), learning_rate)
    }

    /// AdamW (decoupled weight decay).
    pub fn adamw<B>(learning_rate: f64, weight_decay: f32, grad_clip: Option<f32>) -> Self
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let config = AdamWConfig::new()
            .with_epsilon(1e-5)
            .with_weight_decay(weight_decay)
            .with_grad_clipping(grad_clip.map(GradientClippingConfig::Norm));
        Self::from_optimizer(config.init::<B, M>(), learning_rate)
    }

    fn from_optimizer<B, O>(mut optimizer: O, learning_rate: f64) -> Self
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B> + 'static,
    {
        Self {
            step_fn: Box::new(move |lr, module, grads| optimizer.step(lr, module, grads)),
            learning_rate,
            steps: 0,
        }
    }

    /// Apply one update and return the new module.
    pub fn step(&mut self, module: M, grads: GradientsParams) -> M {
        self.steps += 1;
        (self.step_fn)(self.learning_rate, module, grads)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl<M> std::fmt::Debug for ModuleOptimizer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleOptimizer")
            .field("learning_rate", &self.learning_rate)
            .field("steps", &self.steps)
            .finish()
    }
}
