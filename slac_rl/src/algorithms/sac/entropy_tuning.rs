//! Automatic entropy coefficient tuning.
//!
//! α is learned to hold the policy entropy near a target:
//! ```text
//! L(log α) = -log α * (H_target - H),   H = -E[log π]
//! ```
//!
//! The gradient with respect to `log α` is `H - H_target`, so α grows while
//! the policy is less random than the target and shrinks otherwise. The
//! update is a plain SGD step on the scalar.

// ============================================================================
// Entropy Tuner
// ============================================================================

/// Result of one temperature update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaUpdate {
    /// `-log α * (H_target - H)` before the step.
    pub loss: f32,
    /// α after the step.
    pub alpha: f32,
}

/// Owns `log α` and its target entropy.
#[derive(Debug, Clone)]
pub struct EntropyTuner {
    /// Optimized in log space to keep α > 0.
    log_alpha: f32,
    /// Continuous actions use `-dim(A)`.
    target_entropy: f32,
    learning_rate: f32,
    /// `exp(log_alpha)`, refreshed after every step.
    alpha: f32,
}

impl EntropyTuner {
    /// `initial_alpha = 1.0` corresponds to `log α = 0`.
    pub fn new(initial_alpha: f32, target_entropy: f32, learning_rate: f32) -> Self {
        Self {
            log_alpha: initial_alpha.ln(),
            target_entropy,
            learning_rate,
            alpha: initial_alpha,
        }
    }

    /// Current coefficient.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn log_alpha(&self) -> f32 {
        self.log_alpha
    }

    pub fn target_entropy(&self) -> f32 {
        self.target_entropy
    }

    /// Loss value for a measured entropy.
    pub fn loss(&self, entropy: f32) -> f32 {
        -self.log_alpha * (self.target_entropy - entropy)
    }

    /// One gradient step given the entropy measured on the actor's batch.
    pub fn step(&mut self, entropy: f32) -> AlphaUpdate {
        let loss = self.loss(entropy);
        let grad = entropy - self.target_entropy;
        self.log_alpha -= self.learning_rate * grad;
        self.alpha = self.log_alpha.exp();
        AlphaUpdate {
            loss,
            alpha: self.alpha,
        }
    }

    /// Overwrite `log α`, e.g. when resuming.
    pub fn set_log_alpha(&mut self, log_alpha: f32) {
        self.log_alpha = log_alpha;
        self.alpha = log_alpha.exp();
    }
}

/// Target entropy for a continuous action space: `-dim(A)`.
pub fn target_entropy_continuous(action_dim: usize) -> f32 {
    -(action_dim as f32)
}

// ============================================================================
// Tests
// ============================================================================
