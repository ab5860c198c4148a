//! Loss terms of the latent actor-critic update.
//!
//! All inputs are `[batch, 1]` columns.

use burn::prelude::*;

/// Sum of the two heads' mean squared TD errors:
/// `L = E[(Q1 - y)²] + E[(Q2 - y)²]`.
pub fn critic_loss<B: Backend>(q1: Tensor<B, 2>, q2: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let q1_loss = (q1 - targets.clone()).powf_scalar(2.0).mean();
    let q2_loss = (q2 - targets).powf_scalar(2.0).mean();
    q1_loss + q2_loss
}

/// `L = E[α log π(a|·) - min Q(z, a)]`.
pub fn actor_loss<B: Backend>(min_q: Tensor<B, 2>, log_probs: Tensor<B, 2>, alpha: f32) -> Tensor<B, 1> {
    (log_probs.mul_scalar(alpha) - min_q).mean()
}

/// `y = r + γ (1 - done) (min Q'(z', a') - α log π(a'|·))`.
pub fn td_targets<B: Backend>(
    rewards: Tensor<B, 2>,
    terminals: Tensor<B, 2>,
    min_q_next: Tensor<B, 2>,
    next_log_probs: Tensor<B, 2>,
    gamma: f32,
    alpha: f32,
) -> Tensor<B, 2> {
    let v_next = min_q_next - next_log_probs.mul_scalar(alpha);
    let not_done = terminals.neg().add_scalar(1.0);
    rewards + not_done.mul_scalar(gamma) * v_next
}
