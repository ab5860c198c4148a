//! Polyak averaging for the lagged critic.
//!
//! ```text
//! θ_target ← τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! The target critic lives on the inner (non-autodiff) backend, so it never
//! enters a gradient tape. Callers pass `critic.valid()` as the online model.
//!
//! Parameters are paired by traversal order, which is deterministic for two
//! modules built from the same config.

use std::collections::VecDeque;

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened to 1D.
struct OnlineParams<B: Backend> {
    flat: VecDeque<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for OnlineParams<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let value = param.val();
        let numel: usize = value.dims().iter().product();
        self.flat.push_back(value.reshape([numel]));
        param
    }
}

/// Blends each target parameter with the next collected online parameter.
struct Blend<B: Backend> {
    online: VecDeque<Tensor<B, 1>>,
    tau: f32,
    unmatched: usize,
}

impl<B: Backend> ModuleMapper<B> for Blend<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let target = param.val();
        let shape = target.dims();
        let numel: usize = shape.iter().product();

        match self.online.pop_front() {
            Some(online) if online.dims()[0] == numel => {
                let blended = online.mul_scalar(self.tau)
                    + target.reshape([numel]).mul_scalar(1.0 - self.tau);
                Param::initialized(param.id.clone(), blended.reshape(shape))
            }
            _ => {
                self.unmatched += 1;
                param
            }
        }
    }
}

/// Soft-update `target` toward `online` with mixing coefficient `tau`.
///
/// `tau = 1` returns an exact copy of `online`; `tau = 0` returns `target`
/// untouched.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut collector = OnlineParams { flat: VecDeque::new() };
    let _ = online.clone().map(&mut collector);

    let mut blend = Blend {
        online: collector.flat,
        tau,
        unmatched: 0,
    };
    let updated = target.map(&mut blend);
    if blend.unmatched > 0 || !blend.online.is_empty() {
        log::warn!(
            "soft update skipped {} target parameters ({} online left over)",
            blend.unmatched,
            blend.online.len()
        );
    }
    updated
}

/// Exact copy used to initialise a target from its online network.
pub fn hard_copy<B, M>(online: &M) -> M
where
    B: Backend,
    M: Module<B>,
{
    online.clone()
}
