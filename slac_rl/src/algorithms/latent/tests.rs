use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;

use super::switching::regime::RegimeModel;
use super::*;
use crate::buffers::WindowBatch;
use crate::core::tensor_ops::{from_vec, to_vec};
use crate::core::TrainRng;
use crate::error::SlacError;

type B = Autodiff<NdArray<f32>>;

const OBS: usize = 6;
const ACT: usize = 2;

fn random_batch(rng: &mut TrainRng, batch_size: usize, window: usize) -> WindowBatch {
    let mut terminals = vec![0.0; batch_size * window];
    terminals[window - 1] = 1.0;
    WindowBatch {
        batch_size,
        window,
        observation_dim: OBS,
        action_dim: ACT,
        observations: rng.standard_normal_vec(batch_size * (window + 1) * OBS),
        actions: (0..batch_size * window * ACT).map(|_| rng.uniform(-1.0, 1.0)).collect(),
        rewards: rng.standard_normal_vec(batch_size * window),
        terminals,
    }
}

fn continuous_config() -> ContinuousLatentConfig {
    ContinuousLatentConfig::new(OBS, ACT)
        .with_feature_dim(8)
        .with_latent_dims(4, 6)
        .with_hidden_units(16)
        .with_learning_rate(3e-3)
}

fn switching_config() -> SwitchingLatentConfig {
    SwitchingLatentConfig::new(OBS, ACT)
        .with_feature_dim(8)
        .with_z_dim(3)
        .with_regimes(3, 4)
        .with_hidden(16, 8)
}

// ============================================================================
// Continuous model
// ============================================================================

#[test]
fn test_continuous_shapes() {
    let device = Default::default();
    let model = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut rng = TrainRng::seed_from(1);
    let batch = random_batch(&mut rng, 3, 4);

    let encoded = model.encode(batch.observations_tensor(&device), &mut rng);
    assert_eq!(encoded.features.dims(), [3, 5, 8]);

    let posterior = model.sample_posterior(encoded.features.clone(), batch.actions_tensor(&device), &mut rng);
    assert_eq!(posterior.latents.dims(), [3, 5, 10]);
    assert_eq!(posterior.mean.dims(), [3, 5, 4]);

    let prior = model.sample_prior(encoded.mean, batch.actions_tensor(&device), &mut rng);
    assert_eq!(prior.dims(), [3, 5, 10]);
    assert_eq!(model.decode(prior).dims(), [3, 5, OBS]);
    assert_eq!(model.latent_dim(), 10);
}

#[test]
fn test_continuous_loss_terms() {
    let device = Default::default();
    let model = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut rng = TrainRng::seed_from(2);
    let batch = random_batch(&mut rng, 4, 5);

    let info = model.calculate_loss(&batch, &mut rng).unwrap().info(0).unwrap();
    let kld = info.get("loss/kld").unwrap();
    let image = info.get("loss/image").unwrap();
    assert!(kld >= 0.0, "kld {}", kld);
    assert!(image >= 0.0, "image {}", image);
    assert!(info.get("loss/reward").unwrap().is_finite());
    assert_eq!(info.metrics().len(), 3);
}

#[test]
fn test_continuous_update_fits_fixed_batch() {
    let device = Default::default();
    let mut model = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut rng = TrainRng::seed_from(3);
    let batch = random_batch(&mut rng, 8, 4);

    let first = model.update(&batch, &mut rng).unwrap().get("loss/image").unwrap();
    let mut last = first;
    for _ in 0..60 {
        last = model.update(&batch, &mut rng).unwrap().get("loss/image").unwrap();
    }

    assert_eq!(model.update_steps(), 61);
    assert!(last < first, "image loss went from {} to {}", first, last);
}

#[test]
fn test_continuous_rejects_wrong_observation_width() {
    let device = Default::default();
    let model = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut rng = TrainRng::seed_from(4);
    let mut batch = random_batch(&mut rng, 2, 3);
    batch.observation_dim = OBS + 1;
    batch.observations = vec![0.0; 2 * 4 * (OBS + 1)];

    assert!(matches!(
        model.calculate_loss(&batch, &mut rng),
        Err(SlacError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_continuous_prior_is_causal_filter_sample() {
    let device = Default::default();
    let model = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut rng = TrainRng::seed_from(12);
    let features: Tensor<B, 3> = rng.normal_tensor([2, 4, 8], &device);
    let actions: Tensor<B, 3> = rng.normal_tensor([2, 3, ACT], &device);

    let prior = model.sample_prior(features.clone(), actions.clone(), &mut TrainRng::seed_from(3));
    let posterior = model.sample_posterior(features.clone(), actions.clone(), &mut TrainRng::seed_from(3));
    assert_eq!(to_vec(prior.clone()), to_vec(posterior.latents));

    // Changing the last frame leaves every earlier latent untouched.
    let shifted = features.clone().slice_assign(
        [0..2, 3..4, 0..8],
        Tensor::ones([2, 1, 8], &device).mul_scalar(5.0),
    );
    let changed = model.sample_prior(shifted, actions, &mut TrainRng::seed_from(3));
    let width = model.latent_dim();
    let (a, b) = (to_vec(prior), to_vec(changed));
    for batch in 0..2 {
        let start = batch * 4 * width;
        assert_eq!(a[start..start + 3 * width], b[start..start + 3 * width]);
    }
}

#[test]
fn test_continuous_snapshot_restore() {
    let device = Default::default();
    let source = ContinuousLatent::<B>::new(continuous_config(), &device);
    let mut target = ContinuousLatent::<B>::new(continuous_config(), &device);

    for (name, bytes) in source.snapshot().unwrap() {
        target.restore(name, &bytes).unwrap();
    }

    let features: Tensor<B, 3> = Tensor::ones([1, 3, 8], &device);
    let actions: Tensor<B, 3> = Tensor::zeros([1, 2, ACT], &device);
    let a = source.sample_prior(features.clone(), actions.clone(), &mut TrainRng::seed_from(9));
    let b = target.sample_prior(features, actions, &mut TrainRng::seed_from(9));
    assert_eq!(to_vec(a), to_vec(b));
}

#[test]
fn test_continuous_restore_rejects_unknown_and_mismatched() {
    let device = Default::default();
    let mut model = ContinuousLatent::<B>::new(continuous_config(), &device);
    assert!(matches!(
        model.restore("actor", &[]),
        Err(SlacError::Restore { .. })
    ));

    let bigger = ContinuousLatent::<B>::new(continuous_config().with_latent_dims(8, 6), &device);
    let (_, bytes) = bigger
        .snapshot()
        .unwrap()
        .into_iter()
        .find(|(name, _)| *name == LATENT_ARTIFACT)
        .unwrap();
    assert!(model.restore(LATENT_ARTIFACT, &bytes).is_err());
}

// ============================================================================
// Regime model
// ============================================================================

#[test]
fn test_uniform_hmm_with_certain_emissions() {
    let device = Default::default();
    let regime = RegimeModel::<B>::new(3, &device);
    let emissions: Tensor<B, 3> = Tensor::zeros([2, 5, 3], &device);

    // Every path has probability one under the emissions; uniform π and A
    // then sum to one.
    let log_p = to_vec(regime.log_likelihood(&emissions));
    assert!(log_p.iter().all(|v| v.abs() < 1e-5), "{:?}", log_p);

    let posteriors = to_vec(regime.posteriors(&emissions));
    for row in posteriors.chunks(3) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_hmm_likelihood_matches_enumeration() {
    let device = Default::default();
    let regime = RegimeModel::<B>::new(2, &device);
    let e = [[-0.5f32, -2.0], [-1.5, -0.1], [-0.3, -0.9]];
    let emissions: Tensor<B, 3> = from_vec(e.iter().flatten().copied().collect(), [1, 3, 2], &device);

    // Uniform π = A = 1/2: p = Σ_paths (1/2)^3 Π_t exp(e_t(s_t)).
    let mut total = 0.0f32;
    for path in 0..8usize {
        let mut p = 0.125f32;
        for (t, row) in e.iter().enumerate() {
            p *= row[(path >> t) & 1].exp();
        }
        total += p;
    }

    let log_p = to_vec(regime.log_likelihood(&emissions))[0];
    assert!((log_p - total.ln()).abs() < 1e-4, "{} vs {}", log_p, total.ln());
}

#[test]
fn test_map_regime_follows_emissions() {
    let device = Default::default();
    let regime = RegimeModel::<B>::new(3, &device);
    let mut values = vec![-5.0f32; 4 * 3];
    for t in 0..4 {
        values[t * 3 + if t < 2 { 2 } else { 0 }] = 0.0;
    }
    let emissions: Tensor<B, 3> = from_vec(values, [1, 4, 3], &device);

    assert_eq!(regime.map_regimes(&emissions), vec![2, 2, 0, 0]);
}

// ============================================================================
// Switching model
// ============================================================================

#[test]
fn test_switching_loss_terms() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config(), &device);
    let mut rng = TrainRng::seed_from(5);
    let batch = random_batch(&mut rng, 4, 5);

    let info = model.calculate_loss(&batch, &mut rng).unwrap().info(0).unwrap();
    for (name, value) in info.metrics() {
        assert!(value.is_finite(), "{} = {}", name, value);
    }
    assert!(info.get("loss/recon_loss").unwrap() >= 0.0);
    assert!(info.get("loss/kld_normal").unwrap() >= 0.0);
    assert!(info.get("loss/hmm_loss").is_some());
    assert_eq!(model.latent_dim(), 3);
}

#[test]
fn test_switching_update_steps_both_groups() {
    let device = Default::default();
    let mut model = SwitchingLatent::<B>::new(switching_config(), &device);
    let mut rng = TrainRng::seed_from(6);
    let batch = random_batch(&mut rng, 4, 5);

    let first = model.update(&batch, &mut rng).unwrap().get("loss/recon_loss").unwrap();
    let mut last = first;
    for _ in 0..40 {
        last = model.update(&batch, &mut rng).unwrap().get("loss/recon_loss").unwrap();
    }

    assert_eq!(model.update_steps(), 41);
    assert!(last < first, "recon went from {} to {}", first, last);
}

#[test]
fn test_switching_prior_is_deterministic_and_causal() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config(), &device);
    let features: Tensor<B, 3> = from_vec((0..24).map(|v| v as f32 * 0.1).collect(), [1, 3, 8], &device);
    let actions: Tensor<B, 3> = Tensor::zeros([1, 2, ACT], &device);

    let a = to_vec(model.sample_prior(features.clone(), actions.clone(), &mut TrainRng::seed_from(1)));
    let b = to_vec(model.sample_prior(features.clone(), actions.clone(), &mut TrainRng::seed_from(2)));
    assert_eq!(a, b);

    // Changing the last frame leaves earlier latents untouched.
    let mut shifted: Vec<f32> = to_vec(features);
    for v in shifted[16..].iter_mut() {
        *v += 1.0;
    }
    let c = to_vec(model.sample_prior(from_vec(shifted, [1, 3, 8], &device), actions, &mut TrainRng::seed_from(1)));
    assert_eq!(a[..6], c[..6]);
}

#[test]
fn test_switching_regime_posteriors_normalized() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config(), &device);
    let mut rng = TrainRng::seed_from(7);
    let latents: Tensor<B, 3> = rng.normal_tensor([2, 6, 3], &device);

    let posteriors = model.regime_posteriors(&latents).unwrap();
    assert_eq!(posteriors.dims(), [2, 4, 3]);
    for row in to_vec(posteriors).chunks(3) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }
}

#[test]
fn test_switching_window_must_exceed_lags() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config().with_lags(4), &device);
    let mut rng = TrainRng::seed_from(8);
    let batch = random_batch(&mut rng, 2, 3);

    assert!(matches!(
        model.calculate_loss(&batch, &mut rng),
        Err(SlacError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_regime_posteriors_reject_short_sequences() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config().with_lags(4), &device);
    let mut rng = TrainRng::seed_from(9);

    for steps in [2, 4] {
        let latents: Tensor<B, 3> = rng.normal_tensor([2, steps, 3], &device);
        assert!(matches!(
            model.regime_posteriors(&latents),
            Err(SlacError::ShapeMismatch { expected: 5, .. })
        ));
    }

    let wrong_width: Tensor<B, 3> = rng.normal_tensor([2, 6, 5], &device);
    assert!(matches!(
        model.regime_posteriors(&wrong_width),
        Err(SlacError::ShapeMismatch { expected: 3, actual: 5, .. })
    ));
}

#[test]
fn test_transition_density_rejects_short_sequences() {
    let device = Default::default();
    let model = SwitchingLatent::<B>::new(switching_config(), &device);
    let prior = model.transition_prior();
    let lags = prior.lags();
    let mut rng = TrainRng::seed_from(10);
    let latents: Tensor<B, 3> = rng.normal_tensor([1, lags, 3], &device);
    let conditioning: Tensor<B, 2> = rng.normal_tensor([1, 16], &device);

    assert!(matches!(
        prior.log_density(&latents, conditioning),
        Err(SlacError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_switching_snapshot_restore() {
    let device = Default::default();
    let source = SwitchingLatent::<B>::new(switching_config(), &device);
    let mut target = SwitchingLatent::<B>::new(switching_config(), &device);

    let artifacts = source.snapshot().unwrap();
    let names: Vec<&str> = artifacts.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec![ENCODER_ARTIFACT, DECODER_ARTIFACT, LATENT_ARTIFACT]);
    for (name, bytes) in artifacts {
        target.restore(name, &bytes).unwrap();
    }

    let features: Tensor<B, 3> = Tensor::ones([1, 3, 8], &device);
    let actions: Tensor<B, 3> = Tensor::zeros([1, 2, ACT], &device);
    let mut rng = TrainRng::seed_from(0);
    assert_eq!(
        to_vec(source.sample_prior(features.clone(), actions.clone(), &mut rng)),
        to_vec(target.sample_prior(features, actions, &mut rng)),
    );
}
