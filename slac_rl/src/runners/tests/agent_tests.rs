//! Agent tests: acting, batch assembly and parameter artifacts.

use burn::backend::{Autodiff, NdArray};
use tempfile::tempdir;

use super::tiny_config;
use crate::algorithms::latent::{ContinuousLatent, ContinuousLatentConfig};
use crate::buffers::{SequenceStore, WindowBatch};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::core::TrainRng;
use crate::environment::{ActionSpace, Environment, LinearGaussianEnv};
use crate::error::SlacError;
use crate::runners::{actor_input_dim, LatentVariant, SlacAgent, SlacConfig, SwitchingParams};

type B = Autodiff<NdArray<f32>>;

const OBS: usize = 6;

fn action_space() -> ActionSpace {
    ActionSpace::symmetric(1, 1.0)
}

/// Store filled with a few random-policy episodes of the toy env.
fn filled_store(config: &SlacConfig, rng: &mut TrainRng) -> SequenceStore {
    let mut env = LinearGaussianEnv::new(OBS, 20, 1);
    let mut store = SequenceStore::new(
        config.buffer_size,
        OBS,
        1,
        config.num_sequences,
        config.ac_sequence_length,
    )
    .unwrap();

    store.reset_episode(&env.reset(Some(0))).unwrap();
    for _ in 0..60 {
        let action = env.sample_action(rng);
        let result = env.step(&action).unwrap();
        let done = result.done();
        store
            .append(&action, result.reward, result.terminated, &result.observation, done)
            .unwrap();
        if done {
            store.reset_episode(&env.reset(None)).unwrap();
        }
    }
    store
}

fn ac_window(config: &SlacConfig, rng: &mut TrainRng) -> WindowBatch {
    filled_store(config, rng).sample_actor_critic_window(5, rng).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_actor_input_dim() {
    assert_eq!(actor_input_dim(8, 256, 6), 8 * 256 + 7 * 6);
    assert_eq!(actor_input_dim(1, 16, 3), 16);
}

#[test]
fn test_learner_matches_latent_widths() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();

    let learner = agent.learner().config();
    assert_eq!(learner.latent_dim, 4 + 8);
    assert_eq!(learner.history_dim, actor_input_dim(2, 8, 1));
    assert_eq!(agent.learner().actor().input_dim(), learner.history_dim);
    assert_eq!(agent.learner().critic().input_dim(), 4 + 8 + 1);
}

#[test]
fn test_latent_action_width_must_match() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let latent = ContinuousLatent::<B>::new(
        ContinuousLatentConfig::new(OBS, 2)
            .with_feature_dim(8)
            .with_latent_dims(4, 8)
            .with_hidden_units(16),
        &Default::default(),
    );

    let result = SlacAgent::<B>::with_latent(Box::new(latent), &config, &action_space(), &Default::default());
    assert!(matches!(
        result,
        Err(SlacError::ShapeMismatch { expected: 1, actual: 2, .. })
    ));
}

#[test]
fn test_invalid_config_fails_before_building() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path()).with_sequence_lengths(2, 3);
    let result = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default());
    assert!(matches!(result, Err(SlacError::Config(_))));
}

// ============================================================================
// Acting
// ============================================================================

#[test]
fn test_explore_and_exploit_on_fresh_history() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(0);

    let mut history = agent.new_history();
    history.reset_episode(&[0.5; OBS]).unwrap();

    let explored = agent.explore(&history, &mut rng).unwrap();
    let exploited = agent.exploit(&history, &mut rng).unwrap();
    assert_eq!(explored.len(), 1);
    assert!(explored[0].abs() <= 1.0);
    // Encoder means and tanh(μ) involve no noise.
    assert_eq!(exploited, agent.exploit(&history, &mut rng).unwrap());
}

#[test]
fn test_discrete_actions_are_binarized() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent =
        SlacAgent::<B>::new(&config, OBS, &ActionSpace::Discrete { n: 2 }, &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(1);
    let mut history = agent.new_history();
    history.reset_episode(&[0.1; OBS]).unwrap();

    for _ in 0..10 {
        let action = agent.explore(&history, &mut rng).unwrap();
        assert!(action[0] == 0.0 || action[0] == 1.0, "{:?}", action);
        history.append(&[0.2; OBS], &action).unwrap();
    }
}

#[test]
fn test_wrong_history_length_rejected() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut history = crate::buffers::ObservationHistory::new(3, OBS, 1);
    history.reset_episode(&[0.0; OBS]).unwrap();

    let err = agent.exploit(&history, &mut TrainRng::seed_from(0)).unwrap_err();
    assert!(matches!(err, SlacError::ShapeMismatch { .. }));
}

// ============================================================================
// Actor-critic batches
// ============================================================================

#[test]
fn test_actor_critic_batch_shapes() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(2);
    let window = ac_window(&config, &mut rng);

    let batch = agent.prepare_actor_critic_batch(&window, &mut rng).unwrap();
    let history_dim = agent.learner().config().history_dim;
    assert_eq!(batch.latent.dims(), [5, 12]);
    assert_eq!(batch.next_latent.dims(), [5, 12]);
    assert_eq!(batch.action.dims(), [5, 1]);
    assert_eq!(batch.history.dims(), [5, history_dim]);
    assert_eq!(batch.next_history.dims(), [5, history_dim]);
    assert_eq!(batch.reward.dims(), [5, 1]);
    assert_eq!(batch.terminal.dims(), [5, 1]);
}

#[test]
fn test_actor_critic_batch_takes_last_step() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(3);
    let window = ac_window(&config, &mut rng);

    let batch = agent.prepare_actor_critic_batch(&window, &mut rng).unwrap();
    let rewards = crate::core::tensor_ops::to_vec(batch.reward);
    let actions = crate::core::tensor_ops::to_vec(batch.action);
    for b in 0..window.batch_size {
        let last = b * window.window + window.window - 1;
        assert_eq!(rewards[b], window.rewards[last]);
        assert_eq!(actions[b], window.action(b, window.window - 1)[0]);
    }
}

#[test]
fn test_latent_window_rejected_for_actor_critic() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(4);
    let window = filled_store(&config, &mut rng).sample_latent_window(3, &mut rng).unwrap();

    let err = agent.prepare_actor_critic_batch(&window, &mut rng).unwrap_err();
    assert!(matches!(err, SlacError::ShapeMismatch { expected: 2, actual: 4, .. }));
}

#[test]
fn test_switching_agent_updates() {
    let dir = tempdir().unwrap();
    let switching = SwitchingParams {
        z_dim: 3,
        n_regimes: 2,
        embedding_dim: 4,
        hidden_dim: 16,
        ..SwitchingParams::default()
    };
    let config = tiny_config(dir.path())
        .with_latent_variant(LatentVariant::Switching)
        .with_switching(switching);
    let mut agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();
    let mut rng = TrainRng::seed_from(5);
    let store = filled_store(&config, &mut rng);

    let latent_info = agent
        .update_latent(&store.sample_latent_window(4, &mut rng).unwrap(), &mut rng)
        .unwrap();
    assert!(latent_info.get("loss/elbo_loss").unwrap().is_finite());

    let sac_info = agent
        .update_actor_critic(&store.sample_actor_critic_window(4, &mut rng).unwrap(), &mut rng)
        .unwrap();
    assert!(sac_info.critic_loss.is_finite());
    assert_eq!(agent.learner().config().latent_dim, 3);
}

// ============================================================================
// Artifacts
// ============================================================================

#[test]
fn test_snapshot_names_every_artifact() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();

    let snapshot = agent.snapshot().unwrap();
    let names: Vec<&str> = snapshot.names().collect();
    for expected in ["actor", "critic", "decoder", "encoder", "latent_model"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
    assert_eq!(snapshot.len(), 5);
}

#[test]
fn test_warm_start_from_saved_step() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let device = Default::default();
    let mut rng = TrainRng::seed_from(6);
    let mut source = SlacAgent::<B>::new(&config, OBS, &action_space(), &device).unwrap();
    let store = filled_store(&config, &mut rng);
    for _ in 0..3 {
        source
            .update_latent(&store.sample_latent_window(4, &mut rng).unwrap(), &mut rng)
            .unwrap();
        source
            .update_actor_critic(&store.sample_actor_critic_window(4, &mut rng).unwrap(), &mut rng)
            .unwrap();
    }

    let mut checkpointer = Checkpointer::new(CheckpointerConfig::new(config.model_dir())).unwrap();
    let step_dir = checkpointer.save(&source.snapshot().unwrap(), 100, None).unwrap();

    let warm = config.clone().with_warm_start(
        Some(step_dir.clone()),
        Some(step_dir.join("actor.bin")),
        Some(step_dir.join("critic.bin")),
    );
    let mut restored = SlacAgent::<B>::new(&warm, OBS, &action_space(), &device).unwrap();
    restored.warm_start(&warm).unwrap();

    let mut history = source.new_history();
    history.reset_episode(&[0.3; OBS]).unwrap();
    assert_eq!(
        restored.exploit(&history, &mut rng).unwrap(),
        source.exploit(&history, &mut rng).unwrap()
    );
}

#[test]
fn test_warm_start_missing_file_is_error() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path()).with_warm_start(None, Some(dir.path().join("nope.bin")), None);
    let mut agent = SlacAgent::<B>::new(&config, OBS, &action_space(), &Default::default()).unwrap();

    assert!(matches!(agent.warm_start(&config), Err(SlacError::Checkpoint(_))));
}
