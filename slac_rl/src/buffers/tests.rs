//! Test suite for the buffers submodule.
//!
//! Covers:
//! - window shapes for both consumers
//! - zero padding before an episode start, never splicing two episodes
//! - circular overwrite never leaking into sampled windows
//! - observation history padding
//! - misuse errors (append without episode, sampling an under-filled store)

use proptest::prelude::*;

use super::*;
use crate::core::TrainRng;
use crate::error::StoreError;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Observation tagging the record: `[global index + 1, episode + 1, ...]`.
fn tagged_observation(global: u64, episode: usize, dim: usize) -> Vec<f32> {
    let mut obs = vec![0.5; dim];
    obs[0] = global as f32 + 1.0;
    if dim > 1 {
        obs[1] = episode as f32 + 1.0;
    }
    obs
}

/// Scripted action depending only on the step.
fn scripted_action(step: usize, dim: usize) -> Vec<f32> {
    (0..dim).map(|d| ((step + d) as f32 * 0.37).sin()).collect()
}

/// Fill a store with `transitions` steps split into episodes of `episode_len`.
fn fill_store(store: &mut SequenceStore, transitions: usize, episode_len: usize) {
    let (od, ad) = (store.observation_dim(), store.action_dim());
    let mut episode = 0;
    let mut t = 0;
    store
        .reset_episode(&tagged_observation(store.total_written(), episode, od))
        .unwrap();

    for step in 0..transitions {
        t += 1;
        let done = t == episode_len;
        let next = tagged_observation(store.total_written(), episode, od);
        store
            .append(&scripted_action(step, ad), step as f32, done, &next, done)
            .unwrap();
        if done {
            t = 0;
            episode += 1;
            store
                .reset_episode(&tagged_observation(store.total_written(), episode, od))
                .unwrap();
        }
    }
}

fn is_zero(row: &[f32]) -> bool {
    row.iter().all(|&v| v == 0.0)
}

/// Zeros only as a prefix; non-zero rows are consecutive records of one episode.
fn assert_single_episode(batch: &WindowBatch, written: u64, capacity: usize) {
    for b in 0..batch.batch_size {
        let mut seen_data = false;
        let mut previous: Option<(f32, f32)> = None;
        for j in 0..=batch.window {
            let row = batch.observation(b, j);
            if is_zero(row) {
                assert!(!seen_data, "zero observation after data in window {}", b);
                assert!(
                    j == 0 || is_zero(batch.action(b, j - 1)),
                    "non-zero action leading into padding"
                );
                continue;
            }
            seen_data = true;

            let (global, episode) = (row[0], row[1]);
            assert!(global <= written as f32, "read beyond write cursor");
            assert!(
                global > written.saturating_sub(capacity as u64) as f32,
                "read an overwritten record"
            );
            if let Some((prev_global, prev_episode)) = previous {
                assert_eq!(global, prev_global + 1.0, "records not contiguous");
                assert_eq!(episode, prev_episode, "window spliced two episodes");
            }
            previous = Some((global, episode));
        }
        assert!(seen_data, "window {} has no data", b);
    }
}

// =============================================================================
// SEQUENCE STORE
// =============================================================================

#[test]
fn test_scenario_capacity_100_shapes() {
    let mut store = SequenceStore::new(100, 4, 2, 5, 3).unwrap();
    fill_store(&mut store, 50, 20);
    let mut rng = TrainRng::seed_from(0);

    let batch = store.sample_latent_window(8, &mut rng).unwrap();

    assert_eq!(batch.observations.len(), 8 * 6 * 4);
    assert_eq!(batch.actions.len(), 8 * 5 * 2);
    assert_eq!(batch.rewards.len(), 8 * 5);
    assert_eq!(batch.terminals.len(), 8 * 5);

    let device = Default::default();
    let obs = batch.observations_tensor::<burn::backend::NdArray<f32>>(&device);
    let actions = batch.actions_tensor::<burn::backend::NdArray<f32>>(&device);
    assert_eq!(obs.dims(), [8, 6, 4]);
    assert_eq!(actions.dims(), [8, 5, 2]);

    assert_single_episode(&batch, store.total_written(), store.capacity());
}

#[test]
fn test_actor_critic_window_shapes() {
    let mut store = SequenceStore::new(64, 3, 1, 8, 4).unwrap();
    fill_store(&mut store, 40, 15);
    let mut rng = TrainRng::seed_from(1);

    let batch = store.sample_actor_critic_window(16, &mut rng).unwrap();
    assert_eq!(batch.window, 4);
    assert_eq!(batch.observations.len(), 16 * 5 * 3);
    assert_eq!(batch.actions.len(), 16 * 4);
    assert_single_episode(&batch, store.total_written(), store.capacity());
}

#[test]
fn test_window_fields_align_with_records() {
    // One episode, no padding: record k holds reward k-1 and obs tag k+1.
    let mut store = SequenceStore::new(32, 2, 1, 3, 3).unwrap();
    fill_store(&mut store, 10, 100);
    let mut rng = TrainRng::seed_from(2);

    let batch = store.sample_window(3, 32, &mut rng).unwrap();
    for b in 0..batch.batch_size {
        let last_obs = batch.observation(b, 3);
        let end_record = last_obs[0] - 1.0;
        // Reward of the final action is the step index of that transition.
        assert_eq!(batch.rewards[b * 3 + 2], end_record - 1.0);
        for j in 0..3 {
            let reached = batch.observation(b, j + 1);
            if !is_zero(reached) && batch.observation(b, j)[0] != 0.0 {
                assert_eq!(reached[0], batch.observation(b, j)[0] + 1.0);
            }
        }
    }
}

#[test]
fn test_episode_start_is_zero_padded() {
    let mut store = SequenceStore::new(50, 2, 1, 6, 6).unwrap();
    // Only two transitions exist: every window must be padded.
    fill_store(&mut store, 2, 100);
    let mut rng = TrainRng::seed_from(3);

    let batch = store.sample_window(6, 10, &mut rng).unwrap();
    for b in 0..batch.batch_size {
        let padded = (0..=6).filter(|&j| is_zero(batch.observation(b, j))).count();
        assert!(padded >= 4, "expected at least 4 padded frames, got {}", padded);
        // The frame after the padding is the episode-opening observation.
        let first = batch.observation(b, padded);
        assert_eq!(first[0], 1.0);
    }
    assert_single_episode(&batch, store.total_written(), store.capacity());
}

#[test]
fn test_terminal_mask_recorded() {
    let mut store = SequenceStore::new(20, 2, 1, 2, 2).unwrap();
    store.reset_episode(&[1.0, 1.0]).unwrap();
    store.append(&[0.1], 1.0, false, &[2.0, 1.0], false).unwrap();
    store.append(&[0.2], 2.0, true, &[3.0, 1.0], true).unwrap();

    let mut rng = TrainRng::seed_from(4);
    let batch = store.sample_window(2, 20, &mut rng).unwrap();
    for b in 0..batch.batch_size {
        let last_terminal = batch.terminals[b * 2 + 1];
        let last_reward = batch.rewards[b * 2 + 1];
        if last_reward == 2.0 {
            assert_eq!(last_terminal, 1.0);
        } else {
            assert_eq!(last_terminal, 0.0);
        }
    }
}

#[test]
fn test_circular_overwrite_never_leaks() {
    let mut store = SequenceStore::new(30, 3, 2, 5, 2).unwrap();
    fill_store(&mut store, 200, 13);
    assert_eq!(store.len(), 30);
    assert_eq!(store.total_written(), 200 + 1 + 200 / 13);

    let mut rng = TrainRng::seed_from(5);
    for _ in 0..20 {
        let batch = store.sample_latent_window(8, &mut rng).unwrap();
        assert_single_episode(&batch, store.total_written(), store.capacity());
    }
}

#[test]
fn test_sampling_empty_store_fails() {
    let mut store = SequenceStore::new(10, 2, 1, 4, 2).unwrap();
    let mut rng = TrainRng::seed_from(6);
    assert!(!store.can_sample(4));
    assert!(matches!(
        store.sample_latent_window(4, &mut rng),
        Err(StoreError::InsufficientData { window: 4, .. })
    ));

    // An opening record alone is not a valid window end.
    store.reset_episode(&[1.0, 1.0]).unwrap();
    assert!(store.sample_latent_window(1, &mut rng).is_err());

    store.append(&[0.0], 0.0, false, &[2.0, 1.0], false).unwrap();
    assert!(store.can_sample(4));
    assert!(store.sample_latent_window(1, &mut rng).is_ok());
}

#[test]
fn test_append_without_episode_fails() {
    let mut store = SequenceStore::new(10, 2, 1, 4, 2).unwrap();
    assert_eq!(
        store.append(&[0.0], 0.0, false, &[1.0, 1.0], false),
        Err(StoreError::EpisodeNotStarted)
    );

    store.reset_episode(&[1.0, 1.0]).unwrap();
    store.append(&[0.0], 0.0, true, &[1.0, 1.0], true).unwrap();
    assert!(!store.episode_open());
    assert_eq!(
        store.append(&[0.0], 0.0, false, &[1.0, 1.0], false),
        Err(StoreError::EpisodeNotStarted)
    );
}

#[test]
fn test_dimension_mismatch_rejected() {
    let mut store = SequenceStore::new(10, 2, 1, 4, 2).unwrap();
    assert!(matches!(
        store.reset_episode(&[1.0]),
        Err(StoreError::DimensionMismatch { field: "observation", .. })
    ));
    store.reset_episode(&[1.0, 1.0]).unwrap();
    assert!(matches!(
        store.append(&[0.0, 1.0], 0.0, false, &[1.0, 1.0], false),
        Err(StoreError::DimensionMismatch { field: "action", .. })
    ));
}

#[test]
fn test_window_longer_than_capacity_rejected() {
    assert!(matches!(
        SequenceStore::new(5, 2, 1, 5, 2),
        Err(StoreError::InvalidWindow { window: 5, capacity: 5 })
    ));
    assert!(SequenceStore::new(5, 2, 1, 4, 0).is_err());
}

#[test]
fn test_sampling_is_reproducible() {
    let mut store = SequenceStore::new(64, 2, 1, 4, 2).unwrap();
    fill_store(&mut store, 60, 9);

    let a = store.sample_latent_window(8, &mut TrainRng::seed_from(9)).unwrap();
    let b = store.sample_latent_window(8, &mut TrainRng::seed_from(9)).unwrap();
    assert_eq!(a, b);
}

proptest! {
    #[test]
    fn prop_windows_respect_cursor_and_episodes(
        capacity in 8usize..48,
        transitions in 1usize..150,
        episode_len in 1usize..20,
        window in 1usize..7,
        seed in any::<u64>(),
    ) {
        prop_assume!(window < capacity);
        let mut store = SequenceStore::new(capacity, 3, 2, window, 1).unwrap();
        fill_store(&mut store, transitions, episode_len);

        let mut rng = TrainRng::seed_from(seed);
        match store.sample_window(window, 6, &mut rng) {
            Ok(batch) => {
                prop_assert_eq!(batch.observations.len(), 6 * (window + 1) * 3);
                prop_assert_eq!(batch.actions.len(), 6 * window * 2);
                assert_single_episode(&batch, store.total_written(), capacity);
            }
            Err(StoreError::InsufficientData { .. }) => prop_assert!(!store.can_sample(window)),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

// =============================================================================
// OBSERVATION HISTORY
// =============================================================================

#[test]
fn test_history_reset_pads_with_zeros() {
    let num_sequences = 8;
    let mut history = ObservationHistory::new(num_sequences, 2, 1);
    history.reset_episode(&[1.0, 1.0]).unwrap();

    for n in 0..num_sequences - 1 {
        let obs = history.observations();
        let actions = history.actions();
        let padded = num_sequences - 1 - n;

        assert_eq!(obs.len(), num_sequences * 2);
        assert_eq!(actions.len(), (num_sequences - 1) * 1);
        assert!(obs[..padded * 2].iter().all(|&v| v == 0.0));
        assert!(obs[padded * 2..].iter().all(|&v| v != 0.0));
        // Actions are padded identically: one fewer real action than frames.
        assert!(actions[..padded].iter().all(|&v| v == 0.0));
        assert!(actions[padded..].iter().all(|&v| v != 0.0));

        history.append(&[2.0 + n as f32, 1.0], &[0.5]).unwrap();
    }
}

#[test]
fn test_history_rolls_oldest_out() {
    let mut history = ObservationHistory::new(3, 1, 1);
    history.reset_episode(&[1.0]).unwrap();
    for v in 2..=5 {
        history.append(&[v as f32], &[v as f32 * 10.0]).unwrap();
    }
    assert_eq!(history.observations(), vec![3.0, 4.0, 5.0]);
    assert_eq!(history.actions(), vec![40.0, 50.0]);

    history.reset_episode(&[9.0]).unwrap();
    assert_eq!(history.observations(), vec![0.0, 0.0, 9.0]);
    assert_eq!(history.actions(), vec![0.0, 0.0]);
}

#[test]
fn test_history_append_before_reset_fails() {
    let mut history = ObservationHistory::new(3, 1, 1);
    assert_eq!(history.append(&[1.0], &[0.0]), Err(StoreError::EpisodeNotStarted));
}
