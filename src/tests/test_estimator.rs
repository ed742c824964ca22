use std::collections::BTreeSet;

use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activations::Activation;
use crate::environment::EnvironmentState;
use crate::error::{PallasError, Result};
use crate::estimator::{
    ApproximatorKind, EstimatorConfig, FunctionApproximator, FunctionEstimator, NeuralApproximator, Parameters,
    TabularApproximator, TargetRule, UpdateMode, ESTIMATOR_PARAMS,
};
use crate::memory::FifoMemory;
use crate::optimizer::OptimizerKind;
use crate::params::ParamSet;
use crate::transition::Transition;

/// Regress the taken action straight onto the reward.
struct RewardTarget;

impl TargetRule for RewardTarget {
    fn targets(&self, estimator: &FunctionEstimator, batch: &[Transition]) -> Result<Vec<Array1<f32>>> {
        batch
            .iter()
            .map(|t| {
                let mut target = estimator.predict(&t.state)?;
                target[t.action] = t.reward;
                Ok(target)
            })
            .collect()
    }
}

fn state(x: f32) -> EnvironmentState {
    EnvironmentState::new(array![x, 0.0], BTreeSet::from([0, 1]))
}

fn transition(x: f32, reward: f32) -> Transition {
    Transition::new(state(x), 0, reward, state(x + 1.0), false)
}

fn tabular(config: EstimatorConfig) -> FunctionEstimator {
    FunctionEstimator::new(Box::new(TabularApproximator::new(2, 2)), config)
}

#[test]
fn test_online_update_touches_taken_action() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 0.5,
        ..EstimatorConfig::default()
    });
    assert_eq!(estimator.mode(), UpdateMode::Online);
    let report = estimator.update(transition(1.0, 1.0), &RewardTarget).unwrap().unwrap();
    assert_eq!(report.samples, 1);
    assert_eq!(estimator.predict(&state(1.0)).unwrap(), array![0.5, 0.0]);
    assert_eq!(estimator.update_count(), 1);
}

#[test]
fn test_hard_target_sync_every_n_updates() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 0.5,
        target_update_cycle: 3,
        ..EstimatorConfig::default()
    })
    .with_target();
    assert!(estimator.has_target());

    for _ in 0..2 {
        let report = estimator.update(transition(1.0, 1.0), &RewardTarget).unwrap().unwrap();
        assert!(!report.synchronized);
    }
    assert_eq!(estimator.predict(&state(1.0)).unwrap(), array![0.75, 0.0]);
    assert_eq!(estimator.predict_target(&state(1.0)).unwrap(), array![0.0, 0.0]);
    assert_ne!(estimator.target_parameters(), Some(estimator.clone_parameters()));

    let report = estimator.update(transition(1.0, 1.0), &RewardTarget).unwrap().unwrap();
    assert!(report.synchronized);
    assert_eq!(estimator.predict_target(&state(1.0)).unwrap(), array![0.875, 0.0]);
    assert_eq!(estimator.target_parameters(), Some(estimator.clone_parameters()));
}

#[test]
fn test_polyak_target_blend() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 0.5,
        target_update_cycle: 1,
        tau: 0.5,
        ..EstimatorConfig::default()
    })
    .with_target();
    estimator.update(transition(1.0, 1.0), &RewardTarget).unwrap();
    assert_eq!(estimator.predict(&state(1.0)).unwrap(), array![0.5, 0.0]);
    assert_eq!(estimator.predict_target(&state(1.0)).unwrap(), array![0.25, 0.0]);

    estimator.update(transition(1.0, 1.0), &RewardTarget).unwrap();
    // live 0.75, target 0.5·0.25 + 0.5·0.75
    assert_eq!(estimator.predict_target(&state(1.0)).unwrap(), array![0.5, 0.0]);
}

#[test]
fn test_predict_target_falls_back_to_live() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 1.0,
        ..EstimatorConfig::default()
    });
    estimator.update(transition(2.0, 3.0), &RewardTarget).unwrap();
    assert_eq!(
        estimator.predict_target(&state(2.0)).unwrap(),
        estimator.predict(&state(2.0)).unwrap()
    );
    assert_eq!(estimator.target_parameters(), None);
}

#[test]
fn test_replay_waits_for_a_full_batch() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 0.5,
        batch_size: 4,
        ..EstimatorConfig::default()
    })
    .with_memory(Box::new(FifoMemory::new(100).unwrap()))
    .with_seed(3);
    assert_eq!(estimator.mode(), UpdateMode::Replay);

    for i in 0..3 {
        assert!(estimator.update(transition(i as f32, 1.0), &RewardTarget).unwrap().is_none());
    }
    assert_eq!(estimator.memory_len(), 3);
    let report = estimator.update(transition(3.0, 1.0), &RewardTarget).unwrap().unwrap();
    assert_eq!(report.samples, 4);
    assert_eq!(estimator.memory_len(), 4);
    for i in 0..4 {
        assert_eq!(estimator.predict(&state(i as f32)).unwrap(), array![0.5, 0.0]);
    }
}

#[test]
fn test_replay_respects_min_samples_and_cycle() {
    let mut estimator = tabular(EstimatorConfig {
        batch_size: 2,
        min_samples: 5,
        update_cycle: 2,
        ..EstimatorConfig::default()
    })
    .with_memory(Box::new(FifoMemory::new(100).unwrap()))
    .with_seed(8);
    let trained: Vec<bool> = (0..9)
        .map(|i| {
            estimator
                .update(transition(i as f32, 1.0), &RewardTarget)
                .unwrap()
                .is_some()
        })
        .collect();
    // ready from the fifth store, then every second store
    assert_eq!(trained, vec![false, false, false, false, true, false, true, false, true]);
}

#[test]
fn test_width_mismatch_fails_fast() {
    let mut estimator = tabular(EstimatorConfig::default());
    let wide = EnvironmentState::new(array![1.0, 2.0, 3.0], BTreeSet::from([0]));
    assert!(matches!(estimator.predict(&wide), Err(PallasError::DimensionMismatch { .. })));

    let bad = Transition::new(wide.clone(), 0, 1.0, wide, true);
    assert!(matches!(
        estimator.update(bad, &RewardTarget),
        Err(PallasError::DimensionMismatch { .. })
    ));
    assert_eq!(estimator.update_count(), 0);
}

#[test]
fn test_snapshot_is_independent() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 1.0,
        ..EstimatorConfig::default()
    });
    let snapshot = estimator.snapshot();
    let published = estimator.published();
    estimator.update(transition(1.0, 4.0), &RewardTarget).unwrap();

    let features = state(1.0).features;
    assert_eq!(snapshot.predict(features.view()).unwrap(), array![0.0, 0.0]);
    assert_eq!(published.predict(features.view()).unwrap(), array![4.0, 0.0]);
    assert_eq!(estimator.snapshot().predict(features.view()).unwrap(), array![4.0, 0.0]);
}

#[test]
fn test_train_and_load_parameters() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 1.0,
        ..EstimatorConfig::default()
    });
    estimator.train(&[(array![1.0, 0.0], array![2.0, -2.0])]).unwrap();
    assert_eq!(estimator.predict(&state(1.0)).unwrap(), array![2.0, -2.0]);
    let saved = estimator.clone_parameters();

    estimator.train(&[(array![1.0, 0.0], array![0.0, 0.0])]).unwrap();
    estimator.load_parameters(&saved).unwrap();
    assert_eq!(estimator.predict(&state(1.0)).unwrap(), array![2.0, -2.0]);
    assert!(estimator.train(&[]).is_err());
}

#[test]
fn test_neural_regression_moves_toward_target() {
    let mut rng = StdRng::seed_from_u64(12);
    let network = NeuralApproximator::new(3, &[8], 2, Activation::Relu, OptimizerKind::Sgd, &mut rng).unwrap();
    let flat = network.parameters().flatten();
    assert_eq!(flat.len(), 3 * 8 + 8 + 8 * 2 + 2);
    assert!(matches!(network.parameters(), Parameters::Dense(ref layers) if layers.len() == 2));

    let mut estimator = FunctionEstimator::new(
        Box::new(network),
        EstimatorConfig {
            learning_rate: 0.05,
            ..EstimatorConfig::default()
        },
    );
    let features = array![0.5, -0.2, 0.1];
    let target = array![1.0, -1.0];
    let error = |estimator: &FunctionEstimator| {
        let prediction = estimator.predict_features(features.view()).unwrap();
        (&prediction - &target).mapv(|d| d * d).sum()
    };
    let before = error(&estimator);
    for _ in 0..200 {
        estimator.train(&[(features.clone(), target.clone())]).unwrap();
    }
    assert!(error(&estimator) < before);
    assert_eq!(estimator.update_count(), 200);
}

#[test]
fn test_flush_trains_a_partial_batch() {
    let mut estimator = tabular(EstimatorConfig {
        learning_rate: 1.0,
        batch_size: 8,
        ..EstimatorConfig::default()
    })
    .with_memory(Box::new(FifoMemory::new(100).unwrap()))
    .with_seed(4);
    for i in 0..3 {
        assert!(estimator.update(transition(i as f32, 2.0), &RewardTarget).unwrap().is_none());
    }
    let report = estimator.flush(&RewardTarget).unwrap().unwrap();
    assert_eq!(report.samples, 3);
    for i in 0..3 {
        assert_eq!(estimator.predict(&state(i as f32)).unwrap(), array![2.0, 0.0]);
    }
    // nothing new since the last step
    assert!(estimator.flush(&RewardTarget).unwrap().is_none());
}

#[test]
fn test_flush_still_honours_min_samples() {
    let mut estimator = tabular(EstimatorConfig {
        batch_size: 2,
        min_samples: 5,
        ..EstimatorConfig::default()
    })
    .with_memory(Box::new(FifoMemory::new(100).unwrap()));
    estimator.update(transition(0.0, 1.0), &RewardTarget).unwrap();
    assert!(estimator.flush(&RewardTarget).unwrap().is_none());
    assert_eq!(estimator.predict(&state(0.0)).unwrap(), array![0.0, 0.0]);
}

#[test]
fn test_config_rejects_unusable_values() {
    let parse = |text: &str| {
        ParamSet::parse("estimator", text, ESTIMATOR_PARAMS).and_then(|p| EstimatorConfig::from_params(&p))
    };
    assert!(matches!(parse("updateCycle = 0"), Err(PallasError::InvalidParameter { .. })));
    assert!(parse("tabularResolution = 0.0").is_err());
    assert!(parse("maxGradientNorm = -1.0").is_err());

    let config = parse("updateCycle = 3, tabularResolution = 0.01, maxGradientNorm = 5.0").unwrap();
    assert_eq!(config.update_cycle, 3);
    assert_eq!(config.tabular_resolution, 0.01);
    assert_eq!(config.max_gradient_norm, 5.0);
    assert_eq!(parse("").unwrap(), EstimatorConfig::default());
}

#[test]
fn test_built_table_uses_configured_resolution() {
    let config = EstimatorConfig {
        learning_rate: 1.0,
        tabular_resolution: 0.1,
        ..EstimatorConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(1);
    let table = ApproximatorKind::Tabular.build(2, 2, &config, &mut rng).unwrap();
    let mut estimator = FunctionEstimator::new(table, config);
    estimator.update(transition(1.0, 3.0), &RewardTarget).unwrap();
    // 1.02 rounds onto the same cell as 1.0
    assert_eq!(estimator.predict(&state(1.02)).unwrap(), array![3.0, 0.0]);
    assert_eq!(estimator.predict(&state(1.2)).unwrap(), array![0.0, 0.0]);
}
