use std::collections::BTreeSet;

use ndarray::array;

use crate::algorithms::{build_algorithm, AlgorithmKind, AlgorithmSetup, LearningAlgorithm, MctsLearning, QTarget};
use crate::environment::EnvironmentState;
use crate::estimator::{
    ApproximatorKind, EstimatorConfig, FunctionApproximator, FunctionEstimator, TabularApproximator, UpdateMode,
};
use crate::params::ParamSet;
use crate::transition::Transition;

fn setup(approximator: ApproximatorKind) -> AlgorithmSetup {
    AlgorithmSetup {
        input_size: 2,
        action_count: 3,
        approximator,
        estimator: EstimatorConfig {
            learning_rate: 0.5,
            ..EstimatorConfig::default()
        },
        memory: ParamSet::empty("memory"),
        seed: 5,
    }
}

fn params(kind: AlgorithmKind, text: &str) -> ParamSet {
    ParamSet::parse("algorithm", text, kind.param_defs()).unwrap()
}

fn state(x: f32) -> EnvironmentState {
    EnvironmentState::new(array![x, 1.0], BTreeSet::from([0, 1, 2]))
}

#[test]
fn test_build_every_kind() {
    let kinds = [
        AlgorithmKind::QLearning,
        AlgorithmKind::Dqn,
        AlgorithmKind::DoubleDqn,
        AlgorithmKind::Sarsa,
        AlgorithmKind::ActorCritic,
        AlgorithmKind::Reinforce,
        AlgorithmKind::Ppo,
        AlgorithmKind::Mcts,
        AlgorithmKind::Ddpg,
        AlgorithmKind::SacDiscrete,
    ];
    for kind in kinds {
        let algorithm = build_algorithm(kind, &ParamSet::empty("algorithm"), &setup(ApproximatorKind::Tabular)).unwrap();
        assert_eq!(algorithm.kind(), kind);
        assert_eq!(algorithm.estimator().output_size(), 3);
        assert_eq!(algorithm.action_values(&state(0.0)).unwrap().len(), 3);
    }

    let small = ApproximatorKind::Neural {
        hidden_layers: vec![4],
        activation: crate::activations::Activation::Relu,
        optimizer: crate::optimizer::OptimizerKind::Sgd,
        loss: crate::loss::LossKind::Mse,
        dueling: false,
    };
    let dueling = build_algorithm(AlgorithmKind::DuelingDqn, &ParamSet::empty("algorithm"), &setup(small)).unwrap();
    assert_eq!(dueling.action_values(&state(0.0)).unwrap().len(), 3);
}

#[test]
fn test_estimator_wiring_per_kind() {
    let build = |kind| build_algorithm(kind, &ParamSet::empty("algorithm"), &setup(ApproximatorKind::Tabular)).unwrap();

    let q = build(AlgorithmKind::QLearning);
    assert_eq!(q.estimator().mode(), UpdateMode::Online);
    assert!(!q.estimator().has_target());

    let dqn = build(AlgorithmKind::Dqn);
    assert_eq!(dqn.estimator().mode(), UpdateMode::Replay);
    assert!(dqn.estimator().has_target());

    let double = build(AlgorithmKind::DoubleDqn);
    assert_eq!(double.estimator().mode(), UpdateMode::Replay);
    assert!(double.estimator().has_target());

    // the actor of an actor/critic pair never has a target; its critics do
    for kind in [AlgorithmKind::Ddpg, AlgorithmKind::SacDiscrete] {
        assert!(kind.uses_target());
        let algorithm = build(kind);
        assert_eq!(algorithm.estimator().mode(), UpdateMode::Online);
        assert!(!algorithm.estimator().has_target());
    }
}

#[test]
fn test_ddpg_and_sac_learn_online() {
    for kind in [AlgorithmKind::Ddpg, AlgorithmKind::SacDiscrete] {
        let text = match kind {
            AlgorithmKind::Ddpg => "gamma = 0.9, entropyCoefficient = 0.0",
            _ => "gamma = 0.9, softQAlpha = 0.5, autoSoftAlpha = false",
        };
        let mut algorithm = build_algorithm(kind, &params(kind, text), &setup(ApproximatorKind::Tabular)).unwrap();
        let before = algorithm.action_values(&state(0.0)).unwrap();
        assert!((before.sum() - 1.0).abs() < 1e-5);
        let loss = algorithm
            .observe(Transition::new(state(0.0), 2, 1.0, state(1.0), true))
            .unwrap();
        assert!(loss.map_or(false, f32::is_finite));
        let after = algorithm.action_values(&state(0.0)).unwrap();
        assert!(after[2] > before[2], "{:?}: {:?}", kind, after);
        assert!(algorithm.end_episode().unwrap().is_none());
    }

    let bad_alpha = params(AlgorithmKind::SacDiscrete, "softQAlpha = 0.0");
    assert!(build_algorithm(AlgorithmKind::SacDiscrete, &bad_alpha, &setup(ApproximatorKind::Tabular)).is_err());
    let bad_rate = params(AlgorithmKind::SacDiscrete, "alphaLearningRate = -1.0");
    assert!(build_algorithm(AlgorithmKind::SacDiscrete, &bad_rate, &setup(ApproximatorKind::Tabular)).is_err());
}

#[test]
fn test_zero_actions_rejected() {
    let mut no_actions = setup(ApproximatorKind::Tabular);
    no_actions.action_count = 0;
    assert!(build_algorithm(AlgorithmKind::QLearning, &ParamSet::empty("algorithm"), &no_actions).is_err());
}

#[test]
fn test_double_q_target() {
    let next = EnvironmentState::new(array![1.0], BTreeSet::from([0, 1]));
    let mut table = TabularApproximator::new(1, 2);
    table.insert(next.features.view(), array![10.0, 20.0]).unwrap();
    let mut estimator = FunctionEstimator::new(Box::new(table), EstimatorConfig::default()).with_target();

    // live now prefers action 0 while the target still prefers action 1
    let mut live = TabularApproximator::new(1, 2);
    live.insert(next.features.view(), array![1.0, 0.0]).unwrap();
    estimator.load_parameters(&live.parameters()).unwrap();

    let step = Transition::new(
        EnvironmentState::new(array![0.0], BTreeSet::from([0, 1])),
        0,
        1.0,
        next.clone(),
        false,
    );
    assert_eq!(QTarget::new(0.5, true).td_target(&estimator, &step).unwrap(), 6.0);
    assert_eq!(QTarget::new(0.5, false).td_target(&estimator, &step).unwrap(), 11.0);

    let terminal = Transition::new(step.state.clone(), 0, 1.0, next, true);
    assert_eq!(QTarget::new(0.5, true).td_target(&estimator, &terminal).unwrap(), 1.0);
}

#[test]
fn test_q_learning_learns_online() {
    let mut algorithm = build_algorithm(
        AlgorithmKind::QLearning,
        &params(AlgorithmKind::QLearning, "gamma = 0.9"),
        &setup(ApproximatorKind::Tabular),
    )
    .unwrap();
    let loss = algorithm
        .observe(Transition::new(state(0.0), 2, 1.0, state(1.0), true))
        .unwrap();
    assert!(loss.is_some());
    assert_eq!(algorithm.action_values(&state(0.0)).unwrap(), array![0.0, 0.0, 0.5]);
}

#[test]
fn test_reinforce_learns_at_episode_end() {
    let mut algorithm = build_algorithm(
        AlgorithmKind::Reinforce,
        &params(AlgorithmKind::Reinforce, "gamma = 1.0, entropyCoefficient = 0.0"),
        &setup(ApproximatorKind::Tabular),
    )
    .unwrap();
    let before = algorithm.action_values(&state(0.0)).unwrap();
    assert!((before.sum() - 1.0).abs() < 1e-5);

    assert!(algorithm
        .observe(Transition::new(state(0.0), 1, 1.0, state(1.0), true))
        .unwrap()
        .is_none());
    assert_eq!(algorithm.action_values(&state(0.0)).unwrap(), before);

    assert!(algorithm.end_episode().unwrap().is_some());
    let after = algorithm.action_values(&state(0.0)).unwrap();
    assert!(after[1] > before[1]);
    assert!(algorithm.end_episode().unwrap().is_none());
}

#[test]
fn test_actor_critic_and_ppo_losses() {
    let mut actor_critic = build_algorithm(
        AlgorithmKind::ActorCritic,
        &ParamSet::empty("algorithm"),
        &setup(ApproximatorKind::Tabular),
    )
    .unwrap();
    let step = Transition::new(state(0.0), 0, 1.0, state(1.0), false);
    assert!(actor_critic.observe(step.clone()).unwrap().is_some());

    let mut ppo = build_algorithm(
        AlgorithmKind::Ppo,
        &params(AlgorithmKind::Ppo, "updateEpochs = 2, ppoEpsilon = 0.1"),
        &setup(ApproximatorKind::Tabular),
    )
    .unwrap();
    assert!(ppo.observe(step).unwrap().is_none());
    let loss = ppo.end_episode().unwrap();
    assert!(loss.map_or(false, f32::is_finite));

    assert!(build_algorithm(
        AlgorithmKind::Ppo,
        &params(AlgorithmKind::Ppo, "updateEpochs = 0"),
        &setup(ApproximatorKind::Tabular),
    )
    .is_err());
}

/// A cut-short episode rewarding action 0, then a terminal episode punishing
/// action 1 from another state.
fn two_episodes(algorithm: &mut dyn LearningAlgorithm) {
    algorithm
        .observe(Transition::new(state(0.0), 0, 1.0, state(5.0), false))
        .unwrap();
    algorithm.episode_boundary().unwrap();
    algorithm
        .observe(Transition::new(state(5.0), 1, -10.0, state(6.0), true))
        .unwrap();
    algorithm.episode_boundary().unwrap();
}

#[test]
fn test_deferred_returns_stay_inside_their_episode() {
    for (kind, text) in [
        (AlgorithmKind::Reinforce, "gamma = 1.0, entropyCoefficient = 0.0"),
        (AlgorithmKind::Ppo, "gamma = 1.0, entropyCoefficient = 0.0"),
    ] {
        let mut algorithm = build_algorithm(kind, &params(kind, text), &setup(ApproximatorKind::Tabular)).unwrap();
        two_episodes(algorithm.as_mut());
        assert!(algorithm.end_episode().unwrap().is_some());
        // the truncated episode earned +1 on its own
        let probabilities = algorithm.action_values(&state(0.0)).unwrap();
        assert!(probabilities[0] > 1.0 / 3.0, "{:?}: {:?}", kind, probabilities);
    }

    let table = |outputs| {
        FunctionEstimator::new(
            Box::new(TabularApproximator::new(2, outputs)),
            EstimatorConfig {
                learning_rate: 0.5,
                ..EstimatorConfig::default()
            },
        )
    };
    let mut mcts = MctsLearning::new(table(3), table(1), 1.0);
    two_episodes(&mut mcts);
    mcts.end_episode().unwrap();
    assert_eq!(mcts.value_estimator().predict(&state(0.0)).unwrap(), array![0.5]);
    assert_eq!(mcts.value_estimator().predict(&state(5.0)).unwrap(), array![-5.0]);
}
