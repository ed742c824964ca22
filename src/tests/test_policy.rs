use std::collections::BTreeSet;

use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::PallasError;
use crate::policy::{build_policy, greedy_action, PolicyKind};

const ALL_KINDS: [PolicyKind; 9] = [
    PolicyKind::Greedy,
    PolicyKind::EpsilonGreedy,
    PolicyKind::NoisyNextBest,
    PolicyKind::Sampled,
    PolicyKind::EntropyGreedy,
    PolicyKind::EntropyNoisyNextBest,
    PolicyKind::Multinomial,
    PolicyKind::OuNoise,
    PolicyKind::Mcts,
];

#[test]
fn test_epsilon_decay_from_params() {
    let mut policy = build_policy(
        PolicyKind::EpsilonGreedy,
        "epsilonInitial = 0.2, epsilonDecayRate = 0.999, epsilonMin = 0.01",
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let values = array![0.3, 0.1, 0.7];
    let available = BTreeSet::from([0, 1, 2]);
    for _ in 0..1000 {
        policy.select(values.view(), &available, &mut rng).unwrap();
    }
    let epsilon = policy.exploration_rate().unwrap();
    assert!((epsilon - 0.2 * 0.999f32.powi(1000)).abs() < 1e-4);
    assert!((epsilon - 0.0736).abs() < 1e-3);
}

#[test]
fn test_linear_decay_stops_at_floor() {
    let mut policy = build_policy(
        PolicyKind::EpsilonGreedy,
        "epsilonInitial = 1.0, epsilonMin = 0.2, linearDecay = true, epsilonDecayStep = 0.1",
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(2);
    let values = array![1.0, 0.0];
    let available = BTreeSet::from([0, 1]);
    for _ in 0..3 {
        policy.select(values.view(), &available, &mut rng).unwrap();
    }
    assert!((policy.exploration_rate().unwrap() - 0.7).abs() < 1e-5);
    for _ in 0..20 {
        policy.select(values.view(), &available, &mut rng).unwrap();
    }
    assert!((policy.exploration_rate().unwrap() - 0.2).abs() < 1e-6);
}

#[test]
fn test_decay_by_episode() {
    let mut policy = build_policy(
        PolicyKind::EpsilonGreedy,
        "epsilonInitial = 0.5, epsilonDecayRate = 0.5, epsilonMin = 0.0, epsilonDecayByEpisode = true",
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..10 {
        policy
            .select(array![0.0, 1.0].view(), &BTreeSet::from([0, 1]), &mut rng)
            .unwrap();
    }
    assert_eq!(policy.exploration_rate(), Some(0.5));
    policy.end_episode(&[1.0]);
    assert_eq!(policy.exploration_rate(), Some(0.25));
}

#[test]
fn test_greedy_is_deterministic() {
    let mut policy = build_policy(PolicyKind::Greedy, "").unwrap();
    let values = array![0.4, 2.0, -1.0, 2.0];
    let available = BTreeSet::from([0, 2, 3]);
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        assert_eq!(policy.select(values.view(), &available, &mut rng).unwrap(), 3);
    }
    assert_eq!(policy.greedy(values.view(), &available).unwrap(), 3);
    assert_eq!(greedy_action(values.view(), &BTreeSet::from([1, 3])).unwrap(), 1);
}

#[test]
fn test_every_policy_stays_in_available_set() {
    let values = array![0.9, -0.5, 0.3, 0.3, 2.0, 0.0];
    let available = BTreeSet::from([1, 2, 3, 5]);
    for kind in ALL_KINDS {
        let mut policy = build_policy(kind, "").unwrap();
        assert_eq!(policy.kind(), kind);
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let action = policy.select(values.view(), &available, &mut rng).unwrap();
            assert!(available.contains(&action), "{:?} chose {}", kind, action);
        }
        // the unavailable best action is never the greedy pick either
        assert_eq!(policy.greedy(values.view(), &available).unwrap(), 2);
    }
}

#[test]
fn test_every_policy_rejects_empty_set() {
    let values = array![1.0, 2.0];
    for kind in ALL_KINDS {
        let mut policy = build_policy(kind, "").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = policy.select(values.view(), &BTreeSet::new(), &mut rng).unwrap_err();
        assert!(matches!(err, PallasError::Protocol { .. }), "{:?}", kind);
    }
}

#[test]
fn test_single_action_is_always_chosen() {
    let values = array![5.0, -3.0, 1.0];
    let only = BTreeSet::from([1]);
    for kind in ALL_KINDS {
        let mut policy = build_policy(kind, "").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(policy.select(values.view(), &only, &mut rng).unwrap(), 1);
        }
    }
}

#[test]
fn test_policy_keys_are_not_shared() {
    assert!(build_policy(PolicyKind::Greedy, "epsilonInitial = 0.3").is_err());
    assert!(build_policy(PolicyKind::NoisyNextBest, "initialExplorationNoise = 0.5").is_ok());
    assert!(build_policy(PolicyKind::OuNoise, "theta = 0.15, sigma = 0.3").is_ok());
    assert!(build_policy(PolicyKind::Mcts, "cPUCT = 1.5, resetCycle = 10").is_ok());
    assert!(build_policy(PolicyKind::EntropyGreedy, "asSoftMax = false").is_ok());
    assert!(build_policy(PolicyKind::EpsilonGreedy, "epsilonInitial = 1.5").is_err());
}
