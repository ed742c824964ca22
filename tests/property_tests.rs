#[cfg(test)]
mod property_tests {
    use std::collections::BTreeSet;

    use ndarray::Array1;
    use pallas::activations::softmax;
    use pallas::environment::EnvironmentState;
    use pallas::memory::{FifoMemory, Memory};
    use pallas::policy::{greedy_action, Decay, DecayingValue};
    use pallas::transition::Transition;
    use proptest::prelude::*;

    fn transition(reward: f32) -> Transition {
        let state = EnvironmentState::new(Array1::from(vec![reward]), BTreeSet::from([0]));
        Transition::new(state.clone(), 0, reward, state, false)
    }

    proptest! {
        #[test]
        fn test_greedy_stays_in_available_set(
            values in prop::collection::vec(-100.0f32..100.0, 1..12),
            mask in prop::collection::vec(any::<bool>(), 12),
        ) {
            let mut available: BTreeSet<usize> = (0..values.len()).filter(|&i| mask[i]).collect();
            if available.is_empty() {
                available.insert(values.len() - 1);
            }
            let values = Array1::from(values);
            let action = greedy_action(values.view(), &available).unwrap();
            prop_assert!(available.contains(&action));
            // no available action beats the chosen one
            for &other in &available {
                prop_assert!(values[other] <= values[action]);
            }
        }

        #[test]
        fn test_fifo_len_is_bounded(capacity in 1usize..50, adds in 0usize..200) {
            let mut memory = FifoMemory::new(capacity).unwrap();
            for i in 0..adds {
                memory.add(transition(i as f32));
            }
            prop_assert_eq!(memory.len(), adds.min(capacity));
            if adds > 0 {
                // newest entry is always last
                let newest = memory.get(memory.len() - 1).unwrap().reward;
                prop_assert_eq!(newest, (adds - 1) as f32);
            }
        }

        #[test]
        fn test_exponential_decay_matches_closed_form(
            initial in 0.1f32..1.0,
            floor in 0.0f32..0.1,
            rate in 0.5f32..1.0,
            steps in 0usize..300,
        ) {
            let mut value = DecayingValue::new("epsilon", initial, floor, Decay::Exponential { rate }).unwrap();
            for _ in 0..steps {
                value.step();
            }
            let expected = (initial * rate.powi(steps as i32)).max(floor);
            prop_assert!((value.value() - expected).abs() < 1e-4);
            prop_assert!((value.evaluate(steps) - expected).abs() < 1e-4);
            prop_assert!(value.value() >= floor);
        }

        #[test]
        fn test_softmax_is_a_distribution(values in prop::collection::vec(-50.0f32..50.0, 1..16)) {
            let probabilities = softmax(Array1::from(values).view());
            prop_assert!((probabilities.sum() - 1.0).abs() < 1e-4);
            prop_assert!(probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }
}
