use serde::{Deserialize, Serialize};

use crate::error::{PallasError, Result};

/// Step rule of a decaying exploration parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Decay {
    /// v ← max(floor, v · rate)
    Exponential { rate: f32 },
    /// v ← max(floor, v − step)
    Linear { step: f32 },
}

impl Decay {
    fn apply(&self, value: f32) -> f32 {
        match *self {
            Decay::Exponential { rate } => value * rate,
            Decay::Linear { step } => value - step,
        }
    }
}

/// A value that shrinks toward a floor one step at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayingValue {
    initial: f32,
    floor: f32,
    current: f32,
    decay: Decay,
    steps: usize,
}

impl DecayingValue {
    pub fn new(name: &str, initial: f32, floor: f32, decay: Decay) -> Result<Self> {
        if !(initial.is_finite() && floor.is_finite()) || initial < floor {
            return Err(PallasError::invalid_parameter(
                name.to_string(),
                format!("initial value {} must not be below its floor {}", initial, floor),
            ));
        }
        let valid = match decay {
            Decay::Exponential { rate } => rate > 0.0 && rate <= 1.0,
            Decay::Linear { step } => step >= 0.0,
        };
        if !valid {
            return Err(PallasError::invalid_parameter(
                name.to_string(),
                format!("invalid decay {:?}", decay),
            ));
        }
        Ok(DecayingValue {
            initial,
            floor,
            current: initial,
            decay,
            steps: 0,
        })
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn step(&mut self) {
        self.current = self.decay.apply(self.current).max(self.floor);
        self.steps += 1;
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.steps = 0;
    }

    /// Closed form of the value after `k` steps.
    pub fn evaluate(&self, k: usize) -> f32 {
        let v = match self.decay {
            Decay::Exponential { rate } => self.initial * rate.powi(k.min(i32::MAX as usize) as i32),
            Decay::Linear { step } => self.initial - step * k as f32,
        };
        v.max(self.floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay() {
        let mut v = DecayingValue::new("epsilon", 0.2, 0.01, Decay::Exponential { rate: 0.999 }).unwrap();
        for _ in 0..1000 {
            v.step();
        }
        assert!((v.value() - 0.0736).abs() < 1e-3);
        assert!((v.value() - v.evaluate(1000)).abs() < 1e-4);
    }

    #[test]
    fn closed_form_survives_huge_step_counts() {
        let v = DecayingValue::new("epsilon", 0.5, 0.05, Decay::Exponential { rate: 0.9 }).unwrap();
        assert_eq!(v.evaluate(usize::MAX), 0.05);
        assert_eq!(v.evaluate(i32::MAX as usize + 1), 0.05);
        let flat = DecayingValue::new("epsilon", 0.5, 0.05, Decay::Exponential { rate: 1.0 }).unwrap();
        assert_eq!(flat.evaluate(usize::MAX), 0.5);
    }

    #[test]
    fn linear_decay_stops_at_floor() {
        let mut v = DecayingValue::new("epsilon", 1.0, 0.5, Decay::Linear { step: 0.2 }).unwrap();
        v.step();
        assert!((v.value() - 0.8).abs() < 1e-6);
        for _ in 0..10 {
            v.step();
        }
        assert_eq!(v.value(), 0.5);
        v.reset();
        assert_eq!(v.value(), 1.0);
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(DecayingValue::new("epsilon", 0.1, 0.2, Decay::Exponential { rate: 0.9 }).is_err());
        assert!(DecayingValue::new("epsilon", 0.3, 0.2, Decay::Exponential { rate: 1.5 }).is_err());
    }
}
