//! # Activation Functions Module
//!
//! Element-wise non-linearities applied after each dense layer. Hidden layers
//! of value and policy networks default to ReLU; output layers stay
//! [`Activation::Linear`] so values are unbounded and policy logits can be
//! normalised with a softmax by the algorithm that reads them.
//!
//! ```rust
//! use pallas::activations::Activation;
//! use ndarray::array;
//!
//! let mut batch = array![[1.0, -0.5], [0.0, 2.0]];
//! Activation::Relu.apply_batch(&mut batch);
//! assert_eq!(batch, array![[1.0, 0.0], [0.0, 2.0]]);
//! ```

pub mod functions;

pub use functions::{softmax, Activation};
