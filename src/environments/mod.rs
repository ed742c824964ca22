//! Demonstration environments.
//!
//! - [`TspEnvironment`]: travelling salesman tours over seeded random cities
//! - [`MazeEnvironment`]: a continuing walk through a generated maze

pub mod maze;
pub mod tsp;

pub use maze::MazeEnvironment;
pub use tsp::TspEnvironment;
