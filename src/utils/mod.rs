//! # Utility Functions (`utils`)
//!
//! Trainer checkpoints and data-parallel gradient aggregation.

pub mod serialization;
pub mod parallel;

pub use serialization::{detect_name, load_state, load_trainer, save_state};
pub use parallel::{aggregate_gradients, average_gradients};
