//! Handwritten digit recognizer for 20x20 pixel grids.
//!
//! A single-hidden-layer sigmoid network trained one example at a time,
//! with JSON persistence of its parameters.

pub mod math;
pub mod activation;
pub mod network;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use error::{Error, Result};
pub use network::model::{JsonFileStore, MemoryStore, ModelStore, PersistedModel};
pub use network::network::{
    load_or_initialize, EngineConfig, ForwardPass, InitSource, Label, Network, TrainingExample,
    DEFAULT_HIDDEN_UNITS, DEFAULT_MODEL_PATH, LEARNING_RATE,
};
pub use network::parameters::{Parameters, INIT_EPSILON, INPUT_SIZE, OUTPUT_SIZE};
