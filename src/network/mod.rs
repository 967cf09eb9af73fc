pub mod model;
pub mod network;
pub mod parameters;

pub use model::{JsonFileStore, MemoryStore, ModelStore, PersistedModel};
pub use network::{EngineConfig, ForwardPass, InitSource, Label, Network, TrainingExample};
pub use parameters::Parameters;
