mod loader;
mod metadata;
mod state_dict;

pub use loader::{Checkpoint, CheckpointKind, STATE_DICT_KEYS};
pub use metadata::TrainingMetadata;
pub use state_dict::{NamedTensor, StateDict};
