use std::path::PathBuf;

/// Errors that can occur while opening and reading a checkpoint archive.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read checkpoint archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("no data.pkl entry in checkpoint archive {0}")]
    MissingPickle(PathBuf),

    #[error("failed to unpickle {path}: {message}")]
    Pickle { path: PathBuf, message: String },

    #[error(
        "cannot find model in checkpoint {path}; expected one of \
         'model_state_dict', 'actor_critic', 'policy' but found keys: {keys:?}"
    )]
    Unrecognized { path: PathBuf, keys: Vec<String> },

    #[error(
        "checkpoint {path} holds a pickled module ({class}) instead of a state dict; \
         re-save it with torch.save({{'model_state_dict': model.state_dict()}}, path) \
         or export it with torch.jit.script(model).save(path)"
    )]
    DirectModel { path: PathBuf, class: String },

    #[error("failed to read tensor '{name}': {message}")]
    Tensor { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reconstructing, tracing or verifying a policy.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("no model found: checkpoint has no weight tensors under prefix '{prefix}'")]
    NoModelFound { prefix: String },

    #[error("weight '{name}' has shape {shape:?}, expected a 2-D matrix")]
    NonMatrixWeight { name: String, shape: Vec<usize> },

    #[error(
        "inconsistent layer chain: '{previous}' outputs {produced} features \
         but '{next}' expects {expected} inputs"
    )]
    InconsistentLayerChain {
        previous: String,
        produced: usize,
        next: String,
        expected: usize,
    },

    #[error("shape mismatch for '{key}': network expects {expected:?}, checkpoint has {found:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("portable graph runtime error: {0}")]
    Runtime(String),

    #[error(
        "traced output does not match eager output \
         (max abs diff {max_abs_diff:e}, atol {atol:e}, rtol {rtol:e})"
    )]
    OutputMismatch {
        max_abs_diff: f32,
        atol: f32,
        rtol: f32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building the configuration diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum DiagnoseError {
    #[error("invalid action scale pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
