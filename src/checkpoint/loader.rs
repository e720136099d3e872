use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use candle_core::pickle::{Object, PthTensors, Stack};
use candle_core::DType;
use tracing::debug;

use crate::checkpoint::metadata::TrainingMetadata;
use crate::checkpoint::state_dict::{NamedTensor, StateDict};
use crate::error::CheckpointError;

/// Root-dictionary keys that hold the policy's parameters, in lookup order.
pub const STATE_DICT_KEYS: [&str; 3] = ["model_state_dict", "actor_critic", "policy"];

/// How a checkpoint stores its parameters, resolved once when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointKind {
    /// Root dictionary with the parameters nested under `key`.
    StateDict { key: &'static str },
    /// Root object is the model itself rather than a dictionary. `class` is
    /// the pickled type when the root names one.
    DirectModel { class: Option<String> },
    /// Root dictionary without any of [`STATE_DICT_KEYS`].
    Unrecognized { keys: Vec<String> },
}

impl CheckpointKind {
    fn classify(root: &Object) -> Self {
        let Object::Dict(entries) = root else {
            return CheckpointKind::DirectModel {
                class: root_class(root),
            };
        };
        let mut keys: Vec<String> = entries
            .iter()
            .filter_map(|(k, _)| match k {
                Object::Unicode(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        match STATE_DICT_KEYS
            .iter()
            .find(|wanted| keys.iter().any(|k| k == *wanted))
        {
            Some(key) => CheckpointKind::StateDict { key: *key },
            None => {
                keys.sort();
                CheckpointKind::Unrecognized { keys }
            }
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::StateDict { key } => write!(f, "state dict under '{key}'"),
            CheckpointKind::DirectModel { class: Some(class) } => {
                write!(f, "direct model ({class})")
            }
            CheckpointKind::DirectModel { class: None } => write!(f, "direct model"),
            CheckpointKind::Unrecognized { keys } => write!(f, "unrecognized (keys: {keys:?})"),
        }
    }
}

/// An opened PyTorch checkpoint archive.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    kind: CheckpointKind,
    metadata: TrainingMetadata,
}

impl Checkpoint {
    /// Open a checkpoint and classify its root object.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        let root = read_root_object(path)?;
        let kind = CheckpointKind::classify(&root);
        let metadata = TrainingMetadata::from_root(&root);
        debug!(path = %path.display(), %kind, "opened checkpoint");
        Ok(Checkpoint {
            path: path.to_path_buf(),
            kind,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &CheckpointKind {
        &self.kind
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Read every tensor of the model's parameter dictionary as f32.
    pub fn state_dict(&self) -> Result<StateDict, CheckpointError> {
        let key = match &self.kind {
            CheckpointKind::StateDict { key } => Some(*key),
            CheckpointKind::DirectModel { .. } => None,
            CheckpointKind::Unrecognized { keys } => {
                return Err(CheckpointError::Unrecognized {
                    path: self.path.clone(),
                    keys: keys.clone(),
                })
            }
        };

        let tensors = PthTensors::new(&self.path, key).map_err(|e| CheckpointError::Pickle {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        // Only TorchScript roots expose their tensors without the module's code.
        if let CheckpointKind::DirectModel { class } = &self.kind {
            if tensors.tensor_infos().is_empty() {
                return Err(CheckpointError::DirectModel {
                    path: self.path.clone(),
                    class: class.clone().unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }

        let mut dict = StateDict::new();
        for name in tensors.tensor_infos().keys() {
            let tensor = tensors
                .get(name)
                .map_err(|e| tensor_error(name, e))?
                .ok_or_else(|| CheckpointError::Tensor {
                    name: name.clone(),
                    message: "listed in archive but not readable".to_string(),
                })?;
            dict.insert(name.clone(), to_named_tensor(name, &tensor)?);
        }
        debug!(tensors = dict.len(), "read state dict");
        Ok(dict)
    }
}

/// `module.Class` of a pickled object built by `NEWOBJ`/`REDUCE` (+ `BUILD`).
fn root_class(root: &Object) -> Option<String> {
    match root {
        Object::Class {
            module_name,
            class_name,
        } => Some(format!("{module_name}.{class_name}")),
        Object::Build { callable, .. } | Object::Reduce { callable, .. } => root_class(callable),
        _ => None,
    }
}

fn read_root_object(path: &Path) -> Result<Object, CheckpointError> {
    let archive_error = |source| CheckpointError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(archive_error)?;
    let pickle_name = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_owned)
        .ok_or_else(|| CheckpointError::MissingPickle(path.to_path_buf()))?;

    let entry = archive.by_name(&pickle_name).map_err(archive_error)?;
    let mut reader = BufReader::new(entry);
    let pickle_error = |e: candle_core::Error| CheckpointError::Pickle {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut stack = Stack::empty();
    stack.read_loop(&mut reader).map_err(pickle_error)?;
    stack.finalize().map_err(pickle_error)
}

fn to_named_tensor(
    name: &str,
    tensor: &candle_core::Tensor,
) -> Result<NamedTensor, CheckpointError> {
    let shape = tensor.dims().to_vec();
    let values = tensor
        .to_dtype(DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| tensor_error(name, e))?;
    Ok(NamedTensor::new(shape, values))
}

fn tensor_error(name: &str, err: candle_core::Error) -> CheckpointError {
    CheckpointError::Tensor {
        name: name.to_string(),
        message: err.to_string(),
    }
}
