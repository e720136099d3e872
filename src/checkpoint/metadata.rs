use candle_core::pickle::Object;
use serde::Serialize;

/// Training metadata stored beside the parameters in a checkpoint dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingMetadata {
    /// Training iteration (`iter`) the checkpoint was taken at.
    pub iteration: Option<i64>,
    /// Free-form `infos` entry, rendered Python-style.
    pub infos: Option<String>,
}

impl TrainingMetadata {
    /// Extract `iter` and `infos` from the checkpoint's root object. Anything
    /// that is not a dictionary carries no metadata.
    pub fn from_root(root: &Object) -> Self {
        let Object::Dict(entries) = root else {
            return Self::default();
        };
        let mut metadata = TrainingMetadata::default();
        for (key, value) in entries {
            match key {
                Object::Unicode(k) if k == "iter" => {
                    if let Object::Int(i) = value {
                        metadata.iteration = Some(i64::from(*i));
                    }
                }
                Object::Unicode(k) if k == "infos" => {
                    if !matches!(value, Object::None) {
                        metadata.infos = Some(render(value));
                    }
                }
                _ => {}
            }
        }
        metadata
    }
}

/// Short Python-like rendering of an unpickled value.
pub(crate) fn render(obj: &Object) -> String {
    match obj {
        Object::Int(i) => i.to_string(),
        Object::Float(f) => f.to_string(),
        Object::Bool(true) => "True".to_string(),
        Object::Bool(false) => "False".to_string(),
        Object::None => "None".to_string(),
        Object::Unicode(s) => format!("'{s}'"),
        Object::List(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Object::Tuple(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("({})", items.join(", "))
        }
        Object::Dict(entries) => {
            let items: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render(k), render(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        Object::Class {
            module_name,
            class_name,
        } => format!("<class {module_name}.{class_name}>"),
        _ => "<object>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Object {
        Object::Unicode(s.to_string())
    }

    #[test]
    fn test_reads_iter_and_infos() {
        let root = Object::Dict(vec![
            (key("iter"), Object::Int(1500)),
            (
                key("infos"),
                Object::Dict(vec![(key("env"), key("go2_flat"))]),
            ),
        ]);
        let meta = TrainingMetadata::from_root(&root);
        assert_eq!(meta.iteration, Some(1500));
        assert_eq!(meta.infos.as_deref(), Some("{'env': 'go2_flat'}"));
    }

    #[test]
    fn test_none_infos_is_absent() {
        let root = Object::Dict(vec![(key("infos"), Object::None)]);
        let meta = TrainingMetadata::from_root(&root);
        assert_eq!(meta, TrainingMetadata::default());
    }

    #[test]
    fn test_non_dict_root_has_no_metadata() {
        let meta = TrainingMetadata::from_root(&Object::List(vec![]));
        assert!(meta.iteration.is_none());
        assert!(meta.infos.is_none());
    }
}
