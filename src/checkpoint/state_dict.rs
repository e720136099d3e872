use std::collections::BTreeMap;

/// A dense f32 tensor copied out of a checkpoint, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        NamedTensor { shape, values }
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }
}

/// Parameter dictionary keyed by tensor name.
///
/// Iteration is in lexicographic key order, which is the order architecture
/// inference relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, NamedTensor>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: NamedTensor) -> Option<NamedTensor> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedTensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Entries whose name starts with `prefix`, in sorted order.
    pub fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a NamedTensor)> + 'a {
        self.iter().filter(move |(name, _)| name.starts_with(prefix))
    }
}

impl FromIterator<(String, NamedTensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, NamedTensor)>>(iter: I) -> Self {
        StateDict {
            tensors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(v: f32) -> NamedTensor {
        NamedTensor::new(vec![1], vec![v])
    }

    #[test]
    fn test_iteration_is_lexicographic() {
        let mut dict = StateDict::new();
        dict.insert("actor.2.weight", scalar(2.0));
        dict.insert("actor.10.weight", scalar(10.0));
        dict.insert("actor.0.weight", scalar(0.0));

        let keys: Vec<&str> = dict.keys().collect();
        assert_eq!(keys, ["actor.0.weight", "actor.10.weight", "actor.2.weight"]);
    }

    #[test]
    fn test_with_prefix_filters() {
        let dict: StateDict = [
            ("actor.0.weight".to_string(), scalar(1.0)),
            ("critic.0.weight".to_string(), scalar(2.0)),
            ("std".to_string(), scalar(3.0)),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = dict.with_prefix("actor.").map(|(n, _)| n).collect();
        assert_eq!(names, ["actor.0.weight"]);
        assert!(dict.contains("std"));
        assert_eq!(dict.len(), 3);
    }
}
