//! Fixture writer producing PyTorch-compatible checkpoint archives.
//!
//! The output mirrors what `torch.save` emits: a zip archive holding
//! `archive/data.pkl` (pickle protocol 2) and one raw little-endian storage
//! per tensor under `archive/data/<n>`. Tensors are pickled through
//! `torch._utils._rebuild_tensor_v2` with persistent storage ids, so the
//! checkpoint reader is exercised on the real format.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::checkpoint::{NamedTensor, StateDict};

/// Where the parameter dictionary sits inside the pickled root object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLayout {
    /// `{key: {name: tensor, ..}, "iter": .., "infos": ..}`
    Nested(&'static str),
    /// `{name: tensor, ..}` with no wrapping dictionary.
    Flat,
    /// `torch.save(model)`: an instance of `module.Class` whose
    /// `_parameters` hold the tensors.
    Module(&'static str, &'static str),
}

/// Builds a checkpoint file from named f32 tensors.
#[derive(Debug, Clone)]
pub struct CheckpointBuilder {
    layout: RootLayout,
    tensors: Vec<(String, NamedTensor)>,
    iteration: Option<i32>,
    infos: Option<String>,
}

impl Default for CheckpointBuilder {
    fn default() -> Self {
        CheckpointBuilder {
            layout: RootLayout::Nested("model_state_dict"),
            tensors: Vec::new(),
            iteration: None,
            infos: None,
        }
    }
}

impl CheckpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(mut self, layout: RootLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn tensor(mut self, name: &str, shape: Vec<usize>, values: Vec<f32>) -> Self {
        self.tensors
            .push((name.to_string(), NamedTensor::new(shape, values)));
        self
    }

    pub fn state_dict(mut self, dict: &StateDict) -> Self {
        for (name, tensor) in dict.iter() {
            self.tensors.push((name.to_string(), tensor.clone()));
        }
        self
    }

    pub fn iteration(mut self, iteration: i32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn infos(mut self, infos: &str) -> Self {
        self.infos = Some(infos.to_string());
        self
    }

    /// Write the archive to `path`.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut pickle = PickleWriter::new();
        pickle.proto();
        match self.layout {
            RootLayout::Module(module, class) => self.write_module(&mut pickle, module, class),
            _ => self.write_root_dict(&mut pickle),
        }
        pickle.stop();

        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("archive/data.pkl", stored())?;
        zip.write_all(&pickle.into_bytes())?;
        for (storage, (_, tensor)) in self.tensors.iter().enumerate() {
            zip.start_file(format!("archive/data/{storage}"), stored())?;
            let bytes: Vec<u8> = tensor.values.iter().flat_map(|v| v.to_le_bytes()).collect();
            zip.write_all(&bytes)?;
        }
        zip.start_file("archive/version", stored())?;
        zip.write_all(b"3\n")?;
        zip.finish()?;
        Ok(())
    }

    fn write_root_dict(&self, pickle: &mut PickleWriter) {
        pickle.empty_dict();
        pickle.mark();
        match self.layout {
            RootLayout::Nested(key) => {
                pickle.unicode(key);
                self.write_tensor_dict(pickle);
                if let Some(iteration) = self.iteration {
                    pickle.unicode("iter");
                    pickle.int(iteration);
                }
                pickle.unicode("infos");
                match &self.infos {
                    Some(infos) => pickle.unicode(infos),
                    None => pickle.none(),
                }
            }
            _ => self.write_tensor_entries(pickle),
        }
        pickle.set_items();
    }

    /// `Class.__new__(Class)` followed by `BUILD` with the instance `__dict__`.
    fn write_module(&self, pickle: &mut PickleWriter, module: &str, class: &str) {
        pickle.global(module, class);
        pickle.empty_tuple();
        pickle.new_obj();
        pickle.empty_dict();
        pickle.mark();
        pickle.unicode("training");
        pickle.new_true();
        pickle.unicode("_parameters");
        self.write_tensor_dict(pickle);
        pickle.set_items();
        pickle.build();
    }

    fn write_tensor_dict(&self, pickle: &mut PickleWriter) {
        pickle.empty_dict();
        pickle.mark();
        self.write_tensor_entries(pickle);
        pickle.set_items();
    }

    fn write_tensor_entries(&self, pickle: &mut PickleWriter) {
        for (storage, (name, tensor)) in self.tensors.iter().enumerate() {
            pickle.unicode(name);
            pickle.tensor(&storage.to_string(), tensor);
        }
    }
}

/// Minimal pickle protocol 2 emitter covering the opcodes `torch.save` uses
/// for plain tensor dictionaries.
struct PickleWriter {
    buf: Vec<u8>,
}

impl PickleWriter {
    fn new() -> Self {
        PickleWriter { buf: Vec::new() }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn proto(&mut self) {
        self.buf.extend_from_slice(&[0x80, 2]);
    }

    fn stop(&mut self) {
        self.buf.push(b'.');
    }

    fn mark(&mut self) {
        self.buf.push(b'(');
    }

    fn tuple(&mut self) {
        self.buf.push(b't');
    }

    fn empty_tuple(&mut self) {
        self.buf.push(b')');
    }

    fn empty_dict(&mut self) {
        self.buf.push(b'}');
    }

    fn set_items(&mut self) {
        self.buf.push(b'u');
    }

    fn reduce(&mut self) {
        self.buf.push(b'R');
    }

    fn none(&mut self) {
        self.buf.push(b'N');
    }

    fn new_true(&mut self) {
        self.buf.push(0x88);
    }

    fn new_false(&mut self) {
        self.buf.push(0x89);
    }

    fn new_obj(&mut self) {
        self.buf.push(0x81);
    }

    fn build(&mut self) {
        self.buf.push(b'b');
    }

    fn binpersid(&mut self) {
        self.buf.push(b'Q');
    }

    fn global(&mut self, module: &str, name: &str) {
        self.buf.push(b'c');
        self.buf.extend_from_slice(module.as_bytes());
        self.buf.push(b'\n');
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(b'\n');
    }

    fn int(&mut self, value: i32) {
        if (0..256).contains(&value) {
            self.buf.push(b'K');
            self.buf.push(value as u8);
        } else {
            self.buf.push(b'J');
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn unicode(&mut self, value: &str) {
        self.buf.push(b'X');
        self.buf
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value.as_bytes());
    }

    fn int_tuple(&mut self, values: &[usize]) {
        if values.is_empty() {
            self.empty_tuple();
            return;
        }
        self.mark();
        for &v in values {
            self.int(v as i32);
        }
        self.tuple();
    }

    /// `_rebuild_tensor_v2(storage, offset, size, stride, requires_grad, hooks)`
    fn tensor(&mut self, storage_key: &str, tensor: &NamedTensor) {
        self.global("torch._utils", "_rebuild_tensor_v2");
        self.mark();

        // persistent id: ('storage', torch.FloatStorage, key, location, numel)
        self.mark();
        self.unicode("storage");
        self.global("torch", "FloatStorage");
        self.unicode(storage_key);
        self.unicode("cpu");
        self.int(tensor.numel() as i32);
        self.tuple();
        self.binpersid();

        self.int(0);
        self.int_tuple(&tensor.shape);
        self.int_tuple(&row_major_strides(&tensor.shape));
        self.new_false();
        self.global("collections", "OrderedDict");
        self.empty_tuple();
        self.reduce();

        self.tuple();
        self.reduce();
    }
}

fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Deterministic pseudo-random weights for an MLP with the given widths,
/// named `{prefix}{2k}.weight` / `{prefix}{2k}.bias` like a sequential actor.
pub fn mlp_state_dict(prefix: &str, widths: &[usize]) -> StateDict {
    let mut dict = StateDict::new();
    let mut seed = 0x2545_f491_u32;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        (seed as f32 / u32::MAX as f32 - 0.5) * 0.4
    };
    for (k, pair) in widths.windows(2).enumerate() {
        let (d_in, d_out) = (pair[0], pair[1]);
        let weight: Vec<f32> = (0..d_in * d_out).map(|_| next()).collect();
        let bias: Vec<f32> = (0..d_out).map(|_| next()).collect();
        dict.insert(
            format!("{prefix}{}.weight", 2 * k),
            NamedTensor::new(vec![d_out, d_in], weight),
        );
        dict.insert(
            format!("{prefix}{}.bias", 2 * k),
            NamedTensor::new(vec![d_out], bias),
        );
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[4, 3, 2]), vec![6, 2, 1]);
        assert_eq!(row_major_strides(&[5]), vec![1]);
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn test_mlp_state_dict_shapes() {
        let dict = mlp_state_dict("actor.", &[4, 8, 2]);
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.get("actor.0.weight").unwrap().shape, vec![8, 4]);
        assert_eq!(dict.get("actor.2.bias").unwrap().shape, vec![2]);
    }

    #[test]
    fn test_pickle_starts_with_protocol_and_ends_with_stop() {
        let mut pickle = PickleWriter::new();
        pickle.proto();
        pickle.none();
        pickle.stop();
        assert_eq!(pickle.into_bytes(), vec![0x80, 2, b'N', b'.']);
    }
}
