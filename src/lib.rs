//! # Policy Export
//!
//! Turns a reinforcement-learning policy checkpoint (a PyTorch `torch.save`
//! archive) into a self-contained ONNX inference graph, and compares the
//! constants of a training environment against a deployment configuration.
//!
//! ## Modules
//!
//! - [`checkpoint`]: PyTorch archive reading, root classification, state dicts
//! - [`policy`]: architecture inference, actor network, non-strict weight transfer
//! - [`export`]: tracing, ONNX encoding, reload and verification, the export pipeline
//! - [`diagnose`]: Isaac Lab vs MuJoCo configuration report
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: structured error types
//! - [`logging`]: tracing subscriber setup for the binaries
//! - [`testing`]: synthetic checkpoint writers for tests

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod export;
pub mod logging;
pub mod policy;
pub mod testing;
