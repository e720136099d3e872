//! Training vs deployment configuration diagnostic.

mod deploy;
pub mod reference;
mod report;

pub use deploy::{DeployConfig, ObservationTermConfig};
pub use report::{diagnose, DiagnosticReport, Section};
