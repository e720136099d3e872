use std::path::Path;

use crate::diagnose::DeployConfig;
use crate::error::ConfigError;
use crate::export::ExportConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub export: ExportConfig,
    pub deploy: DeployConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let export = &self.export;
        if export.policy_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "export.policy_prefix must not be empty".into(),
            ));
        }
        if export.noise_key.is_empty() {
            return Err(ConfigError::Validation(
                "export.noise_key must not be empty".into(),
            ));
        }
        if export.batch_size == 0 {
            return Err(ConfigError::Validation(
                "export.batch_size must be > 0".into(),
            ));
        }
        if !export.atol.is_finite() || export.atol <= 0.0 {
            return Err(ConfigError::Validation("export.atol must be > 0".into()));
        }
        if !export.rtol.is_finite() || export.rtol < 0.0 {
            return Err(ConfigError::Validation("export.rtol must be >= 0".into()));
        }
        if export.output_file_name.is_empty() {
            return Err(ConfigError::Validation(
                "export.output_file_name must not be empty".into(),
            ));
        }
        if export.opset_version < 7 {
            return Err(ConfigError::Validation(
                "export.opset_version must be >= 7".into(),
            ));
        }

        self.deploy.validate()
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&AppConfig::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Activation;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[export]
activation = "tanh"
seed = 11
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.export.activation, Activation::Tanh);
        assert_eq!(config.export.seed, Some(11));
        // Other fields should be defaults
        assert_eq!(config.export.policy_prefix, "actor.");
        assert_eq!(config.deploy.num_joints(), 12);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        let default = AppConfig::default();
        assert_eq!(config.export.batch_size, default.export.batch_size);
        assert!((config.export.atol - 1e-6).abs() < 1e-12);
        assert_eq!(config.export.seed, None);
        assert_eq!(config.deploy, default.deploy);
    }

    #[test]
    fn test_validation_rejects_empty_prefix() {
        let mut config = AppConfig::default();
        config.export.policy_prefix.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = AppConfig::default();
        config.export.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_tolerances() {
        let mut config = AppConfig::default();
        config.export.atol = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.export.rtol = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_old_opset() {
        let mut config = AppConfig::default();
        config.export.opset_version = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_mismatched_deploy_lists() {
        let mut config = AppConfig::default();
        config.deploy.action_scale.pop();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("deploy.action_scale"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.export.output_file_name, "policy.onnx");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[export]
policy_prefix = "pi."
batch_size = 4

[deploy]
kp = [30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 30.0]

[[deploy.observations]]
name = "ang_vel"
dims = 3
scale = 0.25
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.export.policy_prefix, "pi.");
        assert_eq!(config.export.batch_size, 4);
        assert_eq!(config.deploy.kp[0], 30.0);
        assert_eq!(config.deploy.observations.len(), 1);
        // Others are defaults
        assert_eq!(config.deploy.kd, vec![0.5; 12]);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[export]\nbatch_size = 0\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Validation(_))));

        std::fs::write(&path, "[export\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml().unwrap();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
        assert_eq!(config.deploy, DeployConfig::default());
    }
}
