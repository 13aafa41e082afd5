use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::controls::compile_patterns;
use super::error::ConfigError;
use super::file_map::DevicePaths;

/// State value patterns to apply to a control device once it is mapped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePatternOverride {
    pub device: String,
    /// Configuration to rebuild. None rebuilds every configuration of the device
    pub config: Option<String>,
    pub patterns: Vec<String>,
}

/// Structure representing the application configuration: which files to map,
/// where the device categories live in them and where the report goes.
/// Configs are serializable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub hdf_paths: Vec<PathBuf>,
    pub control_path: String,
    pub digitizer_path: String,
    pub msi_path: String,
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub state_patterns: Vec<StatePatternOverride>,
}

impl Default for Config {
    /// A config with no files and the LaPD layout
    fn default() -> Self {
        let paths = DevicePaths::default();
        Self {
            hdf_paths: Vec::new(),
            control_path: paths.control,
            digitizer_path: paths.digitizer,
            msi_path: paths.msi,
            report_path: None,
            state_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful and every state pattern compiles
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate_patterns()?;
        Ok(config)
    }

    fn validate_patterns(&self) -> Result<(), ConfigError> {
        for state in self.state_patterns.iter() {
            compile_patterns(&state.patterns)?;
        }
        Ok(())
    }

    pub fn device_paths(&self) -> DevicePaths {
        DevicePaths {
            control: self.control_path.clone(),
            digitizer: self.digitizer_path.clone(),
            msi: self.msi_path.clone(),
        }
    }

    pub fn has_report(&self) -> bool {
        self.report_path.is_some()
    }
}
