//! Mapping of whole files as driven by a [`Config`], and the YAML report.
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::config::{Config, StatePatternOverride};
use super::container::Container;
use super::error::{ArgumentError, ReportError};
use super::file_map::FileMap;
use super::hdf5_container::Hdf5Container;

/// Every mapped file, keyed by its path
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Report {
    files: BTreeMap<String, FileMap>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &Path, map: FileMap) {
        self.files.insert(path.to_string_lossy().to_string(), map);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileMap> {
        self.files.get(path)
    }

    /// Write the report as a YAML document
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml_str)?;
        Ok(())
    }
}

/// Map a container with the category roots and state patterns of `config`
pub fn map_container(container: &dyn Container, config: &Config) -> Result<FileMap, ArgumentError> {
    let mut map = FileMap::new(container, &config.device_paths())?;
    apply_state_patterns(&mut map, &config.state_patterns);
    Ok(map)
}

/// Open and map one HDF5 file
pub fn map_file(path: &Path, config: &Config) -> Result<FileMap, ReportError> {
    let file = Hdf5Container::open(path)?;
    Ok(map_container(&file, config)?)
}

/// Rebuild control state values as requested. Requests that can not be honored
/// are logged and skipped.
pub fn apply_state_patterns(map: &mut FileMap, overrides: &[StatePatternOverride]) {
    for state in overrides {
        let Some(control) = map.controls_mut().get_mut(&state.device) else {
            spdlog::warn!("State patterns given for {} but it is not a mapped control device", state.device);
            continue;
        };
        let config_names: Vec<String> = match &state.config {
            Some(name) => vec![name.clone()],
            None => control.configs.keys().cloned().collect(),
        };
        for name in config_names {
            match control.set_state_values(&name, &state.patterns) {
                Ok(true) => spdlog::info!("Applied state patterns to {} {name}", state.device),
                Ok(false) => (),
                Err(e) => spdlog::warn!("Could not apply state patterns to {} {name}: {e}", state.device),
            }
        }
    }
}
