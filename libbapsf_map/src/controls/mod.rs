//! Control device mappings: probe drives, waveform generators and power supplies.
//!
//! Command list devices (Waveform, N5700_PS) record one textual command per
//! index; the state values of such a configuration are obtained by parsing the
//! command list with [`StatePattern`]s and can be rebuilt on request.
pub mod n5700ps;
pub mod nixyz;
pub mod parser;
pub mod sixk;
pub mod waveform;

use serde::Serialize;
use std::collections::BTreeMap;

use super::container::{AttrValue, Attributes, Group};
use super::descriptors::{FieldDescriptor, ValueType};
use super::device_map::{DeviceCategory, DeviceInfo, DeviceMapper, MappedDevice};
use super::diagnostics::Diagnostics;
use super::error::{ArgumentError, MappingError, StateValuesError};

pub use n5700ps::N5700Ps;
pub use nixyz::{NiXyz, NiXz};
pub use parser::{compile_patterns, CommandListParser, CommandValues, StatePattern};
pub use sixk::SixK;
pub use waveform::Waveform;

static MAPPERS: &[&dyn DeviceMapper<ControlMap>] = &[&N5700Ps, &NiXyz, &NiXz, &SixK, &Waveform];

/// Dataset written by every control device but the 6K Compumotor
pub const RUN_TIME_LIST: &str = "Run time list";
pub const COMMAND_INDEX: &str = "Command index";
pub const SHOT_NUMBER: &str = "Shot number";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConType {
    Motion,
    Power,
    Waveform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlDevice {
    N5700Ps,
    NiXyz,
    NiXz,
    SixK,
    Waveform,
}

impl ControlDevice {
    pub fn contype(&self) -> ConType {
        match self {
            ControlDevice::N5700Ps => ConType::Power,
            ControlDevice::Waveform => ConType::Waveform,
            ControlDevice::NiXyz | ControlDevice::NiXz | ControlDevice::SixK => ConType::Motion,
        }
    }

    /// Patterns tried when the state values are first built
    pub fn default_patterns(&self) -> &'static [&'static str] {
        match self {
            ControlDevice::Waveform => waveform::DEFAULT_PATTERNS,
            ControlDevice::N5700Ps => n5700ps::DEFAULT_PATTERNS,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateValue {
    pub descriptor: FieldDescriptor,
    /// Regex that produced the values, None for raw or remainder states
    pub pattern: Option<String>,
    pub command_list: Option<CommandValues>,
    pub cl_str: Option<Vec<String>>,
}

impl StateValue {
    /// A state read directly from dataset fields
    pub fn from_fields(dataset_paths: &[String], fields: &[&str], shape: &[usize]) -> Self {
        Self {
            descriptor: FieldDescriptor::new(dataset_paths.to_vec(), fields, shape, ValueType::F64),
            pattern: None,
            command_list: None,
            cl_str: None,
        }
    }
}

/// Device specific settings of a configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ConfigDetails {
    Waveform {
        ip_address: Option<String>,
        generator_device: Option<String>,
        gpib_address: Option<AttrValue>,
        initial_state: Option<String>,
    },
    PowerSupply {
        ip_address: Option<String>,
        power_supply_device: Option<String>,
        initial_state: Option<String>,
    },
    ProbeDrive(nixyz::ProbeDriveSetup),
    SixK(sixk::SixKSetup),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlConfig {
    pub dataset_paths: Vec<String>,
    pub shotnum: FieldDescriptor,
    pub state_values: BTreeMap<String, StateValue>,
    pub command_list: Option<Vec<String>>,
    pub details: ConfigDetails,
    /// The dataset carries a scalar integer `Command index` field
    #[serde(skip)]
    pub command_index_valid: bool,
}

/// State values produced from a command list, with any parse warnings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateValueBuild {
    pub state_values: BTreeMap<String, StateValue>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlMap {
    pub info: DeviceInfo,
    pub device: ControlDevice,
    pub contype: ConType,
    pub configs: BTreeMap<String, ControlConfig>,
    pub diagnostics: Diagnostics,
}

impl MappedDevice for ControlMap {
    fn mappers() -> &'static [&'static dyn DeviceMapper<Self>] {
        MAPPERS
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl ControlMap {
    pub fn new(
        group: &Group,
        device: ControlDevice,
        configs: BTreeMap<String, ControlConfig>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            info: DeviceInfo::new(group, DeviceCategory::Control),
            device,
            contype: device.contype(),
            configs,
            diagnostics,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.info.group_name
    }

    pub fn has_command_list(&self) -> bool {
        self.configs.values().any(|c| c.command_list.is_some())
    }

    /// Name of the dataset holding the recorded control data. Only the
    /// 6K Compumotor uses `config_name` (a receptacle number).
    pub fn construct_dataset_name(&self, config_name: Option<&str>) -> Result<String, ArgumentError> {
        match self.device {
            ControlDevice::SixK => sixk::construct_dataset_name(&self.configs, config_name),
            _ => Ok(RUN_TIME_LIST.to_string()),
        }
    }

    fn config(&self, config_name: &str) -> Result<&ControlConfig, ArgumentError> {
        self.configs
            .get(config_name)
            .ok_or_else(|| ArgumentError::UnknownConfig(config_name.to_string()))
    }

    /// A parser bound to the command list of `config_name`
    pub fn clparse(&self, config_name: &str) -> Result<CommandListParser, ArgumentError> {
        let config = self.config(config_name)?;
        let commands = config
            .command_list
            .as_ref()
            .ok_or_else(|| ArgumentError::NoCommandList(config_name.to_string()))?;
        Ok(CommandListParser::new(commands.iter().cloned()))
    }

    /// Parse the command list of `config_name` into state values. An empty
    /// result means the patterns did not yield anything usable.
    pub fn construct_state_values(
        &self,
        config_name: &str,
        patterns: &[StatePattern],
    ) -> Result<StateValueBuild, StateValuesError> {
        parse_state_values(config_name, self.config(config_name)?, patterns)
    }

    /// Replace the state values of `config_name` with those parsed by `patterns`.
    /// When parsing yields nothing the configuration is left untouched and
    /// `false` is returned.
    pub fn set_state_values<S: AsRef<str>>(
        &mut self,
        config_name: &str,
        patterns: &[S],
    ) -> Result<bool, StateValuesError> {
        let patterns = compile_patterns(patterns)?;
        let build = self.construct_state_values(config_name, &patterns)?;
        let path = self.info.group_path.clone();
        for warning in build.warnings {
            self.diagnostics.warn(&path, warning);
        }
        if build.state_values.is_empty() {
            self.diagnostics.warn(
                &path,
                format!("RE parsing of 'command list' for '{config_name}' was unsuccessful, doing nothing"),
            );
            return Ok(false);
        }
        if let Some(config) = self.configs.get_mut(config_name) {
            config.state_values = build.state_values;
        }
        Ok(true)
    }

    /// Restore the state values of `config_name` to the default `command`
    /// descriptor, or to the device's default patterns when `apply_patterns` is set
    /// and they parse.
    pub fn reset_state_values(
        &mut self,
        config_name: &str,
        apply_patterns: bool,
    ) -> Result<(), StateValuesError> {
        let mut state_values = BTreeMap::new();
        if apply_patterns {
            let patterns = compile_patterns(self.device.default_patterns())?;
            let build = self.construct_state_values(config_name, &patterns)?;
            let path = self.info.group_path.clone();
            for warning in build.warnings {
                self.diagnostics.warn(&path, warning);
            }
            state_values = build.state_values;
        }
        if state_values.is_empty() {
            state_values = default_state_values(self.config(config_name)?)
                .ok_or_else(|| ArgumentError::NoCommandList(config_name.to_string()))?;
        }
        if let Some(config) = self.configs.get_mut(config_name) {
            config.state_values = state_values;
        }
        Ok(())
    }
}

fn parse_state_values(
    config_name: &str,
    config: &ControlConfig,
    patterns: &[StatePattern],
) -> Result<StateValueBuild, StateValuesError> {
    let commands = config
        .command_list
        .as_ref()
        .ok_or_else(|| ArgumentError::NoCommandList(config_name.to_string()))?;
    let mut build = StateValueBuild::default();
    if !config.command_index_valid {
        build.warnings.push(format!(
            "dataset '{}' does NOT have a '{COMMAND_INDEX}' field that is a column of integers",
            config.dataset_paths.first().map(|s| s.as_str()).unwrap_or_default()
        ));
        return Ok(build);
    }
    let outcome = CommandListParser::new(commands.iter().cloned()).apply_patterns(patterns)?;
    build.warnings = outcome.warnings.clone();
    if !outcome.is_success() {
        return Ok(build);
    }
    for (name, state) in outcome.states {
        let descriptor = FieldDescriptor::new(
            config.dataset_paths.clone(),
            &[COMMAND_INDEX],
            &[],
            state.values.value_type(),
        );
        build.state_values.insert(
            name,
            StateValue {
                descriptor,
                pattern: state.pattern,
                command_list: Some(state.values),
                cl_str: Some(state.cl_str),
            },
        );
    }
    Ok(build)
}

/// The unparsed `command` state: the raw command list indexed by `Command index`
pub fn default_state_values(config: &ControlConfig) -> Option<BTreeMap<String, StateValue>> {
    let commands = config.command_list.as_ref()?;
    let values = CommandValues::Text(commands.clone());
    let descriptor = FieldDescriptor::new(
        config.dataset_paths.clone(),
        &[COMMAND_INDEX],
        &[],
        values.value_type(),
    );
    let mut state_values = BTreeMap::new();
    state_values.insert(
        String::from("command"),
        StateValue {
            descriptor,
            pattern: None,
            command_list: Some(values),
            cl_str: Some(commands.clone()),
        },
    );
    Some(state_values)
}

/// Split a command list attribute into trimmed lines
pub fn split_command_list(text: &str) -> Vec<String> {
    text.lines().map(|line| line.trim().to_string()).collect()
}

/// The `Shot number` descriptor of a control dataset. The field is required.
pub fn shotnum_descriptor(device: &Group, dataset_name: &str) -> Result<FieldDescriptor, MappingError> {
    let dset = device.dataset(dataset_name)?;
    let field = dset.field(SHOT_NUMBER).ok_or_else(|| {
        MappingError::new(
            device.path(),
            format!("dataset '{}' is missing '{SHOT_NUMBER}' field", dset.path()),
        )
    })?;
    Ok(FieldDescriptor::field(dset.path(), SHOT_NUMBER, &field.shape, ValueType::I32))
}

/// Shared builder of command list devices: one configuration per subgroup, all
/// recorded in the `Run time list` dataset.
///
/// `attributes` lists (key, attribute name) pairs harvested as text, except the
/// command list attribute, which is required.
pub fn build_command_list_configs(
    group: &Group,
    device: ControlDevice,
    command_list_attr: &str,
    make_details: impl Fn(&Attributes, &str, &mut Diagnostics) -> ConfigDetails,
) -> Result<ControlMap, MappingError> {
    let mut diagnostics = Diagnostics::new();
    let subgroups = group.subgroup_names()?;
    if subgroups.is_empty() {
        return Err(MappingError::new(group.path(), "has no mappable configurations"));
    }
    if !group.is_dataset(RUN_TIME_LIST) {
        return Err(MappingError::new(
            group.path(),
            format!("dataset '{RUN_TIME_LIST}' not found"),
        ));
    }
    let dset = group.dataset(RUN_TIME_LIST)?;
    let shotnum = shotnum_descriptor(group, RUN_TIME_LIST)?;
    let command_index_valid = dset
        .field(COMMAND_INDEX)
        .is_some_and(|f| f.is_scalar_integer());
    let patterns = compile_patterns(device.default_patterns()).map_err(|e| {
        MappingError::new(group.path(), format!("invalid default pattern: {e}"))
    })?;

    let mut configs = BTreeMap::new();
    for name in subgroups {
        let config_group = group.group(&name)?;
        let attrs = config_group.attrs()?;
        let command_list = match attrs.get(command_list_attr).and_then(AttrValue::as_str) {
            Some(text) => split_command_list(text),
            None => {
                return Err(MappingError::new(
                    group.path(),
                    format!("attribute '{command_list_attr}' not found for configuration group '{name}'"),
                ))
            }
        };
        let details = make_details(&attrs, config_group.path(), &mut diagnostics);
        let mut config = ControlConfig {
            dataset_paths: vec![dset.path().to_string()],
            shotnum: shotnum.clone(),
            state_values: BTreeMap::new(),
            command_list: Some(command_list),
            details,
            command_index_valid,
        };
        // build time parse warnings are dropped; the raw command list is the fallback
        let parsed = parse_state_values(&name, &config, &patterns)
            .map(|b| b.state_values)
            .unwrap_or_default();
        config.state_values = if parsed.is_empty() {
            default_state_values(&config).unwrap_or_default()
        } else {
            parsed
        };
        configs.insert(name, config);
    }
    Ok(ControlMap::new(group, device, configs, diagnostics))
}

/// Harvest a text attribute, warning when it is absent
pub fn harvest_text(
    attrs: &Attributes,
    key: &str,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Option<String> {
    match super::device_map::harvest(attrs, key, path, diagnostics)? {
        AttrValue::Str(s) => Some(s),
        _ => {
            diagnostics.warn(path, format!("attribute '{key}' is not a string, ignoring it"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DType, Field};
    use crate::memory::MemoryContainer;

    pub(crate) fn run_time_list(mc: &mut MemoryContainer, device: &str, fields: &[&str]) {
        let mut layout = vec![Field::scalar("Shot number", DType::Int(4))];
        for name in fields {
            let dtype = if *name == COMMAND_INDEX {
                DType::Int(4)
            } else {
                DType::Float(8)
            };
            layout.push(Field::scalar(name, dtype));
        }
        mc.add_dataset(&format!("{device}/{RUN_TIME_LIST}"), &[20], DType::Compound(layout));
    }

    #[test]
    fn test_split_command_list() {
        assert_eq!(
            split_command_list("FREQ 1.0 \n  FREQ 2.0\n"),
            vec![String::from("FREQ 1.0"), String::from("FREQ 2.0")]
        );
    }

    #[test]
    fn test_contype() {
        assert_eq!(ControlDevice::NiXz.contype(), ConType::Motion);
        assert_eq!(ControlDevice::N5700Ps.contype(), ConType::Power);
        assert!(ControlDevice::SixK.default_patterns().is_empty());
    }
}
