use super::{build_command_list_configs, harvest_text, ConfigDetails, ControlDevice, ControlMap};
use crate::container::Group;
use crate::device_map::{harvest, DeviceMapper};
use crate::error::MappingError;

pub const DEFAULT_PATTERNS: &[&str] = &[
    r"(?P<FREQ>(\bFREQ\s)(?P<VAL>(\d+\.\d*|\.\d+|\d+\b)))",
    r"(?P<VOLT>(\bVOLT\s)(?P<VAL>(\d+\.\d*|\.\d+|\d+\b)))",
];

/// Maps the `Waveform` generator group
#[derive(Debug, Clone, Copy)]
pub struct Waveform;

impl DeviceMapper<ControlMap> for Waveform {
    fn device_name(&self) -> &'static str {
        "Waveform"
    }

    fn build(&self, group: &Group) -> Result<ControlMap, MappingError> {
        build_command_list_configs(
            group,
            ControlDevice::Waveform,
            "Waveform command list",
            |attrs, path, diagnostics| ConfigDetails::Waveform {
                ip_address: harvest_text(attrs, "IP address", path, diagnostics),
                generator_device: harvest_text(attrs, "Generator type", path, diagnostics),
                gpib_address: harvest(attrs, "GPIB address", path, diagnostics),
                initial_state: harvest_text(attrs, "Initial state", path, diagnostics),
            },
        )
    }
}
