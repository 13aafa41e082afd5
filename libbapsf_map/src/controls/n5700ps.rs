use super::{build_command_list_configs, harvest_text, ConfigDetails, ControlDevice, ControlMap};
use crate::container::Group;
use crate::device_map::DeviceMapper;
use crate::error::MappingError;

pub const DEFAULT_PATTERNS: &[&str] =
    &[r"(?P<VOLT>(\bSOURCE:VOLTAGE:LEVEL\s)(?P<VAL>(\d+\.\d*|\.\d+|\d+\b)))"];

/// Maps the `N5700_PS` power supply group
#[derive(Debug, Clone, Copy)]
pub struct N5700Ps;

impl DeviceMapper<ControlMap> for N5700Ps {
    fn device_name(&self) -> &'static str {
        "N5700_PS"
    }

    fn build(&self, group: &Group) -> Result<ControlMap, MappingError> {
        build_command_list_configs(
            group,
            ControlDevice::N5700Ps,
            "N5700 power supply command list",
            |attrs, path, diagnostics| ConfigDetails::PowerSupply {
                ip_address: harvest_text(attrs, "IP address", path, diagnostics),
                power_supply_device: harvest_text(attrs, "Model Number", path, diagnostics),
                initial_state: harvest_text(attrs, "Initialization commands", path, diagnostics),
            },
        )
    }
}
