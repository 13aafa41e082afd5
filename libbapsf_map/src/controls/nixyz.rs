//! National Instruments probe drives, `NI_XYZ` and its two axis sibling `NI_XZ`.
//!
//! Both write a single `Run time list` and describe their motion lists as
//! attribute-only subgroups.
use serde::Serialize;
use std::collections::BTreeMap;

use super::{shotnum_descriptor, ConfigDetails, ControlConfig, ControlDevice, ControlMap, StateValue, RUN_TIME_LIST};
use crate::container::{AttrValue, Group};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::MappingError;

/// Distance between the drive pivot point and the LaPD axis
pub const LPP_CM: f64 = 58.771;

const NOTE: &str = "The 'r', 'theta', and 'phi' fields in the dataset are supposed to \
represent spherical coordinates of the probe tip with respect to the pivot point of the \
probe drive, but their calculation is inaccurate. The distance between the pivot point \
and the LaPD axis is Lpp = 58.771 cm.";

const CONFIG_NAME: &str = "config01";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeDriveSetup {
    /// Motion list name to its harvested attributes, None where missing
    pub motion_lists: BTreeMap<String, BTreeMap<String, Option<AttrValue>>>,
    pub note: String,
    pub lpp_cm: f64,
}

/// What differs between the drive flavours
struct DriveLayout {
    device: ControlDevice,
    /// Any of these marks a subgroup as a motion list
    axis_attrs: &'static [&'static str],
    /// (key, attribute) pairs harvested from every motion list
    pairs: &'static [(&'static str, &'static str)],
    fan_attr: &'static str,
    state_name: &'static str,
    fields: &'static [&'static str],
}

const XYZ: DriveLayout = DriveLayout {
    device: ControlDevice::NiXyz,
    axis_attrs: &["Nx", "Ny", "Nz", "dx", "dy", "dz", "x0", "y0", "z0"],
    pairs: &[
        ("Nx", "Nx"),
        ("Ny", "Ny"),
        ("Nz", "Nz"),
        ("dx", "dx"),
        ("dy", "dy"),
        ("dz", "dz"),
        ("fan_XYZ", "fan_XYZ"),
        ("max_ydrive_steps", "max_ydrive_steps"),
        ("min_ydrive_steps", "min_ydrive_steps"),
        ("max_zdrive_steps", "max_zdrive_steps"),
        ("min_zdrive_steps", "min_zdrive_steps"),
        ("x0", "x0"),
        ("y0", "y0"),
        ("z0", "z0"),
        ("port", "z_port"),
    ],
    fan_attr: "fan_XYZ",
    state_name: "xyz",
    fields: &["x", "y", "z"],
};

const XZ: DriveLayout = DriveLayout {
    device: ControlDevice::NiXz,
    axis_attrs: &["Nx", "Nz", "dx", "dz", "x0", "z0"],
    pairs: &[
        ("Nx", "Nx"),
        ("Nz", "Nz"),
        ("dx", "dx"),
        ("dz", "dz"),
        ("fan_XZ", "fan_XZ"),
        ("max_zdrive_steps", "max_zdrive_steps"),
        ("min_zdrive_steps", "min_zdrive_steps"),
        ("x0", "x0"),
        ("z0", "z0"),
        ("port", "z_port"),
    ],
    fan_attr: "fan_XZ",
    state_name: "xz",
    fields: &["x", "z"],
};

#[derive(Debug, Clone, Copy)]
pub struct NiXyz;

#[derive(Debug, Clone, Copy)]
pub struct NiXz;

impl DeviceMapper<ControlMap> for NiXyz {
    fn device_name(&self) -> &'static str {
        "NI_XYZ"
    }

    fn build(&self, group: &Group) -> Result<ControlMap, MappingError> {
        build_drive(group, &XYZ)
    }
}

impl DeviceMapper<ControlMap> for NiXz {
    fn device_name(&self) -> &'static str {
        "NI_XZ"
    }

    fn build(&self, group: &Group) -> Result<ControlMap, MappingError> {
        build_drive(group, &XZ)
    }
}

fn build_drive(group: &Group, layout: &DriveLayout) -> Result<ControlMap, MappingError> {
    let mut diagnostics = Diagnostics::new();
    let subgroups = group.subgroup_names()?;
    if subgroups.is_empty() {
        diagnostics.warn(group.path(), "no defining motion list groups exist");
    }
    if !group.is_dataset(RUN_TIME_LIST) {
        return Err(MappingError::new(
            group.path(),
            format!("dataset '{RUN_TIME_LIST}' not found"),
        ));
    }
    let dset = group.dataset(RUN_TIME_LIST)?;

    let mut motion_lists = BTreeMap::new();
    for name in subgroups {
        let attrs = group.group(&name)?.attrs()?;
        if !layout.axis_attrs.iter().any(|a| attrs.contains_key(*a)) {
            continue;
        }
        let mut entries = BTreeMap::new();
        for (key, attr) in layout.pairs {
            let value = match attrs.get(*attr) {
                Some(v) if *attr == layout.fan_attr => Some(AttrValue::Bool(v.is_true_flag())),
                Some(v) => Some(v.clone()),
                None => {
                    diagnostics.warn(
                        group.path(),
                        format!("Motion List attribute '{attr}' not found for ML group '{name}'"),
                    );
                    None
                }
            };
            entries.insert(key.to_string(), value);
        }
        motion_lists.insert(name, entries);
    }
    if motion_lists.is_empty() {
        diagnostics.warn(group.path(), "has no identifiable motion lists");
    }

    let dataset_paths = vec![dset.path().to_string()];
    let shotnum = shotnum_descriptor(group, RUN_TIME_LIST)?;

    let missing: Vec<&str> = layout
        .fields
        .iter()
        .copied()
        .filter(|f| !dset.has_field(f))
        .collect();
    if missing.len() == layout.fields.len() {
        return Err(MappingError::new(
            group.path(),
            format!("dataset '{}' missing fields {}", dset.path(), missing.join(", ")),
        ));
    } else if !missing.is_empty() {
        diagnostics.warn(
            group.path(),
            format!("dataset '{}' missing field '{}'", dset.path(), missing.join(", ")),
        );
    }

    let mut state_values = BTreeMap::new();
    state_values.insert(
        layout.state_name.to_string(),
        StateValue::from_fields(&dataset_paths, layout.fields, &[layout.fields.len()]),
    );

    let config = ControlConfig {
        dataset_paths,
        shotnum,
        state_values,
        command_list: None,
        details: ConfigDetails::ProbeDrive(ProbeDriveSetup {
            motion_lists,
            note: NOTE.to_string(),
            lpp_cm: LPP_CM,
        }),
        command_index_valid: false,
    };
    let mut configs = BTreeMap::new();
    configs.insert(CONFIG_NAME.to_string(), config);
    Ok(ControlMap::new(group, layout.device, configs, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DType, Field};
    use crate::controls::ConType;
    use crate::descriptors::ValueType;
    use crate::memory::MemoryContainer;

    const XYZ_PATH: &str = "/Raw data + config/NI_XYZ";
    const XZ_PATH: &str = "/Raw data + config/NI_XZ";

    fn drive(mc: &mut MemoryContainer, path: &str, fields: &[&str]) {
        let mut layout = vec![Field::scalar("Shot number", DType::Int(4))];
        layout.extend(fields.iter().map(|f| Field::scalar(f, DType::Float(8))));
        mc.add_dataset(&format!("{path}/Run time list"), &[10], DType::Compound(layout));
    }

    fn xyz_scenario() -> MemoryContainer {
        let mut mc = MemoryContainer::new();
        drive(&mut mc, XYZ_PATH, &["x", "y", "z", "theta", "phi"]);
        let ml = format!("{XYZ_PATH}/ml-0001");
        for (attr, value) in [("Nx", 11i64), ("Ny", 21), ("Nz", 1), ("z_port", 27)] {
            mc.set_attr(&ml, attr, value);
        }
        for (attr, value) in [("dx", 0.5), ("dy", 0.5), ("dz", 0.0), ("x0", 0.0), ("y0", 0.0), ("z0", 0.0)] {
            mc.set_attr(&ml, attr, value);
        }
        mc.set_attr(&ml, "fan_XYZ", "TRUE");
        // no axis attributes, not a motion list
        mc.set_attr(&format!("{XYZ_PATH}/Extra"), "Comment", "nothing");
        mc
    }

    fn build(mc: &MemoryContainer, path: &str, mapper: &dyn DeviceMapper<ControlMap>) -> Result<ControlMap, MappingError> {
        let group = match Group::open(mc, path) {
            Ok(g) => g,
            Err(_) => panic!(),
        };
        mapper.build(&group)
    }

    #[test]
    fn test_xyz() {
        let mc = xyz_scenario();
        let map = match build(&mc, XYZ_PATH, &NiXyz) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(map.contype, ConType::Motion);
        assert!(!map.has_command_list());
        assert_eq!(map.configs.keys().collect::<Vec<_>>(), vec!["config01"]);
        let config = &map.configs["config01"];
        let xyz = &config.state_values["xyz"];
        assert_eq!(xyz.descriptor.dataset_fields, vec!["x", "y", "z"]);
        assert_eq!(xyz.descriptor.shape, vec![3]);
        assert_eq!(xyz.descriptor.value_type, ValueType::F64);
        let ConfigDetails::ProbeDrive(setup) = &config.details else {
            panic!()
        };
        assert_eq!(setup.motion_lists.len(), 1);
        let ml = &setup.motion_lists["ml-0001"];
        assert_eq!(ml["fan_XYZ"], Some(AttrValue::Bool(true)));
        assert_eq!(ml["port"], Some(AttrValue::Int(27)));
        assert_eq!(ml["max_ydrive_steps"], None);
        assert!(map.diagnostics.mentions("max_ydrive_steps"));
        assert_eq!(setup.lpp_cm, LPP_CM);
        assert_eq!(map.construct_dataset_name(Some("anything")), Ok(String::from("Run time list")));
    }

    #[test]
    fn test_xz() {
        let mut mc = MemoryContainer::new();
        drive(&mut mc, XZ_PATH, &["x", "z"]);
        let ml = format!("{XZ_PATH}/ml-0001");
        mc.set_attr(&ml, "Nx", 5i64);
        mc.set_attr(&ml, "fan_XZ", "FALSE");
        let map = match build(&mc, XZ_PATH, &NiXz) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        let config = &map.configs["config01"];
        let xz = &config.state_values["xz"];
        assert_eq!(xz.descriptor.dataset_fields, vec!["x", "z"]);
        assert_eq!(xz.descriptor.shape, vec![2]);
        let ConfigDetails::ProbeDrive(setup) = &config.details else {
            panic!()
        };
        assert_eq!(setup.motion_lists["ml-0001"]["fan_XZ"], Some(AttrValue::Bool(false)));
        assert!(!setup.motion_lists["ml-0001"].contains_key("Ny"));
    }

    #[test]
    fn test_missing_fields() {
        let mut mc = xyz_scenario();
        drive(&mut mc, XYZ_PATH, &["x", "z"]);
        let map = match build(&mc, XYZ_PATH, &NiXyz) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.diagnostics.mentions("missing field 'y'"));

        drive(&mut mc, XYZ_PATH, &["theta"]);
        assert!(build(&mc, XYZ_PATH, &NiXyz).is_err());
    }

    #[test]
    fn test_failure_modes() {
        let mut mc = xyz_scenario();
        mc.remove(&format!("{XYZ_PATH}/Run time list"));
        assert!(build(&mc, XYZ_PATH, &NiXyz).is_err());

        let mut mc = MemoryContainer::new();
        mc.add_dataset(
            &format!("{XYZ_PATH}/Run time list"),
            &[10],
            DType::Compound(vec![Field::scalar("x", DType::Float(8))]),
        );
        assert!(build(&mc, XYZ_PATH, &NiXyz).is_err());
    }

    #[test]
    fn test_no_motion_lists() {
        let mut mc = MemoryContainer::new();
        drive(&mut mc, XYZ_PATH, &["x", "y", "z"]);
        let map = match build(&mc, XYZ_PATH, &NiXyz) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.diagnostics.mentions("no defining motion list groups exist"));
        let ConfigDetails::ProbeDrive(setup) = &map.configs["config01"].details else {
            panic!()
        };
        assert!(setup.motion_lists.is_empty());
    }
}
