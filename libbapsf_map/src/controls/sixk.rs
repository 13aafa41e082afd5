//! The 6K Compumotor probe drive.
//!
//! Motion lists and probes are both subgroups, told apart by name. Each probe
//! is one configuration keyed by its receptacle number and writes its own
//! dataset `XY[<receptacle>]: <probe name>`.
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{shotnum_descriptor, ConfigDetails, ControlConfig, ControlDevice, ControlMap, StateValue};
use crate::container::{AttrValue, Attributes, Group};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::{ArgumentError, MappingError};

static MOTION_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\bMotion list:\s)(?P<NAME>.+\b)$").expect("Invalid regex"));
static PROBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\bProbe:\sXY\[)(?P<RNUM>\b\d+\b)(\]:\s)(?P<NAME>.+\b)$").expect("Invalid regex")
});

const PROBE_PAIRS: [(&str, &str); 8] = [
    ("calib", "Calibration"),
    ("level sy (cm)", "Level sy (cm)"),
    ("port", "Port"),
    ("probe channels", "Probe channels"),
    ("probe type", "Probe type"),
    ("unnamed", "Unnamed"),
    ("sx at end (cm)", "sx at end (cm)"),
    ("z", "z"),
];

const MOTION_LIST_PAIRS: [(&str, &str); 3] = [
    ("created date", "Created date"),
    ("data motion count", "Data motion count"),
    ("motion count", "Motion count"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionList {
    pub group_name: String,
    pub group_path: String,
    pub attributes: BTreeMap<String, Option<AttrValue>>,
    pub delta: Option<[f64; 3]>,
    pub center: Option<[f64; 3]>,
    pub npoints: Option<[i64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeList {
    pub group_name: String,
    pub group_path: String,
    pub probe_name: String,
    pub receptacle: u32,
    pub attributes: BTreeMap<String, Option<AttrValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SixKSetup {
    pub receptacle: u32,
    pub probe: ProbeList,
    /// Every motion list of the device, shared by all receptacles
    pub motion_lists: BTreeMap<String, MotionList>,
}

#[derive(Debug, Clone, Copy)]
pub struct SixK;

impl DeviceMapper<ControlMap> for SixK {
    fn device_name(&self) -> &'static str {
        "6K Compumotor"
    }

    fn build(&self, group: &Group) -> Result<ControlMap, MappingError> {
        let mut diagnostics = Diagnostics::new();
        let mut motion_lists = BTreeMap::new();
        let mut probes: Vec<ProbeList> = Vec::new();
        for name in group.subgroup_names()? {
            if let Some(caps) = MOTION_LIST_RE.captures(&name) {
                let ml_name = caps["NAME"].to_string();
                let ml = analyze_motion_list(group, &name, &ml_name, &mut diagnostics)?;
                motion_lists.insert(ml_name, ml);
            } else if let Some(caps) = PROBE_RE.captures(&name) {
                let Ok(receptacle) = caps["RNUM"].parse::<u32>() else {
                    diagnostics.warn(group.path(), format!("receptacle number of '{name}' is out of range"));
                    continue;
                };
                let probe = analyze_probe(group, &name, &caps["NAME"], receptacle, &mut diagnostics)?;
                if probes.iter().any(|p| p.receptacle == receptacle) {
                    diagnostics.warn(
                        group.path(),
                        format!("probe '{name}' uses an already mapped receptacle {receptacle}, ignoring it"),
                    );
                    continue;
                }
                probes.push(probe);
            }
        }
        if probes.is_empty() {
            return Err(MappingError::new(
                group.path(),
                "has no mappable configurations (Probe List groups)",
            ));
        }

        let mut configs = BTreeMap::new();
        for probe in probes {
            let dset_name = dataset_name(probe.receptacle, &probe.probe_name);
            if !group.is_dataset(&dset_name) {
                return Err(MappingError::new(
                    group.path(),
                    format!(
                        "dataset for configuration '{} - {}' could not be determined or found",
                        probe.probe_name, probe.receptacle
                    ),
                ));
            }
            let dset = group.dataset(&dset_name)?;
            let dataset_paths = vec![dset.path().to_string()];
            let shotnum = shotnum_descriptor(group, &dset_name)?;

            let mut state_values = BTreeMap::new();
            state_values.insert(
                String::from("xyz"),
                StateValue::from_fields(&dataset_paths, &["x", "y", "z"], &[3]),
            );
            state_values.insert(
                String::from("ptip_rot_theta"),
                StateValue::from_fields(&dataset_paths, &["theta"], &[]),
            );
            state_values.insert(
                String::from("ptip_rot_phi"),
                StateValue::from_fields(&dataset_paths, &["phi"], &[]),
            );

            configs.insert(
                probe.receptacle.to_string(),
                ControlConfig {
                    dataset_paths,
                    shotnum,
                    state_values,
                    command_list: None,
                    details: ConfigDetails::SixK(SixKSetup {
                        receptacle: probe.receptacle,
                        probe,
                        motion_lists: motion_lists.clone(),
                    }),
                    command_index_valid: false,
                },
            );
        }
        Ok(ControlMap::new(group, ControlDevice::SixK, configs, diagnostics))
    }
}

fn dataset_name(receptacle: u32, probe_name: &str) -> String {
    format!("XY[{receptacle}]: {probe_name}")
}

/// Dataset of the probe on `receptacle`. With no receptacle given the device
/// must have exactly one.
pub fn construct_dataset_name(
    configs: &BTreeMap<String, ControlConfig>,
    receptacle: Option<&str>,
) -> Result<String, ArgumentError> {
    let unknown = || ArgumentError::UnknownReceptacle(configs.keys().cloned().collect());
    let config = match receptacle {
        Some(rnum) => configs.get(rnum),
        None if configs.len() == 1 => configs.values().next(),
        None => None,
    }
    .ok_or_else(unknown)?;
    match &config.details {
        ConfigDetails::SixK(setup) => Ok(dataset_name(setup.receptacle, &setup.probe.probe_name)),
        _ => Err(unknown()),
    }
}

fn harvest_pairs(
    attrs: &Attributes,
    pairs: &[(&str, &str)],
    path: &str,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<String, Option<AttrValue>> {
    pairs
        .iter()
        .map(|(key, attr)| {
            let value = attrs.get(*attr).cloned();
            if value.is_none() {
                diagnostics.warn(path, format!("attribute '{attr}' not found"));
            }
            (key.to_string(), value)
        })
        .collect()
}

fn analyze_motion_list(
    device: &Group,
    gname: &str,
    ml_name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<MotionList, MappingError> {
    let group = device.group(gname)?;
    let path = group.path().to_string();
    let attrs = group.attrs()?;
    match attrs.get("Motion list").and_then(AttrValue::as_str) {
        Some(declared) if declared != ml_name => diagnostics.warn(
            &path,
            format!(
                "discovered motion list name '{ml_name}' does not match the name defined in attributes '{declared}', using discovered name"
            ),
        ),
        Some(_) => (),
        None => diagnostics.warn(&path, "motion list attribute 'Motion list' not found"),
    }
    let attributes = harvest_pairs(&attrs, &MOTION_LIST_PAIRS, &path, diagnostics);

    let float = |key: &str| attrs.get(key).and_then(AttrValue::as_float);
    let delta = match (float("Delta x"), float("Delta y")) {
        (Some(dx), Some(dy)) => Some([dx, dy, 0.0]),
        _ => {
            diagnostics.warn(&path, "attributes 'Delta x' and/or 'Delta y' not found");
            None
        }
    };
    let center = match (float("Grid center x"), float("Grid center y")) {
        (Some(x), Some(y)) => Some([x, y, 0.0]),
        _ => {
            diagnostics.warn(&path, "attributes 'Grid center x' and/or 'Grid center y' not found");
            None
        }
    };
    let int = |key: &str| attrs.get(key).and_then(AttrValue::as_int);
    let npoints = match (int("Nx"), int("Ny")) {
        (Some(nx), Some(ny)) => Some([nx, ny, 1]),
        _ => {
            diagnostics.warn(&path, "attributes 'Nx' and/or 'Ny' not found");
            None
        }
    };

    Ok(MotionList {
        group_name: gname.to_string(),
        group_path: path,
        attributes,
        delta,
        center,
        npoints,
    })
}

fn analyze_probe(
    device: &Group,
    gname: &str,
    probe_name: &str,
    receptacle: u32,
    diagnostics: &mut Diagnostics,
) -> Result<ProbeList, MappingError> {
    let group = device.group(gname)?;
    let path = group.path().to_string();
    let attrs = group.attrs()?;
    match attrs.get("Probe").and_then(AttrValue::as_str) {
        Some(declared) if declared != probe_name => diagnostics.warn(
            &path,
            format!(
                "discovered probe name '{probe_name}' does not match the name defined in attributes '{declared}', using discovered name"
            ),
        ),
        Some(_) => (),
        None => diagnostics.warn(&path, "probe list attribute 'Probe' not found"),
    }
    match attrs.get("Receptacle").and_then(AttrValue::as_int) {
        Some(declared) if declared != i64::from(receptacle) => diagnostics.warn(
            &path,
            format!(
                "discovered receptacle number '{receptacle}' does not match the number defined in attributes '{declared}', using discovered number"
            ),
        ),
        Some(_) => (),
        None => diagnostics.warn(&path, "probe list attribute 'Receptacle' not found"),
    }
    Ok(ProbeList {
        group_name: gname.to_string(),
        group_path: path.clone(),
        probe_name: probe_name.to_string(),
        receptacle,
        attributes: harvest_pairs(&attrs, &PROBE_PAIRS, &path, diagnostics),
    })
}
