//! MSI (machine state information) diagnostics: fixed schema groups holding a
//! per-shot summary dataset and optional raw signal datasets.
pub mod interferometer;
pub mod summary;

use serde::Serialize;
use std::collections::BTreeMap;

use super::container::{AttrValue, Attributes, Dataset, Group};
use super::descriptors::FieldDescriptor;
use super::device_map::{DeviceCategory, DeviceInfo, DeviceMapper, MappedDevice};
use super::diagnostics::Diagnostics;
use super::error::MappingError;

pub use interferometer::InterferometerArray;
pub use summary::{SummaryDiagnostic, DISCHARGE, GAS_PRESSURE, HEATER, MAGNETIC_FIELD};

static MAPPERS: &[&dyn DeviceMapper<MsiMap>] = &[
    &DISCHARGE,
    &GAS_PRESSURE,
    &HEATER,
    &InterferometerArray,
    &MAGNETIC_FIELD,
];

pub const SHOT_NUMBER: &str = "Shot number";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MsiConfig {
    /// Number of recorded shots
    pub shape: Vec<usize>,
    pub shotnum: FieldDescriptor,
    /// Primary, plottable data
    pub signals: BTreeMap<String, FieldDescriptor>,
    /// Per-shot meta data from the summary dataset(s)
    pub meta: BTreeMap<String, FieldDescriptor>,
    pub meta_shape: Vec<usize>,
    /// Harvested attributes. Always lists: empty when the attribute is missing,
    /// one entry per instance (None where missing) for per-instance attributes.
    pub attributes: BTreeMap<String, Vec<Option<AttrValue>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MsiMap {
    pub info: DeviceInfo,
    pub config: MsiConfig,
    pub diagnostics: Diagnostics,
}

impl MappedDevice for MsiMap {
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

impl MsiMap {
    pub fn new(group: &Group, config: MsiConfig, diagnostics: Diagnostics) -> Self {
        Self {
            info: DeviceInfo::new(group, DeviceCategory::Msi),
            config,
            diagnostics,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.info.group_name
    }
}

/// Spread an attribute into a list, one entry per array element
fn spread(value: &AttrValue) -> Vec<Option<AttrValue>> {
    match value {
        AttrValue::IntArray(a) => a.iter().map(|v| Some(AttrValue::Int(*v))).collect(),
        AttrValue::FloatArray(a) => a.iter().map(|v| Some(AttrValue::Float(*v))).collect(),
        AttrValue::StrArray(a) => a.iter().map(|v| Some(AttrValue::Str(v.clone()))).collect(),
        other => vec![Some(other.clone())],
    }
}

/// Harvest `(key, attribute)` pairs of a diagnostic group. Missing attributes
/// become empty lists.
pub fn harvest_attributes(
    attrs: &Attributes,
    pairs: &[(&str, &str)],
    device: &Group,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<String, Vec<Option<AttrValue>>> {
    let mut harvested = BTreeMap::new();
    for (key, attr) in pairs {
        let values = match attrs.get(*attr) {
            Some(value) => spread(value),
            None => {
                diagnostics.warn(
                    device.path(),
                    format!(
                        "attribute '{attr}' not found for MSI diagnostic '{}', continuing with mapping",
                        device.name()
                    ),
                );
                Vec::new()
            }
        };
        harvested.insert(key.to_string(), values);
    }
    harvested
}

/// Every named dataset must exist below `device`
pub fn require_datasets(device: &Group, names: &[&str]) -> Result<(), MappingError> {
    match names.iter().find(|name| !device.is_dataset(name)) {
        Some(name) => Err(MappingError::new(
            device.path(),
            format!("dataset '{name}' not found"),
        )),
        None => Ok(()),
    }
}

/// Number of samples per shot of a signal dataset: it must be an unstructured
/// 2-D dataset with one row per shot.
pub fn signal_width(device: &Group, dset: &Dataset, nshots: usize) -> Result<usize, MappingError> {
    match dset.shape() {
        [rows, width] if !dset.is_structured() && *rows == nshots => Ok(*width),
        _ => Err(MappingError::new(
            device.path(),
            format!("'{}' does not match expected shape", dset.name()),
        )),
    }
}
