//! Diagnostics made of a single summary dataset plus zero or more signal
//! datasets, all described by a static layout table.
use std::collections::BTreeMap;

use super::{harvest_attributes, require_datasets, signal_width, MsiConfig, MsiMap, SHOT_NUMBER};
use crate::container::Group;
use crate::descriptors::{FieldDescriptor, ValueType};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::MappingError;

pub struct SummaryLayout {
    pub device_name: &'static str,
    pub summary: &'static str,
    /// (meta key, summary field, element type)
    pub meta: &'static [(&'static str, &'static str, ValueType)],
    /// (signal key, dataset name)
    pub signals: &'static [(&'static str, &'static str)],
    /// (attribute key, attribute name)
    pub attributes: &'static [(&'static str, &'static str)],
}

/// Mapper of one table driven diagnostic
pub struct SummaryDiagnostic(pub &'static SummaryLayout);

pub static DISCHARGE: SummaryDiagnostic = SummaryDiagnostic(&SummaryLayout {
    device_name: "Discharge",
    summary: "Discharge summary",
    meta: &[
        ("timestamp", "Timestamp", ValueType::F64),
        ("data valid", "Data valid", ValueType::I8),
        ("pulse length", "Pulse length", ValueType::F32),
        ("peak current", "Peak current", ValueType::F32),
        ("bank voltage", "Bank voltage", ValueType::F32),
    ],
    signals: &[
        ("voltage", "Cathode-anode voltage"),
        ("current", "Discharge current"),
    ],
    attributes: &[
        ("current conversion factor", "Current conversion factor"),
        ("voltage conversion factor", "Voltage conversion factor"),
        ("t0", "Start time"),
        ("dt", "Timestep"),
    ],
});

pub static GAS_PRESSURE: SummaryDiagnostic = SummaryDiagnostic(&SummaryLayout {
    device_name: "Gas pressure",
    summary: "Gas pressure summary",
    meta: &[
        ("timestamp", "Timestamp", ValueType::F64),
        ("data valid - ion gauge", "Ion gauge data valid", ValueType::I8),
        ("data valid - RGA", "RGA data valid", ValueType::I8),
        ("fill pressure", "Fill pressure", ValueType::F32),
        ("peak AMU", "Peak AMU", ValueType::F32),
    ],
    signals: &[("partial pressures", "RGA partial pressures")],
    attributes: &[
        ("RGA AMUs", "RGA AMUs"),
        ("ion gauge calib tag", "Ion gauge calibration tag"),
        ("RGA calib tag", "RGA calibration tag"),
    ],
});

pub static HEATER: SummaryDiagnostic = SummaryDiagnostic(&SummaryLayout {
    device_name: "Heater",
    summary: "Heater summary",
    meta: &[
        ("timestamp", "Timestamp", ValueType::F64),
        ("data valid", "Data valid", ValueType::I8),
        ("current", "Heater current", ValueType::F32),
        ("voltage", "Heater voltage", ValueType::F32),
        ("temperature", "Heater temperature", ValueType::F32),
    ],
    signals: &[],
    attributes: &[("calib tag", "Calibration tag")],
});

pub static MAGNETIC_FIELD: SummaryDiagnostic = SummaryDiagnostic(&SummaryLayout {
    device_name: "Magnetic field",
    summary: "Magnetic field summary",
    meta: &[
        ("timestamp", "Timestamp", ValueType::F64),
        ("data valid", "Data valid", ValueType::I8),
        ("peak magnetic field", "Peak magnetic field", ValueType::F32),
    ],
    signals: &[
        ("magnet ps current", "Magnet power supply currents"),
        ("magnetic field", "Magnetic field profile"),
    ],
    attributes: &[
        ("calib tag", "Calibration tag"),
        ("z", "Profile z locations"),
    ],
});

impl DeviceMapper<MsiMap> for SummaryDiagnostic {
    fn device_name(&self) -> &'static str {
        self.0.device_name
    }

    fn build(&self, group: &Group) -> Result<MsiMap, MappingError> {
        let layout = self.0;
        let mut required: Vec<&str> = layout.signals.iter().map(|(_, dset)| *dset).collect();
        required.push(layout.summary);
        require_datasets(group, &required)?;

        let mut diagnostics = Diagnostics::new();
        let attributes = harvest_attributes(&group.attrs()?, layout.attributes, group, &mut diagnostics);

        let summary = group.dataset(layout.summary)?;
        let has_fields = std::iter::once(SHOT_NUMBER)
            .chain(layout.meta.iter().map(|(_, field, _)| *field))
            .all(|f| summary.has_field(f));
        let nshots = match summary.shape() {
            [n] if has_fields => *n,
            _ => {
                return Err(MappingError::new(
                    group.path(),
                    format!("'{}' does not match expected shape", layout.summary),
                ))
            }
        };
        let field_shape = |name: &str| {
            summary
                .field(name)
                .map(|f| f.shape.clone())
                .unwrap_or_default()
        };

        let shotnum = FieldDescriptor::field(summary.path(), SHOT_NUMBER, &field_shape(SHOT_NUMBER), ValueType::I32);
        let meta = layout
            .meta
            .iter()
            .map(|(key, field, value_type)| {
                let descriptor = FieldDescriptor::field(summary.path(), field, &field_shape(*field), *value_type);
                (key.to_string(), descriptor)
            })
            .collect();

        let mut signals = BTreeMap::new();
        for (key, name) in layout.signals {
            let dset = group.dataset(name)?;
            let width = signal_width(group, &dset, nshots)?;
            signals.insert(
                key.to_string(),
                FieldDescriptor::whole(dset.path(), &[width], ValueType::F32),
            );
        }

        let config = MsiConfig {
            shape: vec![nshots],
            shotnum,
            signals,
            meta,
            meta_shape: Vec::new(),
            attributes,
        };
        Ok(MsiMap::new(group, config, diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{AttrValue, DType, Field};
    use crate::memory::MemoryContainer;

    const DISCHARGE_PATH: &str = "/MSI/Discharge";

    fn discharge(mc: &mut MemoryContainer, nshots: usize, width: usize) {
        mc.add_dataset(&format!("{DISCHARGE_PATH}/Cathode-anode voltage"), &[nshots, width], DType::Float(4));
        mc.add_dataset(&format!("{DISCHARGE_PATH}/Discharge current"), &[nshots, width], DType::Float(4));
        mc.add_dataset(
            &format!("{DISCHARGE_PATH}/Discharge summary"),
            &[nshots],
            DType::Compound(vec![
                Field::scalar("Shot number", DType::Int(4)),
                Field::scalar("Timestamp", DType::Float(8)),
                Field::scalar("Data valid", DType::Int(1)),
                Field::scalar("Pulse length", DType::Float(4)),
                Field::scalar("Peak current", DType::Float(4)),
                Field::scalar("Bank voltage", DType::Float(4)),
            ]),
        );
        mc.set_attr(DISCHARGE_PATH, "Current conversion factor", 0.0);
        mc.set_attr(DISCHARGE_PATH, "Voltage conversion factor", 0.0);
        mc.set_attr(DISCHARGE_PATH, "Start time", -0.0249856);
        mc.set_attr(DISCHARGE_PATH, "Timestep", 4.88e-5);
    }

    fn build(mc: &MemoryContainer, path: &str, mapper: &SummaryDiagnostic) -> Result<MsiMap, MappingError> {
        let group = match Group::open(mc, path) {
            Ok(g) => g,
            Err(_) => panic!(),
        };
        mapper.build(&group)
    }

    #[test]
    fn test_discharge() {
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 10, 4096);
        let map = match build(&mc, DISCHARGE_PATH, &DISCHARGE) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.diagnostics.is_empty());
        let config = &map.config;
        assert_eq!(config.shape, vec![10]);
        assert_eq!(config.signals["voltage"].shape, vec![4096]);
        assert_eq!(config.signals["current"].shape, vec![4096]);
        assert!(config.signals["current"].dataset_fields.is_empty());
        assert_eq!(config.signals["current"].value_type, ValueType::F32);
        assert_eq!(config.shotnum.dataset_paths, vec![format!("{DISCHARGE_PATH}/Discharge summary")]);
        assert_eq!(config.shotnum.value_type, ValueType::I32);
        assert_eq!(config.meta.len(), 5);
        assert_eq!(config.meta["data valid"].value_type, ValueType::I8);
        assert_eq!(config.meta["timestamp"].dataset_fields, vec!["Timestamp"]);
        assert_eq!(config.attributes["t0"], vec![Some(AttrValue::Float(-0.0249856))]);
    }

    #[test]
    fn test_discharge_failures() {
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 10, 100);
        mc.remove(&format!("{DISCHARGE_PATH}/Discharge summary"));
        assert!(build(&mc, DISCHARGE_PATH, &DISCHARGE).is_err());

        // signal rows disagree with the summary
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 10, 100);
        mc.add_dataset(&format!("{DISCHARGE_PATH}/Discharge current"), &[9, 100], DType::Float(4));
        assert!(build(&mc, DISCHARGE_PATH, &DISCHARGE).is_err());

        // signal with fields
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 10, 100);
        mc.add_dataset(
            &format!("{DISCHARGE_PATH}/Cathode-anode voltage"),
            &[10, 100],
            DType::Compound(vec![Field::scalar("v", DType::Float(4))]),
        );
        assert!(build(&mc, DISCHARGE_PATH, &DISCHARGE).is_err());

        // summary missing a field
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 10, 100);
        mc.add_dataset(
            &format!("{DISCHARGE_PATH}/Discharge summary"),
            &[10],
            DType::Compound(vec![Field::scalar("Shot number", DType::Int(4))]),
        );
        assert!(build(&mc, DISCHARGE_PATH, &DISCHARGE).is_err());
    }

    #[test]
    fn test_missing_attributes_warn() {
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, 3, 10);
        mc.remove_attr(DISCHARGE_PATH, "Timestep");
        let map = match build(&mc, DISCHARGE_PATH, &DISCHARGE) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(map.diagnostics.len(), 1);
        assert!(map.diagnostics.mentions("Timestep"));
        assert!(map.config.attributes["dt"].is_empty());
    }

    #[test]
    fn test_heater_and_magnetic_field() {
        let mut mc = MemoryContainer::new();
        mc.add_dataset(
            "/MSI/Heater/Heater summary",
            &[4],
            DType::Compound(vec![
                Field::scalar("Shot number", DType::Int(4)),
                Field::scalar("Timestamp", DType::Float(8)),
                Field::scalar("Data valid", DType::Int(1)),
                Field::scalar("Heater current", DType::Float(4)),
                Field::scalar("Heater voltage", DType::Float(4)),
                Field::scalar("Heater temperature", DType::Float(4)),
            ]),
        );
        mc.set_attr("/MSI/Heater", "Calibration tag", "08/27/2002");
        let map = match build(&mc, "/MSI/Heater", &HEATER) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert!(map.config.signals.is_empty());
        assert_eq!(map.config.meta["temperature"].dataset_fields, vec!["Heater temperature"]);

        let path = "/MSI/Magnetic field";
        mc.add_dataset(&format!("{path}/Magnet power supply currents"), &[4, 10], DType::Float(4));
        mc.add_dataset(&format!("{path}/Magnetic field profile"), &[4, 1024], DType::Float(4));
        mc.add_dataset(
            &format!("{path}/Magnetic field summary"),
            &[4],
            DType::Compound(vec![
                Field::scalar("Shot number", DType::Int(4)),
                Field::scalar("Timestamp", DType::Float(8)),
                Field::scalar("Data valid", DType::Int(1)),
                Field::scalar("Peak magnetic field", DType::Float(4)),
            ]),
        );
        mc.set_attr(path, "Profile z locations", vec![0i64, 1, 2]);
        let map = match build(&mc, path, &MAGNETIC_FIELD) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(map.config.signals["magnetic field"].shape, vec![1024]);
        assert_eq!(map.config.signals["magnet ps current"].shape, vec![10]);
        assert_eq!(
            map.config.attributes["z"],
            vec![Some(AttrValue::Int(0)), Some(AttrValue::Int(1)), Some(AttrValue::Int(2))]
        );
        assert!(map.diagnostics.mentions("Calibration tag"));
    }
}
