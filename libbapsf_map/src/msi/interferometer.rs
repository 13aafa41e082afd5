//! The interferometer array: one subgroup per interferometer, each with its
//! own summary list and trace, mapped as a single diagnostic.
use std::collections::BTreeMap;

use super::{harvest_attributes, require_datasets, signal_width, MsiConfig, MsiMap, SHOT_NUMBER};
use crate::container::{AttrValue, Dataset, Group};
use crate::descriptors::{FieldDescriptor, ValueType};
use crate::device_map::DeviceMapper;
use crate::diagnostics::Diagnostics;
use crate::error::MappingError;

const SUMMARY: &str = "Interferometer summary list";
const TRACE: &str = "Interferometer trace";
const COUNT_ATTR: &str = "Interferometer count";

const META: [(&str, &str, ValueType); 3] = [
    ("timestamp", "Timestamp", ValueType::F64),
    ("data valid", "Data valid", ValueType::I8),
    ("peak density", "Peak density", ValueType::F32),
];

/// Attributes harvested from every interferometer subgroup
const INSTANCE_ATTRIBUTES: [(&str, &str); 4] = [
    ("t0", "Start time"),
    ("dt", "Timestep"),
    ("n_bar_L", "n_bar_L"),
    ("z", "z location"),
];

#[derive(Debug, Clone, Copy)]
pub struct InterferometerArray;

fn field_shape(dset: &Dataset, field: &str) -> Vec<usize> {
    dset.field(field).map(|f| f.shape.clone()).unwrap_or_default()
}

impl DeviceMapper<MsiMap> for InterferometerArray {
    fn device_name(&self) -> &'static str {
        "Interferometer array"
    }

    fn build(&self, group: &Group) -> Result<MsiMap, MappingError> {
        let mut diagnostics = Diagnostics::new();
        let mut attributes = harvest_attributes(
            &group.attrs()?,
            &[("n interferometer", COUNT_ATTR), ("calib tag", "Calibration tag")],
            group,
            &mut diagnostics,
        );
        let declared = match attributes.get("n interferometer").map(|v| v.as_slice()) {
            Some([Some(AttrValue::Int(n))]) => usize::try_from(*n).ok(),
            _ => None,
        };
        if declared.is_none() {
            diagnostics.warn(
                group.path(),
                format!("attribute '{COUNT_ATTR}' is not an integer, continuing with mapping"),
            );
        }

        let mut instances = Vec::new();
        for name in group.subgroup_names()? {
            if !name.contains("Interferometer") {
                continue;
            }
            let instance = group.group(&name)?;
            if require_datasets(&instance, &[SUMMARY, TRACE]).is_err() {
                return Err(MappingError::new(
                    group.path(),
                    format!("datasets '{SUMMARY}' and '{TRACE}' are required for '{name}'"),
                ));
            }
            let summary = instance.dataset(SUMMARY)?;
            let trace = instance.dataset(TRACE)?;
            instances.push((name, instance, summary, trace));
        }
        let Some((_, _, first_summary, first_trace)) = instances.first() else {
            return Err(MappingError::new(group.path(), "has no interferometers"));
        };
        let nshots = match first_summary.shape() {
            [n] => *n,
            _ => {
                return Err(MappingError::new(
                    group.path(),
                    format!("'{SUMMARY}' does not match expected shape"),
                ))
            }
        };
        let width = signal_width(group, first_trace, nshots)?;
        let shotnum_shape = field_shape(first_summary, SHOT_NUMBER);
        let meta_shapes: Vec<Vec<usize>> = META
            .iter()
            .map(|(_, field, _)| field_shape(first_summary, field))
            .collect();

        let mut per_instance: BTreeMap<String, Vec<Option<AttrValue>>> = BTreeMap::new();
        let mut names = Vec::new();
        let mut summary_paths = Vec::new();
        let mut trace_paths = Vec::new();
        for (name, instance, summary, trace) in &instances {
            if summary.shape() != [nshots] {
                return Err(MappingError::new(
                    group.path(),
                    format!("'{SUMMARY}' shape is not consistent across all interferometers"),
                ));
            }
            let has_fields = std::iter::once(SHOT_NUMBER)
                .chain(META.iter().map(|(_, field, _)| *field))
                .all(|f| summary.has_field(f));
            if !has_fields {
                return Err(MappingError::new(
                    group.path(),
                    format!("'{SUMMARY}' of '{name}' does NOT have required fields"),
                ));
            }
            if trace.is_structured() || trace.shape() != [nshots, width] {
                return Err(MappingError::new(
                    group.path(),
                    format!("'{TRACE}' shape is not consistent across all interferometers"),
                ));
            }
            let consistent = field_shape(summary, SHOT_NUMBER) == shotnum_shape
                && META
                    .iter()
                    .zip(meta_shapes.iter())
                    .all(|((_, field, _), shape)| field_shape(summary, field) == *shape);
            if !consistent {
                return Err(MappingError::new(
                    group.path(),
                    format!("field shapes of '{SUMMARY}' are not consistent for all interferometers"),
                ));
            }

            let attrs = instance.attrs()?;
            for (key, attr) in INSTANCE_ATTRIBUTES {
                let value = attrs.get(attr).cloned();
                if value.is_none() {
                    diagnostics.warn(
                        instance.path(),
                        format!("attribute '{attr}' not found, continuing with mapping"),
                    );
                }
                per_instance.entry(key.to_string()).or_default().push(value);
            }
            names.push(Some(AttrValue::Str(name.clone())));
            summary_paths.push(summary.path().to_string());
            trace_paths.push(trace.path().to_string());
        }

        let count = instances.len();
        if let Some(expected) = declared.filter(|n| *n != count) {
            return Err(MappingError::new(
                group.path(),
                format!("found {count} interferometers, '{COUNT_ATTR}' expects {expected}"),
            ));
        }

        attributes.insert(String::from("interferometer name"), names);
        attributes.extend(per_instance);

        let mut signals = BTreeMap::new();
        signals.insert(
            String::from("signal"),
            FieldDescriptor::new(trace_paths, &[], &[count, width], ValueType::F32),
        );
        let meta = META
            .iter()
            .zip(meta_shapes)
            .map(|((key, field, value_type), shape)| {
                let descriptor = FieldDescriptor::new(summary_paths.clone(), &[*field], &shape, *value_type);
                (key.to_string(), descriptor)
            })
            .collect();

        let config = MsiConfig {
            shape: vec![nshots],
            shotnum: FieldDescriptor::new(summary_paths.clone(), &[SHOT_NUMBER], &shotnum_shape, ValueType::I32),
            signals,
            meta,
            meta_shape: vec![count],
            attributes,
        };
        Ok(MsiMap::new(group, config, diagnostics))
    }
}
