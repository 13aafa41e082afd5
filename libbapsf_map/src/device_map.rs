use serde::Serialize;

use super::container::{AttrValue, Attributes, Group};
use super::diagnostics::Diagnostics;
use super::error::MappingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceCategory {
    Digitizer,
    Control,
    Msi,
}

/// Identity of one mapped device. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub group_name: String,
    pub group_path: String,
    pub category: DeviceCategory,
}

impl DeviceInfo {
    pub fn new(group: &Group, category: DeviceCategory) -> Self {
        Self {
            group_name: group.name().to_string(),
            group_path: group.path().to_string(),
            category,
        }
    }
}

/// Builds the mapping of one device class from its group.
///
/// One unit struct per device implements this; the category modules list them
/// in a static table keyed by the expected group name.
pub trait DeviceMapper<M>: Sync {
    /// Group name this mapper recognizes
    fn device_name(&self) -> &'static str;

    fn build(&self, group: &Group) -> Result<M, MappingError>;
}

/// A category of mapped devices (digitizer, control, msi)
pub trait MappedDevice: Sized + 'static {
    fn mappers() -> &'static [&'static dyn DeviceMapper<Self>];
    fn info(&self) -> &DeviceInfo;
    fn diagnostics(&self) -> &Diagnostics;
}

/// Look up an optional attribute, warning when it is absent
pub fn harvest(
    attrs: &Attributes,
    key: &str,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Option<AttrValue> {
    match attrs.get(key) {
        Some(value) => Some(value.clone()),
        None => {
            diagnostics.warn(
                path,
                format!("attribute '{key}' not found, continuing with mapping"),
            );
            None
        }
    }
}
