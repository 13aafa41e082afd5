use serde::Serialize;
use std::collections::BTreeMap;

use super::container::{Container, Group};
use super::device_map::{DeviceMapper, MappedDevice};
use super::diagnostics::Diagnostic;
use super::error::{ArgumentError, MappingError};

/// All mapped devices of one category found below a category root group.
///
/// Subgroups whose name exactly matches a registered mapper are built; a device
/// whose build fails is left out and recorded in `rejected`. Subgroups with no
/// registered mapper are ignored here and reported by the file map as unknowns.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryRegistry<M: MappedDevice> {
    root_path: Option<String>,
    devices: BTreeMap<String, M>,
    rejected: Vec<Diagnostic>,
}

impl<M: MappedDevice> CategoryRegistry<M> {
    /// A registry for a category whose root group does not exist
    pub fn empty() -> Self {
        Self {
            root_path: None,
            devices: BTreeMap::new(),
            rejected: Vec::new(),
        }
    }

    /// Map every recognised device below `path`. The path must name a group.
    pub fn from_path(container: &dyn Container, path: &str) -> Result<Self, ArgumentError> {
        let group =
            Group::open(container, path).map_err(|_| ArgumentError::NotAGroup(path.to_string()))?;
        Ok(Self::new(&group))
    }

    pub fn new(root: &Group) -> Self {
        let mut registry = Self {
            root_path: Some(root.path().to_string()),
            devices: BTreeMap::new(),
            rejected: Vec::new(),
        };
        let subgroups = match root.subgroup_names() {
            Ok(names) => names,
            Err(e) => {
                spdlog::warn!("Could not list members of {}: {e}", root.path());
                registry.rejected.push(Diagnostic {
                    path: root.path().to_string(),
                    message: e.to_string(),
                });
                return registry;
            }
        };

        for name in subgroups {
            let Some(mapper) = M::mappers().iter().find(|m| m.device_name() == name) else {
                spdlog::debug!("No mapper registered for {}", root.child_path(&name));
                continue;
            };
            let result = root.group(&name).map_err(MappingError::from).and_then(|g| mapper.build(&g));
            match result {
                Ok(device) => {
                    spdlog::info!("Mapped device {}", root.child_path(&name));
                    registry.devices.insert(name, device);
                }
                Err(e) => {
                    spdlog::warn!("Mapping of {} failed: {e}", root.child_path(&name));
                    registry.rejected.push(Diagnostic {
                        path: root.child_path(&name),
                        message: e.to_string(),
                    });
                }
            }
        }
        registry
    }

    /// Names of every device this category knows how to map
    pub fn mappable_devices() -> Vec<&'static str> {
        M::mappers().iter().map(|m| m.device_name()).collect()
    }

    pub fn root_path(&self) -> Option<&str> {
        self.root_path.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&M> {
        self.devices.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut M> {
        self.devices.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.devices.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &M)> {
        self.devices.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Devices that were recognised but could not be mapped
    pub fn rejected(&self) -> &[Diagnostic] {
        &self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DType;
    use crate::digitizers::DigitizerMap;
    use crate::memory::MemoryContainer;
    use crate::msi::MsiMap;

    fn discharge(mc: &mut MemoryContainer, root: &str) {
        let path = format!("{root}/Discharge");
        mc.add_dataset(&format!("{path}/Cathode-anode voltage"), &[5, 100], DType::Float(4));
        mc.add_dataset(&format!("{path}/Discharge current"), &[5, 100], DType::Float(4));
        mc.add_dataset(
            &format!("{path}/Discharge summary"),
            &[5],
            DType::Compound(vec![
                crate::container::Field::scalar("Shot number", DType::Int(4)),
                crate::container::Field::scalar("Timestamp", DType::Float(8)),
                crate::container::Field::scalar("Data valid", DType::Int(1)),
                crate::container::Field::scalar("Pulse length", DType::Float(4)),
                crate::container::Field::scalar("Peak current", DType::Float(4)),
                crate::container::Field::scalar("Bank voltage", DType::Float(4)),
            ]),
        );
    }

    #[test]
    fn test_partial_failure() {
        let mut mc = MemoryContainer::new();
        discharge(&mut mc, "/MSI");
        // recognised name but empty group: mapping fails
        mc.add_group("/MSI/Heater");
        mc.add_group("/MSI/Not a diagnostic");
        let registry: CategoryRegistry<MsiMap> = match CategoryRegistry::from_path(&mc, "/MSI") {
            Ok(r) => r,
            Err(_) => panic!(),
        };
        assert_eq!(registry.names(), vec!["Discharge"]);
        assert_eq!(registry.rejected().len(), 1);
        assert_eq!(registry.rejected()[0].path, "/MSI/Heater");
        assert!(registry.get("Not a diagnostic").is_none());
    }

    #[test]
    fn test_not_a_group() {
        let mut mc = MemoryContainer::new();
        mc.add_dataset("/MSI", &[3], DType::Int(4));
        let result: Result<CategoryRegistry<MsiMap>, _> = CategoryRegistry::from_path(&mc, "/MSI");
        assert_eq!(result.err(), Some(ArgumentError::NotAGroup(String::from("/MSI"))));
        let result: Result<CategoryRegistry<MsiMap>, _> =
            CategoryRegistry::from_path(&mc, "/Nothing");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_root() {
        let mut mc = MemoryContainer::new();
        mc.add_group("/Raw data + config");
        let registry: CategoryRegistry<DigitizerMap> =
            match CategoryRegistry::from_path(&mc, "/Raw data + config") {
                Ok(r) => r,
                Err(_) => panic!(),
            };
        assert!(registry.is_empty());
        assert!(registry.rejected().is_empty());
        assert_eq!(
            CategoryRegistry::<DigitizerMap>::mappable_devices(),
            vec!["SIS 3301", "SIS crate"]
        );
    }
}
