use serde::{Deserialize, Serialize};

use super::container::{normalize_path, Container, Group};
use super::controls::ControlMap;
use super::diagnostics::Diagnostics;
use super::digitizers::DigitizerMap;
use super::error::ArgumentError;
use super::msi::MsiMap;
use super::registry::CategoryRegistry;

/// Digitizers preferred as the main digitizer, in priority order
const MAIN_DIGITIZER_CANDIDATES: [&str; 2] = ["SIS 3301", "SIS crate"];

/// Root group of each device category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePaths {
    pub control: String,
    pub digitizer: String,
    pub msi: String,
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self {
            control: String::from("Raw data + config"),
            digitizer: String::from("Raw data + config"),
            msi: String::from("MSI"),
        }
    }
}

/// A mapped device of any category
#[derive(Debug, Clone, Copy)]
pub enum DeviceRef<'a> {
    Control(&'a ControlMap),
    Digitizer(&'a DigitizerMap),
    Msi(&'a MsiMap),
}

/// Mapping of an entire file: one registry per category plus everything found
/// below the category roots that nothing knows how to map.
#[derive(Debug, Clone, Serialize)]
pub struct FileMap {
    pub device_paths: DevicePaths,
    pub controls: CategoryRegistry<ControlMap>,
    pub digitizers: CategoryRegistry<DigitizerMap>,
    pub msi: CategoryRegistry<MsiMap>,
    pub unknowns: Vec<String>,
    pub diagnostics: Diagnostics,
}

fn build_registry<M: super::device_map::MappedDevice>(
    container: &dyn Container,
    path: &str,
    label: &str,
    diagnostics: &mut Diagnostics,
) -> CategoryRegistry<M> {
    match Group::open(container, path) {
        Ok(group) => CategoryRegistry::new(&group),
        Err(_) => {
            diagnostics.warn(path, format!("{label} ('{path}') does NOT exist."));
            CategoryRegistry::empty()
        }
    }
}

impl FileMap {
    pub fn new(container: &dyn Container, paths: &DevicePaths) -> Result<Self, ArgumentError> {
        if Group::open(container, "/").is_err() {
            return Err(ArgumentError::NotAGroup(String::from("/")));
        }
        let device_paths = DevicePaths {
            control: normalize_path(&paths.control),
            digitizer: normalize_path(&paths.digitizer),
            msi: normalize_path(&paths.msi),
        };
        let mut diagnostics = Diagnostics::new();
        let msi = build_registry(container, &device_paths.msi, "MSI", &mut diagnostics);
        let digitizers = build_registry(
            container,
            &device_paths.digitizer,
            "Group for digitizers",
            &mut diagnostics,
        );
        let controls = build_registry(
            container,
            &device_paths.control,
            "Group for control devices",
            &mut diagnostics,
        );
        let mut map = Self {
            device_paths,
            controls,
            digitizers,
            msi,
            unknowns: Vec::new(),
            diagnostics,
        };
        map.unknowns = map.find_unknowns(container);
        Ok(map)
    }

    /// Every member of the root and of the category roots that is neither a
    /// category root nor a mapped device
    fn find_unknowns(&self, container: &dyn Container) -> Vec<String> {
        let paths = [
            (&self.device_paths.control, self.controls.names()),
            (&self.device_paths.digitizer, self.digitizers.names()),
            (&self.device_paths.msi, self.msi.names()),
        ];
        let root_known: Vec<String> = paths
            .iter()
            .filter_map(|(path, _)| path.trim_start_matches('/').split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();
        let mut known: Vec<(String, Vec<String>)> = vec![(String::from("/"), root_known)];
        for (path, names) in paths.iter() {
            let names = names.iter().map(|n| n.to_string());
            match known.iter_mut().find(|(p, _)| p == *path) {
                Some((_, list)) => list.extend(names),
                None => known.push((path.to_string(), names.collect())),
            }
        }

        let mut unknowns = Vec::new();
        for (path, names) in known.iter() {
            let Ok(group) = Group::open(container, path) else {
                continue;
            };
            let Ok(members) = group.member_names() else {
                continue;
            };
            for member in members {
                if !names.contains(&member) {
                    unknowns.push(group.child_path(&member));
                }
            }
        }
        unknowns
    }

    /// Look up a mapped device by name: controls first, then digitizers, then msi
    pub fn get(&self, name: &str) -> Option<DeviceRef<'_>> {
        if let Some(control) = self.controls.get(name) {
            Some(DeviceRef::Control(control))
        } else if let Some(digi) = self.digitizers.get(name) {
            Some(DeviceRef::Digitizer(digi))
        } else {
            self.msi.get(name).map(DeviceRef::Msi)
        }
    }

    /// The sole mapped digitizer, else the first mapped of the preferred candidates
    pub fn main_digitizer(&self) -> Option<&DigitizerMap> {
        if self.digitizers.len() == 1 {
            return self.digitizers.iter().next().map(|(_, digi)| digi);
        }
        MAIN_DIGITIZER_CANDIDATES
            .iter()
            .find_map(|name| self.digitizers.get(name))
    }

    pub fn controls_mut(&mut self) -> &mut CategoryRegistry<ControlMap> {
        &mut self.controls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DType;
    use crate::memory::MemoryContainer;

    fn unknown_layout() -> MemoryContainer {
        let mut mc = MemoryContainer::new();
        mc.add_group("/Raw data + config/Not known");
        mc.add_group("/MSI/Not a diagnostic");
        mc.add_dataset("/Random dataset", &[2], DType::Int(4));
        mc
    }

    #[test]
    fn test_unknowns() {
        let mc = unknown_layout();
        let map = match FileMap::new(&mc, &DevicePaths::default()) {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        assert_eq!(
            map.unknowns,
            vec![
                String::from("/Random dataset"),
                String::from("/Raw data + config/Not known"),
                String::from("/MSI/Not a diagnostic"),
            ]
        );
        // both control and digitizer roots point at the same group, listed once
        assert_eq!(
            map.unknowns
                .iter()
                .filter(|u| u.as_str() == "/Raw data + config/Not known")
                .count(),
            1
        );
        assert!(map.get("Not known").is_none());
        assert!(map.main_digitizer().is_none());
    }

    #[test]
    fn test_missing_roots() {
        let mc = MemoryContainer::new();
        let map = match FileMap::new(&mc, &DevicePaths::default()) {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        assert!(map.controls.is_empty());
        assert!(map.digitizers.is_empty());
        assert!(map.msi.is_empty());
        assert!(map.unknowns.is_empty());
        assert_eq!(map.diagnostics.len(), 3);
        assert!(map.diagnostics.mentions("Group for control devices ('/Raw data + config') does NOT exist."));
    }

    #[test]
    fn test_empty_paths_mean_root() {
        let mut mc = MemoryContainer::new();
        mc.add_group("/Something");
        let paths = DevicePaths {
            control: String::new(),
            digitizer: String::new(),
            msi: String::new(),
        };
        let map = match FileMap::new(&mc, &paths) {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        assert_eq!(map.device_paths.msi, "/");
        assert_eq!(map.unknowns, vec![String::from("/Something")]);
    }
}
