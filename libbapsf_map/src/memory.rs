use fxhash::FxHashMap;
use ndarray::{ArrayD, IxDyn};

use super::container::{
    join_path, normalize_path, AttrValue, Attributes, Container, DType, DatasetLayout, NodeKind,
};
use super::error::ContainerError;

#[derive(Debug, Clone)]
enum Node {
    Group { members: Vec<String>, attrs: Attributes },
    Dataset { layout: DatasetLayout, attrs: Attributes },
}

/// An in-memory container tree. Members keep insertion order.
///
/// Builder methods create missing parent groups on the fly, so a layout can be
/// described with one call per dataset.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    nodes: FxHashMap<String, Node>,
}

impl Default for MemoryContainer {
    fn default() -> Self {
        let mut nodes = FxHashMap::default();
        nodes.insert(
            String::from("/"),
            Node::Group {
                members: Vec::new(),
                attrs: Attributes::new(),
            },
        );
        Self { nodes }
    }
}

fn split_parent(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(0) => (String::from("/"), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::from("/"), path.to_string()),
    }
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&mut self, path: &str, node: Node) {
        let (parent, name) = split_parent(path);
        if !self.nodes.contains_key(&parent) {
            self.add_group(&parent);
        }
        if let Some(Node::Group { members, .. }) = self.nodes.get_mut(&parent) {
            if !members.contains(&name) {
                members.push(name);
            }
        }
        self.nodes.insert(path.to_string(), node);
    }

    /// Create a group (and any missing parents). Existing groups are left untouched.
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        let path = normalize_path(path);
        if self.nodes.contains_key(&path) {
            return self;
        }
        self.link(
            &path,
            Node::Group {
                members: Vec::new(),
                attrs: Attributes::new(),
            },
        );
        self
    }

    /// Create or replace a dataset
    pub fn add_dataset(&mut self, path: &str, shape: &[usize], dtype: DType) -> &mut Self {
        let path = normalize_path(path);
        self.link(
            &path,
            Node::Dataset {
                layout: DatasetLayout {
                    shape: shape.to_vec(),
                    dtype,
                },
                attrs: Attributes::new(),
            },
        );
        self
    }

    /// Set an attribute on an existing object. Unknown paths become groups.
    pub fn set_attr(&mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        let path = normalize_path(path);
        if !self.nodes.contains_key(&path) {
            self.add_group(&path);
        }
        match self.nodes.get_mut(&path) {
            Some(Node::Group { attrs, .. }) | Some(Node::Dataset { attrs, .. }) => {
                attrs.insert(name.to_string(), value.into());
            }
            None => (),
        }
        self
    }

    pub fn remove_attr(&mut self, path: &str, name: &str) -> &mut Self {
        let path = normalize_path(path);
        match self.nodes.get_mut(&path) {
            Some(Node::Group { attrs, .. }) | Some(Node::Dataset { attrs, .. }) => {
                attrs.remove(name);
            }
            None => (),
        }
        self
    }

    /// Remove an object and everything below it
    pub fn remove(&mut self, path: &str) -> &mut Self {
        let path = normalize_path(path);
        let prefix = format!("{path}/");
        self.nodes
            .retain(|key, _| key != &path && !key.starts_with(&prefix));
        let (parent, name) = split_parent(&path);
        if let Some(Node::Group { members, .. }) = self.nodes.get_mut(&parent) {
            members.retain(|m| m != &name);
        }
        self
    }
}

impl Container for MemoryContainer {
    fn kind(&self, path: &str) -> Option<NodeKind> {
        match self.nodes.get(&normalize_path(path)) {
            Some(Node::Group { .. }) => Some(NodeKind::Group),
            Some(Node::Dataset { .. }) => Some(NodeKind::Dataset),
            None => None,
        }
    }

    fn members(&self, path: &str) -> Result<Vec<String>, ContainerError> {
        let path = normalize_path(path);
        match self.nodes.get(&path) {
            Some(Node::Group { members, .. }) => Ok(members.clone()),
            Some(Node::Dataset { .. }) => Err(ContainerError::NotAGroup(path)),
            None => Err(ContainerError::NotFound(path)),
        }
    }

    fn attributes(&self, path: &str) -> Result<Attributes, ContainerError> {
        let path = normalize_path(path);
        match self.nodes.get(&path) {
            Some(Node::Group { attrs, .. }) | Some(Node::Dataset { attrs, .. }) => {
                Ok(attrs.clone())
            }
            None => Err(ContainerError::NotFound(path)),
        }
    }

    fn layout(&self, path: &str) -> Result<DatasetLayout, ContainerError> {
        let path = normalize_path(path);
        match self.nodes.get(&path) {
            Some(Node::Dataset { layout, .. }) => Ok(layout.clone()),
            Some(Node::Group { .. }) => Err(ContainerError::NotADataset(path)),
            None => Err(ContainerError::NotFound(path)),
        }
    }
}

/// Convenience for builders: the full path of `name` below `parent`
pub fn child(parent: &str, name: &str) -> String {
    join_path(&normalize_path(parent), name)
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        let len = value.len();
        match ArrayD::from_shape_vec(IxDyn(&[len]), value) {
            Ok(arr) => AttrValue::IntArray(arr),
            Err(e) => AttrValue::Unsupported(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_parents() {
        let mut mc = MemoryContainer::new();
        mc.add_dataset("/Raw data + config/SIS 3301/data", &[10, 5], DType::Int(2));
        assert_eq!(mc.kind("/Raw data + config"), Some(NodeKind::Group));
        assert_eq!(mc.kind("/Raw data + config/SIS 3301"), Some(NodeKind::Group));
        assert_eq!(
            mc.kind("/Raw data + config/SIS 3301/data"),
            Some(NodeKind::Dataset)
        );
        let members = match mc.members("/") {
            Ok(m) => m,
            Err(_) => panic!(),
        };
        assert_eq!(members, vec![String::from("Raw data + config")]);
    }

    #[test]
    fn test_remove_subtree() {
        let mut mc = MemoryContainer::new();
        mc.add_group("/MSI/Discharge");
        mc.add_dataset("/MSI/Discharge/Discharge summary", &[5], DType::Float(4));
        mc.remove("/MSI/Discharge");
        assert_eq!(mc.kind("/MSI/Discharge/Discharge summary"), None);
        assert_eq!(mc.kind("/MSI/Discharge"), None);
        assert!(matches!(mc.members("/MSI"), Ok(m) if m.is_empty()));
    }

    #[test]
    fn test_attributes() {
        let mut mc = MemoryContainer::new();
        mc.set_attr("/MSI/Heater", "Calibration tag", "abc");
        assert_eq!(mc.kind("/MSI/Heater"), Some(NodeKind::Group));
        let attrs = match mc.attributes("/MSI/Heater") {
            Ok(a) => a,
            Err(_) => panic!(),
        };
        assert_eq!(
            attrs.get("Calibration tag"),
            Some(&AttrValue::Str(String::from("abc")))
        );
        assert!(matches!(
            mc.layout("/MSI/Heater"),
            Err(ContainerError::NotADataset(_))
        ));
    }
}
