//! The read-only seam between the mapping engine and whatever stores the data.
//!
//! Mappers only ever see a [`Group`] handle. The handle talks to a [`Container`]
//! trait object, which is implemented for real HDF5 files
//! ([`Hdf5Container`](crate::hdf5_container::Hdf5Container)) and for in-memory
//! trees ([`MemoryContainer`](crate::memory::MemoryContainer)).
use ndarray::ArrayD;
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::ContainerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Dataset,
}

/// Element type of a dataset or a dataset field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DType {
    Int(usize),
    UInt(usize),
    Float(usize),
    Bool,
    FixedString(usize),
    VarString,
    Compound(Vec<Field>),
    Other(String),
}

/// A named field of a compound element type. `shape` is empty for scalar fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl Field {
    pub fn new(name: &str, dtype: DType, shape: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
        }
    }

    pub fn scalar(name: &str, dtype: DType) -> Self {
        Self::new(name, dtype, &[])
    }

    /// True for a single integer per row, the only acceptable shot number or command index column
    pub fn is_scalar_integer(&self) -> bool {
        self.shape.is_empty() && self.dtype.is_integer()
    }
}

impl DType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::Int(_) | DType::UInt(_))
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            DType::Compound(fields) => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

/// Decoded attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntArray(ArrayD<i64>),
    FloatArray(ArrayD<f64>),
    StrArray(Vec<String>),
    Unsupported(String),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer arrays, with a scalar integer promoted to a one element array
    pub fn as_int_array(&self) -> Option<ArrayD<i64>> {
        match self {
            AttrValue::IntArray(a) => Some(a.clone()),
            AttrValue::Int(v) => ArrayD::from_shape_vec(ndarray::IxDyn(&[1]), vec![*v]).ok(),
            _ => None,
        }
    }

    /// LaPD flags are stored as the byte string `TRUE`
    pub fn is_true_flag(&self) -> bool {
        self.as_str() == Some("TRUE")
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// Read-only, path addressed access to a hierarchical container
pub trait Container {
    fn kind(&self, path: &str) -> Option<NodeKind>;
    fn members(&self, path: &str) -> Result<Vec<String>, ContainerError>;
    fn attributes(&self, path: &str) -> Result<Attributes, ContainerError>;
    fn layout(&self, path: &str) -> Result<DatasetLayout, ContainerError>;
}

/// Normalize a user supplied path to an absolute path without a trailing separator
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::from("/")
    } else {
        format!("/{trimmed}")
    }
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Group handle, loosely modelled after the h5py group
#[derive(Clone)]
pub struct Group<'c> {
    container: &'c dyn Container,
    path: String,
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("path", &self.path).finish()
    }
}

impl<'c> Group<'c> {
    pub fn open(container: &'c dyn Container, path: &str) -> Result<Self, ContainerError> {
        let path = normalize_path(path);
        match container.kind(&path) {
            Some(NodeKind::Group) => Ok(Self { container, path }),
            Some(NodeKind::Dataset) => Err(ContainerError::NotAGroup(path)),
            None => Err(ContainerError::NotFound(path)),
        }
    }

    pub fn name(&self) -> &str {
        basename(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child_path(&self, name: &str) -> String {
        join_path(&self.path, name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.container.kind(&self.child_path(name)).is_some()
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.container.kind(&self.child_path(name)) == Some(NodeKind::Group)
    }

    pub fn is_dataset(&self, name: &str) -> bool {
        self.container.kind(&self.child_path(name)) == Some(NodeKind::Dataset)
    }

    pub fn member_names(&self) -> Result<Vec<String>, ContainerError> {
        self.container.members(&self.path)
    }

    pub fn subgroup_names(&self) -> Result<Vec<String>, ContainerError> {
        Ok(self
            .member_names()?
            .into_iter()
            .filter(|name| self.is_group(name))
            .collect())
    }

    pub fn dataset_names(&self) -> Result<Vec<String>, ContainerError> {
        Ok(self
            .member_names()?
            .into_iter()
            .filter(|name| self.is_dataset(name))
            .collect())
    }

    pub fn attrs(&self) -> Result<Attributes, ContainerError> {
        self.container.attributes(&self.path)
    }

    pub fn attr(&self, name: &str) -> Result<Option<AttrValue>, ContainerError> {
        Ok(self.attrs()?.remove(name))
    }

    pub fn group(&self, name: &str) -> Result<Group<'c>, ContainerError> {
        Group::open(self.container, &self.child_path(name))
    }

    pub fn dataset(&self, name: &str) -> Result<Dataset, ContainerError> {
        let path = self.child_path(name);
        match self.container.kind(&path) {
            Some(NodeKind::Dataset) => {
                let layout = self.container.layout(&path)?;
                Ok(Dataset { path, layout })
            }
            Some(NodeKind::Group) => Err(ContainerError::NotADataset(path)),
            None => Err(ContainerError::NotFound(path)),
        }
    }
}

/// Dataset metadata snapshot. Sample data is never read by the mapping engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    path: String,
    layout: DatasetLayout,
}

impl Dataset {
    pub fn name(&self) -> &str {
        basename(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    pub fn ndim(&self) -> usize {
        self.layout.shape.len()
    }

    pub fn dtype(&self) -> &DType {
        &self.layout.dtype
    }

    pub fn is_structured(&self) -> bool {
        self.layout.dtype.fields().is_some()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.layout
            .dtype
            .fields()
            .and_then(|fields| fields.iter().find(|f| f.name == name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("Raw data + config/"), "/Raw data + config");
        assert_eq!(join_path("/", "MSI"), "/MSI");
        assert_eq!(join_path("/MSI", "Discharge"), "/MSI/Discharge");
        assert_eq!(basename("/MSI/Discharge"), "Discharge");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_attr_helpers() {
        assert_eq!(AttrValue::Int(3).as_float(), Some(3.0));
        assert_eq!(AttrValue::Float(3.5).as_int(), None);
        assert!(AttrValue::Str(String::from("TRUE")).is_true_flag());
        assert!(!AttrValue::Str(String::from("FALSE")).is_true_flag());
        let arr = match AttrValue::Int(5).as_int_array() {
            Some(a) => a,
            None => panic!(),
        };
        assert_eq!(arr.ndim(), 1);
        assert_eq!(arr[[0]], 5);
    }
}
