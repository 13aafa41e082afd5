use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::File;
use hdf5_sys::h5a::H5Aread;
use ndarray::{ArrayD, IxDyn};
use std::path::Path;

use super::container::{
    normalize_path, AttrValue, Attributes, Container, DType, DatasetLayout, Field, NodeKind,
};
use super::error::ContainerError;

/// Read fixed length strings of any length. The element length is only known
/// at runtime, so the attribute is read in its own file type and split into
/// `n` byte chunks.
fn read_fixed_strings(attr: &hdf5::Attribute, n: usize) -> Result<AttrValue, ContainerError> {
    let dtype = attr.dtype()?;
    let count = attr.size();
    let mut buffer = vec![0u8; n * count];
    if n > 0 && count > 0 {
        let status = hdf5::sync::sync(|| unsafe {
            H5Aread(attr.id(), dtype.id(), buffer.as_mut_ptr().cast())
        });
        if status < 0 {
            return Err(ContainerError::ReadFailed(attr.name()));
        }
    }
    let decode =
        |bytes: &[u8]| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string();
    if attr.is_scalar() {
        Ok(AttrValue::Str(decode(&buffer[..])))
    } else if n == 0 {
        Ok(AttrValue::StrArray(vec![String::new(); count]))
    } else {
        Ok(AttrValue::StrArray(buffer.chunks(n).map(decode).collect()))
    }
}

fn read_strings<T: hdf5::H5Type>(
    attr: &hdf5::Attribute,
    to_string: impl Fn(&T) -> String,
) -> Result<AttrValue, ContainerError> {
    if attr.is_scalar() {
        Ok(AttrValue::Str(to_string(&attr.read_scalar::<T>()?)))
    } else {
        Ok(AttrValue::StrArray(
            attr.read_raw::<T>()?.iter().map(to_string).collect(),
        ))
    }
}

fn read_numeric<T: hdf5::H5Type + Clone>(
    attr: &hdf5::Attribute,
    scalar: impl Fn(T) -> AttrValue,
    array: impl Fn(ArrayD<T>) -> AttrValue,
) -> Result<AttrValue, ContainerError> {
    if attr.is_scalar() {
        return Ok(scalar(attr.read_scalar::<T>()?));
    }
    let shape = attr.shape();
    let values = attr.read_raw::<T>()?;
    match ArrayD::from_shape_vec(IxDyn(&shape), values) {
        Ok(arr) => Ok(array(arr)),
        Err(e) => Ok(AttrValue::Unsupported(e.to_string())),
    }
}

fn read_unsigned(attr: &hdf5::Attribute) -> Result<AttrValue, ContainerError> {
    let to_signed = |v: u64| i64::try_from(v).ok();
    if attr.is_scalar() {
        return Ok(match to_signed(attr.read_scalar::<u64>()?) {
            Some(v) => AttrValue::Int(v),
            None => AttrValue::Unsupported(format!("unsigned integer above {}", i64::MAX)),
        });
    }
    let shape = attr.shape();
    let values: Option<Vec<i64>> = attr.read_raw::<u64>()?.into_iter().map(to_signed).collect();
    match values.map(|v| ArrayD::from_shape_vec(IxDyn(&shape), v)) {
        Some(Ok(arr)) => Ok(AttrValue::IntArray(arr)),
        Some(Err(e)) => Ok(AttrValue::Unsupported(e.to_string())),
        None => Ok(AttrValue::Unsupported(format!(
            "unsigned integer array with an element above {}",
            i64::MAX
        ))),
    }
}

fn read_attribute(attr: &hdf5::Attribute) -> Result<AttrValue, ContainerError> {
    let descriptor = attr.dtype()?.to_descriptor()?;
    let value = match descriptor {
        TypeDescriptor::Integer(_) => read_numeric::<i64>(attr, AttrValue::Int, AttrValue::IntArray)?,
        TypeDescriptor::Unsigned(_) => read_unsigned(attr)?,
        TypeDescriptor::Float(_) => read_numeric::<f64>(attr, AttrValue::Float, AttrValue::FloatArray)?,
        TypeDescriptor::Boolean => {
            if attr.is_scalar() {
                AttrValue::Bool(attr.read_scalar::<bool>()?)
            } else {
                AttrValue::Unsupported(String::from("boolean array"))
            }
        }
        TypeDescriptor::VarLenAscii => read_strings::<VarLenAscii>(attr, |s| s.as_str().to_string())?,
        TypeDescriptor::VarLenUnicode => {
            read_strings::<VarLenUnicode>(attr, |s| s.as_str().to_string())?
        }
        TypeDescriptor::FixedAscii(n) | TypeDescriptor::FixedUnicode(n) => {
            read_fixed_strings(attr, n)?
        }
        other => AttrValue::Unsupported(format!("{other:?}")),
    };
    Ok(value)
}

/// Convert an HDF5 type to our element type. Array members are flattened into
/// the returned per-element shape.
fn convert_descriptor(descriptor: &TypeDescriptor) -> (DType, Vec<usize>) {
    match descriptor {
        TypeDescriptor::Integer(size) => (DType::Int(*size as usize), vec![]),
        TypeDescriptor::Unsigned(size) => (DType::UInt(*size as usize), vec![]),
        TypeDescriptor::Float(size) => (DType::Float(*size as usize), vec![]),
        TypeDescriptor::Boolean => (DType::Bool, vec![]),
        TypeDescriptor::FixedAscii(n) | TypeDescriptor::FixedUnicode(n) => {
            (DType::FixedString(*n), vec![])
        }
        TypeDescriptor::VarLenAscii | TypeDescriptor::VarLenUnicode => (DType::VarString, vec![]),
        TypeDescriptor::FixedArray(inner, len) => {
            let (dtype, mut shape) = convert_descriptor(inner);
            shape.insert(0, *len);
            (dtype, shape)
        }
        TypeDescriptor::Compound(compound) => {
            let fields = compound
                .fields
                .iter()
                .map(|f| {
                    let (dtype, shape) = convert_descriptor(&f.ty);
                    Field {
                        name: f.name.clone(),
                        dtype,
                        shape,
                    }
                })
                .collect();
            (DType::Compound(fields), vec![])
        }
        other => (DType::Other(format!("{other:?}")), vec![]),
    }
}

/// A read-only HDF5 file
#[derive(Debug)]
pub struct Hdf5Container {
    file: File,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        if !path.exists() {
            return Err(ContainerError::BadFilePath(path.to_path_buf()));
        }
        Ok(Self {
            file: File::open(path)?,
        })
    }

    fn read_attributes(location: &hdf5::Location) -> Result<Attributes, ContainerError> {
        let mut attrs = Attributes::new();
        for name in location.attr_names()? {
            let attr = location.attr(&name)?;
            match read_attribute(&attr) {
                Ok(value) => {
                    attrs.insert(name, value);
                }
                Err(e) => {
                    spdlog::debug!("Could not decode attribute {name}: {e}");
                    attrs.insert(name, AttrValue::Unsupported(e.to_string()));
                }
            }
        }
        Ok(attrs)
    }
}

impl Container for Hdf5Container {
    fn kind(&self, path: &str) -> Option<NodeKind> {
        let path = normalize_path(path);
        if path == "/" {
            return Some(NodeKind::Group);
        }
        if !self.file.link_exists(&path) {
            return None;
        }
        if self.file.group(&path).is_ok() {
            Some(NodeKind::Group)
        } else if self.file.dataset(&path).is_ok() {
            Some(NodeKind::Dataset)
        } else {
            None
        }
    }

    fn members(&self, path: &str) -> Result<Vec<String>, ContainerError> {
        Ok(self.file.group(&normalize_path(path))?.member_names()?)
    }

    fn attributes(&self, path: &str) -> Result<Attributes, ContainerError> {
        let path = normalize_path(path);
        match self.kind(&path) {
            Some(NodeKind::Group) => Self::read_attributes(&self.file.group(&path)?),
            Some(NodeKind::Dataset) => Self::read_attributes(&self.file.dataset(&path)?),
            None => Err(ContainerError::NotFound(path)),
        }
    }

    fn layout(&self, path: &str) -> Result<DatasetLayout, ContainerError> {
        let dataset = self.file.dataset(&normalize_path(path))?;
        let (dtype, _) = convert_descriptor(&dataset.dtype()?.to_descriptor()?);
        Ok(DatasetLayout {
            shape: dataset.shape(),
            dtype,
        })
    }
}
