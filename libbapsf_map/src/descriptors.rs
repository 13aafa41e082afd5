use serde::Serialize;

/// Element type handed to the array reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    U32,
    F32,
    F64,
    Bool,
    /// Fixed width text holding at most this many characters
    Str(usize),
}

/// Where a value lives and how it looks: the contract consumed by array readers.
///
/// `dataset_fields` is empty when the whole (unstructured) dataset is the value.
/// `dataset_paths` may be empty for digitizer shot numbers, whose header dataset
/// depends on the requested board and channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub dataset_paths: Vec<String>,
    pub dataset_fields: Vec<String>,
    pub shape: Vec<usize>,
    pub value_type: ValueType,
}

impl FieldDescriptor {
    pub fn new(
        dataset_paths: Vec<String>,
        dataset_fields: &[&str],
        shape: &[usize],
        value_type: ValueType,
    ) -> Self {
        Self {
            dataset_paths,
            dataset_fields: dataset_fields.iter().map(|f| f.to_string()).collect(),
            shape: shape.to_vec(),
            value_type,
        }
    }

    /// A descriptor of a single field in a single dataset
    pub fn field(dataset_path: &str, field: &str, shape: &[usize], value_type: ValueType) -> Self {
        Self::new(vec![dataset_path.to_string()], &[field], shape, value_type)
    }

    /// A descriptor of a whole unstructured dataset
    pub fn whole(dataset_path: &str, shape: &[usize], value_type: ValueType) -> Self {
        Self::new(vec![dataset_path.to_string()], &[], shape, value_type)
    }
}

/// Row or column count of a digitizer board's datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Extent {
    /// Every channel on the board agrees on this count
    Consistent(usize),
    /// Channels disagree; readers must handle shapes per channel
    Inconsistent,
    /// Never measured, the configuration is not active
    Unknown,
}

impl Extent {
    /// Fold one more observation into the extent
    pub fn observe(self, value: usize) -> Self {
        match self {
            Extent::Unknown => Extent::Consistent(value),
            Extent::Consistent(n) if n == value => self,
            Extent::Consistent(_) => Extent::Inconsistent,
            Extent::Inconsistent => Extent::Inconsistent,
        }
    }

    pub fn value(&self) -> Option<usize> {
        match self {
            Extent::Consistent(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_observe() {
        let ext = Extent::Unknown.observe(10);
        assert_eq!(ext, Extent::Consistent(10));
        assert_eq!(ext.observe(10), Extent::Consistent(10));
        assert_eq!(ext.observe(11), Extent::Inconsistent);
        assert_eq!(Extent::Inconsistent.observe(10), Extent::Inconsistent);
        assert_eq!(Extent::Inconsistent.value(), None);
    }
}
