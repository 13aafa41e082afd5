use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Could not open container because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Container has no object at path {0}")]
    NotFound(String),
    #[error("Container object at path {0} is not a group")]
    NotAGroup(String),
    #[error("Container object at path {0} is not a dataset")]
    NotADataset(String),
    #[error("Could not read raw values of attribute {0}")]
    ReadFailed(String),
    #[error("Container failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

/// Fatal failure to represent a single device. Caught by the category registry.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("'{path}' mapping failed: {why}")]
    Unmappable { path: String, why: String },
    #[error("Mapping failed due to container error: {0}")]
    ContainerError(#[from] ContainerError),
}

impl MappingError {
    pub fn new(path: &str, why: impl Into<String>) -> Self {
        Self::Unmappable {
            path: path.to_string(),
            why: why.into(),
        }
    }
}

/// Caller errors: bad handles or arguments that do not name anything mapped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("Path {0} is not a group in the container")]
    NotAGroup(String),
    #[error("No active digitizer configuration detected")]
    NoActiveConfig,
    #[error("There are multiple active configurations ({0:?}); a configuration name must be specified")]
    AmbiguousConfig(Vec<String>),
    #[error("Invalid configuration name {0}")]
    UnknownConfig(String),
    #[error("Specified configuration {0} is not active")]
    InactiveConfig(String),
    #[error("Specified adc {adc} is not in configuration {config}")]
    UnknownAdc { adc: String, config: String },
    #[error("Configuration {0} uses multiple adcs; an adc must be specified")]
    AmbiguousAdc(String),
    #[error("Board {board} and channel {channel} do not specify a valid dataset")]
    InvalidConnection { board: u32, channel: u32 },
    #[error("A valid receptacle number needs to be given, expected one of {0:?}")]
    UnknownReceptacle(Vec<String>),
    #[error("Configuration {0} does not carry a command list")]
    NoCommandList(String),
}

#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("StatePattern failed to compile regex: {0}")]
    BadRegex(#[from] regex::Error),
    #[error("StatePattern {0} must define exactly two named groups, VAL and a symbolic name")]
    WrongGroupCount(String),
    #[error("StatePattern {0} does not define the VAL group")]
    MissingValue(String),
    #[error("StatePattern can not use reserved symbolic name {0}")]
    ReservedName(String),
    #[error("Symbolic group {0} is defined in multiple patterns")]
    DuplicateName(String),
}

#[derive(Debug, Error)]
pub enum StateValuesError {
    #[error("State value rebuild failed due to argument error: {0}")]
    Argument(#[from] ArgumentError),
    #[error("State value rebuild failed due to pattern error: {0}")]
    Pattern(#[from] PatternError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config contains an invalid state pattern: {0}")]
    PatternError(#[from] PatternError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Report failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Report failed due to container error: {0}")]
    ContainerError(#[from] ContainerError),
    #[error("Report failed due to argument error: {0}")]
    ArgumentError(#[from] ArgumentError),
}
