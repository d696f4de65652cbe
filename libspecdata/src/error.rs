use std::path::PathBuf;
use thiserror::Error;

use super::record::RecordId;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("KeyRegistry already has a handler for key {0}; keys may only be registered once")]
    DuplicateKey(String),
    #[error("KeyRegistry was given a badly-formed key: '{0}'")]
    BadKey(String),
    #[error("KeyRegistry was given a handler for key {0} without a process operation")]
    MissingProcessOperation(String),
    #[error("KeyRegistry could not compile key {key} as a pattern: {source}")]
    BadPattern { key: String, source: regex::Error },
    #[error("KeyRegistry does not know of a handler module named {0}")]
    UnknownModule(String),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Line has no value after its key: {0}")]
    MissingValue(String),
    #[error("Handler failed to parse a number: {0}")]
    ParsingError(#[from] std::num::ParseFloatError),
    #[error("Attribute {0} does not hold a {1}")]
    WrongValueType(String, &'static str),
    #[error("Attribute {0} was required but never set")]
    MissingAttribute(String),
    #[error("{0}")]
    Mismatch(String),
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Handler {key} failed on line {line_number} ({record}): {source}")]
    Handler {
        line_number: usize,
        key: String,
        record: RecordId,
        source: HandlerError,
    },
    #[error("Deferred processing by handler {key} failed for {record}: {source}")]
    DeferredProcessing {
        key: String,
        record: RecordId,
        source: HandlerError,
    },
    #[error("Line {line_number} has no handler for key '{token}'")]
    Unmatched { line_number: usize, token: String },
    #[error("Handler {key} set attribute {attribute} on {record} but does not declare it")]
    UndeclaredAttribute {
        key: String,
        attribute: String,
        record: RecordId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("Attribute {0} was never populated on this record")]
    NotPopulated(String),
    #[error("No registered handler declares attribute {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Geometry {0} is not in the diffractometer geometry catalog")]
    UnknownGeometry(String),
    #[error("Geometry line {group} of {scan} has {actual} values; geometry {geometry} expects {expected}")]
    GeometryShapeMismatch {
        scan: RecordId,
        geometry: String,
        group: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Geometry line {group} of {scan} has a non-numeric value '{value}'")]
    BadValue {
        scan: RecordId,
        group: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("GeometryCatalog failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("GeometryCatalog must have exactly one default geometry; found {0}")]
    DefaultCount(usize),
    #[error("GeometryCatalog defines geometry {0} more than once")]
    DuplicateGeometry(String),
    #[error("GeometryCatalog geometry {name} repeats the {group} label {label}")]
    DuplicateLabel {
        name: String,
        group: &'static str,
        label: String,
    },
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container path '{0}' is not an absolute group path")]
    BadPath(String),
    #[error("Container has no group at {0}")]
    MissingGroup(String),
    #[error("Container group {0} has no dataset {1}")]
    MissingDataset(String, String),
}

#[derive(Debug, Error)]
pub enum SpecFileError {
    #[error("Could not open SPEC file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("SPEC file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("SPEC file {path:?} could not be assembled: {source}")]
    Assembly { path: PathBuf, source: AssemblyError },
}

#[derive(Debug, Error)]
pub enum TreeWriterError {
    #[error("TreeWriter failed due to container error: {0}")]
    ContainerError(#[from] ContainerError),
    #[error("TreeWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("TreeWriter failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("TreeWriter cannot write to {0:?} because its directory does not exist")]
    BadFilePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to SPEC file error: {0}")]
    SpecFileError(#[from] SpecFileError),
    #[error("Processor failed due to TreeWriter error: {0}")]
    WriterError(#[from] TreeWriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to KeyRegistry error: {0}")]
    RegistryError(#[from] RegistryError),
    #[error("Processor failed due to GeometryCatalog error: {0}")]
    CatalogError(#[from] CatalogError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
