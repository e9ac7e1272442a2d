use std::path::PathBuf;
use thiserror::Error;

/// Failure to open a batch. The previously opened batch (if any) stays active.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine simulation name in {}: found {} candidate(s) {candidates:?}", folder.display(), candidates.len())]
    AmbiguousSimulationName {
        folder: PathBuf,
        candidates: Vec<String>,
    },

    #[error("parameter list is missing the `{0}` column")]
    MissingColumn(String),

    #[error("parameter list has no parameter columns besides `SimNum`")]
    NoParameterColumns,

    #[error("parameter list has a header but no simulation rows")]
    NoRecords,

    #[error("parameter list column `{0}` appears more than once")]
    DuplicateColumn(String),

    #[error("parameter list line {line}: expected {expected} cells, got {got}")]
    MalformedRow { line: usize, expected: usize, got: usize },

    #[error("parameter list line {line}: `{value}` is not a positive SimNum")]
    InvalidSimNum { line: usize, value: String },

    #[error("SimNum values are not contiguous from 1: position {position} holds SimNum {found}")]
    NonContiguousSimNum { position: usize, found: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no simulation matches the selection {0}")]
    NoMatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("index {index} out of bounds for dimension `{dimension}` with {len} value(s)")]
    IndexOutOfBounds {
        dimension: String,
        index: usize,
        len: usize,
    },

    #[error("unknown dimension `{0}`")]
    UnknownDimension(String),
}

/// Which end of the batch a refused navigation step ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoundaryReached {
    #[error("already at the first simulation")]
    First,
    #[error("already at the last simulation")]
    Last,
}

/// Why a navigation step did not move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Boundary(#[from] BoundaryReached),

    /// The target record carries a value missing from its dimension.
    #[error("cannot select simulation {sim_num}: {source}")]
    Reconcile {
        sim_num: u32,
        #[source]
        source: RangeError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed record at `{path}`: {message}")]
    MalformedRecord { path: String, message: String },

    #[error("metadata file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// Errors from the GBF workspace loader.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("unsupported value: {0}")]
    Unsupported(String),

    #[error("header CRC mismatch: expected {expected}, got {got}")]
    HeaderCrcMismatch { expected: String, got: String },

    #[error("file size mismatch: expected {expected} bytes, got {got} bytes")]
    FileSizeMismatch { expected: u64, got: u64 },

    #[error("variable not found: {0}")]
    VarNotFound(String),

    #[error("field `{name}` chunk out of bounds (offset {offset}, csize {csize}, payload_len {payload_len})")]
    FieldOutOfBounds {
        name: String,
        offset: u64,
        csize: u64,
        payload_len: u64,
    },

    #[error("failed to decompress field `{name}`: {message}")]
    DecompressionFailed { name: String, message: String },

    #[error("field `{name}` CRC mismatch: expected {expected:08X}, got {got:08X}")]
    FieldCrcMismatch { name: String, expected: u32, got: u32 },
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
