mod catalog;
mod decode;
mod error;
mod header;
mod navigation;
mod selection;
mod session;
mod table;
mod value;
mod workspace;

pub use crate::catalog::{
    infer_simulation_name, ArtifactKind, ArtifactPaths, ArtifactTemplates, BatchCatalog, CatalogOptions,
    ParameterDimension, SimulationRecord, SIM_NUM_COLUMN,
};
pub use crate::decode::{decode, format_aligned, DecodedField, DecodedRecord, MetadataView, RecordLike};
pub use crate::error::{
    BoundaryReached, DecodeError, LoadError, LookupError, NavigationError, RangeError, Result,
    WorkspaceError,
};
pub use crate::header::{FieldMeta, Header, MAGIC_BYTES, VERSION};
pub use crate::navigation::{Direction, NavigationController};
pub use crate::selection::{InputChannel, ResolveReport, SelectionObserver, SelectionState, TraceObserver};
pub use crate::session::{load_metadata, Browser, SelectError, Session};
pub use crate::table::{Column, ParamValue, Table};
pub use crate::value::{
    element_count, fmt_shape, CharArray, LogicalArray, MatValue, NumericArray, NumericClass, StringArray,
};
pub use crate::workspace::{
    read_workspace, read_workspace_header, read_workspace_var, write_workspace, ReadOptions, WriteOptions,
};
