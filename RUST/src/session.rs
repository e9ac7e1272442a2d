use crate::catalog::{BatchCatalog, CatalogOptions, SimulationRecord};
use crate::decode::{decode, DecodedRecord, MetadataView};
use crate::error::{DecodeError, LoadError, LookupError, NavigationError, RangeError};
use crate::navigation::{Direction, NavigationController};
use crate::selection::{InputChannel, ResolveReport, SelectionObserver, SelectionState};
use crate::value::MatValue;
use crate::workspace::{read_workspace, ReadOptions};
use std::path::{Path, PathBuf};

/// Why a selection edit did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// The opened batch together with everything the user has selected in it.
#[derive(Debug)]
pub struct Session {
    catalog: BatchCatalog,
    selection: SelectionState,
    navigator: NavigationController,
    current: Option<u32>,
}

impl Session {
    /// Start at the middle value of every dimension. When that point of the
    /// grid has no run, no record is current until the user picks one.
    pub fn new(catalog: BatchCatalog, navigator: NavigationController) -> Self {
        let selection = SelectionState::new(&catalog);
        let current = selection.resolve(&catalog).ok().map(|r| r.sim_num);
        Self {
            catalog,
            selection,
            navigator,
            current,
        }
    }

    pub fn catalog(&self) -> &BatchCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn navigator(&self) -> &NavigationController {
        &self.navigator
    }

    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.selection.subscribe(observer);
    }

    pub fn current_sim_num(&self) -> Option<u32> {
        self.current
    }

    pub fn current_record(&self) -> Option<&SimulationRecord> {
        self.catalog.record(self.current?)
    }

    /// Write one dimension's index from either input channel, then resolve.
    /// On `NoMatch` the index stays written but the current record is kept.
    pub fn select(
        &mut self,
        dimension: &str,
        index: usize,
        channel: InputChannel,
    ) -> Result<ResolveReport, SelectError> {
        self.selection.set_dimension_index(dimension, index, channel)?;
        let report = self.selection.resolve_report(&self.catalog)?;
        self.current = Some(report.sim_num);
        Ok(report)
    }

    /// Select by value rather than index.
    pub fn select_value(
        &mut self,
        dimension: &str,
        value: &str,
        channel: InputChannel,
    ) -> Result<ResolveReport, SelectError> {
        let (_, dim) = self
            .catalog
            .dimension(dimension)
            .ok_or_else(|| RangeError::UnknownDimension(dimension.to_string()))?;
        let index = dim
            .values
            .iter()
            .position(|v| v.to_string() == value.trim())
            .ok_or_else(|| RangeError::IndexOutOfBounds {
                dimension: dimension.to_string(),
                index: dim.len(),
                len: dim.len(),
            })?;
        self.select(dimension, index, channel)
    }

    pub fn resolve(&self) -> Result<&SimulationRecord, LookupError> {
        self.selection.resolve(&self.catalog)
    }

    pub fn step(&mut self, direction: Direction, fast: bool) -> Result<&SimulationRecord, NavigationError> {
        let magnitude = self.navigator.magnitude(fast);
        self.step_by(direction, magnitude)
    }

    pub fn step_by(&mut self, direction: Direction, magnitude: u32) -> Result<&SimulationRecord, NavigationError> {
        self.navigator.step(
            &self.catalog,
            &mut self.selection,
            &mut self.current,
            direction,
            magnitude,
        )
    }

    /// Jump straight to a SimNum.
    pub fn goto(&mut self, sim_num: u32) -> Result<&SimulationRecord, NavigationError> {
        let from = self.current.unwrap_or(1);
        if sim_num >= from {
            self.step_by(Direction::Forward, sim_num - from)
        } else {
            self.step_by(Direction::Backward, from - sim_num)
        }
    }

    /// Decoded workspace of the current record, read from disk on every call.
    pub fn metadata(&self, opts: &ReadOptions) -> MetadataView {
        let Some(record) = self.current_record() else {
            return MetadataView::Unavailable {
                reason: "no simulation selected".to_string(),
            };
        };
        let view = MetadataView::from_result(load_metadata(&record.artifacts.workspace, opts));
        if let MetadataView::Unavailable { reason } = &view {
            tracing::warn!(sim_num = record.sim_num, %reason, "metadata unavailable");
        }
        view
    }
}

/// Read a workspace file and decode it into nested fields.
pub fn load_metadata(path: &Path, opts: &ReadOptions) -> Result<DecodedRecord<MatValue>, DecodeError> {
    if !path.is_file() {
        return Err(DecodeError::FileNotFound(path.to_path_buf()));
    }
    let raw = read_workspace(path, opts).map_err(|e| DecodeError::MalformedRecord {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    decode(&raw)
}

/// Holds the active session; a failed open leaves the previous one in place.
#[derive(Debug)]
pub struct Browser {
    options: CatalogOptions,
    navigator: NavigationController,
    batch_folder: Option<PathBuf>,
    session: Option<Session>,
}

impl Browser {
    pub fn new(options: CatalogOptions, navigator: NavigationController) -> Self {
        Self {
            options,
            navigator,
            batch_folder: None,
            session: None,
        }
    }

    pub fn open_batch<P: AsRef<Path>>(&mut self, folder: P) -> Result<&mut Session, LoadError> {
        let folder = folder.as_ref();
        let catalog = BatchCatalog::load(folder, &self.options).inspect_err(|e| {
            tracing::warn!(folder = %folder.display(), error = %e, "batch not opened");
        })?;
        self.batch_folder = Some(folder.to_path_buf());
        Ok(self.session.insert(Session::new(catalog, self.navigator)))
    }

    /// Re-read the current batch from disk, keeping the old session on failure.
    pub fn reload(&mut self) -> Result<&mut Session, LoadError> {
        let folder = self
            .batch_folder
            .clone()
            .ok_or_else(|| LoadError::FileNotFound(PathBuf::new()))?;
        self.open_batch(folder)
    }

    pub fn batch_folder(&self) -> Option<&Path> {
        self.batch_folder.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }
}
