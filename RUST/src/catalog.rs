use crate::error::LoadError;
use crate::table::{ParamValue, Table};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const SIM_NUM_COLUMN: &str = "SimNum";

/// Folder entries whose names contain these are never artifact folders.
const NON_ARTIFACT_MARKERS: [&str; 2] = ["parlist", "params"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Image,
    Workspace,
    Animation,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Image, Self::Workspace, Self::Animation];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Workspace => "workspace",
            Self::Animation => "animation",
        }
    }
}

/// File extensions substituted into the fixed artifact path templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTemplates {
    pub image_ext: String,
    pub workspace_ext: String,
    pub animation_ext: String,
}

impl Default for ArtifactTemplates {
    fn default() -> Self {
        Self {
            image_ext: "png".to_string(),
            workspace_ext: "gbf".to_string(),
            animation_ext: "gif".to_string(),
        }
    }
}

impl ArtifactTemplates {
    /// Path of `kind` for run `sim_num`, relative to the batch folder.
    pub fn relative_path(&self, kind: ArtifactKind, simulation_name: &str, sim_num: u32) -> PathBuf {
        let run = format!("{simulation_name}_{sim_num:03}");
        let mut path = PathBuf::from(&run);
        match kind {
            ArtifactKind::Image => {
                path.push("fig");
                path.push(format!("overview_{run}.{}", self.image_ext));
            }
            ArtifactKind::Workspace => {
                path.push(format!("{run}_workspace.{}", self.workspace_ext));
            }
            ArtifactKind::Animation => {
                path.push("fig");
                path.push(format!("fiber_radius_{run}.{}", self.animation_ext));
            }
        }
        path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub workspace: PathBuf,
    pub animation: PathBuf,
}

impl ArtifactPaths {
    pub fn get(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Image => &self.image,
            ArtifactKind::Workspace => &self.workspace,
            ArtifactKind::Animation => &self.animation,
        }
    }

    /// Presence of each artifact on disk right now.
    pub fn existing(&self) -> Vec<(ArtifactKind, bool)> {
        ArtifactKind::ALL
            .into_iter()
            .map(|k| (k, self.get(k).is_file()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDimension {
    pub name: String,
    /// Distinct values in first-occurrence order.
    pub values: Vec<ParamValue>,
}

impl ParameterDimension {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_of(&self, value: &ParamValue) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRecord {
    pub sim_num: u32,
    /// One value per catalog dimension, in dimension order.
    pub parameter_values: Vec<ParamValue>,
    pub artifacts: ArtifactPaths,
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub parameter_list: String,
    pub templates: ArtifactTemplates,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            parameter_list: "parlist_sim.csv".to_string(),
            templates: ArtifactTemplates::default(),
        }
    }
}

/// Every run of one opened batch, indexed by parameter grid and by SimNum.
#[derive(Debug, Clone)]
pub struct BatchCatalog {
    folder: PathBuf,
    simulation_name: String,
    dimensions: Vec<ParameterDimension>,
    records: Vec<SimulationRecord>,
}

impl BatchCatalog {
    pub fn load<P: AsRef<Path>>(folder: P, opts: &CatalogOptions) -> Result<Self, LoadError> {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            return Err(LoadError::FileNotFound(folder.to_path_buf()));
        }
        let simulation_name = infer_simulation_name(folder)?;
        let table = Table::read(folder.join(&opts.parameter_list))?;
        let catalog = Self::from_table(folder, &simulation_name, &table, &opts.templates)?;
        tracing::info!(
            folder = %folder.display(),
            simulation = %catalog.simulation_name,
            records = catalog.records.len(),
            dimensions = catalog.dimensions.len(),
            "opened batch"
        );
        Ok(catalog)
    }

    /// Build a catalog from an already parsed parameter table.
    pub fn from_table(
        folder: &Path,
        simulation_name: &str,
        table: &Table,
        templates: &ArtifactTemplates,
    ) -> Result<Self, LoadError> {
        let sim_col = table
            .column(SIM_NUM_COLUMN)
            .ok_or_else(|| LoadError::MissingColumn(SIM_NUM_COLUMN.to_string()))?;
        let param_cols: Vec<_> = table
            .columns
            .iter()
            .filter(|c| c.name != SIM_NUM_COLUMN)
            .collect();
        if param_cols.is_empty() {
            return Err(LoadError::NoParameterColumns);
        }
        if table.row_count() == 0 {
            return Err(LoadError::NoRecords);
        }

        let dimensions = param_cols
            .iter()
            .map(|col| {
                let mut values: Vec<ParamValue> = Vec::new();
                for v in &col.values {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
                ParameterDimension {
                    name: col.name.clone(),
                    values,
                }
            })
            .collect();

        let mut records = Vec::with_capacity(table.row_count());
        for (row, (&line, cell)) in table.lines.iter().zip(&sim_col.values).enumerate() {
            let sim_num = match cell {
                ParamValue::Integer(n) if *n >= 1 => u32::try_from(*n).ok(),
                _ => None,
            }
            .ok_or_else(|| LoadError::InvalidSimNum {
                line,
                value: cell.to_string(),
            })?;

            let artifact = |kind| folder.join(templates.relative_path(kind, simulation_name, sim_num));
            records.push(SimulationRecord {
                sim_num,
                parameter_values: param_cols.iter().map(|c| c.values[row].clone()).collect(),
                artifacts: ArtifactPaths {
                    image: artifact(ArtifactKind::Image),
                    workspace: artifact(ArtifactKind::Workspace),
                    animation: artifact(ArtifactKind::Animation),
                },
            });
        }

        records.sort_by_key(|r| r.sim_num);
        for (i, r) in records.iter().enumerate() {
            if r.sim_num as usize != i + 1 {
                return Err(LoadError::NonContiguousSimNum {
                    position: i,
                    found: r.sim_num,
                });
            }
        }

        Ok(Self {
            folder: folder.to_path_buf(),
            simulation_name: simulation_name.to_string(),
            dimensions,
            records,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn simulation_name(&self) -> &str {
        &self.simulation_name
    }

    pub fn dimensions(&self) -> &[ParameterDimension] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<(usize, &ParameterDimension)> {
        self.dimensions.iter().enumerate().find(|(_, d)| d.name == name)
    }

    pub fn records(&self) -> &[SimulationRecord] {
        &self.records
    }

    pub fn total_num_sims(&self) -> u32 {
        self.records.len() as u32
    }

    /// O(1) lookup; relies on SimNum density.
    pub fn record(&self, sim_num: u32) -> Option<&SimulationRecord> {
        let idx = (sim_num as usize).checked_sub(1)?;
        self.records.get(idx)
    }

    /// Value of `dimension` for `record`.
    pub fn value_of<'a>(&self, record: &'a SimulationRecord, dimension: &str) -> Option<&'a ParamValue> {
        let (idx, _) = self.dimension(dimension)?;
        record.parameter_values.get(idx)
    }
}

/// The batch's simulation name is the common `<name>_` prefix of its entries.
pub fn infer_simulation_name(folder: &Path) -> Result<String, LoadError> {
    let entries = std::fs::read_dir(folder).map_err(|source| LoadError::Io {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut prefixes = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: folder.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if NON_ARTIFACT_MARKERS.iter().any(|m| name.contains(m)) {
            continue;
        }
        if let Some((prefix, _)) = name.split_once('_') {
            prefixes.insert(prefix.to_string());
        }
    }

    if prefixes.len() != 1 {
        return Err(LoadError::AmbiguousSimulationName {
            folder: folder.to_path_buf(),
            candidates: prefixes.into_iter().collect(),
        });
    }
    Ok(prefixes.into_iter().next().unwrap_or_default())
}
