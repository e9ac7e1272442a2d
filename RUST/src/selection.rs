use crate::catalog::{BatchCatalog, SimulationRecord};
use crate::error::{LookupError, RangeError};
use std::fmt;

/// Where a write to the selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChannel {
    /// Value picker (drop-down of the dimension's values).
    Picker,
    /// Position slider over the value indices.
    Slider,
    /// Reconciliation after a SimNum step.
    Navigation,
}

/// Notified after every change of a dimension's index. Picker and slider are
/// both views of the same index, so they refresh from this single event.
pub trait SelectionObserver {
    fn index_changed(&mut self, dimension: &str, index: usize, source: InputChannel);
}

/// Forwards selection changes to `tracing`.
#[derive(Debug, Default)]
pub struct TraceObserver;

impl SelectionObserver for TraceObserver {
    fn index_changed(&mut self, dimension: &str, index: usize, source: InputChannel) {
        tracing::debug!(dimension, index, ?source, "selection changed");
    }
}

/// Outcome of a successful resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    pub sim_num: u32,
    /// Every SimNum that matched; more than one means the grid has duplicates
    /// and the first was used.
    pub matches: Vec<u32>,
}

impl ResolveReport {
    pub fn is_ambiguous(&self) -> bool {
        self.matches.len() > 1
    }
}

/// Chosen value index along each dimension of a catalog.
pub struct SelectionState {
    names: Vec<String>,
    lens: Vec<usize>,
    indices: Vec<usize>,
    observers: Vec<Box<dyn SelectionObserver>>,
}

impl fmt::Debug for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionState")
            .field("names", &self.names)
            .field("indices", &self.indices)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SelectionState {
    /// Starts every dimension at its middle value.
    pub fn new(catalog: &BatchCatalog) -> Self {
        let dims = catalog.dimensions();
        Self {
            names: dims.iter().map(|d| d.name.clone()).collect(),
            lens: dims.iter().map(|d| d.len()).collect(),
            indices: dims.iter().map(|d| d.len().saturating_sub(1) / 2).collect(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.observers.push(observer);
    }

    pub fn dimension_index(&self, dimension: &str) -> Option<usize> {
        self.position(dimension).ok().map(|i| self.indices[i])
    }

    /// Indices in catalog dimension order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn set_dimension_index(
        &mut self,
        dimension: &str,
        index: usize,
        source: InputChannel,
    ) -> Result<(), RangeError> {
        let pos = self.position(dimension)?;
        let len = self.lens[pos];
        if index >= len {
            return Err(RangeError::IndexOutOfBounds {
                dimension: dimension.to_string(),
                index,
                len,
            });
        }
        self.indices[pos] = index;
        for observer in &mut self.observers {
            observer.index_changed(dimension, index, source);
        }
        Ok(())
    }

    /// The record whose parameters equal the selected value on every
    /// dimension. Duplicates resolve to the lowest SimNum.
    pub fn resolve<'c>(&self, catalog: &'c BatchCatalog) -> Result<&'c SimulationRecord, LookupError> {
        let report = self.resolve_report(catalog)?;
        catalog
            .record(report.sim_num)
            .ok_or_else(|| LookupError::NoMatch(self.describe(catalog)))
    }

    pub fn resolve_report(&self, catalog: &BatchCatalog) -> Result<ResolveReport, LookupError> {
        let target: Vec<_> = catalog
            .dimensions()
            .iter()
            .zip(&self.indices)
            .map(|(d, &i)| d.values.get(i))
            .collect::<Option<_>>()
            .ok_or_else(|| LookupError::NoMatch(self.describe(catalog)))?;

        let matches: Vec<u32> = catalog
            .records()
            .iter()
            .filter(|r| r.parameter_values.iter().zip(&target).all(|(v, t)| v == *t))
            .map(|r| r.sim_num)
            .collect();

        let Some(&sim_num) = matches.first() else {
            tracing::warn!(selection = %self.describe(catalog), "selection matches no simulation");
            return Err(LookupError::NoMatch(self.describe(catalog)));
        };
        if matches.len() > 1 {
            tracing::warn!(
                selection = %self.describe(catalog),
                ?matches,
                "selection matches several simulations; using the first"
            );
        }
        tracing::debug!(sim_num, "resolved selection");
        Ok(ResolveReport { sim_num, matches })
    }

    /// Point every dimension at `record`'s value. Inverse of [`Self::resolve`].
    /// Every index is checked before any is written.
    pub fn reconcile_to(&mut self, catalog: &BatchCatalog, record: &SimulationRecord) -> Result<(), RangeError> {
        let targets = catalog
            .dimensions()
            .iter()
            .zip(&record.parameter_values)
            .map(|(dim, value)| {
                let pos = self.position(&dim.name)?;
                match dim.index_of(value) {
                    Some(index) if index < self.lens[pos] => Ok((pos, index)),
                    _ => Err(RangeError::IndexOutOfBounds {
                        dimension: dim.name.clone(),
                        index: dim.len(),
                        len: self.lens[pos],
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (pos, index) in targets {
            self.indices[pos] = index;
            for observer in &mut self.observers {
                observer.index_changed(&self.names[pos], index, InputChannel::Navigation);
            }
        }
        Ok(())
    }

    /// `A=2, B=20` style rendering of the selected values.
    pub fn describe(&self, catalog: &BatchCatalog) -> String {
        catalog
            .dimensions()
            .iter()
            .zip(&self.indices)
            .map(|(d, &i)| match d.values.get(i) {
                Some(v) => format!("{}={}", d.name, v),
                None => format!("{}=#{}", d.name, i),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn position(&self, dimension: &str) -> Result<usize, RangeError> {
        self.names
            .iter()
            .position(|n| n == dimension)
            .ok_or_else(|| RangeError::UnknownDimension(dimension.to_string()))
    }
}
