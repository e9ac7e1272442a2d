use crate::catalog::{BatchCatalog, SimulationRecord};
use crate::error::{BoundaryReached, NavigationError};
use crate::selection::SelectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Sequential movement through a batch by SimNum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationController {
    /// Step used when the "fast" modifier is held.
    pub fast_step: u32,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self { fast_step: 10 }
    }
}

impl NavigationController {
    pub fn new(fast_step: u32) -> Self {
        Self {
            fast_step: fast_step.max(1),
        }
    }

    pub fn magnitude(&self, fast: bool) -> u32 {
        if fast {
            self.fast_step
        } else {
            1
        }
    }

    /// Target SimNum of a step from `current`, or the boundary that refuses it.
    /// Steps never saturate: a step past either end is rejected whole.
    pub fn target(
        &self,
        total: u32,
        current: u32,
        direction: Direction,
        magnitude: u32,
    ) -> Result<u32, BoundaryReached> {
        match direction {
            Direction::Forward => current
                .checked_add(magnitude)
                .filter(|&t| t <= total)
                .ok_or(BoundaryReached::Last),
            Direction::Backward => current
                .checked_sub(magnitude)
                .filter(|&t| t >= 1)
                .ok_or(BoundaryReached::First),
        }
    }

    /// Move `current` (1 when unset) by `magnitude` and reconcile `selection`
    /// to the new record. On any error nothing is modified.
    pub fn step<'c>(
        &self,
        catalog: &'c BatchCatalog,
        selection: &mut SelectionState,
        current: &mut Option<u32>,
        direction: Direction,
        magnitude: u32,
    ) -> Result<&'c SimulationRecord, NavigationError> {
        let from = current.unwrap_or(1);
        let target = self
            .target(catalog.total_num_sims(), from, direction, magnitude)
            .inspect_err(|boundary| {
                tracing::info!(from, magnitude, ?direction, %boundary, "navigation refused");
            })?;
        // Dense SimNums make every in-range target present.
        let record = catalog.record(target).ok_or(match direction {
            Direction::Forward => BoundaryReached::Last,
            Direction::Backward => BoundaryReached::First,
        })?;

        selection
            .reconcile_to(catalog, record)
            .map_err(|source| NavigationError::Reconcile {
                sim_num: target,
                source,
            })
            .inspect_err(|e| tracing::warn!(error = %e, "could not reconcile selection"))?;
        *current = Some(target);
        tracing::debug!(from, to = target, "navigated");
        Ok(record)
    }
}
