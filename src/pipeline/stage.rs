//! The position assignment stage.
use crate::core::{CellRecord, PositionResolver, PositionedCell};
use crate::error::{CaloError, CaloResult};
use crate::pipeline::event_store::EventStore;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reads one cell collection, resolves a position for every cell and publishes the
/// positioned copies under a second name.
///
/// One instance runs per calorimeter subsystem; instances differ only in their
/// resolver and collection names.
pub struct AssignmentStage {
    name: String,
    hits: String,
    positioned_hits: String,
    resolver: Arc<dyn PositionResolver>,
}

impl fmt::Debug for AssignmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentStage")
            .field("name", &self.name)
            .field("hits", &self.hits)
            .field("positioned_hits", &self.positioned_hits)
            .field("shape", &self.resolver.shape())
            .field("readout", &self.resolver.readout_name())
            .finish()
    }
}

impl AssignmentStage {
    pub fn new(
        name: impl Into<String>,
        hits: impl Into<String>,
        positioned_hits: impl Into<String>,
        resolver: Arc<dyn PositionResolver>,
    ) -> Self {
        Self {
            name: name.into(),
            hits: hits.into(),
            positioned_hits: positioned_hits.into(),
            resolver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the cell collection this stage reads.
    pub fn hits(&self) -> &str {
        &self.hits
    }

    /// Name of the positioned collection this stage publishes.
    pub fn positioned_hits(&self) -> &str {
        &self.positioned_hits
    }

    pub fn resolver(&self) -> &dyn PositionResolver {
        self.resolver.as_ref()
    }

    /// Positions `cells` in order.
    ///
    /// # Errors
    ///
    /// `CaloError::Resolution` for the first cell that cannot be positioned; no
    /// partial output is returned.
    pub fn position_cells(&self, cells: &[CellRecord]) -> CaloResult<Vec<PositionedCell>> {
        cells
            .iter()
            .map(|cell| {
                self.resolver
                    .resolve(cell.cell_id)
                    .map(|position| PositionedCell {
                        position,
                        cell: *cell,
                    })
                    .map_err(|reason| CaloError::Resolution {
                        subsystem: self.name.clone(),
                        cell_id: cell.cell_id.0,
                        reason,
                    })
            })
            .collect()
    }

    /// Runs the stage against `store` and returns the number of cells positioned.
    pub fn execute(&self, store: &mut EventStore) -> CaloResult<usize> {
        let cells = store.cells(&self.hits)?;
        let positioned = self.position_cells(&cells)?;
        let count = positioned.len();
        store.put_positioned(&self.positioned_hits, positioned)?;
        debug!(
            stage = %self.name,
            readout = self.resolver.readout_name(),
            cells = count,
            "Positioned cells"
        );
        Ok(count)
    }
}
