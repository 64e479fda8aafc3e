//! Core traits and data types for the cell-position pipeline.
use crate::error::{CaloResult, ResolveFailure};
use crate::metadata::Metadata;
use crate::pipeline::event_store::Event;
use crate::pipeline::output::OutputCommands;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque calorimeter cell identifier.
///
/// The bit layout is defined by the readout the cell belongs to; see
/// [`BitFieldCoder`](crate::geometry::BitFieldCoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for CellId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A single calorimeter cell with its deposited energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub cell_id: CellId,
    pub energy: f64,
}

impl CellRecord {
    pub fn new(cell_id: impl Into<CellId>, energy: f64) -> Self {
        Self {
            cell_id: cell_id.into(),
            energy,
        }
    }
}

/// Cartesian position in detector space (cm, the unit of the geometry description).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Converts cylindrical coordinates (radius, azimuth, z) to Cartesian.
    pub fn from_cylindrical(radius: f64, phi: f64, z: f64) -> Self {
        Self {
            x: radius * phi.cos(),
            y: radius * phi.sin(),
            z,
        }
    }

    /// Distance from the beam axis.
    pub fn rho(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// A cell together with the position resolved for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionedCell {
    pub position: Position,
    pub cell: CellRecord,
}

/// Maps a cell identifier of one readout to a position in detector space.
///
/// Implementations bind their geometry at construction and are pure afterwards:
/// resolving the same identifier twice yields bit-identical output.
pub trait PositionResolver: Send + Sync {
    /// Short name of the detector shape, used in logs.
    fn shape(&self) -> &'static str;

    /// Name of the readout this resolver decodes.
    fn readout_name(&self) -> &str;

    fn resolve(&self, cell_id: CellId) -> Result<Position, ResolveFailure>;
}

/// Trait for an event output writer.
#[async_trait]
pub trait StorageWriter: Send + Sync {
    /// Opens the output (e.g., creates the file).
    async fn init(&mut self, path: &std::path::Path) -> CaloResult<()>;

    /// Records the run-level metadata.
    /// This should be called once after `init` and before the first `write_event`.
    async fn set_metadata(&mut self, metadata: &Metadata) -> CaloResult<()>;

    /// Writes the collections of one event that `commands` keep.
    async fn write_event(&mut self, event: &Event, commands: &OutputCommands) -> CaloResult<()>;

    /// Flushes and closes the output.
    async fn shutdown(&mut self) -> CaloResult<()>;
}
