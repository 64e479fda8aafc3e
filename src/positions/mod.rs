//! Position resolvers, one per calorimeter shape.
//!
//! - [`BarrelResolver`]: cylinder with a radius per layer (ECal and HCal barrels).
//! - [`DiscResolver`]: endcap and forward discs, optionally merging layers.
//! - [`TailCatcherResolver`]: single reference cylinder.
//!
//! All of them decode the same phi-eta grid through [`GridCellDecoder`] and differ only
//! in how the layer turns into a distance.
pub mod barrel;
pub mod discs;
pub mod registry;
pub mod tail_catcher;

pub use barrel::BarrelResolver;
pub use discs::{DiscResolver, LayerMapping, LayerMerge, MergedLayer};
pub use registry::{ResolverConfig, ResolverRegistry};
pub use tail_catcher::TailCatcherResolver;

use crate::core::CellId;
use crate::error::{CaloResult, ResolveFailure};
use crate::geometry::{BitFieldCoder, PhiEtaGrid, Readout};

/// Indices decoded from a cell identifier, with eta and phi already converted to
/// bin centres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub layer: i64,
    pub eta: f64,
    pub phi: f64,
}

/// Decodes `system`, `layer`, `eta` and `phi` from one readout's identifiers.
#[derive(Debug, Clone)]
pub struct GridCellDecoder {
    coder: BitFieldCoder,
    grid: PhiEtaGrid,
    system: Option<(usize, i64)>,
    layer: Option<usize>,
    eta: usize,
    phi: usize,
}

impl GridCellDecoder {
    /// Resolves field positions once so per-cell decoding is index based.
    ///
    /// `require_layer` makes a missing `layer` field a configuration error.
    pub fn new(readout: &Readout, shape: &str, require_layer: bool) -> CaloResult<Self> {
        let grid = readout.require_segmentation(shape)?.clone();
        let layer = if require_layer {
            Some(readout.require_field("layer", shape)?)
        } else {
            readout.decoder().index_of("layer")
        };
        let eta = readout.require_field("eta", shape)?;
        let phi = readout.require_field("phi", shape)?;
        let system = match readout.system_id() {
            Some(expected) => Some((readout.require_field("system", shape)?, expected)),
            None => None,
        };

        Ok(Self {
            coder: readout.decoder().clone(),
            grid,
            system,
            layer,
            eta,
            phi,
        })
    }

    pub fn grid(&self) -> &PhiEtaGrid {
        &self.grid
    }

    pub fn decode(&self, cell_id: CellId) -> Result<GridCell, ResolveFailure> {
        let id = cell_id.0;
        let field = |index: usize| self.coder.fields()[index].value(id);

        if let Some((index, expected)) = self.system {
            let found = field(index);
            if found != expected {
                return Err(ResolveFailure::UnknownSystem { expected, found });
            }
        }

        let layer = self.layer.map_or(0, field);
        if layer < 0 {
            return Err(ResolveFailure::NegativeIndex {
                field: "layer",
                value: layer,
            });
        }

        Ok(GridCell {
            layer,
            eta: self.grid.eta(field(self.eta)),
            phi: self.grid.phi(field(self.phi)),
        })
    }
}
