//! Barrel calorimeters: one radius per layer, angular position from the phi-eta grid.
use super::GridCellDecoder;
use crate::core::{CellId, Position, PositionResolver};
use crate::error::{CaloError, CaloResult, ResolveFailure};
use crate::geometry::Readout;
use crate::validation;

/// Resolver for barrel readouts (ECal barrel, HCal barrel and extended barrel).
///
/// The layer field indexes `layer_radii`; the cell sits at
/// `(R cos φ, R sin φ, R sinh η)`.
#[derive(Debug, Clone)]
pub struct BarrelResolver {
    readout: String,
    decoder: GridCellDecoder,
    layer_radii: Vec<f64>,
}

impl BarrelResolver {
    /// Binds a barrel readout.
    ///
    /// `layer_radii` overrides the radii declared by the readout itself; one of the
    /// two must be present.
    pub fn new(readout: &Readout, layer_radii: Option<Vec<f64>>) -> CaloResult<Self> {
        let layer_radii = match layer_radii {
            Some(radii) => radii,
            None => readout.layer_radii().map(<[f64]>::to_vec).ok_or_else(|| {
                CaloError::Configuration(format!(
                    "no layer radii configured for barrel readout '{}'",
                    readout.name()
                ))
            })?,
        };
        validation::is_positive_table(&layer_radii).map_err(|e| {
            CaloError::Configuration(format!(
                "layer radii for readout '{}': {}",
                readout.name(),
                e
            ))
        })?;

        Ok(Self {
            readout: readout.name().to_string(),
            decoder: GridCellDecoder::new(readout, "barrel", true)?,
            layer_radii,
        })
    }

    pub fn layer_radii(&self) -> &[f64] {
        &self.layer_radii
    }

    /// Radius of `layer`, before angular placement.
    pub fn radius(&self, layer: i64) -> Result<f64, ResolveFailure> {
        usize::try_from(layer)
            .ok()
            .and_then(|l| self.layer_radii.get(l).copied())
            .ok_or(ResolveFailure::LayerOutOfRange {
                layer,
                available: self.layer_radii.len(),
            })
    }
}

impl PositionResolver for BarrelResolver {
    fn shape(&self) -> &'static str {
        "barrel"
    }

    fn readout_name(&self) -> &str {
        &self.readout
    }

    fn resolve(&self, cell_id: CellId) -> Result<Position, ResolveFailure> {
        let cell = self.decoder.decode(cell_id)?;
        let radius = self.radius(cell.layer)?;
        Ok(Position::from_cylindrical(
            radius,
            cell.phi,
            radius * cell.eta.sinh(),
        ))
    }
}
