//! Tail catcher: cells on a reference cylinder behind the hadronic calorimeter.
use super::GridCellDecoder;
use crate::core::{CellId, Position, PositionResolver};
use crate::error::{CaloError, CaloResult, ResolveFailure};
use crate::geometry::Readout;

#[derive(Debug, Clone)]
pub struct TailCatcherResolver {
    readout: String,
    decoder: GridCellDecoder,
    central_radius: f64,
    layer_spacing: f64,
}

impl TailCatcherResolver {
    /// Binds a tail-catcher readout to the reference radius `central_radius`.
    ///
    /// If the readout declares a `layer_spacing`, layer `n` sits `n * layer_spacing`
    /// outside the reference cylinder; otherwise every layer sits on it.
    pub fn new(readout: &Readout, central_radius: f64) -> CaloResult<Self> {
        if !(central_radius.is_finite() && central_radius > 0.0) {
            return Err(CaloError::Configuration(format!(
                "central_radius for readout '{}' must be finite and positive, got {}",
                readout.name(),
                central_radius
            )));
        }
        Ok(Self {
            readout: readout.name().to_string(),
            decoder: GridCellDecoder::new(readout, "tail catcher", false)?,
            central_radius,
            layer_spacing: readout.layer_spacing().unwrap_or(0.0),
        })
    }

    pub fn central_radius(&self) -> f64 {
        self.central_radius
    }
}

impl PositionResolver for TailCatcherResolver {
    fn shape(&self) -> &'static str {
        "tail catcher"
    }

    fn readout_name(&self) -> &str {
        &self.readout
    }

    fn resolve(&self, cell_id: CellId) -> Result<Position, ResolveFailure> {
        let cell = self.decoder.decode(cell_id)?;
        let radius = self.central_radius + cell.layer as f64 * self.layer_spacing;
        Ok(Position::from_cylindrical(
            radius,
            cell.phi,
            radius * cell.eta.sinh(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ReadoutDescription;
    use crate::positions::test_support::grid;

    fn muons(layer_spacing: Option<f64>) -> Readout {
        Readout::from_description(ReadoutDescription {
            name: "Muons_Readout".into(),
            id_spec: "system:4,layer:5,eta:-10,phi:10".into(),
            system_id: Some(13),
            segmentation: Some(grid(256)),
            layer_radii: None,
            disc: None,
            layer_spacing,
        })
        .unwrap()
    }

    fn cell(readout: &Readout, layer: i64, eta: i64) -> CellId {
        CellId(
            readout
                .decoder()
                .encode(&[("system", 13), ("layer", layer), ("eta", eta), ("phi", 3)])
                .unwrap(),
        )
    }

    #[test]
    fn cells_sit_on_reference_cylinder() {
        let readout = muons(None);
        let resolver = TailCatcherResolver::new(&readout, 901.5).unwrap();
        for layer in 0..3 {
            let pos = resolver.resolve(cell(&readout, layer, -40)).unwrap();
            assert!((pos.rho() - 901.5).abs() < 1e-9);
            assert!((pos.z - 901.5 * (-0.4f64).sinh()).abs() < 1e-9);
        }
    }

    #[test]
    fn layer_spacing_moves_cells_outwards() {
        let readout = muons(Some(25.0));
        let resolver = TailCatcherResolver::new(&readout, 901.5).unwrap();
        let pos = resolver.resolve(cell(&readout, 2, 0)).unwrap();
        assert!((pos.rho() - 951.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_radius() {
        let readout = muons(None);
        assert!(TailCatcherResolver::new(&readout, 0.0).is_err());
        assert!(TailCatcherResolver::new(&readout, f64::INFINITY).is_err());
    }
}
