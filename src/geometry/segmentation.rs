//! Phi-eta grid segmentation shared by all calorimeter readouts.
use crate::error::{CaloError, CaloResult};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Regular grid in pseudorapidity and azimuth.
///
/// Bin `i` along eta is centred at `i * grid_size_eta + offset_eta`; bin `j` along phi
/// at `j * 2π / phi_bins + offset_phi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiEtaGrid {
    pub grid_size_eta: f64,
    pub phi_bins: u32,
    #[serde(default)]
    pub offset_eta: f64,
    #[serde(default)]
    pub offset_phi: f64,
}

impl PhiEtaGrid {
    pub fn validate(&self) -> CaloResult<()> {
        if !(self.grid_size_eta.is_finite() && self.grid_size_eta > 0.0) {
            return Err(CaloError::Configuration(format!(
                "grid_size_eta must be finite and positive, got {}",
                self.grid_size_eta
            )));
        }
        validation::is_in_range(self.phi_bins, 1..=u32::MAX)
            .map_err(|_| CaloError::Configuration("phi_bins must be at least 1".to_string()))?;
        if !(self.offset_eta.is_finite() && self.offset_phi.is_finite()) {
            return Err(CaloError::Configuration(
                "segmentation offsets must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Azimuthal width of one phi bin.
    pub fn phi_bin_width(&self) -> f64 {
        2.0 * PI / f64::from(self.phi_bins)
    }

    pub fn eta(&self, eta_bin: i64) -> f64 {
        eta_bin as f64 * self.grid_size_eta + self.offset_eta
    }

    pub fn phi(&self, phi_bin: i64) -> f64 {
        phi_bin as f64 * self.phi_bin_width() + self.offset_phi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> PhiEtaGrid {
        PhiEtaGrid {
            grid_size_eta: 0.01,
            phi_bins: 704,
            offset_eta: -1.0,
            offset_phi: -PI + PI / 704.0,
        }
    }

    #[test]
    fn bin_centres() {
        let g = grid();
        assert!((g.eta(100) - 0.0).abs() < 1e-12);
        assert!((g.phi(0) - (-PI + PI / 704.0)).abs() < 1e-12);
        assert!((g.phi(1) - g.phi(0) - g.phi_bin_width()).abs() < 1e-12);
    }

    #[test]
    fn validation() {
        assert!(grid().validate().is_ok());
        let mut g = grid();
        g.phi_bins = 0;
        assert!(g.validate().is_err());
        let mut g = grid();
        g.grid_size_eta = -0.01;
        assert!(g.validate().is_err());
    }
}
