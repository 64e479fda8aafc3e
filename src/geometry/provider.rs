//! Readout lookup: the narrow geometry interface the position resolvers consume.
//!
//! A detector description is a TOML file with one `[[readouts]]` table per readout:
//!
//! ```toml
//! [[readouts]]
//! name = "ECalBarrelPhiEta"
//! id_spec = "system:4,cryo:1,type:3,subtype:3,layer:8,eta:9,phi:10"
//! system_id = 5
//! layer_radii = [193.0, 198.5, 207.5, 216.5, 225.5, 234.5, 243.5, 252.5]
//!
//! [readouts.segmentation]
//! grid_size_eta = 0.01
//! phi_bins = 704
//! offset_eta = -1.0
//! offset_phi = -3.1371306
//! ```
//!
//! Disc-shaped readouts add a `[readouts.disc]` table with `z_min` and
//! `layer_thickness`; the tail catcher may declare `layer_spacing`.

use crate::error::{CaloError, CaloResult};
use crate::geometry::bitfield::BitFieldCoder;
use crate::geometry::segmentation::PhiEtaGrid;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Source of readout descriptions, keyed by readout name.
pub trait GeometryProvider: Send + Sync {
    /// Looks up a readout.
    ///
    /// # Errors
    ///
    /// `CaloError::Configuration` when no readout with that name is known.
    fn readout(&self, name: &str) -> CaloResult<Arc<Readout>>;

    /// Names of every readout the provider knows, sorted.
    fn readout_names(&self) -> Vec<String>;
}

/// Longitudinal layout of a disc-shaped (endcap or forward) calorimeter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscGeometry {
    /// Distance from the interaction point to the front face of the first layer.
    pub z_min: f64,
    /// Thickness of one physical layer along z.
    pub layer_thickness: f64,
}

/// Serialized form of a readout, as found in the detector description file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutDescription {
    pub name: String,
    pub id_spec: String,
    #[serde(default)]
    pub system_id: Option<i64>,
    #[serde(default)]
    pub segmentation: Option<PhiEtaGrid>,
    #[serde(default)]
    pub layer_radii: Option<Vec<f64>>,
    #[serde(default)]
    pub disc: Option<DiscGeometry>,
    #[serde(default)]
    pub layer_spacing: Option<f64>,
}

/// A validated readout with its identifier decoder.
#[derive(Debug, Clone)]
pub struct Readout {
    name: String,
    decoder: BitFieldCoder,
    system_id: Option<i64>,
    segmentation: Option<PhiEtaGrid>,
    layer_radii: Option<Vec<f64>>,
    disc: Option<DiscGeometry>,
    layer_spacing: Option<f64>,
}

impl Readout {
    pub fn from_description(desc: ReadoutDescription) -> CaloResult<Self> {
        let context = |msg: &str| CaloError::Configuration(format!("readout '{}': {}", desc.name, msg));

        validation::is_not_empty(&desc.name)
            .map_err(|e| CaloError::Configuration(format!("readout name: {}", e)))?;
        let decoder = BitFieldCoder::parse(&desc.id_spec)
            .map_err(|e| context(&e.to_string()))?;

        if desc.system_id.is_some() && !decoder.has_field("system") {
            return Err(context("system_id given but id_spec has no 'system' field"));
        }
        if let Some(grid) = &desc.segmentation {
            grid.validate().map_err(|e| context(&e.to_string()))?;
        }
        if let Some(radii) = &desc.layer_radii {
            validation::is_positive_table(radii).map_err(|e| context(&format!("layer_radii: {}", e)))?;
        }
        if let Some(disc) = &desc.disc {
            if !(disc.z_min.is_finite() && disc.z_min >= 0.0) {
                return Err(context("disc.z_min must be finite and not negative"));
            }
            validation::is_positive_table(&[disc.layer_thickness])
                .map_err(|e| context(&format!("disc.layer_thickness: {}", e)))?;
        }
        if let Some(spacing) = desc.layer_spacing {
            if !(spacing.is_finite() && spacing >= 0.0) {
                return Err(context("layer_spacing must be finite and not negative"));
            }
        }

        Ok(Self {
            name: desc.name,
            decoder,
            system_id: desc.system_id,
            segmentation: desc.segmentation,
            layer_radii: desc.layer_radii,
            disc: desc.disc,
            layer_spacing: desc.layer_spacing,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decoder(&self) -> &BitFieldCoder {
        &self.decoder
    }

    /// Value the `system` field must hold for identifiers of this readout.
    pub fn system_id(&self) -> Option<i64> {
        self.system_id
    }

    pub fn segmentation(&self) -> Option<&PhiEtaGrid> {
        self.segmentation.as_ref()
    }

    pub fn layer_radii(&self) -> Option<&[f64]> {
        self.layer_radii.as_deref()
    }

    pub fn disc(&self) -> Option<&DiscGeometry> {
        self.disc.as_ref()
    }

    pub fn layer_spacing(&self) -> Option<f64> {
        self.layer_spacing
    }

    /// Segmentation, or a configuration error naming `shape` when absent.
    pub fn require_segmentation(&self, shape: &str) -> CaloResult<&PhiEtaGrid> {
        self.segmentation.as_ref().ok_or_else(|| {
            CaloError::Configuration(format!(
                "readout '{}' has no phi-eta segmentation, required by the {} resolver",
                self.name, shape
            ))
        })
    }

    /// Index of `field` in the decoder, or a configuration error naming `shape`.
    pub fn require_field(&self, field: &str, shape: &str) -> CaloResult<usize> {
        self.decoder.index_of(field).ok_or_else(|| {
            CaloError::Configuration(format!(
                "readout '{}' ({}) has no '{}' field, required by the {} resolver",
                self.name,
                self.decoder.descriptor(),
                field,
                shape
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct DescriptionFile {
    #[serde(default)]
    readouts: Vec<ReadoutDescription>,
}

/// In-memory detector description built from readout tables.
#[derive(Debug, Clone, Default)]
pub struct DetectorGeometry {
    readouts: HashMap<String, Arc<Readout>>,
}

impl DetectorGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a detector description from a TOML file.
    ///
    /// Failures (missing file, parse error, invalid readout) are reported as
    /// configuration errors so they surface at setup rather than per cell.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CaloResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CaloError::Configuration(format!(
                "cannot read geometry description '{}': {}",
                path.display(),
                e
            ))
        })?;
        let geometry = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            readouts = geometry.readouts.len(),
            "Loaded detector geometry"
        );
        Ok(geometry)
    }

    pub fn from_toml_str(text: &str) -> CaloResult<Self> {
        let file: DescriptionFile = toml::from_str(text).map_err(|e| {
            CaloError::Configuration(format!("invalid geometry description: {}", e))
        })?;
        Self::from_descriptions(file.readouts)
    }

    pub fn from_descriptions<I>(descriptions: I) -> CaloResult<Self>
    where
        I: IntoIterator<Item = ReadoutDescription>,
    {
        let mut geometry = Self::new();
        for desc in descriptions {
            geometry.add(Readout::from_description(desc)?)?;
        }
        Ok(geometry)
    }

    /// Registers a readout; names must be unique.
    pub fn add(&mut self, readout: Readout) -> CaloResult<()> {
        if self.readouts.contains_key(readout.name()) {
            return Err(CaloError::Configuration(format!(
                "readout '{}' declared twice",
                readout.name()
            )));
        }
        self.readouts
            .insert(readout.name().to_string(), Arc::new(readout));
        Ok(())
    }
}

impl GeometryProvider for DetectorGeometry {
    fn readout(&self, name: &str) -> CaloResult<Arc<Readout>> {
        self.readouts.get(name).cloned().ok_or_else(|| {
            CaloError::Configuration(format!(
                "unknown readout '{}'. Known readouts: [{}]",
                name,
                self.readout_names().join(", ")
            ))
        })
    }

    fn readout_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.readouts.keys().cloned().collect();
        names.sort();
        names
    }
}
