//! Endcap and forward discs.
//!
//! Physical layers are stacked along z starting at `z_min`. Readouts may merge
//! consecutive physical layers into one logical layer for a coarser longitudinal
//! granularity; `merged_layers = [2, 2, 4, ...]` says the first logical layer spans two
//! physical layers, the second two more, the third four, and so on. A cell is placed at
//! the centre of its logical layer, at the transverse radius where its eta crosses
//! that plane.
use super::GridCellDecoder;
use crate::core::{CellId, Position, PositionResolver};
use crate::error::{CaloError, CaloResult, ResolveFailure};
use crate::geometry::{DiscGeometry, Readout};
use crate::validation;

/// A logical layer and the physical layers it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedLayer {
    /// Logical layer index.
    pub index: usize,
    /// First physical layer of the group.
    pub first_raw: u32,
    /// Number of physical layers in the group.
    pub count: u32,
}

/// Prefix-sum lookup from physical to logical layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMerge {
    cumulative: Vec<u32>,
}

impl LayerMerge {
    /// # Errors
    ///
    /// `CaloError::Configuration` for an empty list or a zero entry.
    pub fn new(merged_layers: &[u32]) -> CaloResult<Self> {
        validation::is_positive_counts(merged_layers)
            .map_err(|e| CaloError::Configuration(format!("merged_layers {:?}: {}", merged_layers, e)))?;

        let mut total = 0u32;
        let mut cumulative = Vec::with_capacity(merged_layers.len());
        for &count in merged_layers {
            total = total.checked_add(count).ok_or_else(|| {
                CaloError::Configuration("merged_layers total overflows".to_string())
            })?;
            cumulative.push(total);
        }
        Ok(Self { cumulative })
    }

    /// Number of physical layers covered by the list.
    pub fn total(&self) -> u32 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn logical_layers(&self) -> usize {
        self.cumulative.len()
    }

    /// Logical layer containing physical layer `raw`, or `None` past the last group.
    pub fn lookup(&self, raw: u32) -> Option<MergedLayer> {
        let index = self.cumulative.partition_point(|&end| end <= raw);
        let end = *self.cumulative.get(index)?;
        let first_raw = if index == 0 { 0 } else { self.cumulative[index - 1] };
        Some(MergedLayer {
            index,
            first_raw,
            count: end - first_raw,
        })
    }
}

/// How physical layers map onto logical ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerMapping {
    /// Every physical layer is its own logical layer.
    Identity,
    Merged(LayerMerge),
}

impl LayerMapping {
    pub fn group(&self, raw: u32) -> Option<MergedLayer> {
        match self {
            LayerMapping::Identity => Some(MergedLayer {
                index: raw as usize,
                first_raw: raw,
                count: 1,
            }),
            LayerMapping::Merged(merge) => merge.lookup(raw),
        }
    }

    fn available(&self) -> usize {
        match self {
            LayerMapping::Identity => usize::MAX,
            LayerMapping::Merged(merge) => merge.total() as usize,
        }
    }
}

/// Resolver for disc readouts (EMEC, HEC, forward calorimeters).
#[derive(Debug, Clone)]
pub struct DiscResolver {
    readout: String,
    decoder: GridCellDecoder,
    disc: DiscGeometry,
    mapping: LayerMapping,
}

impl DiscResolver {
    /// Endcap resolver merging physical layers as described by `merged_layers`.
    pub fn merged(readout: &Readout, merged_layers: &[u32]) -> CaloResult<Self> {
        let merge = LayerMerge::new(merged_layers).map_err(|e| {
            CaloError::Configuration(format!("readout '{}': {}", readout.name(), e))
        })?;
        Self::with_mapping(readout, LayerMapping::Merged(merge))
    }

    /// Forward resolver: no merging.
    pub fn forward(readout: &Readout) -> CaloResult<Self> {
        Self::with_mapping(readout, LayerMapping::Identity)
    }

    pub fn with_mapping(readout: &Readout, mapping: LayerMapping) -> CaloResult<Self> {
        let disc = readout.disc().cloned().ok_or_else(|| {
            CaloError::Configuration(format!(
                "readout '{}' has no disc geometry, required by the disc resolver",
                readout.name()
            ))
        })?;
        Ok(Self {
            readout: readout.name().to_string(),
            decoder: GridCellDecoder::new(readout, "disc", true)?,
            disc,
            mapping,
        })
    }

    pub fn mapping(&self) -> &LayerMapping {
        &self.mapping
    }

    /// Distance from the interaction point to the centre of a logical layer.
    pub fn layer_z(&self, group: &MergedLayer) -> f64 {
        self.disc.z_min
            + self.disc.layer_thickness * (f64::from(group.first_raw) + f64::from(group.count) / 2.0)
    }
}

impl PositionResolver for DiscResolver {
    fn shape(&self) -> &'static str {
        match self.mapping {
            LayerMapping::Identity => "forward",
            LayerMapping::Merged(_) => "endcap",
        }
    }

    fn readout_name(&self) -> &str {
        &self.readout
    }

    fn resolve(&self, cell_id: CellId) -> Result<Position, ResolveFailure> {
        let cell = self.decoder.decode(cell_id)?;
        let group = u32::try_from(cell.layer)
            .ok()
            .and_then(|raw| self.mapping.group(raw))
            .ok_or(ResolveFailure::LayerOutOfRange {
                layer: cell.layer,
                available: self.mapping.available(),
            })?;

        if cell.eta.abs() < f64::EPSILON {
            return Err(ResolveFailure::DegenerateEta { eta: cell.eta });
        }

        let z = self.layer_z(&group);
        let radius = z / cell.eta.abs().sinh();
        Ok(Position::from_cylindrical(radius, cell.phi, z.copysign(cell.eta)))
    }
}
