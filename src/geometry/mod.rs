//! Detector geometry: identifier decoding, segmentation and readout lookup.
pub mod bitfield;
pub mod provider;
pub mod segmentation;

pub use bitfield::BitFieldCoder;
pub use provider::{DetectorGeometry, DiscGeometry, GeometryProvider, Readout, ReadoutDescription};
pub use segmentation::PhiEtaGrid;
