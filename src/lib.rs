//! # Calorimeter Cell Positions
//!
//! This crate assigns a position in detector space to every reconstructed calorimeter
//! cell. Cells carry only a packed 64-bit identifier and an energy; each subsystem's
//! readout describes how to unpack the identifier into layer, eta bin and phi bin,
//! and a shape-specific resolver turns those into `(x, y, z)`.
//!
//! ## Crate Structure
//!
//! - **`app`**: `PositionsApp`, which builds a complete job from a configuration and runs it.
//! - **`config`**: Loading and validating the pipeline configuration (TOML plus
//!   environment overrides, via `figment`).
//! - **`core`**: Cell and position types plus the `PositionResolver` and `StorageWriter`
//!   traits.
//! - **`data`**: Output writers (JSON lines, CSV) and their registry.
//! - **`error`**: The `CaloError` enum used throughout the crate.
//! - **`geometry`**: Identifier bit-field decoding, phi-eta segmentation and the detector
//!   description that maps readout names to both.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`metadata`**: Run metadata written at the head of every output.
//! - **`pipeline`**: Event store, event sources, assignment stages, output commands and
//!   the driver that runs stages over every event.
//! - **`positions`**: The barrel, disc (endcap and forward) and tail-catcher resolvers
//!   and the registry that builds them from configuration.
//! - **`validation`**: Small helpers for validating configuration values.

pub mod app;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod positions;
pub mod validation;
