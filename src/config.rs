//! Pipeline configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/pipeline.toml` by default)
//! 2. Environment variables prefixed with `CALO_POSITIONS_`, nested keys separated by
//!    `__` (e.g. `CALO_POSITIONS_RUN__MAX_EVENTS=10`)
//!
//! # Example
//! ```no_run
//! use calo_positions::config::PipelineConfig;
//!
//! let config = PipelineConfig::load()?;
//! config.validate()?;
//! println!("{} stages", config.stages.len());
//! # Ok::<(), calo_positions::error::CaloError>(())
//! ```

use crate::error::{CaloError, CaloResult};
use crate::pipeline::output::OutputCommands;
use crate::positions::ResolverConfig;
use crate::validation;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub application: ApplicationConfig,
    pub geometry: GeometryConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
    /// Assignment stages, in execution order.
    pub stages: Vec<StageDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Detector description (TOML with `[[readouts]]` tables).
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// JSON-lines event file.
    pub path: PathBuf,
    /// Collections read from every event; everything else is discarded on read.
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Writer format (`jsonl`, or `csv` with the `storage_csv` feature).
    #[serde(default = "default_output_format")]
    pub format: String,
    /// `keep <glob>` / `drop <glob>` commands, last match wins.
    #[serde(default = "default_output_commands")]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Stop after this many events; process everything when unset.
    #[serde(default)]
    pub max_events: Option<u64>,
    /// Run the stages of an event concurrently.
    #[serde(default)]
    pub parallel_stages: bool,
}

/// One position assignment stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Input cell collection.
    pub hits: String,
    /// Output positioned-cell collection.
    pub positioned_hits: String,
    pub resolver: ResolverConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_output_format() -> String {
    "jsonl".to_string()
}

fn default_output_commands() -> Vec<String> {
    vec!["keep *".to_string()]
}

impl PipelineConfig {
    /// Load configuration from config/pipeline.toml and environment variables
    pub fn load() -> CaloResult<Self> {
        Self::load_from("config/pipeline.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> CaloResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CALO_POSITIONS_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(text: &str) -> CaloResult<Self> {
        let config = Figment::new().merge(Toml::string(text)).extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> CaloResult<()> {
        let invalid = |msg: String| Err(CaloError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        for (what, path) in [
            ("geometry.path", &self.geometry.path),
            ("input.path", &self.input.path),
            ("output.path", &self.output.path),
        ] {
            validation::is_valid_path(&path.to_string_lossy())
                .or_else(|e| invalid(format!("{}: {}", what, e)))?;
        }

        validation::is_not_empty(&self.output.format)
            .or_else(|e| invalid(format!("output.format: {}", e)))?;
        OutputCommands::parse(&self.output.commands)?;

        if self.stages.is_empty() {
            return invalid("at least one stage must be configured".to_string());
        }

        let inputs: HashSet<&str> = self.input.collections.iter().map(String::as_str).collect();
        if inputs.len() != self.input.collections.len() {
            return invalid("input.collections lists a collection twice".to_string());
        }

        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for stage in &self.stages {
            validation::is_not_empty(&stage.name)
                .or_else(|e| invalid(format!("stage name: {}", e)))?;
            if !names.insert(stage.name.as_str()) {
                return invalid(format!("Duplicate stage name: {}", stage.name));
            }
            if !inputs.contains(stage.hits.as_str()) {
                return invalid(format!(
                    "stage '{}' reads '{}', which is not listed in input.collections",
                    stage.name, stage.hits
                ));
            }
            if inputs.contains(stage.positioned_hits.as_str())
                || !outputs.insert(stage.positioned_hits.as_str())
            {
                return invalid(format!(
                    "stage '{}' output '{}' collides with another collection",
                    stage.name, stage.positioned_hits
                ));
            }
        }

        Ok(())
    }

    /// Parsed output commands.
    pub fn output_commands(&self) -> CaloResult<OutputCommands> {
        OutputCommands::parse(&self.output.commands)
    }
}
