//! Run metadata written at the head of every output file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Captures what produced an output file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    /// The name of the run.
    pub run_name: String,
    /// A free-form description.
    pub description: String,
    /// Where the detector geometry came from.
    pub geometry_source: String,
    /// Stage name to `"<shape> <readout>"` for every assignment stage.
    pub stages: BTreeMap<String, String>,
    /// Output commands applied to every event.
    pub output_commands: Vec<String>,
    /// User-defined parameters.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Version of the position reconstruction software.
    pub software_version: String,
    pub created_at: DateTime<Utc>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            run_name: "cell positions".to_string(),
            description: "".to_string(),
            geometry_source: "".to_string(),
            stages: BTreeMap::new(),
            output_commands: Vec::new(),
            parameters: HashMap::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A builder for constructing `Metadata` instances.
#[derive(Default)]
pub struct MetadataBuilder {
    inner: Metadata,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_name(mut self, name: &str) -> Self {
        self.inner.run_name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.inner.description = description.to_string();
        self
    }

    pub fn geometry_source(mut self, source: &str) -> Self {
        self.inner.geometry_source = source.to_string();
        self
    }

    pub fn stage(mut self, name: &str, shape: &str, readout: &str) -> Self {
        self.inner
            .stages
            .insert(name.to_string(), format!("{} {}", shape, readout));
        self
    }

    pub fn output_command(mut self, command: &str) -> Self {
        self.inner.output_commands.push(command.to_string());
        self
    }

    pub fn parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.inner.parameters.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Metadata {
        self.inner
    }
}

impl Metadata {
    /// Validates the metadata.
    pub fn validate(&self) -> Result<(), String> {
        if self.run_name.is_empty() {
            return Err("Run name cannot be empty.".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_stages_in_name_order() {
        let metadata = MetadataBuilder::new()
            .run_name("pim 100 GeV")
            .stage("positionsHcalBarrel", "barrel", "BarHCal_Readout")
            .stage("positionsEcalBarrel", "barrel", "ECalBarrelPhiEta")
            .output_command("keep *")
            .parameter("max_events", serde_json::json!(1))
            .build();

        assert!(metadata.validate().is_ok());
        let names: Vec<&String> = metadata.stages.keys().collect();
        assert_eq!(names, vec!["positionsEcalBarrel", "positionsHcalBarrel"]);
        assert_eq!(metadata.stages["positionsEcalBarrel"], "barrel ECalBarrelPhiEta");
        assert_eq!(metadata.parameters["max_events"], 1);
    }

    #[test]
    fn empty_run_name_is_invalid() {
        let metadata = MetadataBuilder::new().run_name("").build();
        assert!(metadata.validate().is_err());
    }
}
