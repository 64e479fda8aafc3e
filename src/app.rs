//! Wires configuration, geometry, resolvers and the driver into one runnable job.
//!
//! Everything that can be checked before the first event is checked in
//! [`PositionsApp::new`]: unknown readouts, missing layer tables, bad merge lists,
//! unknown output formats. A constructed app only fails on per-event data.
use crate::config::PipelineConfig;
use crate::core::StorageWriter;
use crate::data::storage_factory::StorageWriterRegistry;
use crate::error::{CaloError, CaloResult};
use crate::geometry::DetectorGeometry;
use crate::metadata::{Metadata, MetadataBuilder};
use crate::pipeline::{AssignmentStage, EventSource, JsonLinesSource, PipelineDriver, RunSummary};
use crate::positions::ResolverRegistry;
use std::fmt;
use tracing::{info, info_span, Instrument};

/// What one configured stage resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub shape: String,
    pub readout: String,
    pub hits: String,
    pub positioned_hits: String,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({} on {})",
            self.name, self.hits, self.positioned_hits, self.shape, self.readout
        )
    }
}

pub struct PositionsApp {
    config: PipelineConfig,
    driver: PipelineDriver,
    writers: StorageWriterRegistry,
}

impl PositionsApp {
    /// Validates `config`, loads the geometry it names and builds every stage.
    pub fn new(config: PipelineConfig) -> CaloResult<Self> {
        config.validate()?;
        let geometry = DetectorGeometry::from_path(&config.geometry.path)?;
        Self::with_geometry(config, &geometry)
    }

    /// Like [`PositionsApp::new`] but with an already loaded geometry.
    pub fn with_geometry(config: PipelineConfig, geometry: &DetectorGeometry) -> CaloResult<Self> {
        config.validate()?;

        let writers = StorageWriterRegistry::new();
        if !writers.is_available(&config.output.format) {
            return Err(CaloError::Configuration(format!(
                "Unsupported output format '{}'. Available formats: [{}]",
                config.output.format,
                writers.list_formats().join(", ")
            )));
        }

        let resolvers = ResolverRegistry::new();
        let mut stages = Vec::with_capacity(config.stages.len());
        for def in &config.stages {
            let resolver = resolvers.create(&def.resolver, geometry).map_err(|e| match e {
                CaloError::Configuration(msg) => {
                    CaloError::Configuration(format!("stage '{}': {}", def.name, msg))
                }
                other => other,
            })?;
            info!(
                stage = %def.name,
                shape = resolver.shape(),
                readout = resolver.readout_name(),
                "Configured assignment stage"
            );
            stages.push(AssignmentStage::new(
                &def.name,
                &def.hits,
                &def.positioned_hits,
                resolver,
            ));
        }

        let driver = PipelineDriver::new(stages, config.output_commands()?)?
            .with_max_events(config.run.max_events)
            .with_parallel_stages(config.run.parallel_stages);

        Ok(Self {
            config,
            driver,
            writers,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn driver(&self) -> &PipelineDriver {
        &self.driver
    }

    /// One line per stage, in execution order.
    pub fn check(&self) -> Vec<StageReport> {
        self.driver
            .stages()
            .map(|stage| StageReport {
                name: stage.name().to_string(),
                shape: stage.resolver().shape().to_string(),
                readout: stage.resolver().readout_name().to_string(),
                hits: stage.hits().to_string(),
                positioned_hits: stage.positioned_hits().to_string(),
            })
            .collect()
    }

    /// Metadata describing this run, written ahead of the first event.
    pub fn metadata(&self) -> Metadata {
        let mut builder = MetadataBuilder::new()
            .run_name(&self.config.application.name)
            .description("calorimeter cell position assignment")
            .geometry_source(&self.config.geometry.path.to_string_lossy())
            .parameter(
                "parallel_stages",
                serde_json::json!(self.config.run.parallel_stages),
            );
        if let Some(max) = self.config.run.max_events {
            builder = builder.parameter("max_events", serde_json::json!(max));
        }
        for stage in self.driver.stages() {
            builder = builder.stage(
                stage.name(),
                stage.resolver().shape(),
                stage.resolver().readout_name(),
            );
        }
        for rule in self.driver.commands().rules() {
            builder = builder.output_command(&rule.to_string());
        }
        builder.build()
    }

    /// Reads the configured input and writes the configured output.
    pub async fn run(&self) -> CaloResult<RunSummary> {
        let span = info_span!("run", name = %self.config.application.name);
        async {
            let mut source =
                JsonLinesSource::open(&self.config.input.path, self.config.input.collections.clone())
                    .await?;
            let mut writer = self.writers.create(&self.config.output.format)?;
            writer.init(&self.config.output.path).await?;
            self.run_with(&mut source, writer.as_mut()).await
        }
        .instrument(span)
        .await
    }

    /// Runs the pipeline between an arbitrary source and an initialised writer.
    pub async fn run_with(
        &self,
        source: &mut dyn EventSource,
        writer: &mut dyn StorageWriter,
    ) -> CaloResult<RunSummary> {
        let metadata = self.metadata();
        let header = match metadata.validate() {
            Ok(()) => writer.set_metadata(&metadata).await,
            Err(msg) => Err(CaloError::Configuration(format!("run metadata: {}", msg))),
        };
        if let Err(e) = header {
            let _ = writer.shutdown().await;
            return Err(e);
        }
        self.driver.run(source, writer).await
    }
}
