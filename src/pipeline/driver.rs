//! Runs the assignment stages over every event and hands the result to a writer.
use crate::core::StorageWriter;
use crate::error::{CaloError, CaloResult};
use crate::pipeline::event_store::Event;
use crate::pipeline::output::OutputCommands;
use crate::pipeline::reader::EventSource;
use crate::pipeline::stage::AssignmentStage;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Totals reported once a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    /// Cells positioned by each stage, in stage order.
    pub cells_per_stage: Vec<(String, u64)>,
}

impl RunSummary {
    pub fn total_cells(&self) -> u64 {
        self.cells_per_stage.iter().map(|(_, n)| n).sum()
    }
}

pub struct PipelineDriver {
    stages: Vec<Arc<AssignmentStage>>,
    commands: OutputCommands,
    max_events: Option<u64>,
    parallel_stages: bool,
}

impl PipelineDriver {
    /// # Errors
    ///
    /// `CaloError::Configuration` when two stages share a name or an output
    /// collection, or a stage publishes under a name another stage reads.
    pub fn new(stages: Vec<AssignmentStage>, commands: OutputCommands) -> CaloResult<Self> {
        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        for stage in &stages {
            if !names.insert(stage.name()) {
                return Err(CaloError::Configuration(format!(
                    "stage name '{}' used twice",
                    stage.name()
                )));
            }
            if !outputs.insert(stage.positioned_hits()) {
                return Err(CaloError::Configuration(format!(
                    "output collection '{}' published by more than one stage",
                    stage.positioned_hits()
                )));
            }
        }
        if let Some(stage) = stages.iter().find(|s| outputs.contains(s.hits())) {
            return Err(CaloError::Configuration(format!(
                "stage '{}' reads '{}', which is a positioned output",
                stage.name(),
                stage.hits()
            )));
        }

        Ok(Self {
            stages: stages.into_iter().map(Arc::new).collect(),
            commands,
            max_events: None,
            parallel_stages: false,
        })
    }

    /// Stops after `max_events` events; `None` processes the whole source.
    pub fn with_max_events(mut self, max_events: Option<u64>) -> Self {
        self.max_events = max_events;
        self
    }

    /// Runs the stages of each event concurrently on the blocking pool.
    pub fn with_parallel_stages(mut self, parallel: bool) -> Self {
        self.parallel_stages = parallel;
        self
    }

    pub fn stages(&self) -> impl Iterator<Item = &AssignmentStage> {
        self.stages.iter().map(Arc::as_ref)
    }

    pub fn commands(&self) -> &OutputCommands {
        &self.commands
    }

    /// Processes events until the source runs dry or `max_events` is reached.
    ///
    /// The writer must already be initialised. It is shut down before returning, on
    /// success and on failure alike, so every event written so far is flushed. A
    /// failing event is never written.
    pub async fn run(
        &self,
        source: &mut dyn EventSource,
        writer: &mut dyn StorageWriter,
    ) -> CaloResult<RunSummary> {
        let result = self.run_events(source, writer).await;
        match result {
            Ok(summary) => {
                writer.shutdown().await?;
                info!(
                    events = summary.events,
                    cells = summary.total_cells(),
                    "Run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "Run aborted");
                if let Err(shutdown_err) = writer.shutdown().await {
                    warn!(error = %shutdown_err, "Writer shutdown failed after aborted run");
                }
                Err(err)
            }
        }
    }

    async fn run_events(
        &self,
        source: &mut dyn EventSource,
        writer: &mut dyn StorageWriter,
    ) -> CaloResult<RunSummary> {
        let mut summary = RunSummary {
            events: 0,
            cells_per_stage: self
                .stages
                .iter()
                .map(|s| (s.name().to_string(), 0))
                .collect(),
        };

        while self.max_events.map_or(true, |max| summary.events < max) {
            let Some(mut event) = source.next_event().await? else {
                break;
            };
            let number = event.number;
            let span = info_span!("event", number);

            let counts = self
                .process_event(&mut event)
                .instrument(span.clone())
                .await
                .map_err(|e| e.in_event(number))?;
            writer
                .write_event(&event, &self.commands)
                .instrument(span)
                .await
                .map_err(|e| e.in_event(number))?;

            for ((_, total), count) in summary.cells_per_stage.iter_mut().zip(counts) {
                *total += count as u64;
            }
            summary.events += 1;
        }
        Ok(summary)
    }

    /// Runs every stage on one event and returns the cells positioned per stage.
    ///
    /// On failure the event's store may hold the outputs of earlier stages (in
    /// sequential mode) but the event must be discarded.
    pub async fn process_event(&self, event: &mut Event) -> CaloResult<Vec<usize>> {
        if !self.parallel_stages {
            return self
                .stages
                .iter()
                .map(|stage| {
                    let _entered = info_span!("stage", name = stage.name()).entered();
                    stage.execute(&mut event.store)
                })
                .collect();
        }

        let mut tasks = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let cells = event.store.cells(stage.hits())?;
            let stage = Arc::clone(stage);
            tasks.push(tokio::task::spawn_blocking(move || {
                let _entered = info_span!("stage", name = stage.name()).entered();
                stage.position_cells(&cells)
            }));
        }

        // All stages finish before anything is published.
        let mut outputs = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            let positioned = joined.map_err(|e| CaloError::StageTask(e.to_string()))??;
            outputs.push(positioned);
        }

        let mut counts = Vec::with_capacity(outputs.len());
        for (stage, positioned) in self.stages.iter().zip(outputs) {
            counts.push(positioned.len());
            event.store.put_positioned(stage.positioned_hits(), positioned)?;
        }
        Ok(counts)
    }
}
