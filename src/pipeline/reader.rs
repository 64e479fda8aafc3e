//! Event sources.
//!
//! The file format is JSON lines, one event per line:
//!
//! ```text
//! {"number": 0, "collections": {"ECalBarrelCells": {"kind": "cells", "items": [{"cell_id": 4242, "energy": 0.31}]}}}
//! ```
//!
//! `number` may be omitted, in which case events are numbered by position in the
//! file. Blank lines are skipped.
use crate::error::{CaloError, CaloResult};
use crate::pipeline::event_store::{Event, EventStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// Anything that yields events one at a time.
#[async_trait]
pub trait EventSource: Send {
    /// Returns the next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> CaloResult<Option<Event>>;
}

#[derive(Debug, Deserialize)]
struct InputEvent {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    collections: EventStore,
}

/// Reads events from a JSON-lines file, keeping only the configured collections.
pub struct JsonLinesSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    collections: Vec<String>,
    line_number: usize,
    events_read: u64,
}

impl JsonLinesSource {
    /// Opens `path`. Every event must contain each name in `collections`; all other
    /// collections are discarded on read.
    pub async fn open<P: AsRef<Path>>(path: P, collections: Vec<String>) -> CaloResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| {
            CaloError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open event file '{}': {}", path.display(), e),
            ))
        })?;
        tracing::info!(path = %path.display(), collections = collections.len(), "Opened event input");
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            collections,
            line_number: 0,
            events_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSource for JsonLinesSource {
    async fn next_event(&mut self) -> CaloResult<Option<Event>> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                CaloError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}:{}: {}", self.path.display(), self.line_number + 1, e),
                ))
            })?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let input: InputEvent = serde_json::from_str(&line).map_err(|e| {
                CaloError::Serialization(format!(
                    "{}:{}: {}",
                    self.path.display(),
                    self.line_number,
                    e
                ))
            })?;
            let number = input.number.unwrap_or(self.events_read);
            self.events_read += 1;

            let store = input
                .collections
                .select(&self.collections)
                .map_err(|e| e.in_event(number))?;
            return Ok(Some(Event { number, store }));
        }
    }
}

/// Serves events from memory; handy for tests and embedding.
///
/// ```
/// use calo_positions::pipeline::{Event, EventSource, MemorySource};
///
/// let mut source = MemorySource::new((0..2).map(Event::new));
/// tokio_test::block_on(async {
///     assert_eq!(source.next_event().await?.map(|e| e.number), Some(0));
///     assert_eq!(source.next_event().await?.map(|e| e.number), Some(1));
///     assert!(source.next_event().await?.is_none());
///     Ok::<(), calo_positions::error::CaloError>(())
/// })?;
/// # Ok::<(), calo_positions::error::CaloError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemorySource {
    events: VecDeque<Event>,
}

impl MemorySource {
    pub fn new<I: IntoIterator<Item = Event>>(events: I) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next_event(&mut self) -> CaloResult<Option<Event>> {
        Ok(self.events.pop_front())
    }
}
