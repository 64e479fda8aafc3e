//! Event output writers.
use crate::{
    core::StorageWriter,
    error::{CaloError, CaloResult},
    metadata::Metadata,
    pipeline::{event_store::Collection, output::OutputCommands, Event},
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};

#[cfg(feature = "storage_csv")]
use std::fs::File;
#[cfg(feature = "storage_csv")]
use std::io::Write;

async fn create_parent_dir(path: &Path) -> CaloResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CaloError::Storage(format!("cannot create '{}': {}", parent.display(), e)))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct MetadataLine<'a> {
    metadata: &'a Metadata,
}

#[derive(Serialize)]
struct EventLine<'a> {
    number: u64,
    collections: BTreeMap<&'a str, &'a Collection>,
}

/// Writes one JSON object per line: a metadata header, then one line per event with
/// the collections the output commands keep.
pub struct JsonLinesWriter {
    path: PathBuf,
    writer: Option<BufWriter<tokio::fs::File>>,
    events_written: u64,
}

impl Default for JsonLinesWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonLinesWriter {
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            writer: None,
            events_written: 0,
        }
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    async fn write_line<T: Serialize + Sync>(&mut self, value: &T) -> CaloResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            CaloError::Storage("JSON-lines writer used before init".to_string())
        })?;
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .map_err(|e| CaloError::Storage(e.to_string()))
    }
}

#[async_trait]
impl StorageWriter for JsonLinesWriter {
    async fn init(&mut self, path: &Path) -> CaloResult<()> {
        create_parent_dir(path).await?;
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            CaloError::Storage(format!("Failed to create '{}': {}", path.display(), e))
        })?;
        self.path = path.to_path_buf();
        self.writer = Some(BufWriter::new(file));
        tracing::info!("JSON-lines writer initialized at '{}'.", self.path.display());
        Ok(())
    }

    async fn set_metadata(&mut self, metadata: &Metadata) -> CaloResult<()> {
        self.write_line(&MetadataLine { metadata }).await
    }

    async fn write_event(&mut self, event: &Event, commands: &OutputCommands) -> CaloResult<()> {
        let line = EventLine {
            number: event.number,
            collections: commands.kept(&event.store).collect(),
        };
        self.write_line(&line).await?;
        self.events_written += 1;
        Ok(())
    }

    async fn shutdown(&mut self) -> CaloResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .await
                .map_err(|e| CaloError::Storage(e.to_string()))?;
            tracing::info!(
                events = self.events_written,
                "JSON-lines writer shut down ('{}').",
                self.path.display()
            );
        }
        Ok(())
    }
}

/// A writer for CSV files, one row per positioned cell.
///
/// Only positioned-cell collections have a tabular form; other kept collections are
/// skipped.
#[cfg(feature = "storage_csv")]
pub struct CsvWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

#[cfg(feature = "storage_csv")]
impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "storage_csv")]
impl CsvWriter {
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            writer: None,
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
pub struct CsvWriter;

#[cfg(not(feature = "storage_csv"))]
impl CsvWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageWriter for CsvWriter {
    async fn init(&mut self, path: &Path) -> CaloResult<()> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = path;
            return Err(CaloError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            create_parent_dir(path).await?;
            self.path = path.to_path_buf();
            tracing::info!("CSV Writer will be initialized at '{}'.", self.path.display());
            Ok(())
        }
    }

    async fn set_metadata(&mut self, metadata: &Metadata) -> CaloResult<()> {
        #[cfg(feature = "storage_csv")]
        {
            let mut file = File::create(&self.path).map_err(|e| {
                CaloError::Storage(format!("Failed to create CSV file: {}", e))
            })?;

            let json_string = serde_json::to_string_pretty(metadata)?;
            for line in json_string.lines() {
                file.write_all(b"# ")
                    .and_then(|_| file.write_all(line.as_bytes()))
                    .and_then(|_| file.write_all(b"\n"))
                    .map_err(|e| CaloError::Storage(e.to_string()))?;
            }

            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(["event", "collection", "cell_id", "energy", "x", "y", "z"])
                .map_err(|e| CaloError::Storage(e.to_string()))?;

            self.writer = Some(writer);
            Ok(())
        }
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = metadata;
            Err(CaloError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    async fn write_event(&mut self, event: &Event, commands: &OutputCommands) -> CaloResult<()> {
        #[cfg(feature = "storage_csv")]
        {
            let writer = self.writer.as_mut().ok_or_else(|| {
                CaloError::Storage("CSV writer has no open file; call set_metadata first".to_string())
            })?;
            for (name, collection) in commands.kept(&event.store) {
                let Collection::PositionedCells(cells) = collection else {
                    tracing::trace!(collection = name, "Skipping non-positioned collection in CSV output");
                    continue;
                };
                for cell in cells.iter() {
                    writer
                        .write_record(&[
                            event.number.to_string(),
                            name.to_string(),
                            cell.cell.cell_id.0.to_string(),
                            cell.cell.energy.to_string(),
                            cell.position.x.to_string(),
                            cell.position.y.to_string(),
                            cell.position.z.to_string(),
                        ])
                        .map_err(|e| CaloError::Storage(e.to_string()))?;
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = (event, commands);
            Err(CaloError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    async fn shutdown(&mut self) -> CaloResult<()> {
        #[cfg(feature = "storage_csv")]
        {
            if let Some(mut writer) = self.writer.take() {
                writer
                    .flush()
                    .map_err(|e| CaloError::Storage(e.to_string()))?;
            }
            tracing::info!("CSV Writer shut down.");
            Ok(())
        }
        #[cfg(not(feature = "storage_csv"))]
        Ok(())
    }
}

/// Keeps filtered events in memory.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    metadata: Option<Metadata>,
    events: Vec<Event>,
    shut_down: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Written events, holding only the kept collections.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

#[async_trait]
impl StorageWriter for MemoryWriter {
    async fn init(&mut self, _path: &Path) -> CaloResult<()> {
        Ok(())
    }

    async fn set_metadata(&mut self, metadata: &Metadata) -> CaloResult<()> {
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    async fn write_event(&mut self, event: &Event, commands: &OutputCommands) -> CaloResult<()> {
        let mut kept = Event::new(event.number);
        for (name, collection) in commands.kept(&event.store) {
            kept.store.put(name, collection.clone())?;
        }
        self.events.push(kept);
        Ok(())
    }

    async fn shutdown(&mut self) -> CaloResult<()> {
        self.shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CellRecord, Position, PositionedCell};
    use crate::metadata::MetadataBuilder;

    fn event() -> Event {
        let mut event = Event::new(7);
        event
            .store
            .put_cells("ECalBarrelCells", vec![CellRecord::new(1u64, 0.25)])
            .unwrap();
        event
            .store
            .put_positioned(
                "ECalBarrelCellPositions",
                vec![PositionedCell {
                    position: Position::new(193.0, 0.0, 0.0),
                    cell: CellRecord::new(1u64, 0.25),
                }],
            )
            .unwrap();
        event
    }

    fn drop_raw() -> OutputCommands {
        OutputCommands::parse(&["keep *", "drop ECalBarrelCells"]).unwrap()
    }

    #[tokio::test]
    async fn jsonl_writes_header_then_filtered_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.jsonl");

        let mut writer = JsonLinesWriter::new();
        writer.init(&path).await.unwrap();
        writer
            .set_metadata(&MetadataBuilder::new().run_name("test").build())
            .await
            .unwrap();
        writer.write_event(&event(), &drop_raw()).await.unwrap();
        writer.shutdown().await.unwrap();
        assert_eq!(writer.events_written(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["metadata"]["run_name"], "test");
        assert_eq!(lines[1]["number"], 7);
        assert!(lines[1]["collections"].get("ECalBarrelCells").is_none());
        assert_eq!(
            lines[1]["collections"]["ECalBarrelCellPositions"]["items"][0]["position"]["x"],
            193.0
        );
    }

    #[tokio::test]
    async fn jsonl_requires_init() {
        let mut writer = JsonLinesWriter::new();
        assert!(writer.write_event(&event(), &drop_raw()).await.is_err());
        assert!(writer.shutdown().await.is_ok());
    }

    #[tokio::test]
    #[cfg(feature = "storage_csv")]
    async fn csv_writes_positioned_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut writer = CsvWriter::new();
        writer.init(&path).await.unwrap();
        writer.set_metadata(&Metadata::default()).await.unwrap();
        writer
            .write_event(&event(), &OutputCommands::default())
            .await
            .unwrap();
        writer.shutdown().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(rows[0], "event,collection,cell_id,energy,x,y,z");
        assert_eq!(rows[1], "7,ECalBarrelCellPositions,1,0.25,193,0,0");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn memory_writer_applies_commands() {
        let mut writer = MemoryWriter::new();
        writer.write_event(&event(), &drop_raw()).await.unwrap();
        let names: Vec<&str> = writer.events()[0].store.names().collect();
        assert_eq!(names, vec!["ECalBarrelCellPositions"]);
    }
}
