//! Per-event collection store.
//!
//! Stages exchange data through named collections. A collection is written once per
//! event and read any number of times; records are shared behind `Arc` so parallel
//! stages and the output writer never copy them.
use crate::core::{CellRecord, PositionedCell};
use crate::error::{CaloError, CaloResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named collection's payload, tagged by record kind.
///
/// Serialized as `{"kind": "cells", "items": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Collection {
    Cells(Arc<Vec<CellRecord>>),
    PositionedCells(Arc<Vec<PositionedCell>>),
    /// Anything the pipeline carries through without interpreting (generator
    /// particles, vertices, ...).
    Opaque(serde_json::Value),
}

impl Collection {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Collection::Cells(_) => "cells",
            Collection::PositionedCells(_) => "positioned_cells",
            Collection::Opaque(_) => "opaque",
        }
    }

    /// Number of records, when the kind has a notion of records.
    pub fn len(&self) -> Option<usize> {
        match self {
            Collection::Cells(cells) => Some(cells.len()),
            Collection::PositionedCells(cells) => Some(cells.len()),
            Collection::Opaque(serde_json::Value::Array(items)) => Some(items.len()),
            Collection::Opaque(_) => None,
        }
    }
}

/// Collections of one event, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventStore {
    collections: BTreeMap<String, Collection>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a collection.
    ///
    /// # Errors
    ///
    /// `CaloError::DuplicateCollection` if `name` was already published this event.
    pub fn put(&mut self, name: &str, collection: Collection) -> CaloResult<()> {
        if self.collections.contains_key(name) {
            return Err(CaloError::DuplicateCollection(name.to_string()));
        }
        self.collections.insert(name.to_string(), collection);
        Ok(())
    }

    pub fn put_cells(&mut self, name: &str, cells: Vec<CellRecord>) -> CaloResult<()> {
        self.put(name, Collection::Cells(Arc::new(cells)))
    }

    pub fn put_positioned(&mut self, name: &str, cells: Vec<PositionedCell>) -> CaloResult<()> {
        self.put(name, Collection::PositionedCells(Arc::new(cells)))
    }

    pub fn get(&self, name: &str) -> CaloResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| CaloError::MissingCollection(name.to_string()))
    }

    pub fn cells(&self, name: &str) -> CaloResult<Arc<Vec<CellRecord>>> {
        match self.get(name)? {
            Collection::Cells(cells) => Ok(Arc::clone(cells)),
            other => Err(CaloError::CollectionKind {
                name: name.to_string(),
                expected: "cells",
                found: other.kind_name(),
            }),
        }
    }

    pub fn positioned_cells(&self, name: &str) -> CaloResult<Arc<Vec<PositionedCell>>> {
        match self.get(name)? {
            Collection::PositionedCells(cells) => Ok(Arc::clone(cells)),
            other => Err(CaloError::CollectionKind {
                name: name.to_string(),
                expected: "positioned_cells",
                found: other.kind_name(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Collection)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Keeps only the listed collections.
    ///
    /// # Errors
    ///
    /// `CaloError::MissingCollection` for the first listed name the store lacks.
    pub fn select(mut self, names: &[String]) -> CaloResult<Self> {
        let mut selected = BTreeMap::new();
        for name in names {
            let collection = self
                .collections
                .remove(name)
                .ok_or_else(|| CaloError::MissingCollection(name.clone()))?;
            selected.insert(name.clone(), collection);
        }
        Ok(Self {
            collections: selected,
        })
    }
}

/// One event flowing through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub number: u64,
    #[serde(rename = "collections")]
    pub store: EventStore,
}

impl Event {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            store: EventStore::new(),
        }
    }
}
