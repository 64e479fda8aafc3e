//! Storage writer factory with automatic feature-based registration.
use crate::core::StorageWriter;
use crate::data::storage::JsonLinesWriter;
use crate::error::{CaloError, CaloResult};
use std::collections::HashMap;

#[cfg(feature = "storage_csv")]
use crate::data::storage::CsvWriter;

type WriterFactory = Box<dyn Fn() -> Box<dyn StorageWriter> + Send + Sync>;

/// Registry for storage writer factories with automatic feature detection.
///
/// The registry automatically registers available storage writers based on
/// enabled Cargo features. `jsonl` is always present.
///
/// # Examples
///
/// ```
/// use calo_positions::data::storage_factory::StorageWriterRegistry;
///
/// let registry = StorageWriterRegistry::new();
/// let _writer = registry.create("jsonl")?;
/// assert!(registry.create("root").is_err());
/// # Ok::<(), calo_positions::error::CaloError>(())
/// ```
pub struct StorageWriterRegistry {
    factories: HashMap<String, WriterFactory>,
}

impl Default for StorageWriterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageWriterRegistry {
    /// Creates a new registry and automatically registers all available writers.
    ///
    /// - `jsonl` → JSON-lines writer (always)
    /// - `storage_csv` → CSV writer
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };

        registry.register("jsonl", || Box::new(JsonLinesWriter::new()));

        #[cfg(feature = "storage_csv")]
        registry.register("csv", || Box::new(CsvWriter::new()));

        registry
    }

    /// Registers a custom storage writer factory, replacing any factory of the same
    /// format.
    pub fn register<F>(&mut self, format: &str, factory: F)
    where
        F: Fn() -> Box<dyn StorageWriter> + Send + Sync + 'static,
    {
        self.factories.insert(format.to_string(), Box::new(factory));
    }

    /// Creates a storage writer for the specified format.
    ///
    /// # Errors
    ///
    /// Returns `CaloError::Configuration` if the format is not registered (feature
    /// not enabled or unknown format).
    pub fn create(&self, format: &str) -> CaloResult<Box<dyn StorageWriter>> {
        self.factories
            .get(format)
            .map(|factory| factory())
            .ok_or_else(|| {
                let available = self.list_formats().join(", ");
                CaloError::Configuration(format!(
                    "Unsupported storage format: '{}'. Available formats: [{}]",
                    format, available
                ))
            })
    }

    /// Returns a sorted list of all registered storage format names.
    pub fn list_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.factories.keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Checks if a specific format is available.
    pub fn is_available(&self, format: &str) -> bool {
        self.factories.contains_key(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_always_available() {
        let registry = StorageWriterRegistry::new();
        assert!(registry.is_available("jsonl"));
        assert!(registry.create("jsonl").is_ok());
    }

    #[test]
    #[cfg(feature = "storage_csv")]
    fn test_csv_writer_available_with_feature() {
        let registry = StorageWriterRegistry::new();
        assert!(registry.is_available("csv"));
        assert!(registry.create("csv").is_ok());
    }

    #[test]
    fn test_invalid_format_returns_error() {
        let registry = StorageWriterRegistry::new();
        let err = registry.create("nonexistent_format").err().unwrap();
        assert!(err.to_string().contains("jsonl"));
    }

    #[test]
    fn test_list_formats_is_sorted() {
        let registry = StorageWriterRegistry::new();
        let formats = registry.list_formats();
        let mut sorted_formats = formats.clone();
        sorted_formats.sort();
        assert_eq!(formats, sorted_formats);
    }

    #[test]
    fn test_custom_registration() {
        use crate::data::storage::MemoryWriter;

        let mut registry = StorageWriterRegistry::new();
        let original_count = registry.list_formats().len();
        registry.register("memory", || Box::new(MemoryWriter::new()));
        assert_eq!(registry.list_formats().len(), original_count + 1);
        assert!(registry.is_available("memory"));
    }
}
