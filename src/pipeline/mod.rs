//! Event loop: reading events, running the assignment stages, filtering output.
pub mod driver;
pub mod event_store;
pub mod output;
pub mod reader;
pub mod stage;

pub use driver::{PipelineDriver, RunSummary};
pub use event_store::{Collection, Event, EventStore};
pub use output::OutputCommands;
pub use reader::{EventSource, JsonLinesSource, MemorySource};
pub use stage::AssignmentStage;
