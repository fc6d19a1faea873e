//! Runboard Core Library
//!
//! The orchestration and streaming core of the live test-run dashboard:
//! the canonical run state store, the static scenario catalog, the output
//! ingestion parser, and the test-runner process supervisor.

pub mod catalog;
pub mod error;
pub mod parser;
pub mod store;
pub mod supervisor;
pub mod types;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogSource};
pub use error::{Error, Result};
pub use parser::OutputParser;
pub use store::{Mutation, RunStore, Snapshot, StoreConfig, StoreEvent};
pub use supervisor::{ProcessSupervisor, RunnerCommand, SupervisorConfig};
pub use types::*;

/// Runboard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
