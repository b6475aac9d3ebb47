//! # rtapp-builder: Real-time application configuration builder
//!
//! Resolves the configuration of a real-time application, a set of processing
//! blocks (functions) exchanging signals through shared memory regions (data
//! sources), into a fully typed, fully addressed static memory plan.
//!
//! ## Architecture
//!
//! - **Store**: an ordered, path-addressed tree of named nodes and typed values,
//!   used both for the inputs (Functions, Data, States) and the exported outputs
//! - **Registry**: the structured types signals may be declared with
//! - **Builder**: the staged pipeline (flattening, data-source binding,
//!   verification, states, consumers/producers, memory layout, brokers)
//! - **Config**: builder settings and JSON/TOML application files
//!
//! ## Example
//!
//! ```no_run
//! use rtapp_builder::{ApplicationFile, BrokerRegistry, ConfigurationBuilder};
//!
//! fn main() -> rtapp_builder::Result<()> {
//!     let app = ApplicationFile::load("application.toml")?;
//!     let types = app.type_registry()?;
//!     let brokers = BrokerRegistry::new();
//!
//!     let output = ConfigurationBuilder::new(&types, &brokers, app.settings.clone())
//!         .build(&app.functions, &app.data, &app.states)?;
//!
//!     for entry in output.memory_table() {
//!         println!("{}", entry);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod registry;
pub mod signal;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use builder::{
    BrokerProvider, BrokerRegistry, BuildOutput, BuildStage, ConfigurationBuilder, DataSource,
    Direction, Function, MemoryEntry, MemoryMapBrokers,
};
pub use config::{ApplicationFile, BuilderSettings};
pub use error::{BuildError, ErrorKind, Result};
pub use registry::{MemberDef, StructDef, TypeRegistry};
pub use signal::{Range, Signal, SignalDeclaration};
pub use store::{ConfigurationStore, NodeId};
pub use types::{Scalar, TypeDescriptor, Value};
