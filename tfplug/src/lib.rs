//! tfplug - Terraform provider lifecycle contracts for Rust
//!
//! The traits and value types a provider implements and exchanges with the
//! host: resources, data sources, diagnostics and dynamic state values.

// Core modules
pub mod context;
pub mod error;
pub mod schema;
pub mod types;

// Provider API modules
pub mod data_source;
pub mod provider;
pub mod resource;

// Helper modules
pub mod import;

// Re-exports for convenience
pub use context::Context;
pub use data_source::DataSource;
pub use error::{Result, TfplugError};
pub use import::import_state_passthrough_id;
pub use provider::{provider_data, Provider, ProviderData};
pub use resource::{Resource, ResourceWithImportState};
pub use schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
pub use types::{
    AttributePath, Config, Diagnostic, DiagnosticSeverity, DiagnosticsExt, Dynamic, DynamicValue,
    State,
};
