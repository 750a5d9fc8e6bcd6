//! Resource implementations

pub mod catalog;

pub use catalog::FunctionResource;
