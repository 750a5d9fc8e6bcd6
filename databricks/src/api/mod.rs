//! Databricks REST API client and endpoint bindings

pub mod catalog;
pub mod client;
pub mod common;
pub mod error;
pub mod iam;

pub use client::{Client, RetryConfig, USER_AGENT_EXTRA};
pub use error::ApiError;
