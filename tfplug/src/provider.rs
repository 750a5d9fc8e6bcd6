//! Provider trait and related types
//!
//! A provider is configured once. Configure hands back opaque provider data,
//! and every resource or data source is then built from that data by a
//! factory, so resources receive their dependencies at construction time.

use crate::context::Context;
use crate::data_source::DataSource;
use crate::error::{Result, TfplugError};
use crate::resource::Resource;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque data produced by Provider::configure
/// Downcast with `provider_data::<T>()`
pub type ProviderData = Arc<dyn Any + Send + Sync>;

pub type ResourceFactory = Box<dyn Fn(&ProviderData) -> Result<Box<dyn Resource>> + Send + Sync>;

pub type DataSourceFactory =
    Box<dyn Fn(&ProviderData) -> Result<Box<dyn DataSource>> + Send + Sync>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Prefix shared by every resource and data source type name
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context) -> ProviderSchemaResponse;

    /// Called once before any resource or data source is created
    /// MUST return provider_data when diagnostics contain no errors
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    /// Factories keyed by full resource type name
    fn resources(&self) -> HashMap<String, ResourceFactory>;

    /// Factories keyed by full data source type name
    fn data_sources(&self) -> HashMap<String, DataSourceFactory>;

    fn resource(&self, type_name: &str, data: &ProviderData) -> Result<Box<dyn Resource>> {
        let factories = self.resources();
        let factory = factories
            .get(type_name)
            .ok_or_else(|| TfplugError::ResourceNotFound(type_name.to_string()))?;
        factory(data)
    }

    fn data_source(&self, type_name: &str, data: &ProviderData) -> Result<Box<dyn DataSource>> {
        let factories = self.data_sources();
        let factory = factories
            .get(type_name)
            .ok_or_else(|| TfplugError::DataSourceNotFound(type_name.to_string()))?;
        factory(data)
    }
}

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
}

pub struct ConfigureProviderResponse {
    pub provider_data: Option<ProviderData>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Downcasts provider data to the provider's concrete type
pub fn provider_data<T: Any + Send + Sync>(data: &ProviderData) -> Result<Arc<T>> {
    Arc::clone(data)
        .downcast::<T>()
        .map_err(|_| TfplugError::InvalidProviderData(std::any::type_name::<T>()))
}
