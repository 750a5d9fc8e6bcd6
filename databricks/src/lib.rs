//! Terraform provider for Databricks Unity Catalog
//!
//! Resources reconcile declared configuration against the Databricks REST API
//! through a generic [`reconcile::Reconciler`].

pub mod api;
pub mod config;
pub mod converters;
pub mod data_sources;
pub mod provider_data;
pub mod reconcile;
pub mod resources;

pub use config::ProviderConfig;
pub use provider_data::DatabricksProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSource;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, ProviderSchemaResponse,
    ResourceFactory,
};
use tfplug::resource::Resource;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::Diagnostic;
use tfplug::{provider_data, Provider, ProviderData};

use crate::reconcile::StabilizationConfig;

pub struct DatabricksProvider {
    stabilization: StabilizationConfig,
}

impl Default for DatabricksProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabricksProvider {
    pub fn new() -> Self {
        Self {
            stabilization: StabilizationConfig::default(),
        }
    }

    /// Overrides the wait applied after creating asynchronously visible objects
    pub fn with_stabilization(mut self, stabilization: StabilizationConfig) -> Self {
        self.stabilization = stabilization;
        self
    }
}

#[async_trait]
impl Provider for DatabricksProvider {
    fn type_name(&self) -> &str {
        "databricks"
    }

    async fn schema(&self, _ctx: Context) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Databricks workspace connection settings")
            .attribute(
                AttributeBuilder::new("host", AttributeType::String)
                    .description("Workspace URL, also read from DATABRICKS_HOST")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("token", AttributeType::String)
                    .description("Personal access token, also read from DATABRICKS_TOKEN")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("http_timeout_seconds", AttributeType::Number)
                    .description("Per-request timeout, also read from DATABRICKS_HTTP_TIMEOUT_SECONDS")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("skip_verify", AttributeType::Bool)
                    .description("Skip TLS certificate verification, also read from DATABRICKS_SKIP_VERIFY")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("rate_limit_retries", AttributeType::Number)
                    .description("Retries for rate limited (429) and unavailable (503) responses")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let config = match ProviderConfig::from_config(&request.config) {
            Ok(config) => config,
            Err(diagnostics) => {
                return ConfigureProviderResponse {
                    provider_data: None,
                    diagnostics,
                }
            }
        };

        match config.client() {
            Ok(client) => {
                tracing::info!(
                    host = %config.host,
                    terraform_version = %request.terraform_version,
                    "configured databricks provider"
                );
                let data = DatabricksProviderData::new(client).with_stabilization(self.stabilization);
                ConfigureProviderResponse {
                    provider_data: Some(Arc::new(data)),
                    diagnostics: vec![],
                }
            }
            Err(e) => ConfigureProviderResponse {
                provider_data: None,
                diagnostics: vec![Diagnostic::error(
                    "Failed to create API client",
                    e.to_string(),
                )],
            },
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "databricks_function".to_string(),
            Box::new(|data: &ProviderData| -> tfplug::Result<Box<dyn Resource>> {
                let data = provider_data::<DatabricksProviderData>(data)?;
                Ok(Box::new(crate::resources::FunctionResource::new(&data)) as Box<dyn Resource>)
            }),
        );
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(
            "databricks_data_users".to_string(),
            Box::new(|data: &ProviderData| -> tfplug::Result<Box<dyn DataSource>> {
                let data = provider_data::<DatabricksProviderData>(data)?;
                Ok(Box::new(crate::data_sources::UsersDataSource::new(&data)) as Box<dyn DataSource>)
            }),
        );
        data_sources
    }
}
