//! Read-only lookups exposed as Terraform data sources

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Key under which the provider registers this data source
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context) -> DataSourceSchemaResponse;

    /// Resolves the lookup. Returned state echoes the config with computed
    /// attributes filled in.
    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse;
}

pub struct DataSourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ReadDataSourceResponse {
    pub state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}
