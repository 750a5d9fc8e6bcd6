//! Users data source implementation

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    DataSource, DataSourceSchemaResponse, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::api::iam::{User, UserFilter, UsersApi};
use crate::api::USER_AGENT_EXTRA;
use crate::DatabricksProviderData;

pub struct UsersDataSource {
    users: UsersApi,
}

impl UsersDataSource {
    pub fn new(data: &DatabricksProviderData) -> Self {
        Self {
            users: data.client.users(),
        }
    }
}

fn user_to_dynamic(user: User) -> Dynamic {
    Dynamic::Map(HashMap::from([
        ("id".to_string(), Dynamic::String(user.id)),
        ("user_name".to_string(), Dynamic::String(user.user_name)),
        ("display_name".to_string(), Dynamic::String(user.display_name)),
        ("active".to_string(), Dynamic::Bool(user.active)),
    ]))
}

fn optional_string(config: &DynamicValue, name: &str) -> Option<String> {
    config
        .get_string(&AttributePath::new(name))
        .ok()
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl DataSource for UsersDataSource {
    fn type_name(&self) -> &str {
        "databricks_data_users"
    }

    async fn schema(&self, _ctx: Context) -> DataSourceSchemaResponse {
        let user = AttributeType::Object(HashMap::from([
            ("id".to_string(), AttributeType::String),
            ("user_name".to_string(), AttributeType::String),
            ("display_name".to_string(), AttributeType::String),
            ("active".to_string(), AttributeType::Bool),
        ]));

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Lists workspace users, optionally filtered by name")
            .attribute(
                AttributeBuilder::new("display_name_contains", AttributeType::String)
                    .description("Only users whose display name contains this string")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("user_name_contains", AttributeType::String)
                    .description("Only users whose user name contains this string")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("users", AttributeType::List(Box::new(user)))
                    .description("Matching users")
                    .read_only()
                    .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let ctx = ctx
            .with_value(USER_AGENT_EXTRA, "data/data_users".to_string())
            .await;
        let mut diagnostics = vec![];

        let filter = UserFilter {
            display_name_contains: optional_string(&request.config, "display_name_contains"),
            user_name_contains: optional_string(&request.config, "user_name_contains"),
        };
        tracing::debug!(filter = ?filter.to_scim(), "reading users data source");

        match self.users.list(&ctx, &filter).await {
            Ok(users) => {
                let mut state = request.config;
                let users = users.into_iter().map(user_to_dynamic).collect();
                if let Err(e) = state.set_list(&AttributePath::new("users"), users) {
                    diagnostics.push(Diagnostic::error(
                        "Failed to set users",
                        e.to_string(),
                    ));
                }
                ReadDataSourceResponse { state, diagnostics }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error("failed to list users", e.to_string()));
                ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                }
            }
        }
    }
}
