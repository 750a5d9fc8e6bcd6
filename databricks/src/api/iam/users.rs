//! SCIM user API implementation

use crate::api::common::ApiQueryParams;
use crate::api::{ApiError, Client};
use serde::{Deserialize, Serialize};
use tfplug::Context;

const USERS_PATH: &str = "/api/2.0/preview/scim/v2/Users";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(rename = "userName", default)]
    pub user_name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub active: bool,
}

/// SCIM list response page
#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(rename = "totalResults", default)]
    total_results: u32,
    #[serde(rename = "Resources", default)]
    resources: Vec<User>,
}

/// Substring filters on users, combined with `and`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub display_name_contains: Option<String>,
    pub user_name_contains: Option<String>,
}

impl UserFilter {
    /// Renders a SCIM filter expression, None when no filter is set
    pub fn to_scim(&self) -> Option<String> {
        let clauses: Vec<String> = [
            ("displayName", &self.display_name_contains),
            ("userName", &self.user_name_contains),
        ]
        .into_iter()
        .filter_map(|(attr, value)| {
            value
                .as_deref()
                .map(|v| format!("{} co \"{}\"", attr, escape_scim(v)))
        })
        .collect();

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" and "))
        }
    }
}

fn escape_scim(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Users API
#[derive(Clone)]
pub struct UsersApi {
    client: Client,
}

impl UsersApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List all users matching the filter, following SCIM pagination
    pub async fn list(&self, ctx: &Context, filter: &UserFilter) -> Result<Vec<User>, ApiError> {
        let scim_filter = filter.to_scim();
        let mut users = Vec::new();
        let mut start_index = 1;

        loop {
            let params = ApiQueryParams::new()
                .add_optional("filter", scim_filter.as_ref())
                .add("attributes", "id,userName,displayName,active")
                .add("startIndex", start_index)
                .add("count", PAGE_SIZE);

            let page: ListUsersResponse = self
                .client
                .get_with_params(ctx, USERS_PATH, &params)
                .await?;

            let received = page.resources.len() as u32;
            users.extend(page.resources);

            tracing::debug!(
                received,
                total = page.total_results,
                "fetched users page starting at {}",
                start_index
            );

            if received == 0 || users.len() as u32 >= page.total_results {
                break;
            }
            start_index += received;
        }

        Ok(users)
    }
}
