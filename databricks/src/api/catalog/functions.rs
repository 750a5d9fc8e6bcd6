//! Unity Catalog function API implementation

use crate::api::common::path_segment;
use crate::api::{ApiError, Client};
use serde::{Deserialize, Serialize};
use tfplug::Context;

const FUNCTIONS_PATH: &str = "/api/2.1/unity-catalog/functions";

/// Wrapper the API uses for function parameter lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameterInfos {
    #[serde(default)]
    pub parameters: Vec<FunctionParameterInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameterInfo {
    pub name: String,
    pub type_text: String,
    pub type_name: String,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_scale: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_interval_type: Option<String>,
    /// IN, OUT or INOUT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<String>,
    /// PARAM or COLUMN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Function definition sent on create. Server-assigned fields are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFunction {
    pub name: String,
    pub catalog_name: String,
    pub schema_name: String,
    pub input_params: FunctionParameterInfos,
    pub data_type: String,
    pub full_data_type: String,
    pub routine_body: String,
    pub routine_definition: String,
    pub parameter_style: String,
    pub is_deterministic: bool,
    pub sql_data_access: String,
    pub is_null_call: bool,
    pub security_type: String,
    pub specific_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_params: Option<FunctionParameterInfos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_path: Option<String>,
    /// JSON-serialized key-value pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
}

/// Request body for POST /api/2.1/unity-catalog/functions
#[derive(Debug, Clone, Serialize)]
pub struct CreateFunctionRequest {
    pub function_info: CreateFunction,
}

/// Function as reported by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_params: Option<FunctionParameterInfos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_params: Option<FunctionParameterInfos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deterministic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_data_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_null_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metastore_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Request body for PATCH /api/2.1/unity-catalog/functions/{full_name}
/// Owner is the only mutable property of a function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Functions API
#[derive(Clone)]
pub struct FunctionsApi {
    client: Client,
}

impl FunctionsApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        ctx: &Context,
        request: &CreateFunctionRequest,
    ) -> Result<FunctionInfo, ApiError> {
        tracing::debug!(
            name = %request.function_info.name,
            catalog = %request.function_info.catalog_name,
            schema = %request.function_info.schema_name,
            "creating function"
        );
        self.client.post(ctx, FUNCTIONS_PATH, request).await
    }

    /// Get a function by its three-level name
    pub async fn get_by_name(&self, ctx: &Context, full_name: &str) -> Result<FunctionInfo, ApiError> {
        self.client
            .get(ctx, &format!("{}/{}", FUNCTIONS_PATH, path_segment(full_name)))
            .await
    }

    pub async fn update(
        &self,
        ctx: &Context,
        full_name: &str,
        request: &UpdateFunction,
    ) -> Result<FunctionInfo, ApiError> {
        self.client
            .patch(
                ctx,
                &format!("{}/{}", FUNCTIONS_PATH, path_segment(full_name)),
                request,
            )
            .await
    }

    pub async fn delete_by_name(&self, ctx: &Context, full_name: &str) -> Result<(), ApiError> {
        self.client
            .delete(ctx, &format!("{}/{}", FUNCTIONS_PATH, path_segment(full_name)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn sample_create() -> CreateFunction {
        CreateFunction {
            name: "add_one".to_string(),
            catalog_name: "main".to_string(),
            schema_name: "default".to_string(),
            input_params: FunctionParameterInfos {
                parameters: vec![FunctionParameterInfo {
                    name: "x".to_string(),
                    type_text: "int".to_string(),
                    type_name: "INT".to_string(),
                    position: 0,
                    type_json: None,
                    type_precision: None,
                    type_scale: None,
                    type_interval_type: None,
                    parameter_mode: None,
                    parameter_type: None,
                    parameter_default: None,
                    comment: None,
                }],
            },
            data_type: "INT".to_string(),
            full_data_type: "int".to_string(),
            routine_body: "SQL".to_string(),
            routine_definition: "x + 1".to_string(),
            parameter_style: "S".to_string(),
            is_deterministic: true,
            sql_data_access: "CONTAINS_SQL".to_string(),
            is_null_call: false,
            security_type: "DEFINER".to_string(),
            specific_name: "add_one".to_string(),
            return_params: None,
            comment: None,
            external_language: None,
            external_name: None,
            sql_path: None,
            properties: None,
        }
    }

    #[tokio::test]
    async fn create_wraps_definition_in_function_info() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/2.1/unity-catalog/functions")
            .match_body(Matcher::PartialJson(json!({
                "function_info": {
                    "name": "add_one",
                    "catalog_name": "main",
                    "routine_definition": "x + 1"
                }
            })))
            .with_body(
                json!({
                    "name": "add_one",
                    "catalog_name": "main",
                    "schema_name": "default",
                    "full_name": "main.default.add_one",
                    "created_at": 1700000000000_i64
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = Client::new(&server.url(), "token").unwrap().functions();
        let info = api
            .create(
                &Context::new(),
                &CreateFunctionRequest {
                    function_info: sample_create(),
                },
            )
            .await
            .unwrap();

        assert_eq!(info.full_name.as_deref(), Some("main.default.add_one"));
        assert_eq!(info.created_at, Some(1700000000000));
        mock.assert_async().await;
    }

    #[test]
    fn create_payload_omits_absent_optionals() {
        let body = serde_json::to_value(sample_create()).unwrap();
        let object = body.as_object().unwrap();

        assert!(!object.contains_key("comment"));
        assert!(!object.contains_key("full_name"));
        assert!(!object.contains_key("created_at"));
        assert!(!object["input_params"]["parameters"][0]
            .as_object()
            .unwrap()
            .contains_key("comment"));
    }

    #[tokio::test]
    async fn update_sends_only_owner() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/2.1/unity-catalog/functions/main.default.add_one")
            .match_body(Matcher::Json(json!({"owner": "data-eng"})))
            .with_body(r#"{"full_name":"main.default.add_one","owner":"data-eng"}"#)
            .create_async()
            .await;

        let api = Client::new(&server.url(), "token").unwrap().functions();
        let info = api
            .update(
                &Context::new(),
                "main.default.add_one",
                &UpdateFunction {
                    owner: Some("data-eng".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(info.owner.as_deref(), Some("data-eng"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_missing_function_is_classified_missing() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/2.1/unity-catalog/functions/main.default.nope")
            .with_status(404)
            .with_body(r#"{"error_code":"NOT_FOUND","message":"Routine not found"}"#)
            .create_async()
            .await;

        let api = Client::new(&server.url(), "token").unwrap().functions();
        let err = api
            .get_by_name(&Context::new(), "main.default.nope")
            .await
            .unwrap_err();

        assert!(err.is_missing());
    }

    #[tokio::test]
    async fn delete_by_name_addresses_full_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/2.1/unity-catalog/functions/main.default.add_one")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let api = Client::new(&server.url(), "token").unwrap().functions();
        api.delete_by_name(&Context::new(), "main.default.add_one")
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
