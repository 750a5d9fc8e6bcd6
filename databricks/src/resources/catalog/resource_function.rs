//! Unity Catalog function resource

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::resource::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaResponse,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DiagnosticsExt, Dynamic, DynamicValue};
use tfplug::import_state_passthrough_id;

use crate::api::catalog::{
    CreateFunction, CreateFunctionRequest, FunctionInfo, FunctionParameterInfos, FunctionsApi,
    UpdateFunction,
};
use crate::api::{ApiError, USER_AGENT_EXTRA};
use crate::converters::{
    fill_missing_attributes, from_state, missing_required, resolve_unknowns, sdk_to_tf,
    strip_read_only, tf_to_sdk, to_state,
};
use crate::reconcile::{
    InvalidQualifiedName, QualifiedName, Reconciler, ReconcilerConfig, RemoteApi,
    StabilizationConfig,
};
use crate::DatabricksProviderData;

const RESOURCE_NAME: &str = "function";
const USER_AGENT: &str = "resource/function";

/// The only attributes the functions API can change on an existing function.
/// Every other configurable attribute forces replacement.
const MUTABLE_ATTRIBUTES: [&str; 1] = ["owner"];

/// Terraform-side model of a function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionModel {
    pub name: Option<String>,
    pub catalog_name: Option<String>,
    pub schema_name: Option<String>,
    pub input_params: Option<FunctionParameterInfos>,
    pub data_type: Option<String>,
    pub full_data_type: Option<String>,
    pub routine_body: Option<String>,
    pub routine_definition: Option<String>,
    pub parameter_style: Option<String>,
    pub is_deterministic: Option<bool>,
    pub sql_data_access: Option<String>,
    pub is_null_call: Option<bool>,
    pub security_type: Option<String>,
    pub specific_name: Option<String>,
    pub comment: Option<String>,
    pub owner: Option<String>,
    pub external_language: Option<String>,
    pub sql_path: Option<String>,
    pub properties: Option<String>,
    pub return_params: Option<FunctionParameterInfos>,
    pub external_name: Option<String>,
    pub full_name: Option<String>,
    pub function_id: Option<String>,
    pub metastore_id: Option<String>,
    pub created_at: Option<i64>,
    pub created_by: Option<String>,
    pub updated_at: Option<i64>,
    pub updated_by: Option<String>,
}

#[async_trait]
impl RemoteApi for FunctionsApi {
    type Object = FunctionInfo;
    type CreateRequest = CreateFunctionRequest;
    type UpdateRequest = UpdateFunction;

    async fn create(
        &self,
        ctx: &Context,
        request: &CreateFunctionRequest,
    ) -> Result<FunctionInfo, ApiError> {
        FunctionsApi::create(self, ctx, request).await
    }

    async fn get_by_name(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
    ) -> Result<FunctionInfo, ApiError> {
        FunctionsApi::get_by_name(self, ctx, &handle.to_string()).await
    }

    async fn update(
        &self,
        ctx: &Context,
        handle: &QualifiedName,
        request: &UpdateFunction,
    ) -> Result<FunctionInfo, ApiError> {
        FunctionsApi::update(self, ctx, &handle.to_string(), request).await
    }

    async fn delete_by_name(&self, ctx: &Context, handle: &QualifiedName) -> Result<(), ApiError> {
        FunctionsApi::delete_by_name(self, ctx, &handle.to_string()).await
    }

    fn handle_of(&self, object: &FunctionInfo) -> Result<QualifiedName, InvalidQualifiedName> {
        function_handle(object)
    }
}

fn function_handle(object: &FunctionInfo) -> Result<QualifiedName, InvalidQualifiedName> {
    if let Some(full_name) = &object.full_name {
        return full_name.parse();
    }
    match (&object.catalog_name, &object.schema_name, &object.name) {
        (Some(catalog), Some(schema), Some(name)) => Ok(QualifiedName::new(catalog, schema, name)),
        _ => Err(InvalidQualifiedName(
            object.name.clone().unwrap_or_default(),
        )),
    }
}

/// Remote API shape the function resource reconciles against
pub trait FunctionsRemote:
    RemoteApi<Object = FunctionInfo, CreateRequest = CreateFunctionRequest, UpdateRequest = UpdateFunction>
    + 'static
{
}

impl<T> FunctionsRemote for T where
    T: RemoteApi<
            Object = FunctionInfo,
            CreateRequest = CreateFunctionRequest,
            UpdateRequest = UpdateFunction,
        > + 'static
{
}

pub struct FunctionResource<A = FunctionsApi> {
    reconciler: Reconciler<A>,
    schema: Schema,
}

impl FunctionResource<FunctionsApi> {
    pub fn new(data: &DatabricksProviderData) -> Self {
        Self::with_api(data.client.functions(), data.stabilization)
    }
}

impl<A: FunctionsRemote> FunctionResource<A> {
    pub fn with_api(api: A, stabilization: StabilizationConfig) -> Self {
        Self {
            reconciler: Reconciler::new(
                api,
                ReconcilerConfig {
                    resource_name: RESOURCE_NAME,
                    stabilization: Some(stabilization),
                },
            ),
            schema: function_schema(),
        }
    }

    /// Builds the payload view of a plan: server-assigned attributes removed
    /// and unknowns nulled
    fn payload_model(&self, planned: &DynamicValue) -> Result<FunctionModel, Vec<Diagnostic>> {
        let mut payload = planned.clone();
        strip_read_only(&self.schema, &mut payload);
        resolve_unknowns(&mut payload);

        let missing = missing_required(&self.schema, &payload);
        if missing.has_errors() {
            return Err(missing);
        }
        from_state(&payload)
    }

    /// Merges an API response into `state`, keeping values the API omits
    fn converge(
        &self,
        mut state: DynamicValue,
        info: &FunctionInfo,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> DynamicValue {
        resolve_unknowns(&mut state);

        let mut model: FunctionModel = match from_state(&state) {
            Ok(model) => model,
            Err(diags) => {
                diagnostics.extend(diags);
                return state;
            }
        };

        diagnostics.extend(sdk_to_tf(info, &mut model));
        diagnostics.extend(to_state(&model, &mut state));
        fill_missing_attributes(&self.schema, &mut state);
        state
    }
}

/// Null and absent compare equal
fn configured_value<'a>(state: &'a DynamicValue, path: &AttributePath) -> Option<&'a Dynamic> {
    state.get(path).ok().filter(|value| !value.is_absent())
}

async fn with_user_agent(ctx: Context) -> Context {
    ctx.with_value(USER_AGENT_EXTRA, USER_AGENT.to_string()).await
}

/// Function identity from state: full_name, or the three identity attributes
fn handle_from_state(state: &DynamicValue) -> Result<QualifiedName, Diagnostic> {
    let full_name_path = AttributePath::new("full_name");

    if let Ok(full_name) = state.get_string(&full_name_path) {
        return full_name.parse().map_err(|e: InvalidQualifiedName| {
            Diagnostic::error("Invalid function name", e.to_string()).with_attribute(full_name_path)
        });
    }

    let part = |attribute: &str| state.get_string(&AttributePath::new(attribute));
    match (part("catalog_name"), part("schema_name"), part("name")) {
        (Ok(catalog), Ok(schema), Ok(name)) => Ok(QualifiedName::new(catalog, schema, name)),
        _ => Err(Diagnostic::error(
            "Missing function identity",
            "state has neither full_name nor catalog_name, schema_name and name",
        )
        .with_attribute(full_name_path)),
    }
}

/// `{parameters = [...]}` wrapper shared by input and return parameters
fn parameters_type() -> AttributeType {
    let parameter = AttributeType::Object(HashMap::from([
        ("name".to_string(), AttributeType::String),
        ("type_text".to_string(), AttributeType::String),
        ("type_name".to_string(), AttributeType::String),
        ("position".to_string(), AttributeType::Number),
        ("type_json".to_string(), AttributeType::String),
        ("type_precision".to_string(), AttributeType::Number),
        ("type_scale".to_string(), AttributeType::Number),
        ("type_interval_type".to_string(), AttributeType::String),
        ("parameter_mode".to_string(), AttributeType::String),
        ("parameter_type".to_string(), AttributeType::String),
        ("parameter_default".to_string(), AttributeType::String),
        ("comment".to_string(), AttributeType::String),
    ]));
    AttributeType::Object(HashMap::from([(
        "parameters".to_string(),
        AttributeType::List(Box::new(parameter)),
    )]))
}

fn function_schema() -> Schema {
    let required = |name: &str, type_: AttributeType, description: &str| {
        AttributeBuilder::new(name, type_)
            .description(description)
            .required()
            .build()
    };
    let optional = |name: &str, description: &str| {
        AttributeBuilder::new(name, AttributeType::String)
            .description(description)
            .optional()
            .build()
    };
    let read_only = |name: &str, type_: AttributeType, description: &str| {
        AttributeBuilder::new(name, type_)
            .description(description)
            .read_only()
            .build()
    };

    SchemaBuilder::new()
        .version(0)
        .description("Manages a Unity Catalog function")
        .attribute(required("name", AttributeType::String, "Name of the function, relative to its schema"))
        .attribute(required("catalog_name", AttributeType::String, "Name of the parent catalog"))
        .attribute(required("schema_name", AttributeType::String, "Name of the parent schema"))
        .attribute(required("input_params", parameters_type(), "Function input parameters"))
        .attribute(required("data_type", AttributeType::String, "Scalar return type, e.g. INT or TABLE_TYPE"))
        .attribute(required("full_data_type", AttributeType::String, "Pretty printed return type"))
        .attribute(required("routine_body", AttributeType::String, "SQL or EXTERNAL"))
        .attribute(required("routine_definition", AttributeType::String, "Function body"))
        .attribute(required("parameter_style", AttributeType::String, "Parameter passing style, S for SQL"))
        .attribute(required("is_deterministic", AttributeType::Bool, "Whether the function is deterministic"))
        .attribute(required("sql_data_access", AttributeType::String, "CONTAINS_SQL, READS_SQL_DATA or NO_SQL"))
        .attribute(required("is_null_call", AttributeType::Bool, "Whether the function returns null for null arguments"))
        .attribute(required("security_type", AttributeType::String, "DEFINER"))
        .attribute(required("specific_name", AttributeType::String, "Specific name of the function"))
        .attribute(optional("comment", "User-provided free-form text description"))
        .attribute(
            AttributeBuilder::new("owner", AttributeType::String)
                .description("Username of the function owner")
                .optional()
                .computed()
                .build(),
        )
        .attribute(optional("external_language", "Language of an EXTERNAL routine, e.g. Python"))
        .attribute(optional("sql_path", "Function SQL path"))
        .attribute(optional("properties", "JSON-serialized key-value pairs"))
        .attribute(
            AttributeBuilder::new("return_params", parameters_type())
                .description("Output columns of a table function")
                .optional()
                .build(),
        )
        .attribute(optional("external_name", "External function name"))
        .attribute(read_only("full_name", AttributeType::String, "Three-level name catalog.schema.function"))
        .attribute(read_only("function_id", AttributeType::String, "Unique identifier of the function"))
        .attribute(read_only("metastore_id", AttributeType::String, "Unique identifier of the parent metastore"))
        .attribute(read_only("created_at", AttributeType::Number, "Creation time in epoch milliseconds"))
        .attribute(read_only("created_by", AttributeType::String, "Username of the creator"))
        .attribute(read_only("updated_at", AttributeType::Number, "Last update time in epoch milliseconds"))
        .attribute(read_only("updated_by", AttributeType::String, "Username of the last updater"))
        .build()
}

#[async_trait]
impl<A: FunctionsRemote> Resource for FunctionResource<A> {
    fn type_name(&self) -> &str {
        "databricks_function"
    }

    async fn schema(&self, _ctx: Context) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: self.schema.clone(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let ctx = with_user_agent(ctx).await;
        let mut diagnostics = vec![];

        let model = match self.payload_model(&request.planned_state) {
            Ok(model) => model,
            Err(diags) => {
                diagnostics.extend(diags);
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics,
                };
            }
        };

        let function_info: CreateFunction = match tf_to_sdk(&model) {
            Ok(function_info) => function_info,
            Err(diags) => {
                diagnostics.extend(diags);
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics,
                };
            }
        };

        let info = match self
            .reconciler
            .create(&ctx, &CreateFunctionRequest { function_info })
            .await
        {
            Ok(info) => info,
            Err(e) => {
                diagnostics.push(Diagnostic::error("failed to create function", e.to_string()));
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics,
                };
            }
        };

        let new_state = self.converge(request.planned_state, &info, &mut diagnostics);
        CreateResourceResponse {
            new_state,
            diagnostics,
        }
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let ctx = with_user_agent(ctx).await;
        let mut diagnostics = vec![];

        let handle = match handle_from_state(&request.current_state) {
            Ok(handle) => handle,
            Err(diag) => {
                diagnostics.push(diag);
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                };
            }
        };

        match self.reconciler.read(&ctx, &handle).await {
            Ok(info) => {
                let new_state = self.converge(request.current_state, &info, &mut diagnostics);
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics,
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(handle = %handle, "function no longer exists, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error("failed to get function", e.to_string()));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                }
            }
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let ctx = with_user_agent(ctx).await;
        let mut diagnostics: Vec<Diagnostic> = self
            .schema
            .attributes
            .iter()
            .filter(|attribute| {
                !attribute.is_read_only() && !MUTABLE_ATTRIBUTES.contains(&attribute.name.as_str())
            })
            .map(|attribute| attribute.name.as_str())
            .filter(|attribute| {
                let path = AttributePath::new(attribute);
                configured_value(&request.prior_state, &path)
                    != configured_value(&request.planned_state, &path)
            })
            .map(|attribute| {
                Diagnostic::error(
                    "failed to update function",
                    format!(
                        "'{}' cannot be changed in place; the function must be replaced",
                        attribute
                    ),
                )
                .with_attribute(AttributePath::new(attribute))
            })
            .collect();

        if diagnostics.has_errors() {
            return UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics,
            };
        }

        let handle = match handle_from_state(&request.prior_state) {
            Ok(handle) => handle,
            Err(diag) => {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics,
                };
            }
        };

        let update: UpdateFunction = match self
            .payload_model(&request.planned_state)
            .and_then(|model| tf_to_sdk(&model))
        {
            Ok(update) => update,
            Err(diags) => {
                diagnostics.extend(diags);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics,
                };
            }
        };

        match self.reconciler.update(&ctx, &handle, &update).await {
            Ok(info) => {
                let new_state = self.converge(request.planned_state, &info, &mut diagnostics);
                UpdateResourceResponse {
                    new_state,
                    diagnostics,
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error("failed to update function", e.to_string()));
                UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics,
                }
            }
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let ctx = with_user_agent(ctx).await;
        let mut diagnostics = vec![];

        match handle_from_state(&request.prior_state) {
            Ok(handle) => {
                if let Err(e) = self.reconciler.delete(&ctx, &handle).await {
                    diagnostics.push(Diagnostic::error("failed to delete function", e.to_string()));
                }
            }
            Err(diag) => diagnostics.push(diag),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_importable(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl<A: FunctionsRemote> ResourceWithImportState for FunctionResource<A> {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        if let Err(e) = request.id.parse::<QualifiedName>() {
            response.diagnostics.push(
                Diagnostic::error("Invalid import ID", e.to_string())
                    .with_attribute(AttributePath::new("full_name")),
            );
            return response;
        }

        import_state_passthrough_id(AttributePath::new("full_name"), &request, &mut response);

        let mut imported = Vec::new();
        for resource in std::mem::take(&mut response.imported_resources) {
            let read = self
                .read(
                    ctx.clone(),
                    ReadResourceRequest {
                        type_name: resource.type_name.clone(),
                        current_state: resource.state,
                    },
                )
                .await;
            response.diagnostics.extend(read.diagnostics);

            match read.new_state {
                Some(state) => imported.push(ImportedResource {
                    type_name: resource.type_name,
                    state,
                }),
                None => response.diagnostics.push(Diagnostic::error(
                    "Cannot import non-existent remote object",
                    format!("function '{}' does not exist", request.id),
                )),
            }
        }
        response.imported_resources = imported;
        response
    }
}
