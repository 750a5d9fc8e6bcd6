use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tfplug::Context;

use super::catalog::FunctionsApi;
use super::common::{ApiErrorResponse, ApiQueryParams};
use super::error::ApiError;
use super::iam::UsersApi;

/// Context key carrying the user agent segment of the calling resource,
/// e.g. `resource/function`
pub const USER_AGENT_EXTRA: &str = "databricks.user_agent_extra";

const BASE_USER_AGENT: &str = concat!("terraform-provider-databricks/", env!("CARGO_PKG_VERSION"));

/// Databricks REST API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth_header: String,
    retry_config: RetryConfig,
}

/// Transport level retries. Only rate limiting (429) and service
/// unavailability (503) are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 60,
        }
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(host: &str, token: &str) -> Result<Self, ApiError> {
        Self::with_config(host, token, false, RetryConfig::default())
    }

    /// Create a new API client with custom TLS and retry configuration
    pub fn with_config(
        host: &str,
        token: &str,
        skip_verify: bool,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let base_url = host.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::InvalidHost(host.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_verify)
            .timeout(Duration::from_secs(retry_config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url,
                auth_header: format!("Bearer {}", token),
                retry_config,
            }),
        })
    }

    pub fn host(&self) -> &str {
        &self.inner.base_url
    }

    /// Unity Catalog function operations
    pub fn functions(&self) -> FunctionsApi {
        FunctionsApi::new(self.clone())
    }

    /// SCIM user operations
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> Result<T, ApiError> {
        let text = self.execute(ctx, Method::GET, path, None::<&()>).await?;
        parse_body(&text)
    }

    /// Execute a GET request with query parameters
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<T, ApiError> {
        let full_path = format!("{}{}", path, params.to_query_string());
        self.get(ctx, &full_path).await
    }

    /// Execute a POST request with retry logic
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let text = self.execute(ctx, Method::POST, path, Some(body)).await?;
        parse_body(&text)
    }

    /// Execute a PATCH request with retry logic
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let text = self.execute(ctx, Method::PATCH, path, Some(body)).await?;
        parse_body(&text)
    }

    /// Execute a DELETE request with retry logic, discarding the response body
    pub async fn delete(&self, ctx: &Context, path: &str) -> Result<(), ApiError> {
        self.execute(ctx, Method::DELETE, path, None::<&()>)
            .await
            .map(|_| ())
    }

    async fn user_agent(&self, ctx: &Context) -> String {
        match ctx.get_value::<String>(USER_AGENT_EXTRA).await {
            Some(extra) => format!("{} {}", BASE_USER_AGENT, extra),
            None => BASE_USER_AGENT.to_string(),
        }
    }

    /// Execute request with retry logic, returning the raw success body
    async fn execute<B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let user_agent = self.user_agent(ctx).await;
        let retry = &self.inner.retry_config;

        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= retry.max_retries {
            if attempt > 0 {
                let backoff = std::cmp::min(
                    retry
                        .initial_backoff_ms
                        .saturating_mul(2_u64.saturating_pow(attempt - 1)),
                    retry.max_backoff_ms,
                );
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff,
                    attempt
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                    _ = ctx.cancelled() => return Err(ApiError::Cancelled),
                }
            }

            if ctx.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let mut request = self
                .inner
                .http_client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, &self.inner.auth_header)
                .header(USER_AGENT, &user_agent);
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!("{} request to: {}", method, url);

            let result = tokio::select! {
                result = request.send() => result,
                _ = ctx.cancelled() => return Err(ApiError::Cancelled),
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!("Response status: {}", status);

                    if status.is_success() {
                        return Ok(response.text().await?);
                    }

                    match status {
                        StatusCode::UNAUTHORIZED => return Err(ApiError::AuthError),
                        StatusCode::TOO_MANY_REQUESTS => last_error = Some(ApiError::RateLimited),
                        StatusCode::SERVICE_UNAVAILABLE => {
                            last_error = Some(ApiError::ServiceUnavailable)
                        }
                        _ => return Err(error_from_response(response).await),
                    }
                }
                Err(e) if e.is_timeout() => return Err(ApiError::Timeout(retry.timeout_seconds)),
                Err(e) => return Err(ApiError::RequestError(e)),
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    // Some endpoints answer with an empty body; treat it as JSON null
    let text = if text.trim().is_empty() { "null" } else { text };
    tracing::debug!("API response body: {}", text);

    serde_json::from_str::<T>(text).map_err(|e| {
        tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
        ApiError::ParseError(format!("Failed to parse response: {}", e))
    })
}

async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    let (error_code, message) = match serde_json::from_str::<ApiErrorResponse>(&text) {
        Ok(body) => {
            let code = body.error_code.clone();
            (code, body.into_message().unwrap_or_else(|| text.clone()))
        }
        Err(_) => (None, text),
    };

    tracing::warn!(status, error_code = ?error_code, "API error response: {}", message);
    ApiError::from_response(status, error_code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::Value;

    fn fast_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn client_sends_bearer_token_and_resource_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/2.1/unity-catalog/functions/main.default.f")
            .match_header("authorization", "Bearer dapi-secret")
            .match_header(
                "user-agent",
                Matcher::Regex("^terraform-provider-databricks/.* resource/function$".into()),
            )
            .with_body(r#"{"name":"f"}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "dapi-secret").unwrap();
        let ctx = Context::new()
            .with_value(USER_AGENT_EXTRA, "resource/function".to_string())
            .await;

        let body: Value = client
            .get(&ctx, "/api/2.1/unity-catalog/functions/main.default.f")
            .await
            .unwrap();
        assert_eq!(body["name"], "f");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_handles_authentication_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/2.0/preview/scim/v2/Me")
            .with_status(401)
            .with_body(r#"{"error_code":"UNAUTHENTICATED","message":"bad token"}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "invalid").unwrap();

        let result: Result<Value, _> = client
            .get(&Context::new(), "/api/2.0/preview/scim/v2/Me")
            .await;
        assert!(matches!(result, Err(ApiError::AuthError)));
    }

    #[tokio::test]
    async fn client_classifies_not_found_as_missing() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/2.1/unity-catalog/functions/main.default.gone")
            .with_status(404)
            .with_body(
                r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"Routine 'main.default.gone' does not exist."}"#,
            )
            .create_async()
            .await;

        let client = Client::new(&server.url(), "token").unwrap();

        let err = client
            .get::<Value>(
                &Context::new(),
                "/api/2.1/unity-catalog/functions/main.default.gone",
            )
            .await
            .unwrap_err();

        assert!(err.is_missing());
        assert_eq!(err.to_string(), "Routine 'main.default.gone' does not exist.");
    }

    #[tokio::test]
    async fn client_retries_rate_limited_requests_then_gives_up() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/2.1/unity-catalog/functions/a.b.c")
            .with_status(429)
            .expect(4)
            .create_async()
            .await;

        let client =
            Client::with_config(&server.url(), "token", false, fast_retries()).unwrap();

        let result = client
            .get::<Value>(&Context::new(), "/api/2.1/unity-catalog/functions/a.b.c")
            .await;
        assert!(matches!(result, Err(ApiError::RateLimited)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_does_not_retry_validation_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/2.1/unity-catalog/functions")
            .with_status(400)
            .with_body(r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"bad routine_body"}"#)
            .expect(1)
            .create_async()
            .await;

        let client =
            Client::with_config(&server.url(), "token", false, fast_retries()).unwrap();

        let err = client
            .post::<Value, _>(
                &Context::new(),
                "/api/2.1/unity-catalog/functions",
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();

        match err {
            ApiError::ApiError {
                status,
                error_code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(error_code.as_deref(), Some("INVALID_PARAMETER_VALUE"));
                assert_eq!(message, "bad routine_body");
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_strips_trailing_slash_from_host() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/2.1/unity-catalog/functions/a.b.c")
            .with_body("")
            .create_async()
            .await;

        let client = Client::new(&format!("{}/", server.url()), "token").unwrap();

        client
            .delete(&Context::new(), "/api/2.1/unity-catalog/functions/a.b.c")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_rejects_empty_host() {
        assert!(matches!(
            Client::new("/", "token"),
            Err(ApiError::InvalidHost(_))
        ));
    }

    #[tokio::test]
    async fn client_stops_when_context_is_cancelled() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/2.1/unity-catalog/functions/a.b.c")
            .expect(0)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "token").unwrap();
        let ctx = Context::new();
        ctx.cancel();

        let result = client
            .get::<Value>(&ctx, "/api/2.1/unity-catalog/functions/a.b.c")
            .await;
        assert!(matches!(result, Err(ApiError::Cancelled)));

        mock.assert_async().await;
    }

    #[test]
    fn parse_body_treats_empty_as_null() {
        let parsed: Option<Value> = parse_body("  ").unwrap();
        assert!(parsed.is_none());

        assert!(matches!(
            parse_body::<Vec<String>>("{not json"),
            Err(ApiError::ParseError(_))
        ));
    }
}
