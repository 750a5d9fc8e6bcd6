//! Common types and utilities for the Databricks REST API

use serde::Deserialize;

/// Error body returned by the REST API on non-success responses
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error_code: Option<String>,
    pub message: Option<String>,
    /// SCIM endpoints report errors with `detail` instead of `message`
    pub detail: Option<String>,
}

impl ApiErrorResponse {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.detail)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}

/// Encodes one path segment, e.g. a three-level object name
pub fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
