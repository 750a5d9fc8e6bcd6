//! Provider configuration resolved from the provider block and environment

use std::fmt;
use tfplug::{AttributePath, Diagnostic, DynamicValue};
use url::Url;

use crate::api::{ApiError, Client, RetryConfig};

pub const ENV_HOST: &str = "DATABRICKS_HOST";
pub const ENV_TOKEN: &str = "DATABRICKS_TOKEN";
pub const ENV_HTTP_TIMEOUT_SECONDS: &str = "DATABRICKS_HTTP_TIMEOUT_SECONDS";
pub const ENV_SKIP_VERIFY: &str = "DATABRICKS_SKIP_VERIFY";

#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub host: String,
    pub token: String,
    pub http_timeout_seconds: u64,
    pub skip_verify: bool,
    pub rate_limit_retries: u32,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("skip_verify", &self.skip_verify)
            .field("rate_limit_retries", &self.rate_limit_retries)
            .finish()
    }
}

impl ProviderConfig {
    /// Reads each setting from the provider block, falling back to the
    /// environment
    pub fn from_config(config: &DynamicValue) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = vec![];
        let defaults = RetryConfig::default();

        let host = string_setting(config, "host", ENV_HOST);
        let token = string_setting(config, "token", ENV_TOKEN);

        let http_timeout_seconds = match number_setting(config, "http_timeout_seconds") {
            Some(n) => positive_integer(n, "http_timeout_seconds", &mut diagnostics),
            None => match std::env::var(ENV_HTTP_TIMEOUT_SECONDS) {
                Ok(raw) => match raw.trim().parse::<u64>() {
                    Ok(n) if n > 0 => Some(n),
                    _ => {
                        diagnostics.push(Diagnostic::error(
                            "Invalid http_timeout_seconds",
                            format!("{} must be a positive integer, got '{}'", ENV_HTTP_TIMEOUT_SECONDS, raw),
                        ));
                        None
                    }
                },
                Err(_) => None,
            },
        }
        .unwrap_or(defaults.timeout_seconds);

        let skip_verify = match config.get_bool(&AttributePath::new("skip_verify")) {
            Ok(b) => b,
            Err(_) => std::env::var(ENV_SKIP_VERIFY)
                .ok()
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(false),
        };

        let rate_limit_retries = number_setting(config, "rate_limit_retries")
            .and_then(|n| {
                if n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&n) {
                    Some(n as u32)
                } else {
                    diagnostics.push(
                        Diagnostic::error(
                            "Invalid rate_limit_retries",
                            format!("rate_limit_retries must be a non-negative integer, got {}", n),
                        )
                        .with_attribute(AttributePath::new("rate_limit_retries")),
                    );
                    None
                }
            })
            .unwrap_or(defaults.max_retries);

        let host = match host {
            Some(host) => match normalize_host(&host) {
                Ok(host) => Some(host),
                Err(detail) => {
                    diagnostics.push(
                        Diagnostic::error("Invalid host", detail)
                            .with_attribute(AttributePath::new("host")),
                    );
                    None
                }
            },
            None => {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing host",
                        format!("host is required (set in provider config or {} env var)", ENV_HOST),
                    )
                    .with_attribute(AttributePath::new("host")),
                );
                None
            }
        };

        if token.is_none() {
            diagnostics.push(
                Diagnostic::error(
                    "Missing token",
                    format!("token is required (set in provider config or {} env var)", ENV_TOKEN),
                )
                .with_attribute(AttributePath::new("token")),
            );
        }

        match (host, token) {
            (Some(host), Some(token)) if diagnostics.is_empty() => Ok(Self {
                host,
                token,
                http_timeout_seconds,
                skip_verify,
                rate_limit_retries,
            }),
            _ => Err(diagnostics),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.rate_limit_retries,
            timeout_seconds: self.http_timeout_seconds,
            ..RetryConfig::default()
        }
    }

    pub fn client(&self) -> Result<Client, ApiError> {
        Client::with_config(&self.host, &self.token, self.skip_verify, self.retry_config())
    }
}

fn string_setting(config: &DynamicValue, name: &str, env: &str) -> Option<String> {
    config
        .get_string(&AttributePath::new(name))
        .ok()
        .or_else(|| std::env::var(env).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn number_setting(config: &DynamicValue, name: &str) -> Option<f64> {
    config.get_number(&AttributePath::new(name)).ok()
}

fn positive_integer(n: f64, name: &str, diagnostics: &mut Vec<Diagnostic>) -> Option<u64> {
    if n.fract() == 0.0 && n >= 1.0 && n <= u64::MAX as f64 {
        Some(n as u64)
    } else {
        diagnostics.push(
            Diagnostic::error(
                format!("Invalid {}", name),
                format!("{} must be a positive integer, got {}", name, n),
            )
            .with_attribute(AttributePath::new(name)),
        );
        None
    }
}

/// Adds `https://` to bare hostnames and validates the result
fn normalize_host(raw: &str) -> Result<String, String> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&with_scheme).map_err(|e| format!("'{}' is not a valid URL: {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("'{}' must use http or https", raw));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no hostname", raw));
    }

    Ok(with_scheme.trim_end_matches('/').to_string())
}
