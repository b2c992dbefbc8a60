//! Errors raised when talking to the remote form backends

use std::fmt;

/// Errors that can occur when interacting with a remote backend
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - token lacks required permissions
    Forbidden { provider: String },
    /// 404 - endpoint or referenced record missing
    NotFound { provider: String, message: String },
    /// 429 Rate Limited
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    /// Network or timeout error
    NetworkError { provider: String, message: String },
    /// Other HTTP errors
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Request could not be built from the local record
    Rejected { provider: String, message: String },
    /// Backend not configured (no URL or key)
    NotConfigured { provider: String },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            ApiError::Unauthorized { provider }
            | ApiError::Forbidden { provider }
            | ApiError::NotFound { provider, .. }
            | ApiError::RateLimited { provider, .. }
            | ApiError::NetworkError { provider, .. }
            | ApiError::HttpError { provider, .. }
            | ApiError::Rejected { provider, .. }
            | ApiError::NotConfigured { provider } => provider,
        }
    }

    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn forbidden(provider: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
        }
    }

    pub fn not_found(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        ApiError::RateLimited {
            provider: provider.into(),
            retry_after_secs: retry_after,
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Rejected {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        ApiError::NotConfigured {
            provider: provider.into(),
        }
    }

    /// Map a non-success response status and body onto an error
    pub fn from_status(
        provider: &str,
        status: u16,
        body: &str,
        retry_after: Option<u64>,
    ) -> Self {
        let message = error_detail(body).unwrap_or_else(|| format!("API error: {}", status));
        match status {
            401 => ApiError::unauthorized(provider),
            403 => ApiError::forbidden(provider),
            404 => ApiError::not_found(provider, message),
            429 => ApiError::rate_limited(provider, retry_after),
            _ => ApiError::http(provider, status, message),
        }
    }
}

/// Pull `detail` or `message` out of a JSON error body
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{}: Unauthorized (401) - check the API token", provider)
            }
            ApiError::Forbidden { provider } => {
                write!(
                    f,
                    "{}: Forbidden (403) - insufficient permissions",
                    provider
                )
            }
            ApiError::NotFound { provider, message } => {
                write!(f, "{}: Not found (404) - {}", provider, message)
            }
            ApiError::RateLimited {
                provider,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{}: Rate limited - retry after {}s", provider, secs)
                } else {
                    write!(f, "{}: Rate limited", provider)
                }
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            ApiError::Rejected { provider, message } => {
                write!(f, "{}: Rejected - {}", provider, message)
            }
            ApiError::NotConfigured { provider } => {
                write!(f, "{}: Not configured", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth_error() {
        assert!(ApiError::unauthorized("forms-api").is_auth_error());
        assert!(ApiError::forbidden("forms-api").is_auth_error());
        assert!(!ApiError::rate_limited("forms-api", None).is_auth_error());
        assert!(!ApiError::network("forms-api", "timeout").is_auth_error());
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(ApiError::unauthorized("forms-api").provider_name(), "forms-api");
        assert_eq!(ApiError::rejected("supabase", "x").provider_name(), "supabase");
    }

    #[test]
    fn test_from_status_prefers_detail() {
        let err = ApiError::from_status("forms-api", 404, r#"{"detail":"Volunteer not found"}"#, None);
        assert_eq!(err.to_string(), "forms-api: Not found (404) - Volunteer not found");
        assert!(matches!(err, ApiError::NotFound { .. }));

        let err = ApiError::from_status("supabase", 409, r#"{"message":"duplicate key"}"#, None);
        assert_eq!(err.to_string(), "supabase: HTTP 409 - duplicate key");
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = ApiError::from_status("forms-api", 500, "<html>oops</html>", None);
        assert_eq!(err.to_string(), "forms-api: HTTP 500 - API error: 500");

        let err = ApiError::from_status("forms-api", 429, "", Some(30));
        assert_eq!(err.to_string(), "forms-api: Rate limited - retry after 30s");
        assert!(ApiError::from_status("forms-api", 401, "", None).is_auth_error());
    }
}
