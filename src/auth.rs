//! Bearer token authentication for the HTTP transport.
//!
//! Tokens come from `--auth-token` / `PG_DIAG_AUTH_TOKENS`. With no tokens
//! configured the middleware is not installed at all.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Build from configured tokens. Blank entries are a configuration error.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid = HashSet::new();
        for token in tokens {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return Err("Empty token value in auth token configuration".to_string());
            }
            valid.insert(trimmed.to_string());
        }
        Ok(Self { tokens: valid })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Compare against every configured token without short-circuiting.
    pub fn verify(&self, provided: &str) -> bool {
        let mut found = false;
        for expected in &self.tokens {
            if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                found = true;
            }
        }
        found
    }
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(&request) {
        Ok(Some(token)) => token,
        Ok(None) => {
            warn!("Authentication failed: missing Authorization header");
            return unauthorized_response(
                "Missing Bearer token in Authorization header",
                "Include a valid token: 'Authorization: Bearer <token>'",
            );
        }
        Err(msg) => {
            warn!("Authentication failed: invalid header format");
            return unauthorized_response(msg, "Use the format: 'Authorization: Bearer <token>'");
        }
    };

    if auth.verify(token) {
        next.run(request).await
    } else {
        warn!(token_prefix = %mask_token(token), "Authentication failed: invalid token");
        unauthorized_response(
            "Invalid Bearer token",
            "Check that the token is one of the tokens configured on the server",
        )
    }
}

fn extract_bearer_token(request: &Request<Body>) -> Result<Option<&str>, &'static str> {
    let Some(auth_header) = request.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err("Invalid Authorization header format. Expected 'Bearer <token>'");
    };
    if token.is_empty() {
        return Err("Bearer token is empty");
    }

    Ok(Some(token))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    if token.chars().count() <= 3 {
        "***".to_string()
    } else {
        let prefix: String = token.chars().take(3).collect();
        format!("{}***", prefix)
    }
}

fn unauthorized_response(message: impl Into<String>, suggestion: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
        suggestion: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code: "unauthorized",
            message: message.into(),
            suggestion: suggestion.into(),
        },
    };
    let json = serde_json::to_string(&body).unwrap_or_else(|_| {
        r#"{"error":{"code":"unauthorized","message":"Authentication failed"}}"#.to_string()
    });

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        json,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(header_value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/pg-diag-mcp");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_no_tokens_means_disabled() {
        let auth = AuthConfig::from_tokens(Vec::new()).unwrap();
        assert!(!auth.is_enabled());
        assert_eq!(auth.token_count(), 0);
        assert!(!AuthConfig::disabled().verify("anything"));
    }

    #[test]
    fn test_tokens_are_trimmed_and_deduplicated() {
        let auth =
            AuthConfig::from_tokens(vec![" alpha ".to_string(), "alpha".to_string()]).unwrap();
        assert!(auth.is_enabled());
        assert_eq!(auth.token_count(), 1);
        assert!(auth.verify("alpha"));
    }

    #[test]
    fn test_blank_token_is_config_error() {
        assert!(AuthConfig::from_tokens(vec!["ok".to_string(), "  ".to_string()]).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_and_prefix_tokens() {
        let auth = AuthConfig::from_tokens(vec!["secret-token".to_string()]).unwrap();
        assert!(!auth.verify("secret"));
        assert!(!auth.verify("secret-token-2"));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&request_with(None)), Ok(None));
        assert_eq!(
            extract_bearer_token(&request_with(Some("Bearer abc"))),
            Ok(Some("abc"))
        );
        assert!(extract_bearer_token(&request_with(Some("Basic abc"))).is_err());
        assert!(extract_bearer_token(&request_with(Some("Bearer "))).is_err());
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("ab"), "***");
        assert_eq!(mask_token("abcdef"), "abc***");
        assert_eq!(mask_token("ééééé"), "ééé***");
    }
}
