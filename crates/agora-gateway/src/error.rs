use agora_core::error::ErrorKind;
use agora_provider::provider::ProviderError;
use agora_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Error shape returned on every non-streaming failure path.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ProviderAuth
            | ErrorKind::ProviderRateLimit
            | ErrorKind::ProviderTimeout
            | ErrorKind::ProviderUpstream
            | ErrorKind::MalformedLlmOutput => StatusCode::BAD_GATEWAY,
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "detail": self.detail,
            "kind": self.kind.as_str(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => Self::not_found(format!("conversation not found: {id}")),
            other => Self {
                kind: ErrorKind::Storage,
                detail: other.to_string(),
            },
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        let kind = provider_error_kind(e.kind());
        Self {
            kind,
            detail: e.to_string(),
        }
    }
}

/// Map a provider kind string (also used in stream `Error` events) onto the
/// gateway error surface.
pub fn provider_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "auth" => ErrorKind::ProviderAuth,
        "rate_limit" => ErrorKind::ProviderRateLimit,
        "timeout" => ErrorKind::ProviderTimeout,
        "malformed_response" => ErrorKind::MalformedLlmOutput,
        _ => ErrorKind::ProviderUpstream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_contract() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ProviderError::Auth("denied".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::internal("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err = ApiError::from(StoreError::NotFound {
            id: "c".to_string(),
        });
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_kind_strings_map_onto_gateway_kinds() {
        assert_eq!(provider_error_kind("auth"), ErrorKind::ProviderAuth);
        assert_eq!(provider_error_kind("rate_limit"), ErrorKind::ProviderRateLimit);
        assert_eq!(provider_error_kind("timeout"), ErrorKind::ProviderTimeout);
        assert_eq!(
            provider_error_kind("malformed_response"),
            ErrorKind::MalformedLlmOutput
        );
        assert_eq!(provider_error_kind("upstream"), ErrorKind::ProviderUpstream);
        assert_eq!(provider_error_kind("bad_request"), ErrorKind::ProviderUpstream);
    }
}
