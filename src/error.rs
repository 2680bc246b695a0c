use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::assistant::AssistantError;
use crate::leetcode::FetchError;
use crate::rate_limit::RateLimitError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Fetch(e) => match e {
                FetchError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                FetchError::NotFound(_) => StatusCode::NOT_FOUND,
                FetchError::Upstream(_) | FetchError::Request(_) | FetchError::Decode(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::Assistant(e) => match e {
                AssistantError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
                AssistantError::Request(_)
                | AssistantError::Upstream { .. }
                | AssistantError::EmptyResponse => StatusCode::BAD_GATEWAY,
            },
            ApiError::RateLimit(e) => match e {
                RateLimitError::Exceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                RateLimitError::TooManyTokens { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            ApiError::from(FetchError::InvalidUrl("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(FetchError::NotFound("two-sum".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(FetchError::Upstream(500)).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(AssistantError::MissingApiKey).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(RateLimitError::Exceeded {
                used: 3,
                max: 3,
                retry_after: Duration::from_secs(61),
            })
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(RateLimitError::TooManyTokens { estimated: 9, max: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn messages_pass_through() {
        assert_eq!(
            ApiError::from(FetchError::InvalidUrl("Invalid URL".into())).to_string(),
            "Invalid URL"
        );
        assert_eq!(ApiError::NotFound("Session".into()).to_string(), "Session not found");
        let limited = ApiError::from(RateLimitError::Exceeded {
            used: 3,
            max: 3,
            retry_after: Duration::from_secs(61),
        });
        assert!(limited.to_string().contains("3/3"));
        assert!(limited.to_string().contains("retry in 2 minutes"));
    }

    #[test]
    fn response_carries_status() {
        let response = ApiError::NotFound("Chat".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
