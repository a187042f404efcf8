use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use thiserror::Error;

use crate::models::api::ErrorBody;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("conversation is empty")]
    EmptyConversation,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitError::Store(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),
    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            RelayError::UpstreamStatus(status.as_u16())
        } else if err.is_decode() {
            RelayError::UpstreamMalformed(err.to_string())
        } else {
            RelayError::UpstreamUnavailable(err.to_string())
        }
    }
}

/// Everything the chat endpoint can fail with, mapped to a client-safe response.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Relay(RelayError::UpstreamUnavailable(_)) |
            ChatError::Relay(RelayError::UpstreamStatus(_)) => StatusCode::BAD_GATEWAY,
            ChatError::Relay(RelayError::UpstreamMalformed(_)) |
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Upstream detail stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            ChatError::RateLimited => "Too many requests. Please try again later.",
            ChatError::Validation(_) => "Invalid request data. 'messages' array is required.",
            ChatError::Relay(_) | ChatError::Internal(_) => "Internal Server Error",
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.public_message().to_string() };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_taxonomy() {
        assert_eq!(ChatError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ChatError::from(ValidationError::EmptyConversation).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::from(RelayError::UpstreamUnavailable("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ChatError::from(RelayError::UpstreamMalformed("bad json".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_detail_is_not_exposed() {
        let err = ChatError::from(RelayError::UpstreamUnavailable("Bearer sk-secret rejected".into()));
        assert!(!err.public_message().contains("sk-secret"));
        assert_eq!(err.public_message(), "Internal Server Error");
    }
}
