use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error surface of the HTTP API. Caller mistakes map to 400, operational
/// failures (driver timeouts, evaluation throws, I/O) map to 500. Bodies are
/// plain text; check-style endpoints never use this type for a negative
/// result — those are 200 with `result`/`pass` false.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("XPath not found for ID {id}. Selectors may be a CSS selector, an XPath (xpath=… or starting with / or (), or a numeric ID from the last tree view")]
    UnknownId { id: u64 },

    #[error("Element not found for selector: {token}. Selectors may be a CSS selector, an XPath (xpath=… or starting with / or (), or a numeric ID from the last tree view")]
    ElementNotFound { token: String },

    #[error("no active tab")]
    NoActiveTab,

    #[error("{0}")]
    Driver(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn driver(err: impl std::fmt::Display) -> Self {
        Self::Driver(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::UnknownId { .. }
            | Self::ElementNotFound { .. }
            | Self::NoActiveTab => StatusCode::BAD_REQUEST,
            Self::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Driver(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_400() {
        assert_eq!(
            ApiError::bad_request("missing field").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::UnknownId { id: 42 }.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ElementNotFound {
                token: "#nope".into()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoActiveTab.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn driver_errors_are_500() {
        assert_eq!(
            ApiError::driver("navigation timeout").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn selector_errors_carry_token_and_hint() {
        let msg = ApiError::ElementNotFound {
            token: "button.submit".into(),
        }
        .to_string();
        assert!(msg.contains("button.submit"));
        assert!(msg.contains("CSS selector"));
        assert!(msg.contains("numeric ID"));

        let msg = ApiError::UnknownId { id: 7 }.to_string();
        assert!(msg.contains("XPath not found for ID 7"));
    }
}
