//! Standardized mapping of HTTP responses and transport failures into [`LibraryError`]

use crate::error::LibraryError;
use reqwest::{Response, StatusCode};

/// Longest slice of an error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Consume a non-success response and turn it into a typed error
    pub async fn from_response(response: Response, context: &str) -> LibraryError {
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Self::status_error(status, &url, &body, context)
    }

    pub fn status_error(status: StatusCode, url: &str, body: &str, context: &str) -> LibraryError {
        let body = Self::truncate(body.trim());
        match status {
            StatusCode::UNAUTHORIZED => {
                LibraryError::Unauthorized(format!("{} at {}: {}", context, url, body))
            }
            StatusCode::NOT_FOUND => LibraryError::NotFound(format!("{} at {}", context, url)),
            _ => LibraryError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                message: if body.is_empty() {
                    context.to_string()
                } else {
                    format!("{}: {}", context, body)
                },
            },
        }
    }

    fn truncate(body: &str) -> &str {
        if body.len() <= MAX_ERROR_BODY {
            return body;
        }
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Log a transport failure with context; the error itself is propagated unchanged
    pub fn describe(error: &reqwest::Error, context: &str) -> String {
        if error.is_timeout() {
            format!("{} timed out: {}", context, error)
        } else if error.is_connect() {
            format!("Connection error during {}: {}", context, error)
        } else if error.to_string().contains("certificate") {
            format!("TLS certificate error during {}: {}", context, error)
        } else {
            format!("{} network error: {}", context, error)
        }
    }
}
