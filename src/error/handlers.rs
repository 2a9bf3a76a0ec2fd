//! Standardized HTTP status handling shared by the registry clients

use crate::error::{Result, SyncError};
use reqwest::{Response, StatusCode};

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Pass successful responses through, turn everything else into a contextual error
    pub async fn check(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(Self::handle_registry_error(status, &error_text, context))
    }

    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(status: StatusCode, error_text: &str, operation: &str) -> SyncError {
        let error_text = Self::truncate(error_text);
        let error_msg = match status.as_u16() {
            400 => format!("Bad request during {}: {}", operation, error_text),
            401 => format!("Unauthorized to perform {}: {}", operation, error_text),
            403 => format!(
                "Forbidden: insufficient permissions for {}: {}",
                operation, error_text
            ),
            404 => format!("Resource not found for {}: {}", operation, error_text),
            409 => format!("Conflict during {}: {}", operation, error_text),
            413 => format!("Payload too large for {}: {}", operation, error_text),
            422 => format!("Registry rejected {}: {}", operation, error_text),
            429 => format!("Rate limited during {}: {}", operation, error_text),
            500 => format!("Registry server error during {}: {}", operation, error_text),
            502 | 503 => format!("Registry unavailable for {}: {}", operation, error_text),
            _ => format!("{} failed (status {}): {}", operation, status, error_text),
        };

        SyncError::Registry(error_msg)
    }

    /// Categorize transport-level failures
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> SyncError {
        if error.is_timeout() {
            SyncError::Network(format!("{} timed out: {}", context, error))
        } else if error.is_connect() {
            SyncError::Network(format!("Connection error during {}: {}", context, error))
        } else {
            SyncError::Network(format!("{} failed: {}", context, error))
        }
    }

    // Registry error bodies can be whole HTML pages.
    fn truncate(text: &str) -> String {
        const LIMIT: usize = 300;
        let trimmed = text.trim();
        match trimmed.char_indices().nth(LIMIT) {
            Some((idx, _)) => format!("{}...", &trimmed[..idx]),
            None => trimmed.to_string(),
        }
    }
}
