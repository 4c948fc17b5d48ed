use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - check username and password")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => ApiError::Unauthorized,
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "gone"),
            ApiError::NotFound(ref b) if b == "gone"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "ä".repeat(400);
        let msg = ApiError::truncate_body(&body);
        assert!(msg.contains("truncated, 800 total bytes"));
    }
}
