use thiserror::Error;

use crate::api::ApiError;
use crate::models::ParseError;

/// Why a screen could not show its document.
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("Server answered with HTTP status {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Server sent an empty response")]
    EmptyBody,

    #[error("Server reported no changes, but nothing is cached")]
    MissingCache,
}

impl ScreenError {
    /// Dialog title for this error
    pub fn title(&self) -> &'static str {
        match self {
            ScreenError::Transport(_) => "Network Error",
            ScreenError::Status(_) | ScreenError::EmptyBody => "Server Error",
            ScreenError::Parse(_) | ScreenError::MissingCache => "Data Error",
        }
    }

    /// User friendly message for the error dialog
    pub fn user_message(&self) -> String {
        match self {
            ScreenError::Transport(ApiError::Unauthorized) => {
                "Login rejected. Press L to log in again.".to_string()
            }
            ScreenError::Transport(ApiError::NetworkError(_)) => {
                "Could not reach the server. Check your internet connection.".to_string()
            }
            ScreenError::Status(401) | ScreenError::Status(403) => {
                "Login required. Press L to log in.".to_string()
            }
            ScreenError::Parse(_) => "The data could not be read. Try again later.".to_string(),
            other => other.to_string(),
        }
    }
}
