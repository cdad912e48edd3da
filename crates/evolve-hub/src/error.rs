//! Error types for evolve-hub

use thiserror::Error;

/// Errors that can occur while talking to the Hub
#[derive(Error, Debug)]
pub enum HubError {
    /// No credential was supplied
    #[error("Hub token is empty")]
    MissingToken,

    /// The service answered with a non-success status
    #[error("Hub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered with something we could not interpret
    #[error("Unexpected Hub response: {0}")]
    UnexpectedResponse(String),

    /// Repository id is malformed
    #[error("Invalid repository id: {0}")]
    InvalidRepoId(String),

    /// Repository does not exist
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Upload folder missing or without files
    #[error("Nothing to upload in {0}")]
    EmptyFolder(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        HubError::Http(err.to_string())
    }
}

impl From<walkdir::Error> for HubError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => HubError::Io(io),
            None => HubError::Io(std::io::Error::other("filesystem loop while walking folder")),
        }
    }
}
