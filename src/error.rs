use thiserror::Error;

use crate::soap::NOT_AUTHENTICATED_FAULT;

// Basic error handling with thiserror
#[derive(Error, Debug)]
pub enum CinemaError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("URL encoding failed: {0}")]
    UrlEncodingFailed(#[from] serde_urlencoded::ser::Error),

    #[error("Authentication rejected by both vendor login flows")]
    AuthRejected,

    #[error("SOAP Fault: {0}")]
    SoapFault(String),

    #[error("Could not extract SOAP session ID")]
    MissingSoapSessionId,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No playlist editor variant could be fetched")]
    PlaylistUnavailable,

    #[error("Session expired while scraping the playlist")]
    SessionExpired,

    #[error("Schedule lookup failed: {0}")]
    Schedule(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Theater not found: {0}")]
    UnknownTheater(String),

    #[error("Task panicked or cancelled")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

impl CinemaError {
    /// True for timeouts and connection failures. These never change auth state.
    pub fn is_transport(&self) -> bool {
        matches!(self, CinemaError::RequestFailed(_))
    }

    /// True for the vendor's verbatim "not authenticated" SOAP fault.
    pub fn is_not_authenticated_fault(&self) -> bool {
        matches!(self, CinemaError::SoapFault(msg) if msg == NOT_AUTHENTICATED_FAULT)
    }
}
