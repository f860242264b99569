use thiserror::Error;

/// Errors returned by [`crate::client::Uploader`].
#[derive(Debug, Error)]
pub enum Error {
    /// A required destination or credential field was empty at construction.
    #[error("missing volcengine tls trace params: {0}")]
    Configuration(String),

    /// The ingestion call failed. The underlying error is surfaced unchanged.
    #[error(transparent)]
    Transmission(#[from] IngestionError),
}

/// Failures reported by a [`crate::ingest::LogIngestion`] implementation.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The request could not be sent or its response could not be read.
    #[error("http transport error: {0}")]
    Http(#[from] attohttpc::Error),

    /// The endpoint could not be turned into a `PutLogs` URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// The request signature could not be computed.
    #[error("failed to sign request: {0}")]
    Signing(String),

    /// The endpoint answered with a non-success status.
    #[error("put logs failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// Any other rejection reported by the ingestion backend.
    #[error("put logs rejected: {0}")]
    Rejected(String),
}
