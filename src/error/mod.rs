//! Error types for library and registry transfers
//!
//! Every failure the client can surface is a variant of [`LibraryError`], so callers can
//! tell a protocol fallback apart from a hard failure without string matching.

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LibraryError>;

#[derive(Debug, Error)]
pub enum LibraryError {
    /// Transfer size was zero, negative or unknown
    #[error("invalid transfer size: {0}")]
    InvalidSize(i64),
    #[error("invalid part size: {0}")]
    InvalidPartSize(i64),

    /// `WWW-Authenticate` value is not `<scheme> <params>`
    #[error("invalid authentication header: {0:?}")]
    InvalidAuthHeader(String),
    #[error("unknown authentication type: {0}")]
    UnknownAuthType(String),
    /// The library service does not offer OCI access for this namespace
    #[error("OCI access is not supported for this namespace")]
    OciAccessUnsupported,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// A request must be replayed but its body cannot be produced again
    #[error("unable to reset request body for retry")]
    UnableToResetBody,

    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected HTTP status {status} from {url}: {message}")]
    HttpStatus {
        status: u16,
        url: String,
        message: String,
    },
    #[error("malformed {header} header: {value:?}")]
    MalformedHeader { header: &'static str, value: String },
    #[error("missing {0} header in response")]
    MissingHeader(&'static str),
    #[error("unexpected content type: expected {expected}, got {actual}")]
    UnexpectedContentType { expected: String, actual: String },
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid digest: {0:?}")]
    InvalidDigest(String),
    #[error("digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("architecture not specified and image index lists {0} manifests")]
    ArchNotSpecified(usize),
    #[error("no image manifest matching OS/architecture {0:?}")]
    NoMatchingArchitecture(String),
    #[error("unexpected architecture: expected {expected}, image is {actual}")]
    UnexpectedArchitecture { expected: String, actual: String },
    #[error("unexpected media type: expected {expected}, got {actual}")]
    UnexpectedMediaType { expected: String, actual: String },
    #[error("unexpected layer count: expected 1, got {0}")]
    UnexpectedLayerCount(usize),
    #[error("invalid SIF image: {0}")]
    InvalidSif(String),

    #[error("configuration error: {0}")]
    Config(String),
    /// A transfer worker or blocking I/O task panicked or was aborted
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl LibraryError {
    /// True when the error means "use the legacy library protocol instead"
    pub fn is_fallback(&self) -> bool {
        matches!(self, LibraryError::OciAccessUnsupported)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LibraryError::NotFound(_))
    }

    /// Integrity failures are never worth retrying: the server content would not change.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            LibraryError::DigestMismatch { .. }
                | LibraryError::UnexpectedArchitecture { .. }
                | LibraryError::UnexpectedMediaType { .. }
                | LibraryError::UnexpectedLayerCount(_)
        )
    }
}
