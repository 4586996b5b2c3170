use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while flattening documents or reading sources
#[derive(Debug, Error)]
pub enum Error {
    /// The document handed to the unwind engine is not a JSON object
    #[error("input document is not valid: {0}")]
    InvalidInput(String),

    /// One line of a line-delimited source is not valid JSON
    #[error("invalid JSON at line {line}: {message}")]
    MalformedLine { line: u64, message: String },

    /// A remote source failed in a way that may succeed on retry
    #[error("transient source failure: {0}")]
    TransientSource(String),

    #[error("failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    /// A path computed by the unwind engine did not resolve in its working rows
    #[error("path `{path}` does not resolve in the working document")]
    TraversalContract { path: String },

    #[error("invalid path key `{0}`")]
    InvalidPath(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether a retry of the same source request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientSource(_) | Error::Http(_))
    }
}
