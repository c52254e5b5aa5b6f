use reqwest::StatusCode;
use thiserror::Error;

/// A non-success response from one of the remote collaborators, passed through
/// as the server produced it.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{url} returned HTTP {status}: {body}")]
    Api {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("storage rejected {url} with HTTP {status} ({code}): {message}")]
    Storage {
        url: String,
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("{url} answered a ranged read with HTTP {status} instead of 206 Partial Content")]
    RangeIgnored { url: String, status: StatusCode },
}

impl RemoteError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api { status, .. }
            | Self::Storage { status, .. }
            | Self::RangeIgnored { status, .. } => *status,
        }
    }

    /// True for the 401/403 family, i.e. the request lacked a valid credential.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        )
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("asset '{asset}' not found in item '{item}'")]
    AssetNotFound { item: String, asset: String },

    #[error("item '{0}' has no datetime")]
    MissingDatetime(String),

    #[error("asset '{asset}' of item '{item}' is {found:?}, expected {expected:?}")]
    IncompatibleRaster {
        item: String,
        asset: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("search returned no items")]
    EmptyResultSet,

    #[error("no asset keys were given to stack")]
    NoAssetsRequested,

    #[error("{path} holds {found} bytes after the transfer, expected {expected}")]
    IncompleteDownload {
        path: String,
        expected: u64,
        found: u64,
    },

    #[error("not a usable href: {0}")]
    InvalidHref(String),
}
