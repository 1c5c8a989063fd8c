use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read volume '{path}': {source}")]
    DataLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("volume size mismatch: expected {expected} voxels, got {actual}")]
    VolumeSize { expected: usize, actual: usize },

    #[error("invalid range: min_val ({min}) must be less than max_val ({max})")]
    InvalidRange { min: f64, max: f64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("malformed octree container: {0}")]
    Decode(String),

    #[error("worker dropped before finishing: {0}")]
    Worker(String),

    #[error("failed to load settings '{path}': {message}")]
    Settings { path: PathBuf, message: String },

    #[error("log sink: {0}")]
    LogSink(#[source] std::io::Error),
}

impl Error {
    /// Client mistakes map to 400, everything else is a server failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidRange { .. } | Error::InvalidRequest(_) => 400,
            _ => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() == 400
    }

    /// Startup failures: the process must not serve requests after one of these.
    pub fn is_data_load(&self) -> bool {
        matches!(self, Error::DataLoad { .. } | Error::VolumeSize { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn range_errors_are_client_errors() {
        let err = Error::InvalidRange { min: 5.0, max: 5.0 };
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("min_val (5)"));
    }

    #[test]
    fn internal_errors_are_server_errors() {
        let err = Error::Encoding("length mismatch".to_string());
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_client_error());
        assert!(Error::VolumeSize { expected: 8, actual: 7 }.is_data_load());
    }
}
