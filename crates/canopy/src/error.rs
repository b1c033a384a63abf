//! Error types for canopy

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid document at {path}: {message}")]
    InvalidDocument { path: String, message: String },
}

impl Error {
    pub(crate) fn invalid(path: &str, message: impl Into<String>) -> Self {
        Error::InvalidDocument {
            path: path.to_string(),
            message: message.into(),
        }
    }
}
