use thiserror::Error;

#[derive(Debug, Error)]
pub enum RomsiftError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{0}")]
    Validation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("download error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
