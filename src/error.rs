use thiserror::Error;

#[derive(Error, Debug)]
pub enum EasyPayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no configuration source found: {0}")]
    ConfigurationNotFound(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("license error: {0}")]
    License(String),
}

pub type Result<T> = std::result::Result<T, EasyPayError>;
