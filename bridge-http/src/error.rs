use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body unreadable: {0}")]
    Body(String),
}

pub type Result<T> = std::result::Result<T, HttpError>;
