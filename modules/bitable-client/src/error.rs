use thiserror::Error;

pub type Result<T> = std::result::Result<T, BitableError>;

#[derive(Debug, Error)]
pub enum BitableError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    /// Lark wraps errors in a 200 response with a non-zero body code.
    #[error("Bitable API error (code {code}): {message}")]
    Api { code: i64, message: String },
}

impl From<reqwest::Error> for BitableError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BitableError::Parse(err.to_string())
        } else {
            BitableError::Network(err.to_string())
        }
    }
}
