use thiserror::Error;

pub type Result<T> = std::result::Result<T, SheetsError>;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Sheets API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Sheets quota still exhausted after {attempts} attempts: {what}")]
    RateLimited { what: &'static str, attempts: u32 },

    #[error("Invalid request: {0}")]
    Request(String),
}

impl From<reqwest::Error> for SheetsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SheetsError::Parse(err.to_string())
        } else {
            SheetsError::Network(err.to_string())
        }
    }
}
