#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
}
