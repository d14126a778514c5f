use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Index out of range: {0}")]
    OutOfRange(usize),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Serialize for the command channel. Internal details are logged, not
    /// leaked to clients.
    pub fn to_response(&self) -> serde_json::Value {
        let message = match self {
            Error::Io(e) => {
                tracing::error!("I/O error: {:?}", e);
                "I/O error".to_string()
            }
            Error::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        json!({ "error": message })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
