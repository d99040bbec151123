use thiserror::Error;

/// Server-side error taxonomy. `Domain` is the one variant application
/// `run()` callbacks are expected to construct themselves — everything
/// else originates from the transport or codec layers.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bolt_core::MessageError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("{message}")]
    Domain { code: String, message: String },
}

impl ServerError {
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerError::Domain {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The `(code, message)` pair to put in a FAILURE message's metadata.
    /// Non-`Domain` errors are never turned into FAILURE (they abort the
    /// connection before a message could be sent), but `dispatch` also
    /// calls this for `Domain` errors returned from `run()`.
    pub(crate) fn as_failure_parts(&self) -> (String, String) {
        match self {
            ServerError::Domain { code, message } => (code.clone(), message.clone()),
            other => ("Neo.DatabaseError.General.UnknownError".to_owned(), other.to_string()),
        }
    }
}
