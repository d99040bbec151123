use thiserror::Error;

/// Error taxonomy for the client session, matching the protocol's recovery
/// model: transport and codec errors are fatal, `ServerFailure` is local to
/// the consumer that triggered it and recoverable via `ack_failure()` or
/// `reset()`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Codec(#[from] bolt_core::MessageError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("server failure: {code}: {message}")]
    ServerFailure { code: String, message: String },

    #[error("authentication failed: {code}: {message}")]
    Auth { code: String, message: String },

    #[error("request was ignored by the server due to a prior failure")]
    Ignored,

    #[error("consumer abandoned the response stream")]
    Cancelled,
}

pub(crate) fn extract_code_message(metadata: &bolt_core::Map) -> (String, String) {
    let code = metadata
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown")
        .to_owned();
    let message = metadata
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_owned();
    (code, message)
}
