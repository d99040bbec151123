//! Server-side Bolt v1 session: handshake negotiation, INIT/RUN/PULL_ALL
//! dispatch, and the application hook that plugs in actual query
//! execution.

pub mod config;
pub mod error;
pub mod hooks;
pub mod session;

#[cfg(test)]
mod tests;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hooks::{Application, QueryOutcome};
pub use session::{ServerSession, ServerState};

use tokio::io::{AsyncRead, AsyncWrite};

/// Drive one accepted connection to completion. Thin wrapper around
/// [`ServerSession::serve`] for callers that don't need to hold onto the
/// session (e.g. to spawn it as a task per connection).
pub async fn serve_connection<S, A>(stream: S, config: ServerConfig, app: A) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: Application,
{
    ServerSession::new(stream, config, app).serve().await
}
