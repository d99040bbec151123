use std::collections::VecDeque;

use bolt_core::{chunk::ChunkReader, chunk::ChunkWriter, handshake, Map, Message, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hooks::{Application, QueryOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    AwaitingHandshake,
    AwaitingInit,
    Ready,
    Streaming,
    Failed,
    Closed,
}

const READ_BUF_SIZE: usize = 8192;

/// Server-side session state machine for a single Bolt connection.
///
/// One instance owns one accepted connection; the caller is expected to
/// spawn a task per connection (see [`crate::serve_connection`]) and run
/// [`ServerSession::serve`] to completion.
pub struct ServerSession<S, A> {
    stream: S,
    config: ServerConfig,
    app: A,
    chunk_writer: ChunkWriter,
    chunk_reader: ChunkReader,
    incoming: VecDeque<bytes::Bytes>,
    state: ServerState,
    pending_stream: Option<QueryOutcome>,
}

impl<S, A> ServerSession<S, A>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: Application,
{
    pub fn new(stream: S, config: ServerConfig, app: A) -> Self {
        let chunk_writer = ChunkWriter::new(&config.codec);
        ServerSession {
            stream,
            config,
            app,
            chunk_writer,
            chunk_reader: ChunkReader::new(),
            incoming: VecDeque::new(),
            state: ServerState::AwaitingHandshake,
            pending_stream: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Run the handshake, then dispatch messages until the client closes
    /// the connection or a fatal protocol/transport error occurs.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        if !self.perform_handshake().await? {
            return Ok(());
        }
        self.state = ServerState::AwaitingInit;

        loop {
            let msg = match self.read_message().await {
                Ok(msg) => msg,
                Err(ServerError::Transport(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("peer closed connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            self.dispatch(msg).await?;
            if self.state == ServerState::Closed {
                return Ok(());
            }
        }
    }

    /// Reads the 20-byte client preamble and replies with the negotiated
    /// version. Returns `Ok(false)` (connection should close, no error) if
    /// no proposed version is acceptable.
    async fn perform_handshake(&mut self) -> Result<bool, ServerError> {
        let mut preamble = [0u8; 20];
        self.stream.read_exact(&mut preamble).await?;

        if preamble[0..4] != handshake::MAGIC_PREAMBLE {
            warn!("handshake magic mismatch");
            return Err(ServerError::Handshake("bad magic preamble".into()));
        }

        let mut proposals = [0u32; 4];
        for (i, chunk) in preamble[4..20].chunks_exact(4).enumerate() {
            proposals[i] = u32::from_be_bytes(chunk.try_into().expect("chunks_exact(4)"));
        }

        match handshake::negotiate(&proposals) {
            Some(version) => {
                self.stream.write_all(&version.to_be_bytes()).await?;
                self.stream.flush().await?;
                info!(version, "handshake negotiated");
                Ok(true)
            }
            None => {
                self.stream
                    .write_all(&handshake::VERSION_NONE.to_be_bytes())
                    .await?;
                self.stream.flush().await?;
                warn!(?proposals, "no acceptable protocol version, closing");
                Ok(false)
            }
        }
    }

    async fn dispatch(&mut self, msg: Message) -> Result<(), ServerError> {
        match (self.state, msg) {
            (ServerState::AwaitingInit, Message::Init { client_name, auth_token }) => {
                debug!(client_name, "received INIT");
                if self.app.verify_auth_token(&auth_token) {
                    let mut metadata = Map::new();
                    metadata
                        .insert("server", Value::String(self.config.server_agent.clone()))
                        .expect("fresh map, key is unique");
                    self.send(Message::Success { metadata }).await?;
                    self.state = ServerState::Ready;
                } else {
                    self.send_failure(
                        "Neo.ClientError.Security.Unauthorized",
                        "the client is not authorized to access this server",
                    )
                    .await?;
                    self.state = ServerState::Closed;
                }
            }

            (ServerState::Ready, Message::Run { statement, parameters }) => {
                match self.app.run(&statement, &parameters) {
                    Ok(outcome) => {
                        let mut metadata = Map::new();
                        metadata
                            .insert(
                                "fields",
                                Value::List(outcome.fields.iter().cloned().map(Value::String).collect()),
                            )
                            .expect("fresh map, key is unique");
                        metadata
                            .insert("result_available_after", Value::Integer(0))
                            .expect("fresh map, key is unique");
                        self.send(Message::Success { metadata }).await?;
                        self.pending_stream = Some(outcome);
                        self.state = ServerState::Streaming;
                    }
                    Err(e) => {
                        let (code, message) = e.as_failure_parts();
                        self.send_failure(&code, &message).await?;
                        self.state = ServerState::Failed;
                    }
                }
            }

            (ServerState::Streaming, Message::PullAll) => {
                let outcome = self
                    .pending_stream
                    .take()
                    .expect("Streaming state implies a pending query outcome");
                for row in outcome.records {
                    self.send(Message::Record { fields: row }).await?;
                }
                self.send(Message::Success { metadata: outcome.summary }).await?;
                self.state = ServerState::Ready;
            }

            (ServerState::Streaming, Message::DiscardAll) => {
                let outcome = self
                    .pending_stream
                    .take()
                    .expect("Streaming state implies a pending query outcome");
                self.send(Message::Success { metadata: outcome.summary }).await?;
                self.state = ServerState::Ready;
            }

            (ServerState::Failed, Message::AckFailure) => {
                self.send(Message::Success { metadata: Map::new() }).await?;
                self.state = ServerState::Ready;
            }

            (_, Message::Reset) => {
                self.pending_stream = None;
                self.send(Message::Success { metadata: Map::new() }).await?;
                self.state = ServerState::Ready;
            }

            (ServerState::Failed, _unexpected) => {
                self.send(Message::Ignored).await?;
            }

            (state, unexpected) => {
                warn!(?state, signature = unexpected.signature(), "unexpected message");
                self.send_failure(
                    "Protocol.InvalidMessage",
                    &format!("unexpected message in state {state:?}"),
                )
                .await?;
                self.state = ServerState::Failed;
            }
        }
        Ok(())
    }

    async fn send_failure(&mut self, code: &str, message: &str) -> Result<(), ServerError> {
        let mut metadata = Map::new();
        metadata
            .insert("code", Value::String(code.to_owned()))
            .expect("fresh map, key is unique");
        metadata
            .insert("message", Value::String(message.to_owned()))
            .expect("fresh map, key is unique");
        self.send(Message::Failure { metadata }).await
    }

    async fn send(&mut self, msg: Message) -> Result<(), ServerError> {
        let mut out = Vec::new();
        self.chunk_writer.write_message(&msg.encode(), &mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<Message, ServerError> {
        loop {
            if let Some(bytes) = self.incoming.pop_front() {
                return Ok(Message::decode(&bytes)?);
            }
            let mut buf = [0u8; READ_BUF_SIZE];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ServerError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                )));
            }
            for msg in self.chunk_reader.feed(&buf[..n]) {
                self.incoming.push_back(msg);
            }
        }
    }
}
