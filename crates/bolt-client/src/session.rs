use std::collections::VecDeque;

use bolt_core::{chunk::ChunkReader, chunk::ChunkWriter, handshake, Map, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{extract_code_message, ClientError};
use crate::response::{ClientResponse, PendingRequest, RequestKind};
use crate::stream::RecordStream;

/// Client-side session states, following the handshake → init → ready ↔
/// streaming → failed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Connected,
    Ready,
    Streaming,
    Failed,
    Closed,
}

const READ_BUF_SIZE: usize = 8192;

/// A single Bolt connection's client-side session state machine.
///
/// Owns the transport exclusively — there is no background reader task;
/// whichever call is in flight (`init`, `run`, advancing a
/// [`RecordStream`], `reset`, ...) drives the socket itself. This matches
/// the protocol's single-threaded cooperative scheduling model: nothing
/// about the pending-request FIFO needs locking because only one task ever
/// touches it.
pub struct ClientSession<S> {
    stream: S,
    config: ClientConfig,
    chunk_writer: ChunkWriter,
    chunk_reader: ChunkReader,
    write_buf: Vec<u8>,
    incoming: VecDeque<bytes::Bytes>,
    pub(crate) pending: VecDeque<PendingRequest>,
    /// (run_id, pull_id) pairs queued by `pipeline()` that no `RecordStream`
    /// has claimed yet. A `RecordStream` claims every entry here whose
    /// `run_id` precedes its own when constructed, so a pipelined pair
    /// always surfaces its response to the next stream instead of being
    /// silently drained as if abandoned.
    pub(crate) unclaimed: VecDeque<(u64, u64)>,
    next_id: u64,
    state: ClientState,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the 20-byte handshake over `stream` and return a session in
    /// the `Connected` state.
    pub async fn connect(mut stream: S, config: ClientConfig) -> Result<Self, ClientError> {
        let proposal = handshake::client_proposal();
        stream.write_all(&proposal).await?;
        stream.flush().await?;

        let mut response = [0u8; 4];
        stream.read_exact(&mut response).await?;
        let version = u32::from_be_bytes(response);
        if version != handshake::SUPPORTED_VERSION {
            warn!(version, "server rejected handshake");
            return Err(ClientError::Handshake(format!(
                "server proposed unsupported version {version}"
            )));
        }
        debug!(version, "handshake negotiated");

        let chunk_writer = ChunkWriter::new(&config.codec);
        Ok(ClientSession {
            stream,
            config,
            chunk_writer,
            chunk_reader: ChunkReader::new(),
            write_buf: Vec::new(),
            incoming: VecDeque::new(),
            pending: VecDeque::new(),
            unclaimed: VecDeque::new(),
            next_id: 0,
            state: ClientState::Connected,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Send INIT and await the server's handshake-completion response.
    pub async fn init(&mut self, auth_token: Map) -> Result<Map, ClientError> {
        let msg = Message::Init {
            client_name: self.config.client_name.clone(),
            auth_token,
        };
        self.chunk_writer.write_message(&msg.encode(), &mut self.write_buf);
        let id = self.push_pending(RequestKind::Init);
        self.flush().await?;

        match self.await_single(id).await {
            Ok(metadata) => {
                self.state = ClientState::Ready;
                debug!("session ready after INIT");
                Ok(metadata)
            }
            Err(ClientError::ServerFailure { code, message }) => {
                self.state = ClientState::Closed;
                Err(ClientError::Auth { code, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Enqueue a RUN + PULL_ALL pair without flushing. Never suspends. The
    /// pair is remembered as unclaimed until the next `run()`'s
    /// `RecordStream` claims and delivers it.
    pub fn pipeline(&mut self, statement: &str, parameters: Map) -> Result<(), ClientError> {
        self.require_usable()?;
        let (run_id, pull_id) = self.enqueue(statement, parameters, RequestKind::PullAll);
        self.unclaimed.push_back((run_id, pull_id));
        Ok(())
    }

    /// Enqueue one more (RUN, PULL_ALL) pair, flush, and return a lazy
    /// sequence of records followed by (optionally) the terminal summary.
    ///
    /// The returned stream first claims and delivers any pair previously
    /// queued by `pipeline()` and still unclaimed, in FIFO order, before
    /// moving on to this call's own pair.
    pub async fn run<'a>(
        &'a mut self,
        statement: &str,
        parameters: Map,
        get_eof: bool,
    ) -> Result<RecordStream<'a, S>, ClientError> {
        self.require_usable()?;
        let (run_id, pull_id) = self.enqueue(statement, parameters, RequestKind::PullAll);
        self.flush().await?;
        self.state = ClientState::Streaming;
        Ok(RecordStream::new(self, run_id, pull_id, get_eof))
    }

    /// Enqueue RUN + DISCARD_ALL, flush, and await the single summary
    /// response. No records are ever produced for a discarded result.
    pub async fn discard(&mut self, statement: &str, parameters: Map) -> Result<ClientResponse, ClientError> {
        self.require_usable()?;
        let (_run_id, discard_id) = self.enqueue(statement, parameters, RequestKind::DiscardAll);
        self.flush().await?;
        self.state = ClientState::Streaming;
        let metadata = self.await_single(discard_id).await?;
        self.state = ClientState::Ready;
        Ok(ClientResponse {
            fields: None,
            metadata,
            eof: true,
        })
    }

    /// Soft recovery: clears the `Failed` state while preserving
    /// session-scoped variables server-side. Only valid while `Failed`.
    pub async fn ack_failure(&mut self) -> Result<(), ClientError> {
        if self.state != ClientState::Failed {
            return Err(ClientError::Protocol(
                "ack_failure() is only valid in the Failed state".into(),
            ));
        }
        let msg = Message::AckFailure;
        self.chunk_writer.write_message(&msg.encode(), &mut self.write_buf);
        let id = self.push_pending(RequestKind::AckFailure);
        self.flush().await?;
        self.await_single(id).await?;
        self.unclaimed.clear();
        self.state = ClientState::Ready;
        debug!("acknowledged failure, session ready");
        Ok(())
    }

    /// Hard recovery: clears all server-side state and any stale entries
    /// left in the local pending queue. Always restores `Ready` unless the
    /// session is `Closed`.
    pub async fn reset(&mut self) -> Result<(), ClientError> {
        if self.state == ClientState::Closed {
            return Err(ClientError::Protocol("cannot reset a closed session".into()));
        }
        let msg = Message::Reset;
        self.chunk_writer.write_message(&msg.encode(), &mut self.write_buf);
        let id = self.push_pending(RequestKind::Reset);
        self.flush().await?;
        self.await_single(id).await?;
        self.unclaimed.clear();
        self.state = ClientState::Ready;
        debug!("reset, session ready");
        Ok(())
    }

    /// Gate for `pipeline()`/`run()`/`discard()`. `Streaming` is accepted
    /// alongside `Ready` so that pipelining further requests, or starting a
    /// new `run()`, behind a `RecordStream` the caller hasn't fully drained
    /// (or has dropped outright) never requires that stream to reach eof
    /// first — the new request's own `RecordStream` claims any still-unread
    /// slots in front of it as it goes.
    fn require_usable(&self) -> Result<(), ClientError> {
        match self.state {
            ClientState::Ready | ClientState::Streaming => Ok(()),
            other => Err(ClientError::Protocol(format!(
                "operation requires Ready or Streaming state, session is {other:?}"
            ))),
        }
    }

    fn push_pending(&mut self, kind: RequestKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(PendingRequest { id, kind });
        id
    }

    fn enqueue(&mut self, statement: &str, parameters: Map, second_kind: RequestKind) -> (u64, u64) {
        let run_msg = Message::Run {
            statement: statement.to_owned(),
            parameters,
        };
        self.chunk_writer.write_message(&run_msg.encode(), &mut self.write_buf);
        let run_id = self.push_pending(RequestKind::Run);

        let second_msg = match second_kind {
            RequestKind::PullAll => Message::PullAll,
            RequestKind::DiscardAll => Message::DiscardAll,
            other => unreachable!("enqueue() only pairs RUN with PULL_ALL/DISCARD_ALL, got {other:?}"),
        };
        self.chunk_writer.write_message(&second_msg.encode(), &mut self.write_buf);
        let second_id = self.push_pending(second_kind);

        (run_id, second_id)
    }

    async fn flush(&mut self) -> Result<(), ClientError> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.stream.flush().await?;
            self.write_buf.clear();
        }
        Ok(())
    }

    pub(crate) async fn read_message(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(bytes) = self.incoming.pop_front() {
                return Ok(Message::decode(&bytes)?);
            }
            let mut buf = [0u8; READ_BUF_SIZE];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                self.state = ClientState::Closed;
                return Err(ClientError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                )));
            }
            for msg in self.chunk_reader.feed(&buf[..n]) {
                self.incoming.push_back(msg);
            }
        }
    }

    /// Fully consume the front pending slot, discarding whatever it
    /// produces. Used both to drain a slot abandoned by a dropped
    /// [`RecordStream`] and, internally, to skip past the RUN half of a
    /// (RUN, PULL_ALL/DISCARD_ALL) pair when awaiting the second half.
    pub(crate) async fn drain_one_pending(&mut self) -> Result<(), ClientError> {
        let front = self
            .pending
            .pop_front()
            .ok_or_else(|| ClientError::Protocol("no pending request to drain".into()))?;

        match front.kind {
            RequestKind::PullAll => loop {
                match self.read_message().await? {
                    Message::Record { .. } => continue,
                    Message::Success { .. } | Message::Ignored => break,
                    Message::Failure { .. } => {
                        self.state = ClientState::Failed;
                        break;
                    }
                    other => {
                        return Err(ClientError::Protocol(format!(
                            "unexpected {other:?} while draining a PULL_ALL response"
                        )))
                    }
                }
            },
            _ => match self.read_message().await? {
                Message::Success { .. } | Message::Ignored => {}
                Message::Failure { .. } => self.state = ClientState::Failed,
                other => {
                    return Err(ClientError::Protocol(format!(
                        "unexpected {other:?} while draining a {:?} response",
                        front.kind
                    )))
                }
            },
        }
        if matches!(self.unclaimed.front(), Some((_, pull_id)) if *pull_id == front.id) {
            self.unclaimed.pop_front();
        }
        Ok(())
    }

    /// Drain every pending slot in front of `slot_id`, then consume and
    /// interpret `slot_id` itself as a single-summary response (used by
    /// INIT, ACK_FAILURE, RESET, and the DISCARD_ALL half of `discard()`).
    pub(crate) async fn await_single(&mut self, slot_id: u64) -> Result<Map, ClientError> {
        loop {
            let front_id = self
                .pending
                .front()
                .map(|p| p.id)
                .ok_or_else(|| ClientError::Protocol("no pending request".into()))?;
            if front_id < slot_id {
                self.drain_one_pending().await?;
                continue;
            }
            break;
        }
        self.pending.pop_front();
        match self.read_message().await? {
            Message::Success { metadata } => Ok(metadata),
            Message::Failure { metadata } => {
                self.state = ClientState::Failed;
                let (code, message) = extract_code_message(&metadata);
                Err(ClientError::ServerFailure { code, message })
            }
            Message::Ignored => Err(ClientError::Ignored),
            other => Err(ClientError::Protocol(format!("unexpected {other:?} answering a request"))),
        }
    }

    pub(crate) fn mark_ready(&mut self) {
        self.state = ClientState::Ready;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = ClientState::Failed;
    }
}
