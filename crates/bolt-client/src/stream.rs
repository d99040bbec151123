use std::collections::VecDeque;

use bolt_core::{Map, Message};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{extract_code_message, ClientError};
use crate::response::ClientResponse;
use crate::session::ClientSession;

/// One (RUN, PULL_ALL) pair this stream still owes a caller a response for.
#[derive(Clone, Copy)]
struct PairSpec {
    run_id: u64,
    pull_id: u64,
    get_eof: bool,
}

/// A lazy sequence of [`ClientResponse`]s produced by one or more `RUN` +
/// `PULL_ALL` pairs.
///
/// Polling this stream is what actually drives reads off the socket: there
/// is no background task pushing records into a buffer. At construction the
/// stream claims every pair previously queued by `pipeline()` that is still
/// unclaimed, in FIFO order, ahead of its own pair — so a caller that issued
/// `pipeline()` calls and then `run()`s sees every pipelined response, not
/// just the last one. Anything still unread on the wire that *isn't* one of
/// these claimed pairs (a prior `run()`'s stream dropped before reaching
/// eof) is genuinely abandoned: the *next* call that reads from the session
/// transparently drains it via [`ClientSession::drain_one_pending`] instead
/// of surfacing it, so an abandoned consumer never desynchronizes the FIFO
/// for whoever queued after it.
pub struct RecordStream<'a, S> {
    session: &'a mut ClientSession<S>,
    queue: VecDeque<PairSpec>,
    run_metadata: Option<Map>,
    finished: bool,
}

impl<'a, S> RecordStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(session: &'a mut ClientSession<S>, run_id: u64, pull_id: u64, get_eof: bool) -> Self {
        let mut queue = VecDeque::new();
        while matches!(session.unclaimed.front(), Some((r, _)) if *r < run_id) {
            let (claimed_run_id, claimed_pull_id) = session.unclaimed.pop_front().unwrap();
            queue.push_back(PairSpec {
                run_id: claimed_run_id,
                pull_id: claimed_pull_id,
                get_eof: false,
            });
        }
        queue.push_back(PairSpec { run_id, pull_id, get_eof });

        RecordStream {
            session,
            queue,
            run_metadata: None,
            finished: false,
        }
    }

    /// Advance the stream, returning the next response or `None` once every
    /// claimed pair is exhausted. Mirrors `Iterator::next` rather than
    /// implementing `futures::Stream` directly, since every caller already
    /// awaits this in a loop and the formal trait buys nothing extra here.
    pub async fn next(&mut self) -> Option<Result<ClientResponse, ClientError>> {
        loop {
            if self.finished {
                return None;
            }

            let target = match self.queue.front() {
                Some(p) => *p,
                None => {
                    self.finished = true;
                    return None;
                }
            };

            let front_id = match self.session.pending.front() {
                Some(p) => p.id,
                None => {
                    self.finished = true;
                    return None;
                }
            };

            if front_id < target.run_id {
                if let Err(e) = self.session.drain_one_pending().await {
                    self.finished = true;
                    return Some(Err(e));
                }
                continue;
            }

            if front_id == target.run_id {
                self.session.pending.pop_front();
                match self.session.read_message().await {
                    Ok(Message::Success { metadata }) => {
                        self.run_metadata = Some(metadata);
                        continue;
                    }
                    Ok(Message::Failure { metadata }) => {
                        self.session.mark_failed();
                        if let Err(e) = self.session.drain_one_pending().await {
                            self.finished = true;
                            return Some(Err(e));
                        }
                        self.queue.pop_front();
                        if self.queue.is_empty() {
                            self.finished = true;
                        }
                        let (code, message) = extract_code_message(&metadata);
                        return Some(Err(ClientError::ServerFailure { code, message }));
                    }
                    Ok(other) => {
                        self.finished = true;
                        return Some(Err(ClientError::Protocol(format!(
                            "unexpected {other:?} answering RUN"
                        ))));
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            debug_assert_eq!(front_id, target.pull_id);
            match self.session.read_message().await {
                Ok(Message::Record { fields }) => {
                    return Some(Ok(ClientResponse {
                        fields: Some(fields),
                        metadata: self.run_metadata.clone().unwrap_or_default(),
                        eof: false,
                    }));
                }
                Ok(Message::Success { metadata }) => {
                    self.session.pending.pop_front();
                    self.run_metadata = None;
                    self.queue.pop_front();
                    let was_last = self.queue.is_empty();
                    if was_last {
                        self.session.mark_ready();
                        self.finished = true;
                    }
                    if target.get_eof {
                        return Some(Ok(ClientResponse {
                            fields: None,
                            metadata,
                            eof: true,
                        }));
                    }
                    if was_last {
                        return None;
                    }
                    continue;
                }
                Ok(Message::Failure { metadata }) => {
                    self.session.pending.pop_front();
                    self.session.mark_failed();
                    self.queue.pop_front();
                    if self.queue.is_empty() {
                        self.finished = true;
                    }
                    let (code, message) = extract_code_message(&metadata);
                    return Some(Err(ClientError::ServerFailure { code, message }));
                }
                Ok(Message::Ignored) => {
                    self.session.pending.pop_front();
                    self.queue.pop_front();
                    if self.queue.is_empty() {
                        self.finished = true;
                    }
                    return Some(Err(ClientError::Ignored));
                }
                Ok(other) => {
                    self.finished = true;
                    return Some(Err(ClientError::Protocol(format!(
                        "unexpected {other:?} answering PULL_ALL"
                    ))));
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
