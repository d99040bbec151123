use bolt_core::{Map, Value};

/// One item yielded from a [`crate::stream::RecordStream`].
///
/// Each `RECORD` produces a response with `fields = Some(...)` and the
/// metadata the RUN's own `SUCCESS` carried (field names,
/// `result_available_after`). The terminal `SUCCESS` that closes the result
/// produces `fields = None` with the summary metadata instead, and is only
/// yielded when the caller asked for it (`get_eof = true`).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub fields: Option<Vec<Value>>,
    pub metadata: Map,
    pub eof: bool,
}

/// What kind of request a pending queue slot corresponds to. Used only to
/// sanity-check which messages are a legal answer to which slot — the FIFO
/// order itself is carried by [`PendingRequest::id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Init,
    Run,
    PullAll,
    DiscardAll,
    AckFailure,
    Reset,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: u64,
    pub kind: RequestKind,
}
