use bolt_core::{Map, Value};

use crate::error::ServerError;

/// What a `RUN` produced, as reported back across two messages: the field
/// names go out immediately in RUN's own SUCCESS, the records and the
/// summary metadata are held until the matching PULL_ALL/DISCARD_ALL.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub fields: Vec<String>,
    pub records: Vec<Vec<Value>>,
    pub summary: Map,
}

/// The application-supplied query engine. The session state machine is
/// generic over this trait so the same handshake/dispatch code serves any
/// backend — an in-memory toy store, a real storage engine, whatever the
/// embedder plugs in.
///
/// `run` is synchronous by design: the core makes no assumption about how
/// query execution is scheduled, and a synchronous callback composes
/// cleanly whether the application executes inline or dispatches to its
/// own worker pool and blocks on the result.
pub trait Application: Send + Sync {
    /// Default accepts any credentials — callers that care about auth
    /// override this.
    fn verify_auth_token(&self, _auth_token: &Map) -> bool {
        true
    }

    fn run(&self, statement: &str, parameters: &Map) -> Result<QueryOutcome, ServerError>;
}
