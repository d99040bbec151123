//! End-to-end client↔server scenarios, driven entirely over an in-memory
//! `tokio::io::duplex` pipe rather than a real socket — the handshake,
//! PackStream codec, chunking and session state machines on both sides are
//! exercised exactly as a TCP deployment would exercise them.

use bolt_core::{Map, Value};
use bolt_server::{Application, QueryOutcome, ServerConfig, ServerError, ServerSession};

use bolt_client::{ClientConfig, ClientError, ClientSession, ClientState};

/// A toy query engine covering the handful of statements the concrete
/// scenarios in the specification exercise.
struct ScenarioEngine;

impl Application for ScenarioEngine {
    fn run(&self, statement: &str, _parameters: &Map) -> Result<QueryOutcome, ServerError> {
        match statement {
            "RETURN 1 AS num" => Ok(QueryOutcome {
                fields: vec!["num".to_owned()],
                records: vec![vec![Value::Integer(1)]],
                summary: {
                    let mut m = Map::new();
                    m.insert("result_consumed_after", Value::Integer(0)).unwrap();
                    m
                },
            }),
            "CREATE ()" => Ok(QueryOutcome {
                fields: vec![],
                records: vec![],
                summary: {
                    let mut stats = Map::new();
                    stats.insert("nodes-created", Value::Integer(1)).unwrap();
                    let mut m = Map::new();
                    m.insert("stats", Value::Map(stats)).unwrap();
                    m.insert("result_consumed_after", Value::Integer(0)).unwrap();
                    m.insert("type", Value::String("w".into())).unwrap();
                    m
                },
            }),
            "MATCH (n) RETURN n" => {
                let node = Value::Structure {
                    signature: 0x4E,
                    fields: vec![
                        Value::Integer(42),
                        Value::List(vec![Value::String("Person".into())]),
                        Value::Map({
                            let mut props = Map::new();
                            props.insert("name", Value::String("Alice".into())).unwrap();
                            props
                        }),
                    ],
                };
                Ok(QueryOutcome {
                    fields: vec!["n".to_owned()],
                    records: vec![vec![node]],
                    summary: {
                        let mut m = Map::new();
                        m.insert("type", Value::String("r".into())).unwrap();
                        m
                    },
                })
            }
            "This will cause a syntax error" => Err(ServerError::domain(
                "Neo.ClientError.Statement.SyntaxError",
                "invalid syntax",
            )),
            other => Err(ServerError::domain(
                "Neo.ClientError.Statement.SyntaxError",
                format!("unrecognized statement: {other}"),
            )),
        }
    }
}

async fn connected_session() -> (ClientSession<tokio::io::DuplexStream>, tokio::task::JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);

    let server = tokio::spawn(async move {
        let session = ServerSession::new(server_io, ServerConfig::default(), ScenarioEngine);
        session.serve().await.unwrap();
    });

    let mut session = ClientSession::connect(client_io, ClientConfig::default()).await.unwrap();

    let mut auth = Map::new();
    auth.insert("scheme", Value::String("basic".into())).unwrap();
    auth.insert("principal", Value::String("neo4j".into())).unwrap();
    auth.insert("credentials", Value::String("password".into())).unwrap();
    let metadata = session.init(auth).await.unwrap();
    assert!(metadata.get("server").is_some());
    assert_eq!(session.state(), ClientState::Ready);

    (session, server)
}

/// Scenario 1 — minimal INIT reaches Ready with server metadata.
#[tokio::test]
async fn minimal_init_reaches_ready() {
    let (session, server) = connected_session().await;
    assert_eq!(session.state(), ClientState::Ready);
    drop(session);
    server.await.unwrap();
}

/// Scenario 2 — a single RUN without get_eof yields one record and the
/// lazy sequence ends without surfacing the terminal summary.
#[tokio::test]
async fn single_run_yields_one_record_without_eof() {
    let (mut session, server) = connected_session().await;

    let mut stream = session.run("RETURN 1 AS num", Map::new(), false).await.unwrap();
    let response = stream.next().await.unwrap().unwrap();
    assert_eq!(response.fields, Some(vec![Value::Integer(1)]));
    assert!(!response.eof);
    assert!(stream.next().await.is_none());
    drop(stream);

    drop(session);
    server.await.unwrap();
}

/// Scenario 3 — two RUNs pipelined before any flush still arrive as two
/// identical, independently-ordered responses.
#[tokio::test]
async fn pipelined_duplicate_runs_arrive_in_order() {
    let (mut session, server) = connected_session().await;

    session.pipeline("RETURN 1 AS num", Map::new()).unwrap();
    let mut second = session.run("RETURN 1 AS num", Map::new(), false).await.unwrap();

    // `second` claims the pipelined RUN's response first, then its own.
    let first_response = second.next().await.unwrap().unwrap();
    assert_eq!(first_response.fields, Some(vec![Value::Integer(1)]));
    let second_response = second.next().await.unwrap().unwrap();
    assert_eq!(second_response.fields, Some(vec![Value::Integer(1)]));
    assert!(second.next().await.is_none());
    drop(second);

    assert_eq!(session.state(), ClientState::Ready);

    drop(session);
    server.await.unwrap();
}

/// Scenario 4 — a FAILURE moves the session into Failed, IGNOREs queued
/// successors, and a RESET restores Ready.
#[tokio::test]
async fn syntax_error_then_reset_recovers() {
    let (mut session, server) = connected_session().await;

    let mut stream = session
        .run("This will cause a syntax error", Map::new(), false)
        .await
        .unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    match err {
        ClientError::ServerFailure { code, .. } => {
            assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
        }
        other => panic!("expected ServerFailure, got {other:?}"),
    }
    drop(stream);
    assert_eq!(session.state(), ClientState::Failed);

    session.reset().await.unwrap();
    assert_eq!(session.state(), ClientState::Ready);

    // The session is usable again after reset.
    let mut stream = session.run("RETURN 1 AS num", Map::new(), false).await.unwrap();
    let response = stream.next().await.unwrap().unwrap();
    assert_eq!(response.fields, Some(vec![Value::Integer(1)]));
    drop(stream);

    drop(session);
    server.await.unwrap();
}

/// Same as above but recovering via the soft path, ACK_FAILURE, instead of
/// RESET.
#[tokio::test]
async fn syntax_error_then_ack_failure_recovers() {
    let (mut session, server) = connected_session().await;

    let mut stream = session
        .run("This will cause a syntax error", Map::new(), false)
        .await
        .unwrap();
    assert!(stream.next().await.unwrap().is_err());
    drop(stream);
    assert_eq!(session.state(), ClientState::Failed);

    session.ack_failure().await.unwrap();
    assert_eq!(session.state(), ClientState::Ready);

    drop(session);
    server.await.unwrap();
}

/// Scenario 5 — a write query with get_eof=true yields exactly one summary
/// response carrying the write statistics.
#[tokio::test]
async fn write_query_with_eof_yields_summary() {
    let (mut session, server) = connected_session().await;

    let mut stream = session.run("CREATE ()", Map::new(), true).await.unwrap();
    let response = stream.next().await.unwrap().unwrap();
    assert_eq!(response.fields, None);
    assert!(response.eof);
    assert_eq!(response.metadata.get("type"), Some(&Value::String("w".into())));
    let stats = response.metadata.get("stats").and_then(Value::as_map).unwrap();
    assert_eq!(stats.get("nodes-created"), Some(&Value::Integer(1)));
    assert!(stream.next().await.is_none());
    drop(stream);

    drop(session);
    server.await.unwrap();
}

/// Scenario 6 — a node value decodes to a generic Structure with signature
/// 0x4E and the three documented fields, no higher-level graph type
/// required at this layer.
#[tokio::test]
async fn node_record_decodes_as_generic_structure() {
    let (mut session, server) = connected_session().await;

    let mut stream = session.run("MATCH (n) RETURN n", Map::new(), false).await.unwrap();
    let response = stream.next().await.unwrap().unwrap();
    let fields = response.fields.unwrap();
    match &fields[0] {
        Value::Structure { signature, fields } => {
            assert_eq!(*signature, 0x4E);
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[0], Value::Integer(42));
            assert_eq!(fields[1], Value::List(vec![Value::String("Person".into())]));
            let props = fields[2].as_map().unwrap();
            assert_eq!(props.get("name"), Some(&Value::String("Alice".into())));
        }
        other => panic!("expected a Structure, got {other:?}"),
    }
    drop(stream);

    drop(session);
    server.await.unwrap();
}

/// `discard()` runs a statement but never streams records back, only the
/// final summary — exercising the RUN+DISCARD_ALL pairing instead of
/// RUN+PULL_ALL.
#[tokio::test]
async fn discard_suppresses_records() {
    let (mut session, server) = connected_session().await;

    let response = session.discard("MATCH (n) RETURN n", Map::new()).await.unwrap();
    assert_eq!(response.fields, None);
    assert!(response.eof);

    drop(session);
    server.await.unwrap();
}

/// A `RecordStream` dropped mid-iteration (the caller abandons it before
/// reaching eof) must not desynchronize the FIFO for a request queued
/// after it.
#[tokio::test]
async fn abandoned_stream_does_not_stall_the_pipeline() {
    let (mut session, server) = connected_session().await;

    {
        let mut stream = session.run("MATCH (n) RETURN n", Map::new(), false).await.unwrap();
        // Intentionally read nothing and drop the stream immediately.
        let _ = &mut stream;
    }

    // A subsequent request still gets its own, correctly-matched response.
    let mut stream = session.run("RETURN 1 AS num", Map::new(), false).await.unwrap();
    let response = stream.next().await.unwrap().unwrap();
    assert_eq!(response.fields, Some(vec![Value::Integer(1)]));
    drop(stream);

    drop(session);
    server.await.unwrap();
}

/// A rejected INIT never reaches Ready; the client surfaces `AuthFailure`.
#[tokio::test]
async fn rejected_auth_surfaces_as_auth_failure() {
    struct DenyAllAuth;
    impl Application for DenyAllAuth {
        fn verify_auth_token(&self, _auth_token: &Map) -> bool {
            false
        }
        fn run(&self, _statement: &str, _parameters: &Map) -> Result<QueryOutcome, ServerError> {
            unreachable!("auth rejected before any RUN can arrive")
        }
    }

    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let session = ServerSession::new(server_io, ServerConfig::default(), DenyAllAuth);
        session.serve().await.unwrap();
    });

    let mut session = ClientSession::connect(client_io, ClientConfig::default()).await.unwrap();
    let err = session.init(Map::new()).await.unwrap_err();
    match err {
        ClientError::Auth { code, .. } => {
            assert_eq!(code, "Neo.ClientError.Security.Unauthorized");
        }
        other => panic!("expected Auth, got {other:?}"),
    }

    server.await.unwrap();
}
