use bolt_core::{chunk::ChunkReader, chunk::ChunkWriter, handshake, CodecConfig, Map, Message, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hooks::{Application, QueryOutcome};
use crate::session::ServerSession;

struct OneShotEngine;

impl Application for OneShotEngine {
    fn run(&self, statement: &str, _parameters: &Map) -> Result<QueryOutcome, ServerError> {
        if statement == "RETURN 1 AS num" {
            Ok(QueryOutcome {
                fields: vec!["num".to_owned()],
                records: vec![vec![Value::Integer(1)]],
                summary: Map::new(),
            })
        } else {
            Err(ServerError::domain(
                "Neo.ClientError.Statement.SyntaxError",
                "bad query",
            ))
        }
    }
}

struct DenyAllAuth;

impl Application for DenyAllAuth {
    fn verify_auth_token(&self, _auth_token: &Map) -> bool {
        false
    }

    fn run(&self, _statement: &str, _parameters: &Map) -> Result<QueryOutcome, ServerError> {
        unreachable!("auth is rejected before any RUN can arrive")
    }
}

fn encode_chunked(msg: &Message) -> Vec<u8> {
    let writer = ChunkWriter::new(&CodecConfig::default());
    let mut out = Vec::new();
    writer.write_message(&msg.encode(), &mut out);
    out
}

/// Reads and decodes exactly one chunked message from `io`.
async fn read_one_message<S: tokio::io::AsyncRead + Unpin>(io: &mut S) -> Message {
    let mut reader = ChunkReader::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = io.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before a full message arrived");
        for msg_bytes in reader.feed(&buf[..n]) {
            return Message::decode(&msg_bytes).unwrap();
        }
    }
}

#[tokio::test]
async fn init_with_valid_auth_reaches_ready() {
    let (mut client_io, server_io) = tokio::io::duplex(4096);

    let server = tokio::spawn(async move {
        let session = ServerSession::new(server_io, ServerConfig::default(), OneShotEngine);
        session.serve().await.unwrap();
    });

    let proposal = handshake::client_proposal();
    client_io.write_all(&proposal).await.unwrap();
    client_io.flush().await.unwrap();
    let mut version = [0u8; 4];
    client_io.read_exact(&mut version).await.unwrap();
    assert_eq!(u32::from_be_bytes(version), 1);

    let mut auth = Map::new();
    auth.insert("scheme", Value::String("basic".into())).unwrap();
    let init = encode_chunked(&Message::Init {
        client_name: "test-client/1.0".into(),
        auth_token: auth,
    });
    client_io.write_all(&init).await.unwrap();
    client_io.flush().await.unwrap();

    match read_one_message(&mut client_io).await {
        Message::Success { metadata } => {
            assert!(metadata.get("server").is_some());
        }
        other => panic!("expected SUCCESS, got {other:?}"),
    }

    // RUN + PULL_ALL
    let run = encode_chunked(&Message::Run {
        statement: "RETURN 1 AS num".into(),
        parameters: Map::new(),
    });
    client_io.write_all(&run).await.unwrap();
    let pull = encode_chunked(&Message::PullAll);
    client_io.write_all(&pull).await.unwrap();
    client_io.flush().await.unwrap();

    match read_one_message(&mut client_io).await {
        Message::Success { metadata } => {
            assert_eq!(
                metadata.get("fields"),
                Some(&Value::List(vec![Value::String("num".into())]))
            );
        }
        other => panic!("expected RUN's SUCCESS, got {other:?}"),
    }

    match read_one_message(&mut client_io).await {
        Message::Record { fields } => assert_eq!(fields, vec![Value::Integer(1)]),
        other => panic!("expected RECORD, got {other:?}"),
    }

    match read_one_message(&mut client_io).await {
        Message::Success { .. } => {}
        other => panic!("expected summary SUCCESS, got {other:?}"),
    }

    drop(client_io);
    server.await.unwrap();
}

#[tokio::test]
async fn failed_run_then_ack_failure_recovers() {
    let (mut client_io, server_io) = tokio::io::duplex(4096);

    let server = tokio::spawn(async move {
        let session = ServerSession::new(server_io, ServerConfig::default(), OneShotEngine);
        session.serve().await.unwrap();
    });

    let proposal = handshake::client_proposal();
    client_io.write_all(&proposal).await.unwrap();
    client_io.flush().await.unwrap();
    let mut version = [0u8; 4];
    client_io.read_exact(&mut version).await.unwrap();

    let init = encode_chunked(&Message::Init {
        client_name: "test-client/1.0".into(),
        auth_token: Map::new(),
    });
    client_io.write_all(&init).await.unwrap();
    client_io.flush().await.unwrap();
    read_one_message(&mut client_io).await; // INIT SUCCESS

    let run = encode_chunked(&Message::Run {
        statement: "bogus".into(),
        parameters: Map::new(),
    });
    client_io.write_all(&run).await.unwrap();
    client_io.flush().await.unwrap();

    match read_one_message(&mut client_io).await {
        Message::Failure { metadata } => {
            assert_eq!(
                metadata.get("code"),
                Some(&Value::String("Neo.ClientError.Statement.SyntaxError".into()))
            );
        }
        other => panic!("expected FAILURE, got {other:?}"),
    }

    let ack = encode_chunked(&Message::AckFailure);
    client_io.write_all(&ack).await.unwrap();
    client_io.flush().await.unwrap();

    match read_one_message(&mut client_io).await {
        Message::Success { .. } => {}
        other => panic!("expected SUCCESS after ACK_FAILURE, got {other:?}"),
    }

    drop(client_io);
    server.await.unwrap();
}

#[tokio::test]
async fn rejected_init_closes_connection() {
    let (mut client_io, server_io) = tokio::io::duplex(4096);

    let server = tokio::spawn(async move {
        let session = ServerSession::new(server_io, ServerConfig::default(), DenyAllAuth);
        session.serve().await.unwrap();
    });

    let proposal = handshake::client_proposal();
    client_io.write_all(&proposal).await.unwrap();
    client_io.flush().await.unwrap();
    let mut version = [0u8; 4];
    client_io.read_exact(&mut version).await.unwrap();

    let init = encode_chunked(&Message::Init {
        client_name: "test-client/1.0".into(),
        auth_token: Map::new(),
    });
    client_io.write_all(&init).await.unwrap();
    client_io.flush().await.unwrap();

    match read_one_message(&mut client_io).await {
        Message::Failure { metadata } => {
            assert_eq!(
                metadata.get("code"),
                Some(&Value::String("Neo.ClientError.Security.Unauthorized".into()))
            );
        }
        other => panic!("expected FAILURE, got {other:?}"),
    }

    server.await.unwrap();
}
