//! A thin demonstration server: wires the Bolt session state machine to a
//! real `TcpListener` with a toy query engine that understands exactly two
//! statements. This is developer scaffolding showing how an application
//! plugs in its own query engine, not a production database front-end.

use anyhow::Result;
use tokio::net::TcpListener;

use bolt_server::{Application, QueryOutcome, ServerConfig, ServerError};
use bolt_core::{Map, Value};

struct EchoEngine;

impl Application for EchoEngine {
    fn run(&self, statement: &str, parameters: &Map) -> Result<QueryOutcome, ServerError> {
        let trimmed = statement.trim();
        if trimmed.eq_ignore_ascii_case("RETURN 1 AS num") {
            let mut summary = Map::new();
            summary
                .insert("result_consumed_after", Value::Integer(0))
                .expect("fresh map, key is unique");
            summary
                .insert("type", Value::String("r".into()))
                .expect("fresh map, key is unique");
            return Ok(QueryOutcome {
                fields: vec!["num".to_owned()],
                records: vec![vec![Value::Integer(1)]],
                summary,
            });
        }

        if trimmed.eq_ignore_ascii_case("CREATE ()") {
            let mut stats = Map::new();
            stats
                .insert("nodes-created", Value::Integer(1))
                .expect("fresh map, key is unique");
            let mut summary = Map::new();
            summary.insert("stats", Value::Map(stats)).expect("fresh map, key is unique");
            summary
                .insert("result_consumed_after", Value::Integer(0))
                .expect("fresh map, key is unique");
            summary
                .insert("type", Value::String("w".into()))
                .expect("fresh map, key is unique");
            return Ok(QueryOutcome {
                fields: vec![],
                records: vec![],
                summary,
            });
        }

        let _ = parameters;
        Err(ServerError::domain(
            "Neo.ClientError.Statement.SyntaxError",
            format!("this toy engine does not understand: {trimmed}"),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::default();
    let addr = format!("{}:{}", config.listen_addr, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "bolt-server listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let config = config.clone();
        tracing::debug!(%peer, "accepted connection");
        tokio::spawn(async move {
            if let Err(e) = bolt_server::serve_connection(socket, config, EchoEngine).await {
                tracing::warn!(%peer, error = %e, "connection ended with an error");
            }
        });
    }
}
