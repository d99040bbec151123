use bolt_core::CodecConfig;
use serde::{Deserialize, Serialize};

/// Default Bolt listen port, per convention.
pub const DEFAULT_PORT: u16 = 7687;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub codec: CodecConfig,
    pub listen_addr: String,
    pub port: u16,
    /// Sent back as `server` metadata in INIT's SUCCESS response.
    pub server_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            codec: CodecConfig::default(),
            listen_addr: "127.0.0.1".to_owned(),
            port: DEFAULT_PORT,
            server_agent: format!("bolt-server/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
