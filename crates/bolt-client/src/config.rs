use bolt_core::CodecConfig;
use serde::{Deserialize, Serialize};

/// Client-side tunables. There's no multi-source config resolution here —
/// a session is constructed once per connection with whatever the caller
/// passes, so a `Default`-driven struct with explicit overrides is all this
/// protocol needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub codec: CodecConfig,
    /// Sent as the first field of INIT, e.g. `"bolt-client/0.1"`.
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            codec: CodecConfig::default(),
            client_name: format!("bolt-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
