//! Client configuration: server endpoints and the default token location.
//!
//! ## Server URL precedence (highest to lowest)
//!
//! 1. `--server` CLI flag
//! 2. `SPYGLASS_SERVER` environment variable (handled by clap's `env` feature)
//! 3. Built-in default (`http://localhost:3000`)
//!
//! The websocket URL is always derived from the resolved REST base so the two
//! channels can never point at different servers.

use std::path::PathBuf;

/// Environment variable name for the server URL override.
pub const SERVER_ENV: &str = "SPYGLASS_SERVER";

/// Built-in default server URL.
pub const DEFAULT_SERVER: &str = "http://localhost:3000";

/// Resolved client endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// REST base URL, no trailing slash (e.g. "http://localhost:3000")
    pub api_base: String,
    /// Websocket URL for the push-event connection (e.g. "ws://localhost:3000/ws")
    pub ws_url: String,
}

impl Endpoints {
    /// Build endpoints from a server URL.
    ///
    /// Accepts `http://` and `https://` bases; trailing slashes are stripped.
    /// The push connection lives at `<base>/ws` with the scheme switched to
    /// `ws`/`wss`.
    pub fn from_server_url(server: &str) -> Self {
        let api_base = server.trim_end_matches('/').to_string();
        let ws_base = if let Some(rest) = api_base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = api_base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            // Already a ws:// or wss:// URL, or schemeless; pass through.
            api_base.clone()
        };
        Self {
            api_base,
            ws_url: format!("{ws_base}/ws"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::from_server_url(DEFAULT_SERVER)
    }
}

/// Default path for the persisted credential file.
///
/// Lives under the platform data directory (e.g.
/// `~/.local/share/spyglass/token` on Linux). Falls back to a dotfile in the
/// current directory when no data directory is available.
pub fn default_token_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("spyglass").join("token"))
        .unwrap_or_else(|| PathBuf::from(".spyglass-token"))
}
