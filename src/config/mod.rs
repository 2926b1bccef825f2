use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 3000;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// Origins the browser may connect from. Native clients send no Origin
/// header and are never filtered.
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:8080".to_string(),
        "http://localhost:63342".to_string(),
    ]
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `todod.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 3000).
    port: Option<u16>,
    /// Bind address for the WebSocket server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,todod=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Browser origins allowed to connect. Empty list = any origin.
    allowed_origins: Option<Vec<String>>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
            None
        }
    }
}

// ─── TodoConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TodoConfig {
    pub port: u16,
    /// Bind address for the WebSocket server (TODOD_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Browser origins allowed through the WS handshake.
    pub allowed_origins: Vec<String>,
}

impl TodoConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file (`--config`, default `./todod.toml`)
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        bind_address: Option<String>,
        log: Option<String>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let path = config_path.unwrap_or_else(|| PathBuf::from("todod.toml"));
        let toml = load_toml(&path).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let bind_address = bind_address
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("TODOD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let allowed_origins = toml.allowed_origins.unwrap_or_else(default_allowed_origins);

        Self {
            port,
            bind_address,
            log,
            log_format,
            allowed_origins,
        }
    }

    /// WebSocket URL client subcommands connect to by default.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}
