//! Configuration system for the murmur client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/murmur/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::transport::SocketConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    backend: BackendFileConfig,
    socket: SocketFileConfig,
    chat: ChatFileConfig,
}

/// `[backend]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    api_url: Option<String>,
    socket_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
    peer_id: Option<String>,
    encryption_key: Option<String>,
}

/// `[socket]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SocketFileConfig {
    heartbeat_secs: Option<u64>,
    watchdog_secs: Option<u64>,
    liveness_timeout_secs: Option<u64>,
    backoff_base_ms: Option<u64>,
    backoff_cap_secs: Option<u64>,
    backoff_attempt_cap: Option<u32>,
    jitter_max_ms: Option<u64>,
    outbound_buffer_cap: Option<usize>,
    channel_capacity: Option<usize>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    page_size: Option<usize>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Backend --
    /// Base URL of the REST API.
    pub api_url: Option<String>,
    /// Base URL of the realtime socket.
    pub socket_url: Option<String>,
    /// Bearer credential for API and socket auth.
    pub token: Option<String>,
    /// The signed-in user id.
    pub user_id: Option<String>,
    /// The peer to chat with.
    pub peer_id: Option<String>,
    /// Base64-encoded 32-byte content encryption key.
    pub encryption_key: Option<String>,

    // -- Socket --
    /// Liveness probe interval.
    pub heartbeat_interval: Duration,
    /// Liveness watchdog check interval.
    pub watchdog_interval: Duration,
    /// Maximum silence before the watchdog force-closes.
    pub liveness_timeout: Duration,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Reconnect delay ceiling.
    pub backoff_cap: Duration,
    /// Attempt counter cap for the backoff exponent.
    pub backoff_attempt_cap: u32,
    /// Random jitter ceiling added to reconnect delays.
    pub jitter_max: Duration,
    /// Outbound frame buffer bound.
    pub outbound_buffer_cap: usize,
    /// Broadcast channel capacity for frames and status.
    pub channel_capacity: usize,

    // -- Chat --
    /// Page size for pagination and sync fetches.
    pub page_size: usize,
    /// Chat event channel capacity.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let socket = SocketConfig::new("");
        Self {
            api_url: None,
            socket_url: None,
            token: None,
            user_id: None,
            peer_id: None,
            encryption_key: None,
            heartbeat_interval: socket.heartbeat_interval,
            watchdog_interval: socket.watchdog_interval,
            liveness_timeout: socket.liveness_timeout,
            backoff_base: socket.backoff_base,
            backoff_cap: socket.backoff_cap,
            backoff_attempt_cap: socket.backoff_attempt_cap,
            jitter_max: socket.jitter_max,
            outbound_buffer_cap: socket.outbound_buffer_cap,
            channel_capacity: socket.channel_capacity,
            page_size: crate::rest::PAGE_SIZE,
            event_buffer: 256,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/murmur/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli.api_url.clone().or_else(|| file.backend.api_url.clone()),
            socket_url: cli
                .socket_url
                .clone()
                .or_else(|| file.backend.socket_url.clone()),
            token: cli.token.clone().or_else(|| file.backend.token.clone()),
            user_id: cli.user_id.clone().or_else(|| file.backend.user_id.clone()),
            peer_id: cli.peer_id.clone().or_else(|| file.backend.peer_id.clone()),
            encryption_key: cli
                .encryption_key
                .clone()
                .or_else(|| file.backend.encryption_key.clone()),
            heartbeat_interval: file
                .socket
                .heartbeat_secs
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            watchdog_interval: file
                .socket
                .watchdog_secs
                .map_or(defaults.watchdog_interval, Duration::from_secs),
            liveness_timeout: file
                .socket
                .liveness_timeout_secs
                .map_or(defaults.liveness_timeout, Duration::from_secs),
            backoff_base: file
                .socket
                .backoff_base_ms
                .map_or(defaults.backoff_base, Duration::from_millis),
            backoff_cap: file
                .socket
                .backoff_cap_secs
                .map_or(defaults.backoff_cap, Duration::from_secs),
            backoff_attempt_cap: file
                .socket
                .backoff_attempt_cap
                .unwrap_or(defaults.backoff_attempt_cap),
            jitter_max: file
                .socket
                .jitter_max_ms
                .map_or(defaults.jitter_max, Duration::from_millis),
            outbound_buffer_cap: file
                .socket
                .outbound_buffer_cap
                .unwrap_or(defaults.outbound_buffer_cap),
            channel_capacity: file
                .socket
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            page_size: file.chat.page_size.unwrap_or(defaults.page_size),
            event_buffer: file.chat.event_buffer.unwrap_or(defaults.event_buffer),
        }
    }

    /// Build a [`SocketConfig`] from this configuration, if the socket URL
    /// is present.
    #[must_use]
    pub fn to_socket_config(&self) -> Option<SocketConfig> {
        let url = self.socket_url.clone()?;
        Some(SocketConfig {
            url,
            heartbeat_interval: self.heartbeat_interval,
            watchdog_interval: self.watchdog_interval,
            liveness_timeout: self.liveness_timeout,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
            backoff_attempt_cap: self.backoff_attempt_cap,
            jitter_max: self.jitter_max,
            outbound_buffer_cap: self.outbound_buffer_cap,
            channel_capacity: self.channel_capacity,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Resilient encrypted chat client")]
pub struct CliArgs {
    /// Base URL of the backend REST API.
    #[arg(long, env = "MURMUR_API_URL")]
    pub api_url: Option<String>,

    /// Base URL of the realtime socket (ws:// or wss://).
    #[arg(long, env = "MURMUR_SOCKET_URL")]
    pub socket_url: Option<String>,

    /// Bearer credential for API and socket authentication.
    #[arg(long, env = "MURMUR_TOKEN")]
    pub token: Option<String>,

    /// Your user id.
    #[arg(long, env = "MURMUR_USER_ID")]
    pub user_id: Option<String>,

    /// The peer to chat with.
    #[arg(long, env = "MURMUR_PEER_ID")]
    pub peer_id: Option<String>,

    /// Base64-encoded 32-byte content encryption key.
    #[arg(long, env = "MURMUR_KEY")]
    pub encryption_key: Option<String>,

    /// Path to config file (default: `~/.config/murmur/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "MURMUR_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/murmur.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available -- use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("murmur").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
