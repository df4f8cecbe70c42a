use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while assembling [`ServerConfig`]. All of them are fatal at
/// startup: the process must not bind a listener with a broken config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API_KEY must be set to a non-empty value")]
    MissingApiKey,

    #[error("MAX_UPLOAD_MB must be greater than zero")]
    ZeroUploadLimit,

    #[error("UPLOAD_FIELDS must name at least one multipart field")]
    NoUploadFields,

    #[error("invalid bind address {0}")]
    BindAddr(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// How an upload identifier maps onto a file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// `{id}[.ext]`; a second upload to the same id replaces the first.
    #[default]
    Exact,
    /// `{id}-{random}[.ext]`; every upload gets its own file.
    Unique,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Shared secret expected in `X-API-KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory uploaded files are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Comma separated multipart field names accepted as the upload part
    #[serde(default = "default_upload_fields")]
    pub upload_fields: String,

    /// Extension appended to stored files, without the dot
    #[serde(default)]
    pub file_extension: Option<String>,

    #[serde(default)]
    pub naming: NamingPolicy,

    /// Maximum multipart body size in MiB
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on graceful drain at shutdown, in seconds
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            upload_fields: default_upload_fields(),
            file_extension: None,
            naming: NamingPolicy::default(),
            max_upload_mb: default_max_upload_mb(),
            timeout_secs: default_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            enable_cors: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `mediadrop` config file and
    /// the process environment, in increasing order of precedence.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal in containers.
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("mediadrop").required(false))
            .add_source(config::Environment::default());

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }

    /// Build configuration from an explicit variable map instead of the
    /// process environment.
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Environment::default().source(Some(vars.into_iter().collect())));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validated()
    }

    /// Convenience for tests and embedding: defaults plus the given key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    fn validated(self) -> Result<Self, ConfigError> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => {}
            _ => return Err(ConfigError::MissingApiKey),
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError::ZeroUploadLimit);
        }
        if self.upload_fields().next().is_none() {
            return Err(ConfigError::NoUploadFields);
        }
        self.socket_addr()?;
        Ok(self)
    }

    /// The configured secret. Empty only on an unvalidated config.
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Accepted multipart field names, trimmed, empties skipped.
    pub fn upload_fields(&self) -> impl Iterator<Item = &str> {
        self.upload_fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Get max upload size in bytes
    pub fn max_upload_size(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("upload")
}

fn default_upload_fields() -> String {
    "file,audio".to_string()
}

fn default_max_upload_mb() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
