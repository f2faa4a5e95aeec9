// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration and its resolution order.
//!
//! Each key is resolved independently: explicit override, then the process
//! environment, then `./.env`, then the global `<config dir>/sqlgate/.env`,
//! then the built-in local-development default. Env files are read with
//! `dotenvy::from_path_iter` and never mutate the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use gate_core::{ConnectionKind, EngineError, EngineResult};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::observability::{redact_url, LogConfig, Sensitive};

pub const DATABASE_URL: &str = "SQLGATE_DATABASE_URL";
pub const DB_HOST: &str = "SQLGATE_DB_HOST";
pub const DB_PORT: &str = "SQLGATE_DB_PORT";
pub const DB_USER: &str = "SQLGATE_DB_USER";
pub const DB_PASSWORD: &str = "SQLGATE_DB_PASSWORD";
pub const DB_NAME: &str = "SQLGATE_DB_NAME";
pub const CONNECTION_KIND: &str = "SQLGATE_CONNECTION_KIND";
pub const POOL_MAX_CONNECTIONS: &str = "SQLGATE_POOL_MAX_CONNECTIONS";
pub const POOL_MIN_CONNECTIONS: &str = "SQLGATE_POOL_MIN_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_SECS: &str = "SQLGATE_ACQUIRE_TIMEOUT_SECS";
pub const STATEMENT_TIMEOUT_SECS: &str = "SQLGATE_STATEMENT_TIMEOUT_SECS";
pub const CONFIRMATION_TTL_SECS: &str = "SQLGATE_CONFIRMATION_TTL_SECS";
pub const REQUEST_TIMEOUT_SECS: &str = "SQLGATE_REQUEST_TIMEOUT_SECS";
pub const LOG_DIR: &str = "SQLGATE_LOG_DIR";
pub const LOG_FILTER: &str = "SQLGATE_LOG_FILTER";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 54322;
const DEFAULT_USER: &str = "postgres";
const DEFAULT_PASSWORD: &str = "postgres";
const DEFAULT_DATABASE: &str = "postgres";

/// Port transaction-mode poolers listen on by convention.
const POOLER_PORT: u16 = 6543;

/// Resolved backend connection descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub kind: ConnectionKind,
    pub url: Sensitive<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Server-side statement timeout; `None` leaves the server default
    pub statement_timeout_secs: Option<u64>,
    pub application_name: String,
}

impl ConnectionDescriptor {
    pub fn new(kind: ConnectionKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: Sensitive::new(url.into()),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 10,
            statement_timeout_secs: Some(30),
            application_name: "sqlgate".to_string(),
        }
    }

    /// Builds the URL from parts, percent-encoding the credentials.
    pub fn from_parts(kind: Option<ConnectionKind>, host: &str, port: u16, user: &str, password: &str, database: &str) -> Self {
        let url = format!(
            "postgresql://{}:{}@{}:{}/{}",
            utf8_percent_encode(user, NON_ALPHANUMERIC),
            utf8_percent_encode(password, NON_ALPHANUMERIC),
            host,
            port,
            utf8_percent_encode(database, NON_ALPHANUMERIC),
        );
        let kind = kind.unwrap_or_else(|| infer_kind(&url));
        Self::new(kind, url)
    }

    pub fn local_default() -> Self {
        Self::from_parts(
            Some(ConnectionKind::Direct),
            DEFAULT_HOST,
            DEFAULT_PORT,
            DEFAULT_USER,
            DEFAULT_PASSWORD,
            DEFAULT_DATABASE,
        )
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }

    /// URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        redact_url(self.url.expose())
    }

    pub fn validate(&self) -> EngineResult<()> {
        let url = Url::parse(self.url.expose()).map_err(|e| EngineError::config(format!("Invalid database URL: {e}")))?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(EngineError::config(format!(
                "Unsupported database URL scheme '{}'",
                url.scheme()
            )));
        }
        if self.max_connections == 0 {
            return Err(EngineError::config("max_connections must be at least 1"));
        }
        if self.min_connections > self.max_connections {
            return Err(EngineError::config("min_connections cannot exceed max_connections"));
        }
        Ok(())
    }
}

/// Pooled when the URL targets the transaction pooler port.
pub fn infer_kind(url: &str) -> ConnectionKind {
    match Url::parse(url).ok().and_then(|u| u.port()) {
        Some(POOLER_PORT) => ConnectionKind::PooledTransaction,
        _ => ConnectionKind::Direct,
    }
}

fn parse_kind(raw: &str) -> EngineResult<ConnectionKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "direct" | "session" => Ok(ConnectionKind::Direct),
        "pooled" | "pooled_transaction" | "transaction" => Ok(ConnectionKind::PooledTransaction),
        other => Err(EngineError::config(format!("Unknown connection kind '{other}'"))),
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub connection: ConnectionDescriptor,
    pub confirmation_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub log: LogConfig,
}

impl GatewayConfig {
    pub fn new(connection: ConnectionDescriptor) -> Self {
        Self {
            connection,
            confirmation_ttl_secs: 300,
            request_timeout_secs: 120,
            log: LogConfig::default(),
        }
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(ConnectionDescriptor::local_default())
    }
}

/// Resolves [`GatewayConfig`] from its layered sources.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    overrides: HashMap<String, String>,
    use_process_env: bool,
    local_env_file: Option<PathBuf>,
    global_env_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            use_process_env: true,
            local_env_file: Some(PathBuf::from(".env")),
            global_env_file: dirs::config_dir().map(|dir| dir.join("sqlgate").join(".env")),
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_local_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_env_file = Some(path.into());
        self
    }

    pub fn with_global_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_env_file = Some(path.into());
        self
    }

    pub fn without_process_env(mut self) -> Self {
        self.use_process_env = false;
        self
    }

    pub fn load(&self) -> EngineResult<GatewayConfig> {
        let layers = self.layers()?;
        let get = |key: &str| -> Option<String> {
            layers
                .iter()
                .find_map(|layer| layer.get(key).cloned())
                .filter(|v| !v.trim().is_empty())
        };

        let kind = get(CONNECTION_KIND).map(|raw| parse_kind(&raw)).transpose()?;
        let mut connection = match get(DATABASE_URL) {
            Some(url) => ConnectionDescriptor::new(kind.unwrap_or_else(|| infer_kind(&url)), url),
            None if get(DB_HOST).is_some() || get(DB_PASSWORD).is_some() => {
                let port = parse_number(DB_PORT, get(DB_PORT))?.unwrap_or(DEFAULT_PORT);
                ConnectionDescriptor::from_parts(
                    kind,
                    &get(DB_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
                    port,
                    &get(DB_USER).unwrap_or_else(|| DEFAULT_USER.to_string()),
                    &get(DB_PASSWORD).unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
                    &get(DB_NAME).unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
                )
            }
            None => {
                let mut local = ConnectionDescriptor::local_default();
                if let Some(kind) = kind {
                    local.kind = kind;
                }
                local
            }
        };

        if let Some(max) = parse_number(POOL_MAX_CONNECTIONS, get(POOL_MAX_CONNECTIONS))? {
            connection.max_connections = max;
        }
        if let Some(min) = parse_number(POOL_MIN_CONNECTIONS, get(POOL_MIN_CONNECTIONS))? {
            connection.min_connections = min;
        }
        if let Some(secs) = parse_number(ACQUIRE_TIMEOUT_SECS, get(ACQUIRE_TIMEOUT_SECS))? {
            connection.acquire_timeout_secs = secs;
        }
        if let Some(secs) = parse_number::<u64>(STATEMENT_TIMEOUT_SECS, get(STATEMENT_TIMEOUT_SECS))? {
            connection.statement_timeout_secs = (secs > 0).then_some(secs);
        }
        connection.validate()?;

        let mut config = GatewayConfig::new(connection);
        if let Some(secs) = parse_number(CONFIRMATION_TTL_SECS, get(CONFIRMATION_TTL_SECS))? {
            config.confirmation_ttl_secs = secs;
        }
        if let Some(secs) = parse_number(REQUEST_TIMEOUT_SECS, get(REQUEST_TIMEOUT_SECS))? {
            config.request_timeout_secs = secs;
        }
        if let Some(dir) = get(LOG_DIR) {
            config.log.directory = Some(PathBuf::from(dir));
        }
        if let Some(filter) = get(LOG_FILTER) {
            config.log.filter = filter;
        }

        tracing::debug!(
            kind = %config.connection.kind,
            url = %config.connection.redacted_url(),
            "Resolved gateway configuration"
        );
        Ok(config)
    }

    /// Sources in precedence order.
    fn layers(&self) -> EngineResult<Vec<HashMap<String, String>>> {
        let mut layers = vec![self.overrides.clone()];
        if self.use_process_env {
            layers.push(std::env::vars().filter(|(k, _)| k.starts_with("SQLGATE_")).collect());
        }
        for file in [&self.local_env_file, &self.global_env_file].into_iter().flatten() {
            layers.push(read_env_file(file)?);
        }
        Ok(layers)
    }
}

/// Key/value pairs of an env file; a missing file is an empty layer.
fn read_env_file(path: &Path) -> EngineResult<HashMap<String, String>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| EngineError::config(format!("Failed to read {}: {e}", path.display())))?;
    iter.map(|item| item.map_err(|e| EngineError::config(format!("Invalid entry in {}: {e}", path.display()))))
        .collect()
}

fn parse_number<T: FromStr>(key: &str, raw: Option<String>) -> EngineResult<Option<T>> {
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| EngineError::config(format!("{key} must be a number, got '{value}'")))
    })
    .transpose()
}
