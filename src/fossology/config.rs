//! Configuration resolution for the scanning bridge.
//!
//! Every setting is resolved with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided function parameter (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FOSSOLOGY_HOST` | - | Scanning host for the SSH transport |
//! | `FOSSOLOGY_PORT` | 22 | SSH port |
//! | `FOSSOLOGY_USER` | sw360 | SSH principal |
//! | `FOSSOLOGY_KEY_PATH` | - | Private key used for every session |
//! | `FOSSOLOGY_KEY_PASSPHRASE` | - | Passphrase of the private key |
//! | `FOSSOLOGY_HOST_FINGERPRINTS` | - | Comma-separated trusted host key fingerprints |
//! | `FOSSOLOGY_CONNECT_TIMEOUT` | 10s | Session open timeout in seconds |
//! | `FOSSOLOGY_EXECUTION_TIMEOUT` | 600s | Remote command timeout in seconds |
//! | `FOSSOLOGY_POOL_SIZE` | 5 | Idle sessions kept for reuse |
//! | `FOSSOLOGY_REST_URL` | - | REST API base URL |
//! | `FOSSOLOGY_REST_TOKEN` | - | REST API bearer token |
//! | `FOSSOLOGY_REST_FOLDER_ID` | - | Folder receiving REST uploads |
//! | `FOSSOLOGY_REPORT_TIMEOUT` | 300s | Upper bound for scan and report polling |
//! | `FOSSOLOGY_POLL_DELAY_MS` | 2000ms | Delay between polls |
//! | `FOSSOLOGY_TRANSPORT` | ssh | `ssh` or `rest` |

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::fossology::error::ConfigError;

/// Default SSH port
pub(crate) const DEFAULT_PORT: u16 = 22;

/// Default SSH principal on the scanning host
pub(crate) const DEFAULT_USER: &str = "sw360";

/// Default session open timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default remote command timeout in seconds
pub(crate) const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 600;

/// Default number of idle sessions kept by the pool
pub(crate) const DEFAULT_POOL_SIZE: usize = 5;

/// Default upper bound for scan and report polling in seconds
pub(crate) const DEFAULT_REPORT_TIMEOUT_SECS: u64 = 300;

/// Default delay between polls in milliseconds
pub(crate) const DEFAULT_POLL_DELAY_MS: u64 = 2000;

pub(crate) const HOST_ENV_VAR: &str = "FOSSOLOGY_HOST";
pub(crate) const PORT_ENV_VAR: &str = "FOSSOLOGY_PORT";
pub(crate) const USER_ENV_VAR: &str = "FOSSOLOGY_USER";
pub(crate) const KEY_PATH_ENV_VAR: &str = "FOSSOLOGY_KEY_PATH";
pub(crate) const KEY_PASSPHRASE_ENV_VAR: &str = "FOSSOLOGY_KEY_PASSPHRASE";
pub(crate) const HOST_FINGERPRINTS_ENV_VAR: &str = "FOSSOLOGY_HOST_FINGERPRINTS";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "FOSSOLOGY_CONNECT_TIMEOUT";
pub(crate) const EXECUTION_TIMEOUT_ENV_VAR: &str = "FOSSOLOGY_EXECUTION_TIMEOUT";
pub(crate) const POOL_SIZE_ENV_VAR: &str = "FOSSOLOGY_POOL_SIZE";
pub(crate) const REST_URL_ENV_VAR: &str = "FOSSOLOGY_REST_URL";
pub(crate) const REST_TOKEN_ENV_VAR: &str = "FOSSOLOGY_REST_TOKEN";
pub(crate) const REST_FOLDER_ID_ENV_VAR: &str = "FOSSOLOGY_REST_FOLDER_ID";
pub(crate) const REPORT_TIMEOUT_ENV_VAR: &str = "FOSSOLOGY_REPORT_TIMEOUT";
pub(crate) const POLL_DELAY_MS_ENV_VAR: &str = "FOSSOLOGY_POLL_DELAY_MS";
pub(crate) const TRANSPORT_ENV_VAR: &str = "FOSSOLOGY_TRANSPORT";

/// Which transport talks to the scanning server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Ssh,
    Rest,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(TransportKind::Ssh),
            "rest" => Ok(TransportKind::Rest),
            other => Err(ConfigError::Invalid {
                name: TRANSPORT_ENV_VAR,
                reason: format!("unknown transport '{}'", other),
            }),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ssh => f.write_str("ssh"),
            TransportKind::Rest => f.write_str("rest"),
        }
    }
}

/// Non-empty string from the environment.
fn env_string(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve an optional string setting with priority: parameter -> env var
fn resolve_string(param: Option<String>, var: &str) -> Option<String> {
    param.or_else(|| env_string(var))
}

pub(crate) fn resolve_host(host_param: Option<String>) -> Option<String> {
    resolve_string(host_param, HOST_ENV_VAR)
}

/// Resolve the SSH port with priority: parameter -> env var -> default
pub(crate) fn resolve_port(port_param: Option<u16>) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    DEFAULT_PORT
}

pub(crate) fn resolve_user(user_param: Option<String>) -> String {
    resolve_string(user_param, USER_ENV_VAR).unwrap_or_else(|| DEFAULT_USER.to_string())
}

pub(crate) fn resolve_key_path(key_path_param: Option<PathBuf>) -> Option<PathBuf> {
    key_path_param.or_else(|| env_string(KEY_PATH_ENV_VAR).map(PathBuf::from))
}

pub(crate) fn resolve_key_passphrase(passphrase_param: Option<String>) -> Option<String> {
    resolve_string(passphrase_param, KEY_PASSPHRASE_ENV_VAR)
}

/// Resolve trusted host key fingerprints; the env var holds a comma-separated list.
pub(crate) fn resolve_host_fingerprints(fingerprints_param: Option<Vec<String>>) -> Vec<String> {
    if let Some(fingerprints) = fingerprints_param {
        return fingerprints;
    }

    env_string(HOST_FINGERPRINTS_ENV_VAR)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|fp| !fp.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve the session open timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the command execution timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_execution_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(EXECUTION_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_EXECUTION_TIMEOUT_SECS
}

/// Resolve the idle pool capacity with priority: parameter -> env var -> default
pub(crate) fn resolve_pool_size(size_param: Option<usize>) -> usize {
    if let Some(size) = size_param {
        return size;
    }

    if let Ok(env_size) = env::var(POOL_SIZE_ENV_VAR)
        && let Ok(size) = env_size.parse::<usize>()
    {
        return size;
    }

    DEFAULT_POOL_SIZE
}

/// Resolve the polling upper bound with priority: parameter -> env var -> default
pub(crate) fn resolve_report_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(REPORT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_REPORT_TIMEOUT_SECS
}

/// Resolve the poll delay with priority: parameter -> env var -> default
pub(crate) fn resolve_poll_delay_ms(delay_param: Option<u64>) -> u64 {
    if let Some(delay) = delay_param {
        return delay;
    }

    if let Ok(env_delay) = env::var(POLL_DELAY_MS_ENV_VAR)
        && let Ok(delay) = env_delay.parse::<u64>()
    {
        return delay;
    }

    DEFAULT_POLL_DELAY_MS
}

/// Resolve the transport; an unparseable env value falls back to the default.
pub(crate) fn resolve_transport(transport_param: Option<TransportKind>) -> TransportKind {
    if let Some(transport) = transport_param {
        return transport;
    }

    if let Ok(env_transport) = env::var(TRANSPORT_ENV_VAR)
        && let Ok(transport) = env_transport.parse::<TransportKind>()
    {
        return transport;
    }

    TransportKind::default()
}

/// Normalize a REST base URL so that it ends with exactly one `v2/` segment.
///
/// URLs addressing the `v1` API are rejected, as are URLs carrying a query or
/// fragment. An empty URL stays empty so that the REST client can report the
/// missing value on first use.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let invalid = |reason: String| ConfigError::Invalid {
        name: REST_URL_ENV_VAR,
        reason,
    };

    let mut url = Url::parse(trimmed)
        .map_err(|e| invalid(format!("'{}' is not a valid URL: {}", trimmed, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(format!("'{}' has no host", trimmed)));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(format!(
            "'{}' must not carry a query or fragment",
            trimmed
        )));
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if segments.iter().any(|s| s == "v1") {
        return Err(invalid("the v1 API is not supported, use v2".to_string()));
    }

    let ends_with_v2 = segments.last().is_some_and(|s| s == "v2");
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| invalid(format!("'{}' cannot carry a path", trimmed)))?;
        path.clear().extend(&segments);
        if !ends_with_v2 {
            path.push("v2");
        }
        path.push("");
    }
    Ok(url.into())
}

/// Settings of the SSH transport.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub key_passphrase: Option<String>,
    pub trusted_fingerprints: Vec<String>,
    pub connect_timeout: Duration,
    pub execution_timeout: Duration,
    pub pool_size: usize,
}

impl SshConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = resolve_host(None).ok_or(ConfigError::Missing(HOST_ENV_VAR))?;
        let key_path = resolve_key_path(None).ok_or(ConfigError::Missing(KEY_PATH_ENV_VAR))?;

        Ok(Self {
            host,
            port: resolve_port(None),
            user: resolve_user(None),
            key_path,
            key_passphrase: resolve_key_passphrase(None),
            trusted_fingerprints: resolve_host_fingerprints(None),
            connect_timeout: Duration::from_secs(resolve_connect_timeout(None)),
            execution_timeout: Duration::from_secs(resolve_execution_timeout(None)),
            pool_size: resolve_pool_size(None),
        })
    }

    /// `host:port` form understood by the session connector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings of the REST transport.
///
/// Values may be empty; the REST client checks them before every call.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub token: String,
    pub folder_id: String,
    pub report_timeout: Duration,
    pub poll_delay: Duration,
}

impl RestConfig {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        folder_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            token: token.into(),
            folder_id: folder_id.into(),
            report_timeout: Duration::from_secs(DEFAULT_REPORT_TIMEOUT_SECS),
            poll_delay: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            &env_string(REST_URL_ENV_VAR).unwrap_or_default(),
            env_string(REST_TOKEN_ENV_VAR).unwrap_or_default(),
            env_string(REST_FOLDER_ID_ENV_VAR).unwrap_or_default(),
        )?;
        config.report_timeout = Duration::from_secs(resolve_report_timeout(None));
        config.poll_delay = Duration::from_millis(resolve_poll_delay_ms(None));
        Ok(config)
    }

    pub fn with_polling(mut self, report_timeout: Duration, poll_delay: Duration) -> Self {
        self.report_timeout = report_timeout;
        self.poll_delay = poll_delay;
        self
    }

    /// Reject configurations the REST API cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Missing(REST_URL_ENV_VAR));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Missing(REST_TOKEN_ENV_VAR));
        }
        if self.folder_id.parse::<u32>().is_err() {
            return Err(ConfigError::Invalid {
                name: REST_FOLDER_ID_ENV_VAR,
                reason: format!("'{}' is not a numeric folder id", self.folder_id),
            });
        }
        Ok(())
    }
}

/// Complete bridge configuration for the selected transport.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub transport: TransportKind,
    pub ssh: Option<SshConfig>,
    pub rest: Option<RestConfig>,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transport = resolve_transport(None);
        match transport {
            TransportKind::Ssh => Ok(Self {
                transport,
                ssh: Some(SshConfig::from_env()?),
                rest: None,
            }),
            TransportKind::Rest => {
                let rest = RestConfig::from_env()?;
                rest.validate()?;
                Ok(Self {
                    transport,
                    ssh: None,
                    rest: Some(rest),
                })
            }
        }
    }
}
