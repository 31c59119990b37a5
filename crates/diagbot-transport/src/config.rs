//! Bot configuration and transport factory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use diagbot_core::server::ServeConfig;
use diagbot_core::traits::ChatTransport;

use crate::console::ConsoleTransport;
use crate::telegram::{TelegramTransport, DEFAULT_POLL_TIMEOUT_SECS};

/// Which chat backend to serve on.
///
/// `Debug` output masks the bot token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Telegram {
        #[serde(default)]
        token: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_poll_timeout")]
        poll_timeout_secs: u64,
    },
    Console {
        #[serde(default = "default_console_conversation")]
        conversation: String,
    },
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Telegram {
                token: _,
                username,
                base_url,
                poll_timeout_secs,
            } => f
                .debug_struct("Telegram")
                .field("token", &"***")
                .field("username", username)
                .field("base_url", base_url)
                .field("poll_timeout_secs", poll_timeout_secs)
                .finish(),
            TransportConfig::Console { conversation } => f
                .debug_struct("Console")
                .field("conversation", conversation)
                .finish(),
        }
    }
}

impl TransportConfig {
    /// The configured bot username, without a leading `@`.
    pub fn username(&self) -> Option<&str> {
        match self {
            TransportConfig::Telegram {
                username: Some(name),
                ..
            } => Some(name.trim().trim_start_matches('@')).filter(|n| !n.is_empty()),
            _ => None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Console {
            conversation: default_console_conversation(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}
fn default_console_conversation() -> String {
    "console".to_string()
}

/// Top-level diagbot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagbotConfig {
    /// Path to the test catalog (JSON or TOML).
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    /// Chat backend.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Max conversations handled concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Drop sessions idle for this many seconds. Unset keeps them forever.
    #[serde(default)]
    pub session_idle_timeout_secs: Option<u64>,
    /// Delay after a failed receive in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_catalog() -> PathBuf {
    PathBuf::from("catalog/tests_config.json")
}
fn default_parallelism() -> usize {
    4
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for DiagbotConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            transport: TransportConfig::default(),
            parallelism: default_parallelism(),
            session_idle_timeout_secs: None,
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl DiagbotConfig {
    /// Settings for the serve loop.
    pub fn to_serve_config(&self) -> ServeConfig {
        let idle_timeout = self.session_idle_timeout_secs.map(Duration::from_secs);
        let mut serve = ServeConfig {
            parallelism: self.parallelism.max(1),
            idle_timeout,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..ServeConfig::default()
        };
        // Sweep at least as often as the timeout itself.
        if let Some(timeout) = idle_timeout {
            serve.sweep_interval = serve.sweep_interval.min(timeout.max(Duration::from_secs(1)));
        }
        serve
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = lookup(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

/// Resolve env vars in a transport config.
fn resolve_transport_config(
    config: &TransportConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> TransportConfig {
    match config {
        TransportConfig::Telegram {
            token,
            username,
            base_url,
            poll_timeout_secs,
        } => TransportConfig::Telegram {
            token: resolve_env_vars(token, lookup),
            username: username.as_ref().map(|u| resolve_env_vars(u, lookup)),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u, lookup)),
            poll_timeout_secs: *poll_timeout_secs,
        },
        TransportConfig::Console { conversation } => TransportConfig::Console {
            conversation: resolve_env_vars(conversation, lookup),
        },
    }
}

/// Apply `${VAR}` references and environment overrides.
///
/// `BOT_TOKEN` and `BOT_USERNAME` switch the transport to Telegram when it
/// is not already; `DIAGBOT_CATALOG` replaces the catalog path.
pub fn apply_overrides(
    mut config: DiagbotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> DiagbotConfig {
    if let Some(token) = lookup("BOT_TOKEN") {
        config.transport = match std::mem::take(&mut config.transport) {
            TransportConfig::Telegram {
                username,
                base_url,
                poll_timeout_secs,
                ..
            } => TransportConfig::Telegram {
                token,
                username,
                base_url,
                poll_timeout_secs,
            },
            TransportConfig::Console { .. } => TransportConfig::Telegram {
                token,
                username: None,
                base_url: None,
                poll_timeout_secs: default_poll_timeout(),
            },
        };
    }

    if let Some(name) = lookup("BOT_USERNAME") {
        if let TransportConfig::Telegram { username, .. } = &mut config.transport {
            *username = Some(name);
        }
    }

    if let Some(catalog) = lookup("DIAGBOT_CATALOG") {
        config.catalog = PathBuf::from(catalog);
    }

    config.transport = resolve_transport_config(&config.transport, &lookup);
    config.catalog = PathBuf::from(resolve_env_vars(&config.catalog.to_string_lossy(), &lookup));
    config
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `diagbot.toml` in the current directory
/// 2. `~/.config/diagbot/config.toml`
///
/// Environment variable overrides: `BOT_TOKEN`, `BOT_USERNAME`, `DIAGBOT_CATALOG`.
pub fn load_config() -> Result<DiagbotConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<DiagbotConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("diagbot.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<DiagbotConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => DiagbotConfig::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("diagbot"))
}

/// Create a transport instance from its configuration.
pub fn create_transport(config: &TransportConfig) -> Result<Box<dyn ChatTransport>> {
    match config {
        TransportConfig::Telegram {
            token,
            base_url,
            poll_timeout_secs,
            ..
        } => {
            if token.trim().is_empty() {
                anyhow::bail!(
                    "telegram transport needs a bot token (set BOT_TOKEN or transport.token)"
                );
            }
            Ok(Box::new(TelegramTransport::new(
                token,
                base_url.clone(),
                *poll_timeout_secs,
            )))
        }
        TransportConfig::Console { conversation } => {
            Ok(Box::new(ConsoleTransport::stdio(conversation.as_str())))
        }
    }
}

/// Ask the backend who the bot is, failing fast on a rejected token.
///
/// The username the backend reports wins over the configured one.
pub async fn resolve_bot_username(
    transport: &dyn ChatTransport,
    config: &TransportConfig,
) -> Result<Option<String>> {
    let fetched = transport
        .identity()
        .await
        .with_context(|| format!("{} transport rejected the credentials", transport.name()))?;
    let configured = config.username();

    match (fetched, configured) {
        (Some(fetched), Some(configured)) => {
            if !fetched.eq_ignore_ascii_case(configured) {
                tracing::warn!(
                    "configured username '{configured}' differs from '{fetched}' reported by {}",
                    transport.name()
                );
            }
            Ok(Some(fetched))
        }
        (Some(fetched), None) => Ok(Some(fetched)),
        (None, configured) => Ok(configured.map(String::from)),
    }
}
