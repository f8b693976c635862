//! Configuration for the bot.
//!
//! Values come from environment variables (after an optional `.env` file has
//! been loaded by the binary). Command-line flags may override the transport
//! mode, port and startup sweep afterwards.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SlackError, SlackResult};

/// Default Slack Web API base URL.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Default port for the HTTP transport.
pub const DEFAULT_PORT: u16 = 3000;

/// How events reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Outbound WebSocket to Slack (needs an app-level token).
    #[default]
    Socket,
    /// Signed HTTP requests from Slack (needs the signing secret).
    Http,
}

impl std::str::FromStr for TransportMode {
    type Err = SlackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" | "socket_mode" | "socket-mode" => Ok(TransportMode::Socket),
            "http" => Ok(TransportMode::Http),
            other => Err(SlackError::Config(format!(
                "Unknown transport mode '{}', expected 'socket' or 'http'",
                other
            ))),
        }
    }
}

/// Configuration for the bot.
#[derive(Clone)]
pub struct BotConfig {
    /// Bot OAuth token (xoxb-...).
    bot_token: SecretString,
    /// App-level token for Socket Mode (xapp-...).
    app_token: Option<SecretString>,
    /// Signing secret for HTTP request verification.
    signing_secret: Option<SecretString>,
    /// Transport used to receive events.
    pub mode: TransportMode,
    /// Port for the HTTP transport.
    pub port: u16,
    /// Slack Web API base URL.
    pub api_base: String,
    /// Run the channel auto-join sweep at startup.
    pub sweep_on_start: bool,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &self.app_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mode", &self.mode)
            .field("port", &self.port)
            .field("api_base", &self.api_base)
            .field("sweep_on_start", &self.sweep_on_start)
            .finish()
    }
}

impl BotConfig {
    /// Create a new configuration with only the bot token set.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into().into()),
            app_token: None,
            signing_secret: None,
            mode: TransportMode::default(),
            port: DEFAULT_PORT,
            api_base: DEFAULT_API_BASE.to_string(),
            sweep_on_start: true,
        }
    }

    /// Set the app-level token used by Socket Mode.
    pub fn with_app_token(mut self, app_token: impl Into<String>) -> Self {
        self.app_token = Some(SecretString::new(app_token.into().into()));
        self
    }

    /// Set the signing secret used by the HTTP transport.
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(SecretString::new(secret.into().into()));
        self
    }

    /// Set the transport mode.
    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the Web API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SLACK_BOT_TOKEN`
    ///
    /// Optional:
    /// - `SLACK_APP_TOKEN` (Socket Mode)
    /// - `SLACK_SIGNING_SECRET` (HTTP mode)
    /// - `ROLLCALL_MODE` (`socket` or `http`; defaults to `http` when only a
    ///   signing secret is present)
    /// - `PORT` (default 3000)
    /// - `SLACK_API_BASE`
    /// - `ROLLCALL_SWEEP_ON_START` (default true)
    pub fn from_env() -> SlackResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> SlackResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = var("SLACK_BOT_TOKEN")
            .ok_or_else(|| SlackError::Config("SLACK_BOT_TOKEN not set".to_string()))?;
        if !bot_token.starts_with("xoxb-") {
            warn!("Bot token doesn't start with 'xoxb-', this may be incorrect");
        }

        let mut config = Self::new(bot_token);

        if let Some(app_token) = var("SLACK_APP_TOKEN") {
            if !app_token.starts_with("xapp-") {
                warn!("App token doesn't start with 'xapp-', this may be incorrect");
            }
            config = config.with_app_token(app_token);
        }
        if let Some(secret) = var("SLACK_SIGNING_SECRET") {
            config = config.with_signing_secret(secret);
        }

        config.mode = match var("ROLLCALL_MODE") {
            Some(mode) => mode.parse()?,
            None if config.app_token.is_none() && config.signing_secret.is_some() => {
                TransportMode::Http
            }
            None => TransportMode::Socket,
        };

        if let Some(port) = var("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| SlackError::Config(format!("Invalid PORT value: {}", port)))?;
        }
        if let Some(api_base) = var("SLACK_API_BASE") {
            config = config.with_api_base(api_base);
        }
        if let Some(sweep) = var("ROLLCALL_SWEEP_ON_START") {
            config.sweep_on_start = parse_bool(&sweep).ok_or_else(|| {
                SlackError::Config(format!("Invalid ROLLCALL_SWEEP_ON_START value: {}", sweep))
            })?;
        }

        Ok(config)
    }

    /// Get the bot token.
    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    /// Get the app token for Socket Mode.
    pub fn app_token(&self) -> Option<&str> {
        self.app_token.as_ref().map(|s| s.expose_secret())
    }

    /// Get the signing secret.
    pub fn signing_secret(&self) -> Option<&str> {
        self.signing_secret.as_ref().map(|s| s.expose_secret())
    }

    /// Validate the configuration for the selected transport.
    pub fn validate(&self) -> SlackResult<()> {
        if !self.bot_token.expose_secret().starts_with("xoxb-") {
            return Err(SlackError::Config(
                "Bot token must start with 'xoxb-'".to_string(),
            ));
        }

        match self.mode {
            TransportMode::Socket => match self.app_token() {
                None => Err(SlackError::Config(
                    "Socket Mode requires SLACK_APP_TOKEN".to_string(),
                )),
                Some(token) if !token.starts_with("xapp-") => Err(SlackError::Config(
                    "App token must start with 'xapp-'".to_string(),
                )),
                Some(_) => Ok(()),
            },
            TransportMode::Http => match self.signing_secret() {
                Some(secret) if !secret.is_empty() => Ok(()),
                _ => Err(SlackError::Config(
                    "HTTP mode requires SLACK_SIGNING_SECRET".to_string(),
                )),
            },
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
