//! Slack workspace roll-call bot.
//!
//! This crate provides:
//! - `/add-all`: invite every active workspace member missing from a channel,
//!   after an explicit confirm/cancel prompt
//! - `/ping` and a mention health check
//! - A channel auto-join sweeper (at startup and on `channel_created`)
//! - Socket Mode and HTTP (Events API) transports sharing one dispatcher
//!
//! # Architecture
//!
//! Both transports decode requests into [`Inbound`] values and hand them to
//! the [`Dispatcher`]. Handlers talk to Slack only through the
//! [`DirectoryClient`] trait, implemented for the Web API by
//! [`SlackDirectory`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rollcall_bot::{BotConfig, Dispatcher, SlackDirectory, SocketModeClient};
//!
//! let config = BotConfig::from_env()?;
//! let directory = Arc::new(SlackDirectory::new(&config)?);
//! let dispatcher = Arc::new(Dispatcher::new(directory));
//! SocketModeClient::new(&config, dispatcher)?.run().await?;
//! ```
//!
//! # Configuration
//!
//! Required environment variables:
//! - `SLACK_BOT_TOKEN` - Bot OAuth token (xoxb-...)
//! - `SLACK_APP_TOKEN` - App-level token, Socket Mode only (xapp-...)
//! - `SLACK_SIGNING_SECRET` - Signing secret, HTTP mode only
//!
//! Optional:
//! - `ROLLCALL_MODE` - `socket` (default) or `http`
//! - `PORT` - HTTP listen port (default 3000)
//! - `SLACK_API_BASE` - Web API base URL
//! - `ROLLCALL_SWEEP_ON_START` - run the auto-join sweep at startup (default true)

pub mod bulk_add;
pub mod commands;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod http;
pub mod interactions;
pub mod membership;
pub mod messages;
pub mod socket;
pub mod sweeper;

// Re-export main types
pub use bulk_add::{BulkAddWorkflow, ConfirmOutcome, InviteReport, RequestOutcome};
pub use config::{BotConfig, TransportMode};
pub use directory::{DirectoryClient, SlackDirectory};
pub use dispatcher::{Dispatcher, Handled};
pub use error::{SlackError, SlackResult};
pub use events::{Inbound, SlackEvent};
pub use membership::{Channel, Member, diff};
pub use socket::SocketModeClient;
pub use sweeper::{ChannelSweeper, SweepReport};
