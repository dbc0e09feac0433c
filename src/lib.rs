//! # webex-notify-rs
//! Send notification messages, optionally with file attachments, to a Cisco
//! Webex room or person.
//!
//! Configuration is resolved once into an immutable [`Config`], either with
//! [`Config::builder`] or from CLI/environment/`.env` layers via
//! [`config::resolve`]. A [`WebexClient`] then turns each `send` into one or
//! more requests: Webex accepts a single file per message, so the text rides
//! with the first file and later files follow one per request, in order. The
//! first failed request stops the sequence and the returned [`SendError`]
//! reports which request failed and what was already delivered.
//!
//! ## Example
//! ```no_run
//! use webex_notify_rs::{Config, WebexClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), webex_notify_rs::Error> {
//!     let config = Config::builder("token", "user@example.com").build()?;
//!     let client = WebexClient::new(config)?;
//!     client.send(Some("**build finished**"), &["report.pdf", "chart.png"]).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod plan;
pub mod transport;

pub use client::{notify, WebexClient};
pub use config::{resolve, CliOverrides, Config, ConfigBuilder};
pub use constants::{default_headers, default_timeout, DEFAULT_TIMEOUT_SECS, WEBEX_API_MESSAGES};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, MemorySink, TracingSink};
pub use error::{ConfigError, Error, Result, SendError, SendErrorKind};
pub use models::{Attachment, Destination, MessageFormat, SendOutcome, WebexFile, WebexMessage};
pub use plan::{RequestPlan, RequestUnit, UnitState};
pub use transport::{HttpTransport, OutgoingRequest, Transport, TransportError, TransportResponse};
