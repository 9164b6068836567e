//! meiru: a small self-hosted mail server.
//!
//! Mail comes in over SMTP, gets classified per recipient, and either lands
//! in a local mailbox or is relayed to the recipient domain's mail
//! exchanger. A minimal IMAP front-end shares the authentication backend.
//!
//! # Architecture
//!
//! ```text
//! TCP ──▶ SmtpSession ──▶ SendQueue ──┬─▶ MailStore (local mailboxes)
//!                                     └─▶ SmtpClient ──▶ remote MX
//! ```
//!
//! Policy comes from a single hierarchical configuration file (see
//! [`config`]): local domains, users and their mailboxes, credentials, bind
//! addresses and size limits. The configuration is loaded once at startup
//! into a [`CoreContext`] and injected into every component.
//!
//! # Modules
//!
//! - [`config`]: the configuration language and its query engine
//! - [`smtp`]: inbound server, outbound client, and the send queue
//! - [`mailstore`]: address-to-mailbox resolution and local delivery
//! - [`imap`]: minimal IMAP front-end (authentication only)
//! - [`auth`]: password records and the shared credential callback
//! - [`error`]: component-tagged error type

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod imap;
pub mod mailstore;
pub mod smtp;
pub mod utils;

pub use config::Config;
pub use context::CoreContext;
pub use error::{Error, ErrorKind, Result};
