//! SMTP protocol: inbound server, outbound client, and the send queue that
//! connects them.

pub mod client;
pub mod queue;
pub mod server;
pub mod session;

pub use client::SmtpClient;
pub use queue::SendQueue;
pub use server::SmtpServer;
pub use session::{Envelope, SmtpSession};

use std::sync::Arc;

/// Credential check invoked for SMTP AUTH and IMAP LOGIN alike.
pub trait AuthRequest: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Sink for envelopes accepted at the end of DATA. Fire-and-forget: the
/// server never observes the delivery result.
pub trait ReceivedMail: Send + Sync {
    fn received(&self, envelope: Envelope);
}

/// Shared server policy, written during startup and read concurrently by
/// every session afterwards.
pub(crate) struct SessionPolicy {
    pub hostname: String,
    pub max_size: u64,
    pub local_domains: Arc<Vec<String>>,
    pub require_auth: bool,
    pub on_auth: Arc<dyn AuthRequest>,
    pub on_mail: Arc<dyn ReceivedMail>,
}

impl SessionPolicy {
    /// Whether the address belongs to one of the configured local domains
    /// (compared case-insensitively).
    pub fn is_address_internal(&self, addr: &str) -> bool {
        let (_, domain) = crate::utils::split_address(addr);
        let domain = domain.to_lowercase();
        self.local_domains
            .iter()
            .any(|local| local.to_lowercase() == domain)
    }
}
