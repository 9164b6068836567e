use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::context::CoreContext;
use crate::error::{Component, Error, Result};

use super::session::SmtpSession;
use super::{AuthRequest, ReceivedMail, SessionPolicy};

/// Inbound SMTP listener. Each accepted connection runs its own
/// [`SmtpSession`] task; the shared policy is read-only after construction.
pub struct SmtpServer {
    listener: TcpListener,
    policy: Arc<SessionPolicy>,
}

impl SmtpServer {
    /// Binds the listener and captures server policy from the context.
    /// A bind address without a port gets the SMTP default appended.
    pub async fn bind(
        ctx: &CoreContext,
        on_auth: Arc<dyn AuthRequest>,
        on_mail: Arc<dyn ReceivedMail>,
    ) -> Result<Self> {
        let mut addr = ctx.smtp_bind.clone();
        if !addr.contains(':') {
            addr.push_str(":25");
        }

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            Error::io(Component::SmtpServer, e).with_info(format!("Bind address {addr}"))
        })?;

        Ok(Self {
            listener,
            policy: Arc::new(SessionPolicy {
                hostname: ctx.hostname.clone(),
                max_size: ctx.max_size,
                local_domains: Arc::clone(&ctx.local_domains),
                require_auth: ctx.require_auth,
                on_auth,
                on_mail,
            }),
        })
    }

    /// The address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. A failed accept is fatal and surfaces to the supervisor.
    pub async fn run(&self) -> Result<()> {
        info!(
            "SMTP server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".into())
        );

        loop {
            let (socket, addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| Error::io(Component::SmtpServer, e))?;
            info!("new SMTP connection from {}", addr);

            let session = SmtpSession::new(Arc::clone(&self.policy), addr);
            tokio::spawn(async move {
                if let Err(e) = session.handle(socket).await {
                    error!("session {} ended with error: {}", addr, e);
                }
            });
        }
    }
}
