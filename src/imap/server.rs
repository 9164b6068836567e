//! Minimal IMAP front-end.
//!
//! Only the authentication path matters to the rest of the system: LOGIN
//! shares the SMTP server's credential callback. Mailbox access commands are
//! not implemented.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::context::CoreContext;
use crate::error::{Component, Error, Result};
use crate::smtp::AuthRequest;
use crate::utils::split_quotes;

pub struct ImapServer {
    listener: TcpListener,
    on_auth: Arc<dyn AuthRequest>,
}

impl ImapServer {
    /// Binds the listener; a bind address without a port gets the IMAP
    /// default appended.
    pub async fn bind(ctx: &CoreContext, on_auth: Arc<dyn AuthRequest>) -> Result<Self> {
        let mut addr = ctx.imap_bind.clone();
        if !addr.contains(':') {
            addr.push_str(":143");
        }

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            Error::io(Component::Imap, e).with_info(format!("Bind address {addr}"))
        })?;

        Ok(Self { listener, on_auth })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            "IMAP server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".into())
        );

        loop {
            let (socket, addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| Error::io(Component::Imap, e))?;
            info!("new IMAP connection from {}", addr);

            let session = ImapSession {
                on_auth: Arc::clone(&self.on_auth),
                remote_addr: addr,
                authenticated: false,
                auth_name: String::new(),
            };
            tokio::spawn(async move {
                if let Err(e) = session.handle(socket).await {
                    error!("IMAP session {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

struct ImapSession {
    on_auth: Arc<dyn AuthRequest>,
    remote_addr: SocketAddr,
    authenticated: bool,
    auth_name: String,
}

impl ImapSession {
    async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut stream = BufReader::new(stream);

        self.write_raw(
            &mut stream,
            &format!(
                "* OK meiru-IMAPd Ready for operation, {}! \r\n",
                self.remote_addr.ip()
            ),
        )
        .await?;

        loop {
            let mut line = String::new();
            let n = stream
                .read_line(&mut line)
                .await
                .map_err(|e| Error::io(Component::Imap, e))?;
            if n == 0 {
                debug!("IMAP client {} disconnected", self.remote_addr);
                return Ok(());
            }

            let line = line.trim().to_string();
            if !self.do_command(&mut stream, &line).await? {
                return Ok(());
            }
        }
    }

    async fn do_command(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> Result<bool> {
        let Some((tag, rest)) = line.split_once(' ') else {
            self.reply(stream, "*", "BAD invalid tag").await?;
            return Ok(true);
        };
        let tag = tag.to_string();
        let cmd = rest.to_uppercase();

        if cmd.starts_with("NOOP") {
            self.reply(stream, &tag, "OK ..well this was a waste of bandwidth.")
                .await?;
        } else if cmd.starts_with("CAPABILITY") {
            self.write_raw(stream, "* CAPABILITY IMAP4rev1\r\n").await?;
            self.reply(stream, &tag, "OK It's not you, it's the mail server!")
                .await?;
        } else if cmd.starts_with("LOGIN") {
            let Ok(parts) = split_quotes(line) else {
                self.reply(stream, &tag, "BAD Command is malformed!").await?;
                return Ok(true);
            };
            if parts.len() < 4 {
                self.reply(stream, &tag, "BAD Command requires 2 parameters!")
                    .await?;
                return Ok(true);
            }

            self.authenticated = self.on_auth.verify(&parts[2], &parts[3]);
            if self.authenticated {
                self.auth_name = parts[2].clone();
                info!(
                    "IMAP client {} logged in as {}",
                    self.remote_addr, self.auth_name
                );
                self.reply(stream, &tag, "OK Thanks for logging in!").await?;
            } else {
                self.reply(stream, &tag, "NO Sorry, those credentials are incorrect!")
                    .await?;
            }
        } else if cmd.starts_with("LOGOUT") {
            self.reply(stream, "*", "BYE Have a nice day! 🎉").await?;
            self.reply(stream, &tag, "OK Logged out").await?;
            return Ok(false);
        } else {
            self.reply(stream, &tag, "BAD Command not recognized 😕")
                .await?;
        }

        Ok(true)
    }

    async fn reply(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        tag: &str,
        text: &str,
    ) -> Result<()> {
        self.write_raw(stream, &format!("{tag} {text}\r\n")).await
    }

    async fn write_raw(&mut self, stream: &mut BufReader<TcpStream>, text: &str) -> Result<()> {
        stream
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::io(Component::Imap, e))
    }
}
