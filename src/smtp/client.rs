use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Component, Error, ErrorKind, Result};

/// One reply line from the remote server. Multi-line responses carry one
/// entry per line; the first code is authoritative for the whole response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    pub code: u16,
    pub text: String,
}

/// An extension advertised in the EHLO response: keyword plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerExt {
    pub name: String,
    pub params: Vec<String>,
}

/// Outbound SMTP connection used to relay a single envelope to a foreign
/// server.
#[derive(Debug)]
pub struct SmtpClient {
    stream: BufReader<TcpStream>,
    pub server_ext: Vec<ServerExt>,
}

impl SmtpClient {
    /// Dials the remote host, appending the SMTP default port when none is
    /// given. The server greeting is left unread; [`SmtpClient::greet`]
    /// consumes it.
    pub async fn connect(host: &str) -> Result<Self> {
        let mut host = host.to_string();
        if !host.contains(':') {
            host.push_str(":25");
        }

        let stream = TcpStream::connect(&host).await.map_err(|e| {
            Error::io(Component::SmtpClient, e).with_info(format!("Remote host {host}"))
        })?;

        Ok(Self {
            stream: BufReader::new(stream),
            server_ext: Vec::new(),
        })
    }

    /// Introduces ourselves with EHLO, falling back to HELO for servers that
    /// refuse it, and records the advertised extensions. The first reply
    /// batch read may be the connection greeting, which is discarded.
    pub async fn greet(&mut self, local_host: &str) -> Result<()> {
        self.cmd(&format!("EHLO {local_host}")).await?;
        let mut replies = self.get_replies().await?;

        if replies.is_empty() {
            return Err(Error::new(Component::SmtpClient, ErrorKind::NoServerResponse));
        }

        // The unread 220 greeting arrives first on a fresh connection; the
        // EHLO answer is the batch after it.
        if replies[0].code == 220 {
            replies = self.get_replies().await?;
            if replies.is_empty() {
                return Err(Error::new(Component::SmtpClient, ErrorKind::NoServerResponse));
            }
        }

        if replies[0].code != 250 {
            self.cmd(&format!("HELO {local_host}")).await?;
            replies = self.get_replies().await?;
            if replies.is_empty() {
                return Err(Error::new(Component::SmtpClient, ErrorKind::NoServerResponse));
            }
            if replies[0].code != 250 {
                return Err(
                    Error::new(Component::SmtpClient, ErrorKind::ReceivedServerError)
                        .with_info(format!("{} {}", replies[0].code, replies[0].text)),
                );
            }
        }

        for reply in &replies[1..] {
            let mut parts = reply.text.split(' ');
            let Some(name) = parts.next() else { continue };
            self.server_ext.push(ServerExt {
                name: name.to_string(),
                params: parts.map(str::to_string).collect(),
            });
        }

        Ok(())
    }

    pub async fn set_sender(&mut self, addr: &str) -> Result<()> {
        self.transact(&format!("MAIL FROM: <{addr}>"), 250).await?;
        Ok(())
    }

    pub async fn add_recipient(&mut self, addr: &str) -> Result<()> {
        self.transact(&format!("RCPT TO: <{addr}>"), 250).await?;
        Ok(())
    }

    /// Transmits the message payload. The terminator is a bare
    /// `\r\n.\r\n`; the payload is sent untouched.
    pub async fn send_data(&mut self, data: &str) -> Result<()> {
        self.transact("DATA", 354).await?;

        self.stream
            .write_all(data.as_bytes())
            .await
            .map_err(|e| Error::io(Component::SmtpClient, e))?;
        self.stream
            .write_all(b"\r\n.\r\n")
            .await
            .map_err(|e| Error::io(Component::SmtpClient, e))?;

        let replies = self.get_replies().await?;
        match replies.first() {
            None => Err(Error::new(Component::SmtpClient, ErrorKind::NoServerResponse)),
            Some(reply) if reply.code != 250 => Err(Error::new(
                Component::SmtpClient,
                ErrorKind::ReceivedServerError,
            )
            .with_info(format!("{} {}", reply.code, reply.text))),
            Some(_) => Ok(()),
        }
    }

    /// Says goodbye and drops the connection. Failures while quitting are
    /// ignored; the socket is going away either way.
    pub async fn close(mut self) {
        if self.cmd("QUIT").await.is_ok() {
            let _ = self.get_replies().await;
        }
    }

    async fn transact(&mut self, command: &str, expect: u16) -> Result<Vec<ServerReply>> {
        self.cmd(command).await?;
        let replies = self.get_replies().await?;

        match replies.first() {
            None => Err(Error::new(Component::SmtpClient, ErrorKind::NoServerResponse)),
            Some(reply) if reply.code != expect => Err(Error::new(
                Component::SmtpClient,
                ErrorKind::ReceivedServerError,
            )
            .with_info(format!("{} {}", reply.code, reply.text))),
            Some(_) => Ok(replies),
        }
    }

    async fn cmd(&mut self, line: &str) -> Result<()> {
        debug!("> {}", line);
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| Error::io(Component::SmtpClient, e))
    }

    /// Reads one full response: consecutive `NNN-text` lines up to the
    /// closing `NNN text` line.
    async fn get_replies(&mut self) -> Result<Vec<ServerReply>> {
        let mut replies = Vec::new();
        let mut has_more = true;

        while has_more {
            let mut line = String::new();
            let n = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(|e| Error::io(Component::SmtpClient, e))?;
            if n == 0 {
                return Err(
                    Error::new(Component::SmtpClient, ErrorKind::NoServerResponse)
                        .with_info("Connection closed by remote server"),
                );
            }

            let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
            debug!("< {}", line);

            let space = line.find(' ');
            let dash = line.find('-');

            // A dash separator marks a continuation line; mixed separators
            // resolve to whichever comes first.
            has_more = match (dash, space) {
                (Some(d), Some(s)) => d > 0 && d < s,
                (Some(d), None) => d > 0,
                _ => false,
            };

            let separator = if has_more {
                dash.unwrap_or_default()
            } else {
                match space {
                    Some(s) => s,
                    None => {
                        return Err(Error::new(
                            Component::SmtpClient,
                            ErrorKind::InvalidServerResponse,
                        )
                        .with_info(format!("Reply line '{line}'")))
                    }
                }
            };

            let code = line[..separator].parse::<u16>().map_err(|_| {
                Error::new(Component::SmtpClient, ErrorKind::InvalidServerResponse)
                    .with_info(format!("Reply line '{line}'"))
            })?;

            replies.push(ServerReply {
                code,
                text: line[separator + 1..].to_string(),
            });
        }

        Ok(replies)
    }
}
