use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{Component, Error, ErrorKind, Result};
use crate::utils::email::{parse_bracketed_address, AddressError};

use super::SessionPolicy;

pub(crate) const MOTD: &str = "meiru-SMTPd - Welcome!";
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// A completed mail transaction: who sent it, who gets it, and the message
/// itself (with `Received:` and `Return-Path:` already prepended). Immutable
/// once handed to the queue.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
    pub data: String,
    local_domains: Arc<Vec<String>>,
}

impl Envelope {
    pub fn new(
        sender: String,
        recipients: Vec<String>,
        data: String,
        local_domains: Arc<Vec<String>>,
    ) -> Self {
        Self {
            sender,
            recipients,
            data,
            local_domains,
        }
    }

    /// Whether the address belongs to one of the local domains this envelope
    /// was accepted under.
    pub fn is_internal(&self, addr: &str) -> bool {
        let (_, domain) = crate::utils::split_address(addr);
        let domain = domain.to_lowercase();
        self.local_domains
            .iter()
            .any(|local| local.to_lowercase() == domain)
    }
}

/// Per-connection protocol state machine. One session per accepted socket;
/// commands are processed strictly in sequence.
pub struct SmtpSession {
    policy: Arc<SessionPolicy>,
    remote_addr: SocketAddr,
    client_hostname: String,
    greeted: bool,
    authenticated: bool,
    auth_name: String,
    sender: Option<String>,
    recipients: Vec<String>,
}

/// Outcome of a single command: keep reading or close the connection.
enum Flow {
    Continue,
    Quit,
}

impl SmtpSession {
    pub(crate) fn new(policy: Arc<SessionPolicy>, remote_addr: SocketAddr) -> Self {
        Self {
            policy,
            remote_addr,
            client_hostname: String::new(),
            greeted: false,
            authenticated: false,
            auth_name: String::new(),
            sender: None,
            recipients: Vec::new(),
        }
    }

    /// Drives the session until QUIT, EOF, an oversize line, or an I/O
    /// error.
    pub(crate) async fn handle(mut self, stream: TcpStream) -> Result<()> {
        let mut stream = BufReader::new(stream);

        self.write_raw(
            &mut stream,
            &format!("220 {} ESMTP {}\r\n", self.policy.hostname, MOTD),
        )
        .await?;

        loop {
            let line = match self.read_line(&mut stream).await? {
                Some(line) => line,
                None => {
                    debug!("client {} disconnected", self.remote_addr);
                    return Ok(());
                }
            };

            match self.do_command(&mut stream, &line).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(()),
            }
        }
    }

    async fn do_command(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> Result<Flow> {
        let cmd = line.to_uppercase();

        if cmd.starts_with("HELO") {
            let hostname = line.get(5..).map(str::trim).unwrap_or("");
            if hostname.is_empty() {
                self.reply(stream, 501, "No HELO hostname provided").await?;
                return Ok(Flow::Continue);
            }
            self.client_hostname = hostname.to_string();
            self.greeted = true;

            let hello = format!("{} Hello! 😊", self.policy.hostname);
            self.reply(stream, 250, &hello).await?;
        } else if cmd.starts_with("EHLO") {
            let hostname = line.get(5..).map(str::trim).unwrap_or("");
            if hostname.is_empty() {
                self.reply(stream, 501, "No EHLO hostname provided").await?;
                return Ok(Flow::Continue);
            }
            self.client_hostname = hostname.to_string();
            self.greeted = true;

            let hello = format!(
                "{} Hello {} [{}]! 😊",
                self.policy.hostname,
                self.client_hostname,
                self.remote_addr.ip()
            );
            let size = format!("SIZE {}", self.policy.max_size);
            self.reply_multi(
                stream,
                250,
                &[
                    hello.as_str(),
                    "PIPELINING",
                    "SMTPUTF8",
                    "AUTH LOGIN PLAIN",
                    size.as_str(),
                ],
            )
            .await?;
        } else if cmd.starts_with("NOOP") {
            self.reply(stream, 250, "OK 👍").await?;
        } else if cmd.starts_with("QUIT") {
            self.reply(stream, 221, "Have a nice day! 🎉").await?;
            return Ok(Flow::Quit);
        } else if cmd.starts_with("RSET") {
            self.reset_envelope();
            self.reply(stream, 250, "All is forgotten").await?;
        } else if cmd.starts_with("MAIL FROM:") {
            self.cmd_mail_from(stream, line).await?;
        } else if cmd.starts_with("RCPT TO:") {
            self.cmd_rcpt_to(stream, line).await?;
        } else if cmd.starts_with("DATA") {
            return self.cmd_data(stream).await;
        } else if cmd.starts_with("AUTH") {
            return self.cmd_auth(stream, line).await;
        } else {
            self.reply(stream, 502, "Command not recognized 😕").await?;
        }

        Ok(Flow::Continue)
    }

    async fn cmd_mail_from(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> Result<()> {
        if !self.greeted {
            return self
                .reply(stream, 503, "Rude! 😠 Say HELO/EHLO first!")
                .await;
        }
        if self.sender.is_some() {
            return self
                .reply(
                    stream,
                    503,
                    "An envelope is already open, call RSET if you want to start over",
                )
                .await;
        }

        let raw = line.get(10..).map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return self.reply(stream, 550, "No address specified").await;
        }

        let addr = match parse_bracketed_address(raw) {
            Ok(addr) => addr,
            Err(e) => return self.reply_address_error(stream, e).await,
        };

        // Mail claiming to originate from a local domain must come from its
        // authenticated owner.
        if self.policy.is_address_internal(&addr) && self.policy.require_auth {
            if !self.authenticated {
                return self
                    .reply(
                        stream,
                        530,
                        "Emails from this domain require authentication. Please authenticate first!",
                    )
                    .await;
            }
            if !self.auth_name.eq_ignore_ascii_case(&addr) {
                let text = format!(
                    "Authenticated for a different address ({}), use that or authenticate as \"{}\" instead!",
                    self.auth_name, addr
                );
                return self.reply(stream, 530, &text).await;
            }
        }

        self.sender = Some(addr);
        self.reply(stream, 250, "OK 👍").await
    }

    async fn cmd_rcpt_to(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> Result<()> {
        let Some(sender) = self.sender.clone() else {
            return self
                .reply(
                    stream,
                    503,
                    "No envelopes to add recipients to, please start one with MAIL FROM",
                )
                .await;
        };

        let raw = line.get(8..).map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return self.reply(stream, 550, "No address specified").await;
        }

        let addr = match parse_bracketed_address(raw) {
            Ok(addr) => addr,
            Err(e) => return self.reply_address_error(stream, e).await,
        };

        if self.policy.require_auth && !self.authenticated {
            return self
                .reply(
                    stream,
                    530,
                    "Outbound emails require authentication. Please authenticate first!",
                )
                .await;
        }
        if self.authenticated && !self.auth_name.eq_ignore_ascii_case(&sender) {
            let text = format!(
                "Authenticated for a different address ({}) than sender ({}), use that or authenticate as \"{}\" instead!",
                self.auth_name, sender, sender
            );
            return self.reply(stream, 530, &text).await;
        }

        self.recipients.push(addr);
        self.reply(stream, 250, "OK 👍").await
    }

    async fn cmd_data(&mut self, stream: &mut BufReader<TcpStream>) -> Result<Flow> {
        let Some(sender) = self.sender.clone() else {
            self.reply(
                stream,
                503,
                "Please specify both a sender and at least one recipient first",
            )
            .await?;
            return Ok(Flow::Continue);
        };
        if self.recipients.is_empty() {
            self.reply(
                stream,
                503,
                "Please specify both a sender and at least one recipient first",
            )
            .await?;
            return Ok(Flow::Continue);
        }
        if self.authenticated && !self.auth_name.eq_ignore_ascii_case(&sender) {
            let text = format!(
                "Authenticated for a different address ({}) than sender ({}), use that or authenticate as \"{}\" instead!",
                self.auth_name, sender, sender
            );
            self.reply(stream, 530, &text).await?;
            return Ok(Flow::Continue);
        }

        self.reply(stream, 354, "Fire away! End with <CRLF>.<CRLF>")
            .await?;

        let body = match self.read_data(stream).await {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(Flow::Quit),
            Err(e) => {
                warn!("client read error during DATA: {}", e);
                return Err(e);
            }
        };

        let data = format!(
            "Received: from {} ({}) by {} with meiru-SMTPd;\n\t{}\nReturn-Path: <{}>\n{}",
            self.client_hostname,
            self.remote_addr.ip(),
            self.policy.hostname,
            Local::now().to_rfc2822(),
            sender,
            body
        );

        let envelope = Envelope::new(
            sender,
            std::mem::take(&mut self.recipients),
            data,
            Arc::clone(&self.policy.local_domains),
        );
        info!(
            "accepted envelope from {} with {} recipient(s)",
            envelope.sender,
            envelope.recipients.len()
        );
        self.policy.on_mail.received(envelope);

        self.reset_envelope();
        self.reply(stream, 250, "Your message is on its way! ✈")
            .await?;
        Ok(Flow::Continue)
    }

    async fn cmd_auth(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        line: &str,
    ) -> Result<Flow> {
        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        if parts.len() < 2 {
            self.reply(stream, 504, "Please specify the authentication method")
                .await?;
            return Ok(Flow::Continue);
        }

        match parts[1].to_uppercase().as_str() {
            "PLAIN" => {
                let b64 = match parts.get(2) {
                    Some(inline) => inline.to_string(),
                    None => {
                        self.reply(stream, 334, "").await?;
                        match self.read_line(stream).await? {
                            Some(line) => line,
                            None => return Ok(Flow::Quit),
                        }
                    }
                };

                let decoded = match BASE64.decode(b64.trim()) {
                    Ok(decoded) => decoded,
                    Err(_) => {
                        self.reply(stream, 501, "That doesn't look like Base64… 🤔")
                            .await?;
                        return Ok(Flow::Continue);
                    }
                };
                let (user, pass) = match decode_plain_response(&decoded) {
                    Ok(credentials) => credentials,
                    Err(_) => {
                        self.reply(stream, 501, "The PLAIN auth string is malformed")
                            .await?;
                        return Ok(Flow::Continue);
                    }
                };

                self.finish_auth(stream, &user, &pass).await?;
            }
            "LOGIN" => {
                self.reply(stream, 334, "VXNlcm5hbWU6").await?;
                let Some(user_b64) = self.read_line(stream).await? else {
                    return Ok(Flow::Quit);
                };
                self.reply(stream, 334, "UGFzc3dvcmQ6").await?;
                let Some(pass_b64) = self.read_line(stream).await? else {
                    return Ok(Flow::Quit);
                };

                let decoded = BASE64
                    .decode(user_b64.trim())
                    .and_then(|user| BASE64.decode(pass_b64.trim()).map(|pass| (user, pass)));
                match decoded {
                    Ok((user, pass)) => {
                        let user = String::from_utf8_lossy(&user).into_owned();
                        let pass = String::from_utf8_lossy(&pass).into_owned();
                        self.finish_auth(stream, &user, &pass).await?;
                    }
                    Err(_) => {
                        self.reply(stream, 535, "That doesn't look like Base64… 🤔")
                            .await?;
                    }
                }
            }
            _ => {
                self.reply(
                    stream,
                    504,
                    "I don't support that authentication method, sorry! 😟",
                )
                .await?;
            }
        }

        Ok(Flow::Continue)
    }

    async fn finish_auth(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        user: &str,
        pass: &str,
    ) -> Result<()> {
        self.authenticated = self.policy.on_auth.verify(user, pass);
        if self.authenticated {
            self.auth_name = user.to_string();
            info!("client {} authenticated as {}", self.remote_addr, user);
            self.reply(stream, 235, "You're authenticated!").await
        } else {
            warn!("failed authentication for {} as {}", self.remote_addr, user);
            self.reply(stream, 535, "Sorry, I cannot accept those credentials!")
                .await
        }
    }

    /// Clears the envelope under construction; greeting and authentication
    /// state survive.
    fn reset_envelope(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }

    async fn reply_address_error(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        err: AddressError,
    ) -> Result<()> {
        match err {
            AddressError::TrailingGarbage => self.reply(stream, 555, "Garbage not permitted").await,
            AddressError::MissingBracket | AddressError::Malformed => {
                self.reply(stream, 501, "The address you specified is malformed")
                    .await
            }
        }
    }

    async fn reply(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        code: u16,
        text: &str,
    ) -> Result<()> {
        self.write_raw(stream, &format!("{code} {text}\r\n")).await
    }

    async fn reply_multi(
        &mut self,
        stream: &mut BufReader<TcpStream>,
        code: u16,
        lines: &[&str],
    ) -> Result<()> {
        let Some((last, head)) = lines.split_last() else {
            return Ok(());
        };
        let mut out = String::new();
        for line in head {
            out.push_str(&format!("{code}-{line}\r\n"));
        }
        out.push_str(&format!("{code} {last}\r\n"));
        self.write_raw(stream, &out).await
    }

    async fn write_raw(&mut self, stream: &mut BufReader<TcpStream>, text: &str) -> Result<()> {
        debug!("> {}", text.trim_end());
        stream
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::io(Component::SmtpServer, e))
    }

    /// Reads one command line. Lines end at CRLF, or at a bare LF followed
    /// by CR. Returns `None` on EOF. Accumulating more than `max_size`
    /// bytes aborts the session.
    async fn read_line<R>(&self, reader: &mut R) -> Result<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        loop {
            let mut chunk = String::new();
            let n = reader
                .read_line(&mut chunk)
                .await
                .map_err(|e| Error::io(Component::SmtpServer, e))?;
            if n == 0 {
                return Ok(None);
            }

            line.push_str(&chunk);
            if line.len() as u64 > self.policy.max_size {
                return Err(Error::new(Component::SmtpServer, ErrorKind::ExceededMaxSize)
                    .with_info(format!("Client {}", self.remote_addr)));
            }

            if chunk.ends_with("\r\n") {
                break;
            }
            // Bare LF: the terminator may arrive as LF CR. Pull one byte to
            // find out.
            match reader.read_u8().await {
                Ok(byte) => {
                    line.push(byte as char);
                    if line.ends_with("\n\r") {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(Error::io(Component::SmtpServer, e)),
            }
        }

        let line = line
            .trim_end_matches(|c| c == '\r' || c == '\n')
            .to_string();
        debug!("< {}", line);
        Ok(Some(line))
    }

    /// Reads the DATA payload up to the `<CRLF>.<CRLF>` terminator: a line
    /// holding a single dot, once any empty line has been seen. Lines are
    /// rejoined with CRLF; dot-stuffing is left untouched. Returns `None`
    /// when the client vanishes mid-payload.
    async fn read_data(&mut self, stream: &mut BufReader<TcpStream>) -> Result<Option<String>> {
        let mut data = String::new();
        let mut check_next = false;
        loop {
            let Some(line) = self.read_line(stream).await? else {
                return Ok(None);
            };

            if line.is_empty() && !check_next {
                check_next = true;
            }
            if check_next && line == "." {
                break;
            }
            data.push_str(&line);
            data.push_str("\r\n");
        }

        Ok(Some(
            data.trim_end_matches(|c| c == '\r' || c == '\n').to_string(),
        ))
    }
}

/// Splits a decoded AUTH PLAIN response (`authzid NUL authcid NUL passwd`)
/// into username and password.
pub(crate) fn decode_plain_response(resp: &[u8]) -> Result<(String, String)> {
    let fields: Vec<&[u8]> = resp.split(|b| *b == 0).collect();
    if fields.len() < 3 {
        return Err(Error::new(
            Component::SmtpServer,
            ErrorKind::InvalidAuthPlainString,
        ));
    }
    Ok((
        String::from_utf8_lossy(fields[1]).into_owned(),
        String::from_utf8_lossy(fields[2]).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_needs_three_fields() {
        let (user, pass) = decode_plain_response(b"\0user@mx.test\0pw").unwrap();
        assert_eq!(user, "user@mx.test");
        assert_eq!(pass, "pw");

        let err = decode_plain_response(b"user-only").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAuthPlainString);
    }

    #[test]
    fn plain_response_ignores_authzid_and_extra_fields() {
        let (user, pass) = decode_plain_response(b"admin\0user@mx.test\0pw\0junk").unwrap();
        assert_eq!(user, "user@mx.test");
        assert_eq!(pass, "pw");
    }

    #[test]
    fn envelope_internal_check_is_case_insensitive() {
        let domains = Arc::new(vec!["MX.test".to_string()]);
        let envelope = Envelope::new(
            "a@mx.test".into(),
            vec!["b@mx.test".into()],
            String::new(),
            domains,
        );
        assert!(envelope.is_internal("b@Mx.TEST"));
        assert!(!envelope.is_internal("c@elsewhere.test"));
    }
}
