use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Component that produced an error. Used as the prefix of every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Config,
    SmtpServer,
    SmtpClient,
    SendQueue,
    Mailstore,
    Imap,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::Config => "cfg",
            Component::SmtpServer => "server",
            Component::SmtpClient => "smtp client",
            Component::SendQueue => "sendqueue",
            Component::Mailstore => "mailstore",
            Component::Imap => "imap",
        })
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Config parsing
    #[error("indent mismatch")]
    IndentMismatch,
    #[error("missing ending quote")]
    UnmatchedQuote,
    // Config preprocessing
    #[error("unknown preprocess directive")]
    UnknownDirective,
    #[error("missing required parameter")]
    MissingParameter,
    // Config queries
    #[error("invalid parameter constraint")]
    InvalidParamConstraint,
    #[error("non-numeric filter in query path")]
    NonNumericFilter,
    #[error("query matched too few properties")]
    TooFewResults,
    #[error("matched property has too few values")]
    TooFewValues,
    // SMTP server
    #[error("client exceeded data size limit")]
    ExceededMaxSize,
    #[error("invalid or malformed AUTH PLAIN string")]
    InvalidAuthPlainString,
    // SMTP client
    #[error("invalid response from server")]
    InvalidServerResponse,
    #[error("received error reply from server")]
    ReceivedServerError,
    #[error("no response from server")]
    NoServerResponse,
    // Send queue
    #[error("cannot resolve remote mail server")]
    CannotResolveDomain,
    #[error("cannot connect to remote mail server")]
    CannotConnectToRemote,
    #[error("communication error while talking to remote mail server")]
    CommunicationErrorRemote,
    // Mailstore
    #[error("could not deliver mail to a valid recipient")]
    NoValidRecipient,
    // Transport
    #[error("I/O failure")]
    Io,
}

/// An error tagged with its originating component, carrying free-form
/// context lines and an optional underlying cause.
///
/// Renders as:
///
/// ```text
/// <component> err: <message>
///     <context line>
///     Underlying error: <cause>
/// ```
#[derive(Debug)]
pub struct Error {
    component: Component,
    kind: ErrorKind,
    info: Vec<String>,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(component: Component, kind: ErrorKind) -> Self {
        Self {
            component,
            kind,
            info: Vec::new(),
            cause: None,
        }
    }

    pub fn io(component: Component, err: std::io::Error) -> Self {
        Self::new(component, ErrorKind::Io).with_cause(err)
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info.push(info.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} err: {}", self.component, self.kind)?;
        for line in &self.info {
            write!(f, "\n\t{line}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n\tUnderlying error: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_component_and_message() {
        let err = Error::new(Component::Config, ErrorKind::IndentMismatch);
        assert_eq!(err.to_string(), "cfg err: indent mismatch");
    }

    #[test]
    fn display_appends_context_and_cause() {
        let err = Error::new(Component::Mailstore, ErrorKind::NoValidRecipient)
            .with_info("Delivery failure reason: domain 'nowhere.test' is not internal")
            .with_cause(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        let rendered = err.to_string();
        assert!(rendered.starts_with("mailstore err: could not deliver mail"));
        assert!(rendered.contains("\n\tDelivery failure reason"));
        assert!(rendered.contains("\n\tUnderlying error: disk on fire"));
    }
}
