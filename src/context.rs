//! Startup wiring: the configuration plus every policy value derived from
//! it, built once and injected into component constructors.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::config::Config;
use crate::smtp::session::DEFAULT_MAX_SIZE;
use crate::utils::parse_byte_size;

#[derive(Clone)]
pub struct CoreContext {
    pub config: Arc<Config>,
    /// Our own FQDN, announced in greetings and `Received:` headers.
    pub hostname: String,
    pub smtp_bind: String,
    pub imap_bind: String,
    /// Upper bound on a single accumulated line, DATA payload included.
    pub max_size: u64,
    /// Backing file for the durable message store.
    pub db_file: PathBuf,
    /// Domains this server accepts final delivery for.
    pub local_domains: Arc<Vec<String>>,
    /// Whether submissions must authenticate.
    pub require_auth: bool,
}

impl CoreContext {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let hostname = config
            .query_single("hostname 0")
            .unwrap_or_else(|_| gethostname::gethostname().to_string_lossy().into_owned());

        let smtp_bind = config
            .query_single("bind smtp 0")
            .or_else(|_| config.query_single("bind 0"))
            .unwrap_or_else(|_| "0.0.0.0:25".to_string());
        let imap_bind = config
            .query_single("bind imap 0")
            .unwrap_or_else(|_| "0.0.0.0:143".to_string());

        let max_size = match config.query_single("max_size 0") {
            Ok(raw) => parse_byte_size(&raw)
                .with_context(|| format!("max_size value '{raw}' is not a byte size"))?,
            Err(_) => DEFAULT_MAX_SIZE,
        };

        let db_file = PathBuf::from(
            config
                .query_single("dbfile 0")
                .unwrap_or_else(|_| "meiru.db".to_string()),
        );

        let local_domains: Vec<String> = config
            .query("domain")?
            .iter()
            .filter_map(|d| d.values.first().cloned())
            .collect();

        Ok(Self {
            config: Arc::new(config),
            hostname,
            smtp_bind,
            imap_bind,
            max_size,
            db_file,
            local_domains: Arc::new(local_domains),
            require_auth: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_policy_from_config() {
        let cfg = Config::parse_str(
            "\
hostname mx.test
max_size 1M
dbfile /var/lib/meiru/mail.db
bind:
	smtp 127.0.0.1:2525
	imap 127.0.0.1:1143
domain mx.test:
	user a:
		box /mail/a
domain other.test:
",
        )
        .unwrap();
        let ctx = CoreContext::from_config(cfg).unwrap();

        assert_eq!(ctx.hostname, "mx.test");
        assert_eq!(ctx.smtp_bind, "127.0.0.1:2525");
        assert_eq!(ctx.imap_bind, "127.0.0.1:1143");
        assert_eq!(ctx.max_size, 1024 * 1024);
        assert_eq!(ctx.db_file, PathBuf::from("/var/lib/meiru/mail.db"));
        assert_eq!(
            *ctx.local_domains,
            vec!["mx.test".to_string(), "other.test".to_string()]
        );
        assert!(ctx.require_auth);
    }

    #[test]
    fn falls_back_to_plain_bind_and_defaults() {
        let cfg = Config::parse_str("bind 10.0.0.1\nhostname mx.test\n").unwrap();
        let ctx = CoreContext::from_config(cfg).unwrap();
        assert_eq!(ctx.smtp_bind, "10.0.0.1");
        assert_eq!(ctx.imap_bind, "0.0.0.0:143");
        assert_eq!(ctx.max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn bad_max_size_is_fatal() {
        let cfg = Config::parse_str("max_size tiny\n").unwrap();
        assert!(CoreContext::from_config(cfg).is_err());
    }
}
