//! Maps `user@domain` addresses onto configured mailboxes.
//!
//! The domain/user table is built from the configuration's `domain` blocks
//! once at startup and is read-only afterwards. Lookups fall back to a
//! per-domain catch-all user when the localpart is unknown.

mod store;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Component, Error, ErrorKind, Result};
use crate::utils::split_address;

pub use store::InboundMailData;

#[derive(Debug, Clone)]
pub struct User {
    pub mailbox_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Domain {
    users: HashMap<String, User>,
    catch_all: Option<String>,
}

#[derive(Debug, Default)]
pub struct MailStore {
    domains: HashMap<String, Domain>,
}

impl MailStore {
    /// Builds the domain/user table from `domain` blocks:
    ///
    /// ```text
    /// domain example.test:
    ///     catch-all postmaster
    ///     user postmaster:
    ///         box /var/mail/example.test/postmaster
    /// ```
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut domains = HashMap::new();

        for domain_prop in cfg.query("domain")? {
            let Some(name) = domain_prop.values.first() else {
                return Err(
                    Error::new(Component::Mailstore, ErrorKind::MissingParameter)
                        .with_info("Defined domain block without domain name in configuration"),
                );
            };
            let block = domain_prop.block.clone().unwrap_or_default();

            let catch_all = cfg
                .query_single_sub("catch-all 0", &block)
                .ok()
                .map(|c| c.to_lowercase());

            let mut users = HashMap::new();
            for user_prop in cfg.query_sub("user", &block)? {
                let Some(username) = user_prop.values.first() else {
                    return Err(
                        Error::new(Component::Mailstore, ErrorKind::MissingParameter)
                            .with_info("Defined user block without username in configuration"),
                    );
                };
                let user_block = user_prop.block.clone().unwrap_or_default();
                let box_dir = cfg
                    .query_single_sub("box 0", &user_block)
                    .unwrap_or_default();

                users.insert(
                    username.to_lowercase(),
                    User {
                        mailbox_dir: PathBuf::from(box_dir),
                    },
                );
            }

            domains.insert(
                name.to_lowercase(),
                Domain { users, catch_all },
            );
        }

        Ok(Self { domains })
    }

    /// Every configured domain name, for the server's local-domain policy.
    pub fn domain_names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Resolves an address to its configured user: case-folded domain, then
    /// localpart, then the domain's catch-all.
    pub(crate) fn get_user(&self, address: &str) -> Result<&User> {
        let (name, domain) = split_address(address);

        let dom = self.domains.get(&domain.to_lowercase()).ok_or_else(|| {
            Error::new(Component::Mailstore, ErrorKind::NoValidRecipient).with_info(format!(
                "Delivery failure reason: domain '{domain}' is not internal"
            ))
        })?;

        if let Some(user) = dom.users.get(&name.to_lowercase()) {
            return Ok(user);
        }

        match &dom.catch_all {
            Some(catch_all) => dom.users.get(catch_all).ok_or_else(|| {
                Error::new(Component::Mailstore, ErrorKind::NoValidRecipient).with_info(format!(
                    "Delivery failure reason: Catch-all '{catch_all}@{domain}' does not map to a valid user"
                ))
            }),
            None => Err(
                Error::new(Component::Mailstore, ErrorKind::NoValidRecipient).with_info(
                    "Delivery failure reason: Could not find valid user or catch-all",
                ),
            ),
        }
    }
}
