//! Credential verification against config-stored password records.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Config;
use crate::smtp::AuthRequest;
use crate::utils::{is_valid_address, split_address};

/// Checks a candidate password against a positional config record.
///
/// A record of two or more atoms carries a scheme tag first (`plain` or
/// `sha256`) and the material second; a single atom is an untagged plain
/// password. Unknown schemes never match.
pub fn check_password(record: &[String], candidate: &str) -> bool {
    let (scheme, material) = match record {
        [] => return false,
        [material] => ("plain".to_string(), material),
        [scheme, material, ..] => (scheme.to_lowercase(), material),
    };

    match scheme.as_str() {
        "plain" => material.as_str() == candidate,
        "sha256" => {
            let digest = Sha256::digest(candidate.as_bytes());
            *material == hex::encode(digest)
        }
        _ => false,
    }
}

/// Authentication backend answering SMTP AUTH and IMAP LOGIN from the
/// configuration's `domain … user … password` records.
pub struct ConfigAuth {
    config: Arc<Config>,
}

impl ConfigAuth {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl AuthRequest for ConfigAuth {
    fn verify(&self, username: &str, password: &str) -> bool {
        if !is_valid_address(username) {
            return false;
        }

        let (name, host) = split_address(username);
        let query = format!("domain:0={host} user:0={name} password");

        let Ok(result) = self.config.query(&query) else {
            return false;
        };
        let Some(record) = result.first() else {
            debug!("no password record for {}", username);
            return false;
        };
        if record.values.is_empty() {
            return false;
        }

        check_password(&record.values, password)
    }
}
