use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::info;

use crate::error::{Component, Error, Result};

use super::MailStore;

/// One internally-bound message as produced by the send queue.
#[derive(Debug, Clone)]
pub struct InboundMailData {
    pub recipient: String,
    pub real_sender: String,
    pub data: Arc<String>,
}

impl MailStore {
    /// Validates the recipient and writes the message into their mailbox
    /// directory. The file first lands in `tmp/` and is renamed into `new/`
    /// so readers never observe a partial message.
    pub async fn save(&self, mail: &InboundMailData) -> Result<()> {
        let user = self.get_user(&mail.recipient)?;

        let filename = unique_filename();
        let tmp_path = user.mailbox_dir.join("tmp").join(&filename);
        let new_path = user.mailbox_dir.join("new").join(&filename);

        ensure_mailbox(&user.mailbox_dir).await?;
        fs::write(&tmp_path, mail.data.as_bytes())
            .await
            .map_err(|e| {
                Error::io(Component::Mailstore, e)
                    .with_info(format!("Writing mailbox file {}", tmp_path.display()))
            })?;
        fs::rename(&tmp_path, &new_path).await.map_err(|e| {
            Error::io(Component::Mailstore, e)
                .with_info(format!("Publishing mailbox file {}", new_path.display()))
        })?;

        info!(
            "stored mail from {} for {} as {}",
            mail.real_sender,
            mail.recipient,
            new_path.display()
        );
        Ok(())
    }
}

async fn ensure_mailbox(dir: &Path) -> Result<()> {
    for sub in ["tmp", "new", "cur"] {
        fs::create_dir_all(dir.join(sub)).await.map_err(|e| {
            Error::io(Component::Mailstore, e)
                .with_info(format!("Creating mailbox directory {}", dir.display()))
        })?;
    }
    Ok(())
}

fn unique_filename() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let pid = std::process::id();
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    format!("{timestamp}.{pid}.{host}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn save_places_mail_in_new() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = dir.path().join("bob");
        let cfg = Config::parse_str(&format!(
            "domain a.test:\n\tuser bob:\n\t\tbox {}\n",
            mailbox.display()
        ))
        .unwrap();
        let store = MailStore::from_config(&cfg).unwrap();

        let mail = InboundMailData {
            recipient: "bob@a.test".into(),
            real_sender: "alice@elsewhere.test".into(),
            data: Arc::new("Subject: hi\r\n\r\nhello".into()),
        };
        store.save(&mail).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(mailbox.join("new"))
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        let content = std::fs::read_to_string(entries[0].path()).unwrap();
        assert_eq!(content, "Subject: hi\r\n\r\nhello");
        assert!(std::fs::read_dir(mailbox.join("tmp")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn save_rejects_unknown_recipient() {
        let cfg = Config::parse_str("domain a.test:\n\tuser bob:\n\t\tbox /tmp/none\n").unwrap();
        let store = MailStore::from_config(&cfg).unwrap();
        let mail = InboundMailData {
            recipient: "nobody@other.test".into(),
            real_sender: "alice@a.test".into(),
            data: Arc::new(String::new()),
        };
        let err = store.save(&mail).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoValidRecipient);
    }
}
