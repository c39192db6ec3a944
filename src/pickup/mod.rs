//! Pickup-directory delivery.
//!
//! Instead of transmitting, a message can be serialized to disk as
//! `<uuid>.eml` for an external agent to pick up. The file is created
//! exclusively; if the generated name already exists the write is a
//! silent no-op.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::{MailError, MailResult};
use crate::mime::{MimeWriter, WireMessage};

/// Writes composed messages into a pickup directory.
#[derive(Debug, Clone)]
pub struct PickupDirectoryWriter {
    directory: PathBuf,
}

impl PickupDirectoryWriter {
    /// Creates a writer for the given directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Returns the pickup directory path.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Serializes the message and writes it as a fresh `<uuid>.eml` file.
    ///
    /// Name collisions succeed without writing anything; every other I/O
    /// failure surfaces as [`crate::errors::MailErrorKind::PickupIo`].
    pub async fn write(&self, message: &WireMessage) -> MailResult<()> {
        let filename = format!("{}.eml", Uuid::new_v4());
        let path = self.directory.join(&filename);

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| MailError::pickup(format!("Cannot access {}: {}", path.display(), e)).with_cause(e))?;
        if exists {
            tracing::debug!(path = %path.display(), "Pickup file already exists, skipping write");
            return Ok(());
        }

        let encoded = MimeWriter::default().encode(message)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            // Lost the race for the name; same outcome as the existence check.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
            Err(e) => {
                return Err(
                    MailError::pickup(format!("Cannot create {}: {}", path.display(), e))
                        .with_cause(e),
                );
            }
        };

        file.write_all(&encoded).await.map_err(|e| {
            MailError::pickup(format!("Cannot write {}: {}", path.display(), e)).with_cause(e)
        })?;
        file.flush().await.map_err(|e| {
            MailError::pickup(format!("Cannot flush {}: {}", path.display(), e)).with_cause(e)
        })?;

        tracing::debug!(path = %path.display(), "Message written to pickup directory");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MailErrorKind;
    use crate::mime::compose;
    use crate::types::EmailData;

    fn test_message() -> WireMessage {
        let email = EmailData::builder()
            .from("sender@example.com")
            .unwrap()
            .to("recipient@example.com")
            .unwrap()
            .subject("Pickup test")
            .text("Hello from the pickup directory")
            .build()
            .unwrap();
        compose(&email).unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_one_eml_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PickupDirectoryWriter::new(dir.path());

        writer.write(&test_message()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().ends_with(".eml"));

        let content = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert!(content.contains("Subject: Pickup test"));
        assert!(content.contains("From: sender@example.com"));
    }

    #[tokio::test]
    async fn test_two_writes_create_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PickupDirectoryWriter::new(dir.path());

        let message = test_message();
        writer.write(&message).await.unwrap();
        writer.write(&message).await.unwrap();

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_missing_directory_is_pickup_io() {
        let writer = PickupDirectoryWriter::new("/nonexistent/pickup/dir");
        let err = writer.write(&test_message()).await.unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::PickupIo);
    }
}
