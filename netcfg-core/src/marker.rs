//! File marker recording that the device has been configured at least once.

use crate::credentials::ProvisioningCredentials;
use crate::traits::CredentialStore;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// The supplicant keeps the real network profile (`save_config`); this
/// marker only remembers that one exists.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn has_credentials(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn persist(&self, credentials: &ProvisioningCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, format!("ssid={}\n", credentials.ssid)).await?;
        tracing::debug!(path = %self.path.display(), "Credentials marker written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SecurityType;

    #[tokio::test]
    async fn marker_appears_after_persist() {
        let dir = std::env::temp_dir().join(format!("netcfg-marker-{}", std::process::id()));
        let store = FileCredentialStore::new(dir.join("nested").join("configured"));
        assert!(!store.has_credentials().await);

        let creds =
            ProvisioningCredentials::new("HomeNet", "pw1234", SecurityType::WpaPsk, false).unwrap();
        store.persist(&creds).await.unwrap();
        assert!(store.has_credentials().await);

        let content = tokio::fs::read_to_string(dir.join("nested").join("configured"))
            .await
            .unwrap();
        assert_eq!(content, "ssid=HomeNet\n");
        assert!(!content.contains("pw1234"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
