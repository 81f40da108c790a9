//! ASN database provisioning

use crate::Result;
use anyhow::{bail, Context};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use std::io::ErrorKind;
use tracing::{info, warn};

/// Outcome of ensuring the database is present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The file was already on disk
    Existing,
    /// The file was fetched, with its size in bytes
    Downloaded(u64),
}

/// Fetches the offline ASN database once if it is missing
pub struct DatabaseProvisioner {
    client: Client,
    url: String,
}

impl DatabaseProvisioner {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Make sure a database file exists at `path`, downloading it if absent
    ///
    /// The body is written to a temporary sibling first, so a failed fetch
    /// never leaves a partial database behind.
    pub async fn ensure(&self, path: &Path) -> Result<Provisioned> {
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("failed to check for {}", path.display()))?;
        if exists {
            info!("{} already exists, skipping download", path.display());
            return Ok(Provisioned::Existing);
        }

        info!("Downloading {} to {}", self.url, path.display());

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to download {}", self.url))?;

        if !response.status().is_success() {
            bail!(
                "failed to download {}: HTTP status {}",
                self.url,
                response.status()
            );
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", self.url))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        write_atomically(path, &bytes).await?;

        info!("Downloaded {} successfully ({} bytes)", self.url, bytes.len());
        Ok(Provisioned::Downloaded(bytes.len() as u64))
    }
}

/// Write `bytes` to a `.part` sibling of `path`, then move it into place
///
/// The sibling is removed again if either step fails.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let partial = partial_path(path);

    let result: Result<()> = async {
        fs::write(&partial, bytes)
            .await
            .with_context(|| format!("failed to write {}", partial.display()))?;
        fs::rename(&partial, path)
            .await
            .with_context(|| format!("failed to move database into {}", path.display()))?;
        Ok(())
    }
    .await;

    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", partial.display(), e);
            }
        }
    }

    result
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
