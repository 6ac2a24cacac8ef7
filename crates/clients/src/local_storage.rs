use std::path::PathBuf;

use anyhow::{Context, Result};

use crowdnest_common::env_or;
use crowdnest_platform::storage::validate_relative_path;
use crowdnest_platform::FileStorage;

/// Uploads on local disk, served by the API under `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `LOCAL_STORAGE_PATH` and `BACKEND_URL`.
    pub fn from_env() -> Self {
        Self::new(
            env_or("LOCAL_STORAGE_PATH", "./uploads"),
            &env_or("BACKEND_URL", "http://localhost:8080"),
        )
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait::async_trait]
impl FileStorage for LocalStorage {
    async fn upload_file(&self, bytes: Vec<u8>, relative_path: &str) -> Result<String> {
        validate_relative_path(relative_path)?;
        let reference = relative_path.trim_start_matches("./").replace('\\', "/");
        let target = self.root.join(&reference);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;

        Ok(reference)
    }

    fn public_url(&self, reference: &str) -> String {
        format!("{}/uploads/{}", self.base_url, reference)
    }
}
