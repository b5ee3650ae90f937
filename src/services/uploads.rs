//! Attachment files written to local disk. Messages only keep the resulting
//! reference URL and the original file name.

use crate::config::UploadConfig;
use crate::error::{AppError, AppResult};
use rand::Rng;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub url: String,
    pub original_name: String,
    /// Name on disk under the upload directory
    pub stored_name: String,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            public_base_url: config.public_base_url.clone(),
            max_bytes: config.max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> AppResult<StoredFile> {
        if bytes.is_empty() {
            return Err(AppError::validation("uploaded file is empty"));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }

        let stored_name = stored_name(original_name);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&stored_name), bytes).await?;

        tracing::debug!(file = %stored_name, size = bytes.len(), "attachment stored");

        Ok(StoredFile {
            url: format!("{}/uploads/{}", self.public_base_url, stored_name),
            original_name: original_name.to_string(),
            stored_name,
        })
    }

    /// Removes a file whose message was never persisted
    pub async fn discard(&self, file: &StoredFile) {
        if let Err(e) = tokio::fs::remove_file(self.dir.join(&file.stored_name)).await {
            tracing::warn!(file = %file.stored_name, error = %e, "could not remove orphaned attachment");
        }
    }

    /// Bytes of a previously stored file. Only names `save` could have produced are served.
    pub async fn read(&self, stored_name: &str) -> AppResult<Vec<u8>> {
        if !is_stored_name(stored_name) {
            return Err(AppError::NotFound("file"));
        }
        match tokio::fs::read(self.dir.join(stored_name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound("file")),
            Err(e) => Err(e.into()),
        }
    }
}

/// `{millis}-{random}-{sanitized original}`
fn stored_name(original: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::rng().random_range(0..1_000_000_000);
    format!("{millis}-{nonce}-{}", sanitize(original))
}

fn is_stored_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn sanitize(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}
