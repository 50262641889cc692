use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::{models::Post, Error, Result};

/// One entry of the posts file.
///
/// Entries that don't decode as a [`Post`] (for example a numeric `title`
/// written by an older client) are kept as raw JSON so a rewrite carries them
/// through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Post(Post),
    Unrecognized(Value),
}

impl StoredRecord {
    pub fn id(&self) -> Option<&str> {
        match self {
            StoredRecord::Post(post) => Some(post.id.as_str()),
            StoredRecord::Unrecognized(value) => value.get("id").and_then(Value::as_str),
        }
    }
}

/// Reads every entry of the file for a read-modify-write cycle.
///
/// Only a missing file counts as an empty collection. Any other read failure,
/// or a file that isn't a JSON array, is a `StorageRead` error so the caller
/// never rewrites over data it could not see.
pub async fn read_records(path: &Path) -> Result<Vec<StoredRecord>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::StorageRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| Error::StorageRead {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

/// Reads the posts for display.
///
/// A missing, unreadable or unparsable file yields an empty collection;
/// individual entries that don't decode are skipped.
pub async fn load_posts(path: &Path) -> Vec<Post> {
    let records = match read_records(path).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Treating posts file as empty: {}", e);
            return Vec::new();
        }
    };

    let total = records.len();
    let posts: Vec<Post> = records
        .into_iter()
        .filter_map(|record| match record {
            StoredRecord::Post(post) => Some(post),
            StoredRecord::Unrecognized(_) => None,
        })
        .collect();

    if posts.len() < total {
        tracing::warn!(
            path = %path.display(),
            skipped = total - posts.len(),
            "Skipped unrecognized entries in posts file"
        );
    }

    posts
}

/// Replaces the whole collection on disk.
///
/// The new content goes to a sibling temp file which is synced and then renamed
/// over `path`, so readers never observe a partially written file.
pub async fn write_records(path: &Path, records: &[StoredRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = temp_path(path);

    if let Err(source) = write_and_rename(path, &tmp, &json).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(Error::StorageWrite {
            path: path.to_path_buf(),
            source,
        });
    }

    tracing::debug!(path = %path.display(), count = records.len(), "Wrote posts file");
    Ok(())
}

async fn write_and_rename(path: &Path, tmp: &Path, json: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;

    let mut file = fs::File::create(tmp).await?;
    file.write_all(json).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp, path).await?;

    // Persist the rename itself.
    #[cfg(unix)]
    fs::File::open(parent).await?.sync_all().await?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "posts.json".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}
