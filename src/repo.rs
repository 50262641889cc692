//! Post repository: the only component that touches the posts file.
//!
//! Every mutation reads the full collection, changes it in memory and rewrites
//! the whole file. Mutations are serialized through a single lock so that two
//! concurrent read-modify-write cycles cannot drop each other's changes. Reads
//! take no lock and see the latest fully written file.
//!
//! Reads tolerate a broken file. Mutations don't: if the file can't be read or
//! parsed they fail with `StorageRead` and leave it untouched. Entries that
//! don't decode as posts are written back verbatim.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::{
    db::{self, StoredRecord},
    models::{NewPost, Post, PostId, PostPatch},
    Error, Result,
};

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts in storage order. Never fails.
    async fn list(&self) -> Vec<Post>;
    async fn get(&self, id: &PostId) -> Option<Post>;
    async fn create(&self, fields: NewPost) -> Result<Post>;
    /// `Ok(None)` when no post has this id.
    async fn update(&self, id: &PostId, patch: PostPatch) -> Result<Option<Post>>;
    /// Whether a post was actually removed.
    async fn delete(&self, id: &PostId) -> Result<bool>;
}

pub struct JsonPostRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPostRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PostRepository for JsonPostRepository {
    async fn list(&self) -> Vec<Post> {
        db::load_posts(&self.path).await
    }

    async fn get(&self, id: &PostId) -> Option<Post> {
        db::load_posts(&self.path)
            .await
            .into_iter()
            .find(|post| &post.id == id)
    }

    async fn create(&self, fields: NewPost) -> Result<Post> {
        ensure_present("title", &fields.title)?;
        ensure_present("content", &fields.content)?;

        let _guard = self.write_lock.lock().await;
        let mut records = db::read_records(&self.path).await?;

        let mut id = PostId::generate();
        while records.iter().any(|record| record.id() == Some(id.as_str())) {
            id = PostId::generate();
        }

        let now = Utc::now();
        let post = Post {
            id,
            title: fields.title,
            content: fields.content,
            created_at: now,
            updated_at: now,
            author_id: fields.author_id,
            author_name: fields.author_name,
            image_url: fields.image_url,
            extra: Default::default(),
        };

        records.push(StoredRecord::Post(post.clone()));
        db::write_records(&self.path, &records).await?;

        tracing::info!(post_id = %post.id, "Created post");
        Ok(post)
    }

    async fn update(&self, id: &PostId, patch: PostPatch) -> Result<Option<Post>> {
        let _guard = self.write_lock.lock().await;
        let mut records = db::read_records(&self.path).await?;

        let Some(post) = records.iter_mut().find_map(|record| match record {
            StoredRecord::Post(post) if &post.id == id => Some(post),
            _ => None,
        }) else {
            return Ok(None);
        };

        let mut updated = post.clone();
        patch.apply(&mut updated);
        ensure_present("title", &updated.title)?;
        ensure_present("content", &updated.content)?;
        updated.updated_at = next_timestamp(updated.updated_at);

        *post = updated.clone();
        db::write_records(&self.path, &records).await?;

        tracing::info!(post_id = %id, "Updated post");
        Ok(Some(updated))
    }

    async fn delete(&self, id: &PostId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = db::read_records(&self.path).await?;

        let before = records.len();
        records.retain(|record| !matches!(record, StoredRecord::Post(post) if &post.id == id));
        if records.len() == before {
            return Ok(false);
        }

        db::write_records(&self.path, &records).await?;

        tracing::info!(post_id = %id, "Deleted post");
        Ok(true)
    }
}

fn ensure_present(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// `now`, or one microsecond past `previous` when the clock hasn't moved on.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn repo_in(dir: &tempfile::TempDir) -> JsonPostRepository {
        JsonPostRepository::new(dir.path().join("posts.json"))
    }

    fn hello() -> NewPost {
        NewPost {
            title: "Hello".into(),
            content: "World".into(),
            image_url: None,
            author_id: Some("u1".into()),
            author_name: Some("Alice".into()),
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        let post = repo.create(hello()).await.unwrap();
        assert!(!post.id.as_str().is_empty());
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(post.title, "Hello");
        assert_eq!(post.author_name.as_deref(), Some("Alice"));

        assert_eq!(repo.get(&post.id).await, Some(post));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        assert_eq!(repo.get(&PostId::from("nonexistent")).await, None);
    }

    #[tokio::test]
    async fn test_create_requires_title_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        let mut fields = hello();
        fields.title = "  ".into();
        assert!(matches!(
            repo.create(fields).await,
            Err(Error::Validation(_))
        ));

        let mut fields = hello();
        fields.content = String::new();
        assert!(matches!(
            repo.create(fields).await,
            Err(Error::Validation(_))
        ));

        assert!(repo.list().await.is_empty());
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_update_title_only() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        let original = repo.create(hello()).await.unwrap();

        let updated = repo
            .update(&original.id, PostPatch::title("Renamed"))
            .await
            .unwrap()
            .unwrap();

        let stored = repo.get(&original.id).await.unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.content, original.content);
        assert_eq!(stored.author_id, original.author_id);
        assert_eq!(stored.author_name, original.author_name);
        assert_eq!(stored.created_at, original.created_at);
        assert!(stored.updated_at > original.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        let result = repo
            .update(&PostId::from("nope"), PostPatch::title("x"))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_update_rejects_blank_title() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        let post = repo.create(hello()).await.unwrap();

        let err = repo.update(&post.id, PostPatch::title("")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(repo.get(&post.id).await.unwrap().title, "Hello");
    }

    #[tokio::test]
    async fn test_update_can_clear_image() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        let mut fields = hello();
        fields.image_url = Some("/uploads/cat.png".into());
        let post = repo.create(fields).await.unwrap();

        let kept = repo
            .update(&post.id, PostPatch::title("still has image"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.image_url.as_deref(), Some("/uploads/cat.png"));

        let patch = PostPatch {
            image_url: Some(None),
            ..PostPatch::default()
        };
        let cleared = repo.update(&post.id, patch).await.unwrap().unwrap();
        assert_eq!(cleared.image_url, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        let keep = repo.create(hello()).await.unwrap();
        let doomed = repo.create(hello()).await.unwrap();

        assert!(repo.delete(&doomed.id).await.unwrap());
        assert_eq!(repo.get(&doomed.id).await, None);
        assert_eq!(repo.list().await, vec![keep.clone()]);

        assert!(!repo.delete(&doomed.id).await.unwrap());
        assert_eq!(repo.list().await, vec![keep]);
    }

    #[tokio::test]
    async fn test_list_keeps_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        let mut created = Vec::new();
        for i in 0..5 {
            let mut fields = hello();
            fields.title = format!("Post {}", i);
            created.push(repo.create(fields).await.unwrap());
            assert_eq!(repo.list().await.len(), i + 1);
        }

        assert_eq!(repo.list().await, created);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        std::fs::write(repo.path(), "garbage").unwrap();

        assert!(repo.list().await.is_empty());
        assert_eq!(repo.get(&PostId::from("a")).await, None);

        assert!(matches!(
            repo.create(hello()).await,
            Err(Error::StorageRead { .. })
        ));
        assert!(matches!(
            repo.update(&PostId::from("a"), PostPatch::title("x")).await,
            Err(Error::StorageRead { .. })
        ));
        assert!(matches!(
            repo.delete(&PostId::from("a")).await,
            Err(Error::StorageRead { .. })
        ));

        assert_eq!(std::fs::read_to_string(repo.path()).unwrap(), "garbage");
    }

    #[tokio::test]
    async fn test_unrecognized_entry_survives_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        let odd = json!({ "id": "b", "title": 42, "content": "numeric title" });
        std::fs::write(
            repo.path(),
            json!([
                {
                    "id": "a",
                    "title": "Keep me",
                    "content": "c",
                    "createdAt": "2024-01-01T00:00:00.000Z",
                    "updatedAt": "2024-01-01T00:00:00.000Z"
                },
                odd.clone()
            ])
            .to_string(),
        )
        .unwrap();

        let listed = repo.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Keep me");

        let created = repo.create(hello()).await.unwrap();
        repo.update(&PostId::from("a"), PostPatch::title("Kept"))
            .await
            .unwrap()
            .unwrap();
        assert!(!repo.delete(&PostId::from("b")).await.unwrap());

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(repo.path()).unwrap()).unwrap();
        let raw = raw.as_array().unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["title"], "Kept");
        assert_eq!(raw[1], odd);
        assert_eq!(raw[2]["id"], created.id.as_str());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(repo_in(&dir));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let mut fields = hello();
                    fields.title = format!("Concurrent {}", i);
                    repo.create(fields).await.unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(repo.list().await.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_mutations_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(repo_in(&dir));

        let mut seeded = Vec::new();
        for i in 0..12 {
            let mut fields = hello();
            fields.title = format!("Seed {}", i);
            seeded.push(repo.create(fields).await.unwrap());
        }
        let (to_update, to_delete) = seeded.split_at(6);

        let mut handles = Vec::new();
        for (i, post) in to_update.iter().enumerate() {
            let repo = repo.clone();
            let id = post.id.clone();
            handles.push(tokio::spawn(async move {
                let patch = PostPatch::title(format!("Updated {}", i));
                assert!(repo.update(&id, patch).await.unwrap().is_some());
            }));
        }
        for post in to_delete {
            let repo = repo.clone();
            let id = post.id.clone();
            handles.push(tokio::spawn(async move {
                assert!(repo.delete(&id).await.unwrap());
            }));
        }
        for i in 0..6 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let mut fields = hello();
                fields.title = format!("Fresh {}", i);
                repo.create(fields).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let posts = repo.list().await;
        assert_eq!(posts.len(), 12);
        for (i, post) in to_update.iter().enumerate() {
            let stored = repo.get(&post.id).await.unwrap();
            assert_eq!(stored.title, format!("Updated {}", i));
        }
        for post in to_delete {
            assert_eq!(repo.get(&post.id).await, None);
        }
        for i in 0..6 {
            let title = format!("Fresh {}", i);
            assert!(posts.iter().any(|post| post.title == title));
        }
    }

    #[tokio::test]
    async fn test_storage_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let repo = JsonPostRepository::new(blocker.join("posts.json"));

        let err = repo.create(hello()).await.unwrap_err();
        assert!(matches!(err, Error::StorageWrite { .. }));
    }
}
