//! Illustration blob storage.
//!
//! Object keys are deterministic per verse and variant
//! (`{song_id}/{verse_id}/full.png`), so regenerating a verse overwrites its
//! previous blobs in place. Only a reset leaves blobs behind that nothing
//! references; those are removed through [`IllustrationStore::delete`].

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Full,
    Thumbnail,
}

impl Variant {
    fn file_name(self) -> &'static str {
        match self {
            Variant::Full => "full.png",
            Variant::Thumbnail => "thumbnail.png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Storage key, relative to the store root.
    pub path: String,
    pub public_url: String,
}

pub fn object_key(song_id: Uuid, verse_id: Uuid, variant: Variant) -> String {
    format!("{}/{}/{}", song_id, verse_id, variant.file_name())
}

pub trait IllustrationStore: Send + Sync {
    fn upload(
        &self,
        song_id: Uuid,
        verse_id: Uuid,
        bytes: &[u8],
        variant: Variant,
    ) -> impl Future<Output = Result<StoredImage>> + Send;

    /// Remove a blob. Missing blobs are not an error.
    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Filesystem store served from `public_base_url` by whatever fronts it.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        LocalStore {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !clean {
            bail!("refusing storage path outside the store: {}", path);
        }
        Ok(self.root.join(relative))
    }
}

impl IllustrationStore for LocalStore {
    async fn upload(
        &self,
        song_id: Uuid,
        verse_id: Uuid,
        bytes: &[u8],
        variant: Variant,
    ) -> Result<StoredImage> {
        let key = object_key(song_id, verse_id, variant);
        let target = self.resolve(&key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(StoredImage {
            public_url: self.public_url(&key),
            path: key,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete {}", target.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_writes_under_root_and_maps_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "https://cdn.example/illustrations/");
        let song = Uuid::from_u128(1);
        let verse = Uuid::from_u128(2);

        let stored = store
            .upload(song, verse, b"image", Variant::Full)
            .await
            .unwrap();
        assert_eq!(stored.path, format!("{song}/{verse}/full.png"));
        assert_eq!(
            stored.public_url,
            format!("https://cdn.example/illustrations/{song}/{verse}/full.png")
        );
        let on_disk = std::fs::read(dir.path().join(&stored.path)).unwrap();
        assert_eq!(on_disk, b"image");
    }

    #[tokio::test]
    async fn upload_overwrites_same_variant() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "/illustrations");
        let (song, verse) = (Uuid::from_u128(1), Uuid::from_u128(2));

        store.upload(song, verse, b"old", Variant::Thumbnail).await.unwrap();
        let stored = store.upload(song, verse, b"new", Variant::Thumbnail).await.unwrap();
        assert!(stored.path.ends_with("thumbnail.png"));
        assert_eq!(std::fs::read(dir.path().join(&stored.path)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "/illustrations");
        let stored = store
            .upload(Uuid::from_u128(1), Uuid::from_u128(2), b"x", Variant::Full)
            .await
            .unwrap();

        store.delete(&stored.path).await.unwrap();
        assert!(!dir.path().join(&stored.path).exists());
        store.delete(&stored.path).await.unwrap();
    }

    #[tokio::test]
    async fn delete_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "/illustrations");
        assert!(store.delete("../etc/passwd").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
        assert!(store.delete("").await.is_err());
    }
}
