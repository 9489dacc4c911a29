//! Object storage for uploaded originals and their variants.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{key}`")]
    InvalidKey { key: String },
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("object payload is empty")]
    EmptyPayload,
    #[error("object size exceeds supported range")]
    SizeOverflow,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata describing an object after upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub checksum: String,
    pub size_bytes: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<StoredObject, ObjectStoreError>;

    async fn download(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    /// Remove an object. Missing objects are treated as success.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Public URL of an object.
    fn file_url(&self, key: &str) -> String;

    /// Time-limited URL of an object.
    fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}

/// Filesystem-backed object store served under `public_base`.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base: String,
    presign_secret: String,
}

impl FsObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(
        root: PathBuf,
        public_base: impl Into<String>,
        presign_secret: impl Into<String>,
    ) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        let public_base = public_base.into().trim_end_matches('/').to_string();
        Ok(Self {
            root,
            public_base,
            presign_secret: presign_secret.into(),
        })
    }

    /// Check a presigned URL's query parameters.
    ///
    /// The digest comparison runs in constant time.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < OffsetDateTime::now_utc().unix_timestamp() {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let expected = signature_digest(&self.presign_secret, key, expires);
        expected.as_slice().ct_eq(&provided).unwrap_u8() == 1
    }

    /// Resolve the absolute filesystem path for an object key.
    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ObjectStoreError::InvalidKey {
                key: key.to_string(),
            });
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Bytes,
    ) -> Result<StoredObject, ObjectStoreError> {
        if bytes.is_empty() {
            return Err(ObjectStoreError::EmptyPayload);
        }
        let absolute = self.resolve(key)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = file.write_all(&bytes).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;

        let checksum = hex::encode(Sha256::digest(&bytes));
        let size_bytes =
            i64::try_from(bytes.len()).map_err(|_| ObjectStoreError::SizeOverflow)?;

        Ok(StoredObject {
            key: key.to_string(),
            checksum,
            size_bytes,
        })
    }

    async fn download(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let absolute = self.resolve(key)?;
        match fs::read(absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let absolute = self.resolve(key)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    fn file_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        self.resolve(key)?;
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| ObjectStoreError::SizeOverflow)?;
        let expires = OffsetDateTime::now_utc()
            .unix_timestamp()
            .checked_add(ttl)
            .ok_or(ObjectStoreError::SizeOverflow)?;
        let signature = sign(&self.presign_secret, key, expires);
        Ok(format!(
            "{}?expires={expires}&signature={signature}",
            self.file_url(key)
        ))
    }
}

/// Object key for a new upload: `{yyyy}/{mm}/{dd}/{uuid}-{sanitised name}`.
pub fn object_key_for(original_name: &str) -> String {
    let (year, month, day) = OffsetDateTime::now_utc().to_calendar_date();
    let directory = format!("{year}/{:02}/{:02}", month as u8, day);
    let identifier = Uuid::new_v4();
    let filename = sanitize_filename(original_name);
    format!("{directory}/{identifier}-{filename}")
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("upload");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "upload".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.chars().all(|ch| ch.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

fn signature_digest(secret: &str, key: &str, expires: i64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(expires.to_string().as_bytes());
    hasher.finalize().to_vec()
}

fn sign(secret: &str, key: &str, expires: i64) -> String {
    hex::encode(signature_digest(secret, key, expires))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().join("media"), "/media/", "secret")
            .expect("create store");
        (dir, store)
    }

    #[tokio::test]
    async fn upload_download_delete() {
        let (_dir, store) = store();
        let stored = store
            .upload("2025/01/01/a.png", "image/png", Bytes::from_static(b"payload"))
            .await
            .expect("upload");
        assert_eq!(stored.size_bytes, 7);
        assert_eq!(stored.checksum.len(), 64);

        let bytes = store.download("2025/01/01/a.png").await.expect("download");
        assert_eq!(bytes, Bytes::from_static(b"payload"));

        store.delete("2025/01/01/a.png").await.expect("delete");
        store.delete("2025/01/01/a.png").await.expect("delete twice");
        assert!(matches!(
            store.download("2025/01/01/a.png").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_dir, store) = store();
        for key in ["../escape.png", "/etc/passwd", "a/../../b", ""] {
            let err = store
                .upload(key, "image/png", Bytes::from_static(b"x"))
                .await
                .expect_err("invalid key");
            assert!(matches!(err, ObjectStoreError::InvalidKey { .. }), "{key}");
        }
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let (_dir, store) = store();
        let err = store
            .upload("a.png", "image/png", Bytes::new())
            .await
            .expect_err("empty");
        assert!(matches!(err, ObjectStoreError::EmptyPayload));
    }

    #[test]
    fn presigned_urls_verify_until_expiry() {
        let (_dir, store) = store();
        let url = store
            .presigned_url("a.png", Duration::from_secs(60))
            .expect("presign");
        assert!(url.starts_with("/media/a.png?expires="));

        let query = url.split_once('?').expect("query").1;
        let mut expires = 0;
        let mut signature = "";
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse().expect("expires"),
                Some(("signature", value)) => signature = value,
                _ => {}
            }
        }
        assert!(store.verify_signature("a.png", expires, signature));
        assert!(!store.verify_signature("b.png", expires, signature));
        assert!(!store.verify_signature("a.png", expires - 3600, &sign("secret", "a.png", expires - 3600)));
    }

    #[test]
    fn same_length_forgeries_are_rejected() {
        let (_dir, store) = store();
        let expires = OffsetDateTime::now_utc().unix_timestamp() + 60;
        let genuine = sign("secret", "a.png", expires);
        assert!(store.verify_signature("a.png", expires, &genuine));

        let mut forged = genuine.clone().into_bytes();
        let last = forged.len() - 1;
        forged[last] = if forged[last] == b'0' { b'1' } else { b'0' };
        let forged = String::from_utf8(forged).expect("ascii");
        assert_eq!(forged.len(), genuine.len());
        assert!(!store.verify_signature("a.png", expires, &forged));

        assert!(!store.verify_signature("a.png", expires, &genuine[..genuine.len() - 2]));
        assert!(!store.verify_signature("a.png", expires, "not-hex"));
        assert!(!store.verify_signature("a.png", expires, ""));
    }

    #[test]
    fn object_keys_are_dated_and_sanitised() {
        let key = object_key_for("My Holiday Photo.JPG");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[3].ends_with("-my-holiday-photo.jpg"));
    }
}
