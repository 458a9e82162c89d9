//! ImageStore - Uploaded Capture Persistence
//!
//! Stores camera uploads under a single directory and hands out opaque
//! `ImageRef`s (the stored file name). The decision flow only ever threads
//! the reference through; bytes are read back by the recognizer client.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Opaque reference to a stored capture image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public URL path the HTTP layer serves the image under
    pub fn public_path(&self) -> String {
        format!("/uploads/{}", self.0)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ImageStore instance
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Create store, making sure the directory exists
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory images are stored in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an upload, returning its reference
    ///
    /// Stored as `{unix_millis}-{uuid}-{original name with whitespace -> '_'}`,
    /// so two cameras sending the same file name never share a file.
    pub async fn save(&self, data: &[u8], original_name: &str) -> Result<ImageRef> {
        let name = stored_file_name(
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            original_name,
        );
        let path = self.dir.join(&name);
        fs::write(&path, data).await?;

        tracing::debug!(path = %path.display(), size = data.len(), "Capture image stored");

        Ok(ImageRef(name))
    }

    /// Resolve a reference to its on-disk path
    pub fn path_of(&self, image_ref: &ImageRef) -> Result<PathBuf> {
        let name = image_ref.as_str();
        let mut components = Path::new(name).components();
        let single_file = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_file || name.contains('\\') {
            return Err(Error::Validation(format!("Invalid image reference: {}", name)));
        }
        Ok(self.dir.join(name))
    }

    /// Read image bytes back
    pub async fn read(&self, image_ref: &ImageRef) -> Result<Vec<u8>> {
        let path = self.path_of(image_ref)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Image file not found: {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn stored_file_name(millis: i64, id: Uuid, original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("capture.jpg");
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let cleaned = if cleaned.is_empty() { "capture.jpg".to_string() } else { cleaned };
    format!("{}-{}-{}", millis, id.simple(), cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_file_name() {
        let id = Uuid::nil();
        let prefix = format!("42-{}", id.simple());
        assert_eq!(stored_file_name(42, id, "gate cam 1.jpg"), format!("{prefix}-gate_cam_1.jpg"));
        assert_eq!(stored_file_name(42, id, "../../etc/passwd"), format!("{prefix}-passwd"));
        assert_eq!(stored_file_name(42, id, ""), format!("{prefix}-capture.jpg"));
    }

    #[test]
    fn test_image_ref_public_path() {
        assert_eq!(ImageRef::new("1-a.jpg").public_path(), "/uploads/1-a.jpg");
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let dir = std::env::temp_dir().join(format!("parkgate-img-{}", uuid::Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).await.unwrap();

        let image_ref = store.save(b"jpegbytes", "entry.jpg").await.unwrap();
        assert!(image_ref.as_str().ends_with("-entry.jpg"));
        assert_eq!(store.read(&image_ref).await.unwrap(), b"jpegbytes");

        let missing = store.read(&ImageRef::new("nope.jpg")).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_same_name_uploads_kept_apart() {
        let dir = std::env::temp_dir().join(format!("parkgate-img-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).await.unwrap();

        let first = store.save(b"first", "cam.jpg").await.unwrap();
        let second = store.save(b"second", "cam.jpg").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.read(&first).await.unwrap(), b"first");
        assert_eq!(store.read(&second).await.unwrap(), b"second");

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_dotted_names_read_back() {
        let dir = std::env::temp_dir().join(format!("parkgate-img-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).await.unwrap();

        for name in ["car..jpg", "IMG..1.jpg"] {
            let image_ref = store.save(b"jpeg", name).await.unwrap();
            assert_eq!(store.read(&image_ref).await.unwrap(), b"jpeg");
        }

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn test_path_traversal_rejected() {
        let store = ImageStore { dir: PathBuf::from("/tmp/x") };
        assert!(store.path_of(&ImageRef::new("../secret")).is_err());
        assert!(store.path_of(&ImageRef::new("..")).is_err());
        assert!(store.path_of(&ImageRef::new("a/b.jpg")).is_err());
        assert!(store.path_of(&ImageRef::new("/etc/passwd")).is_err());
        assert!(store.path_of(&ImageRef::new("")).is_err());
        assert!(store.path_of(&ImageRef::new("1-car..jpg")).is_ok());
    }
}
