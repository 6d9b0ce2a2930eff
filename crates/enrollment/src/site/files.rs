use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::applications::PhotoRole;
use crate::config::StorageConfig;

const UPLOADS_PREFIX: &str = "uploads/";
const PHOTO_NAME_ATTEMPTS: usize = 8;

/// File bytes plus the content type guessed from the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Upload, result and image directories under the static root.
#[derive(Debug, Clone)]
pub struct FileStore {
    uploads_dir: PathBuf,
    results_dir: PathBuf,
    images_dir: PathBuf,
}

impl FileStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            uploads_dir: storage.uploads_dir(),
            results_dir: storage.results_dir(),
            images_dir: storage.images_dir(),
        }
    }

    /// Lays the three directories out under `static_dir`.
    pub fn under(static_dir: &Path) -> Self {
        Self {
            uploads_dir: static_dir.join("uploads"),
            results_dir: static_dir.join("results"),
            images_dir: static_dir.join("images"),
        }
    }

    /// Writes a photo as `<role>_<YYYYmmdd_HHMMSS>_<name>` and returns its `uploads/...`
    /// reference. An existing upload is never replaced: on a name clash a short random
    /// tag goes in front of `<name>`.
    pub fn save_photo(
        &self,
        role: PhotoRole,
        original_name: &str,
        bytes: &[u8],
        at: DateTime<Utc>,
    ) -> Result<String, FileStoreError> {
        let name = sanitize_filename(original_name)
            .ok_or_else(|| FileStoreError::InvalidName(original_name.to_string()))?;
        let prefix = format!("{}_{}", role.label(), at.format("%Y%m%d_%H%M%S"));

        fs::create_dir_all(&self.uploads_dir)?;
        let mut file_name = format!("{prefix}_{name}");
        for _ in 0..PHOTO_NAME_ATTEMPTS {
            match write_new(&self.uploads_dir.join(&file_name), bytes) {
                Ok(()) => {
                    tracing::debug!(file = %file_name, size = bytes.len(), "photo stored");
                    return Ok(format!("{UPLOADS_PREFIX}{file_name}"));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    let tag = uuid::Uuid::new_v4().simple().to_string();
                    file_name = format!("{prefix}_{}_{name}", &tag[..8]);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free upload name").into())
    }

    /// Best-effort removal of a photo written by [`FileStore::save_photo`].
    pub fn remove_upload(&self, reference: &str) {
        let Some(path) = reference
            .strip_prefix(UPLOADS_PREFIX)
            .and_then(|name| contained(&self.uploads_dir, name))
        else {
            tracing::warn!(reference, "refusing to remove unrecognised upload reference");
            return;
        };
        if let Err(err) = fs::remove_file(&path) {
            tracing::warn!(error = %err, path = %path.display(), "failed to remove upload");
        }
    }

    /// Stores a result document under its sanitized name, replacing any previous copy.
    pub fn save_result(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        let name = sanitize_filename(original_name)
            .ok_or_else(|| FileStoreError::InvalidName(original_name.to_string()))?;
        fs::create_dir_all(&self.results_dir)?;
        fs::write(self.results_dir.join(&name), bytes)?;
        tracing::info!(file = %name, size = bytes.len(), "result document stored");
        Ok(name)
    }

    /// Result documents, sorted by name. A missing directory lists as empty.
    pub fn list_results(&self) -> Result<Vec<String>, FileStoreError> {
        let entries = match fs::read_dir(&self.results_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn open_result(&self, name: &str) -> Result<StoredFile, FileStoreError> {
        read_within(&self.results_dir, name)
    }

    pub fn open_image(&self, name: &str) -> Result<StoredFile, FileStoreError> {
        read_within(&self.images_dir, name)
    }
}

/// Creates `path`, failing with `AlreadyExists` instead of truncating another file.
fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(err) = file.write_all(bytes) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err);
    }
    Ok(())
}

/// Joins `name` onto `dir` only when it is a plain file name.
fn contained(dir: &Path, name: &str) -> Option<PathBuf> {
    match sanitize_filename(name) {
        Some(clean) if clean == name => Some(dir.join(clean)),
        _ => None,
    }
}

fn read_within(dir: &Path, name: &str) -> Result<StoredFile, FileStoreError> {
    let path = contained(dir, name).ok_or_else(|| FileStoreError::NotFound(name.to_string()))?;
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(FileStoreError::NotFound(name.to_string()))
        }
        Err(err) => return Err(err.into()),
    };

    Ok(StoredFile {
        name: name.to_string(),
        content_type: mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        bytes,
    })
}

/// Reduces an uploaded name to its last path component made of ASCII letters, digits,
/// `.`, `-` and `_`. Leading dots are dropped so the result is never hidden or `..`.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            ' ' => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),
    #[error("file '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::under(dir.path());
        (dir, store)
    }

    #[test]
    fn sanitizes_names_down_to_a_single_component() {
        assert_eq!(sanitize_filename("photo.jpg").as_deref(), Some("photo.jpg"));
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\my photo.png").as_deref(),
            Some("my_photo.png")
        );
        assert_eq!(sanitize_filename("..").as_deref(), None);
        assert_eq!(sanitize_filename("").as_deref(), None);
        assert_eq!(sanitize_filename(".env").as_deref(), Some("env"));
    }

    #[test]
    fn photos_are_prefixed_with_role_and_timestamp() {
        let (_dir, store) = store();
        let at = Utc
            .with_ymd_and_hms(2025, 1, 6, 8, 30, 5)
            .single()
            .expect("timestamp");

        let reference = store
            .save_photo(PhotoRole::Father, "../dad.jpg", b"jpeg", at)
            .expect("saved");
        assert_eq!(reference, "uploads/father_20250106_083005_dad.jpg");
        assert!(store.uploads_dir.join("father_20250106_083005_dad.jpg").exists());

        store.remove_upload(&reference);
        assert!(!store.uploads_dir.join("father_20250106_083005_dad.jpg").exists());
    }

    #[test]
    fn same_named_photos_in_the_same_second_never_collide() {
        let (_dir, store) = store();
        let at = Utc
            .with_ymd_and_hms(2025, 1, 6, 8, 30, 5)
            .single()
            .expect("timestamp");

        let first = store
            .save_photo(PhotoRole::Father, "photo.jpg", b"AAAA", at)
            .expect("first saved");
        let second = store
            .save_photo(PhotoRole::Father, "photo.jpg", b"BBBB", at)
            .expect("second saved");

        assert_eq!(first, "uploads/father_20250106_083005_photo.jpg");
        assert_ne!(first, second);
        assert!(second.starts_with("uploads/father_20250106_083005_"));
        assert!(second.ends_with("_photo.jpg"));

        let read = |reference: &str| {
            let name = reference.strip_prefix("uploads/").expect("uploads reference");
            std::fs::read(store.uploads_dir.join(name)).expect("read back")
        };
        assert_eq!(read(&first), b"AAAA");
        assert_eq!(read(&second), b"BBBB");
    }

    #[test]
    fn results_round_trip_and_list_sorted() {
        let (_dir, store) = store();
        assert!(store.list_results().expect("list").is_empty());

        store.save_result("term2.pdf", b"%PDF-2").expect("saved");
        store.save_result("term1.pdf", b"%PDF-1").expect("saved");
        assert_eq!(
            store.list_results().expect("list"),
            vec!["term1.pdf".to_string(), "term2.pdf".to_string()]
        );

        let file = store.open_result("term1.pdf").expect("open");
        assert_eq!(file.bytes, b"%PDF-1");
        assert_eq!(file.content_type, "application/pdf");
    }

    #[test]
    fn lookups_never_escape_their_directory() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("secret.txt"), b"secret").expect("write");

        for name in ["../secret.txt", "..", "nested/secret.txt", "missing.png"] {
            assert!(
                matches!(store.open_image(name), Err(FileStoreError::NotFound(_))),
                "{name}"
            );
        }
    }
}
