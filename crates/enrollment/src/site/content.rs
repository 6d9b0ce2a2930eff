use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Homepage text managed from the staff console.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContent {
    pub announcement_title: Option<String>,
    pub announcement_subtitle: Option<String>,
    pub announcement_message: Option<String>,
    pub information_html: Option<String>,
}

/// Partial edit: an absent field keeps its value, a blank one clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentUpdate {
    pub announcement_title: Option<String>,
    pub announcement_subtitle: Option<String>,
    pub announcement_message: Option<String>,
    pub information_html: Option<String>,
}

impl SiteContent {
    pub fn apply(&mut self, update: ContentUpdate) {
        merge(&mut self.announcement_title, update.announcement_title);
        merge(&mut self.announcement_subtitle, update.announcement_subtitle);
        merge(&mut self.announcement_message, update.announcement_message);
        merge(&mut self.information_html, update.information_html);
    }
}

fn merge(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *slot = if value.trim().is_empty() {
            None
        } else {
            Some(value)
        };
    }
}

/// JSON document on disk. Updates read, merge and rewrite the whole document under one
/// mutex and land through a temp file rename.
pub struct ContentStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ContentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content. A missing file reads as empty content.
    pub fn load(&self) -> Result<SiteContent, ContentError> {
        let _guard = self.lock.lock().map_err(|_| ContentError::Poisoned)?;
        self.read()
    }

    pub fn update(&self, update: ContentUpdate) -> Result<SiteContent, ContentError> {
        let _guard = self.lock.lock().map_err(|_| ContentError::Poisoned)?;
        let mut content = self.read()?;
        content.apply(update);
        self.write(&content)?;
        tracing::info!(path = %self.path.display(), "site content updated");
        Ok(content)
    }

    fn read(&self) -> Result<SiteContent, ContentError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(SiteContent::default())
            }
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(SiteContent::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, content: &SiteContent) -> Result<(), ContentError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, content)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| ContentError::Io(err.error))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("site content is unreadable: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("site content lock poisoned")]
    Poisoned,
}
