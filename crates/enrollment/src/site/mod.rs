//! Public site content, result documents and downloadable files.

pub mod content;
pub mod files;
pub mod router;

pub use content::{ContentError, ContentStore, ContentUpdate, SiteContent};
pub use files::{sanitize_filename, FileStore, FileStoreError, StoredFile};
pub use router::site_router;
