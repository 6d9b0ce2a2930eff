use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::applications::{AdmissionService, PhotoRole, PhotoUpload};
use crate::fixtures::{new_applicant, new_staff};
use crate::identity::{ApplicantAccount, Permission, PermissionSet, StaffAccount, StaffRole};
use crate::site::FileStore;
use crate::store::{AccountRepository, MemoryStore};

pub(super) struct Harness {
    pub(super) dir: TempDir,
    pub(super) store: Arc<MemoryStore>,
    pub(super) service: AdmissionService<MemoryStore>,
}

pub(super) fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(MemoryStore::new());
    let files = Arc::new(FileStore::under(dir.path()));
    let service = AdmissionService::new(store.clone(), files);
    Harness {
        dir,
        store,
        service,
    }
}

impl Harness {
    pub(super) fn applicant(&self, email: &str) -> ApplicantAccount {
        self.store
            .insert_applicant(new_applicant(email))
            .expect("applicant")
    }

    pub(super) fn staff(&self, email: &str, permissions: &[Permission]) -> StaffAccount {
        self.store
            .insert_staff(new_staff(
                email,
                StaffRole::Admin,
                PermissionSet::granted(permissions.iter().copied()),
            ))
            .expect("staff")
    }

    pub(super) fn uploads(&self) -> Vec<String> {
        list(&self.dir.path().join("uploads"))
    }
}

pub(super) fn photo(role: PhotoRole, file_name: &str) -> PhotoUpload {
    PhotoUpload {
        role,
        file_name: file_name.to_string(),
        bytes: b"\x89PNG fake image".to_vec(),
    }
}

fn list(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
