//! Upload records and the identity row
//!
//! Two backends:
//!   - **Memory**: for tests and throwaway daemons.
//!   - **JSON**: loads entirely into memory, flushed atomically via temp+rename
//!     after every mutation.
//!
//! Both enforce the zero-or-one identity invariant in
//! `insert_identity_if_absent`, under the same lock that guards the read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zkv_core::types::{IdentityRecord, UploadRecord};
use zkv_core::{ZkvError, ZkvResult};

/// Persistent record store used by the daemon.
pub trait MetadataStore: Send + Sync {
    /// Commit a fully verified upload record.
    fn insert(&self, record: UploadRecord) -> ZkvResult<Uuid>;

    fn get(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>>;

    /// All records, oldest first.
    fn list(&self) -> ZkvResult<Vec<UploadRecord>>;

    /// Remove and return a record.
    fn delete(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>>;

    fn get_identity(&self) -> ZkvResult<Option<IdentityRecord>>;

    /// Store the identity only if none exists. Returns false when one did.
    fn insert_identity_if_absent(&self, identity: IdentityRecord) -> ZkvResult<bool>;

    /// Replace the existing identity. Errors if there is none.
    fn update_identity(&self, identity: IdentityRecord) -> ZkvResult<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    identity: Option<IdentityRecord>,
    #[serde(default)]
    uploads: BTreeMap<Uuid, UploadRecord>,
}

impl Snapshot {
    fn insert(&mut self, record: UploadRecord) -> ZkvResult<Uuid> {
        if !record.is_well_ordered() {
            return Err(ZkvError::protocol("chunk descriptors out of index order"));
        }
        let id = record.id;
        if self.uploads.contains_key(&id) {
            return Err(ZkvError::storage(format!("duplicate upload id {id}")));
        }
        self.uploads.insert(id, record);
        Ok(id)
    }

    fn list(&self) -> Vec<UploadRecord> {
        let mut records: Vec<UploadRecord> = self.uploads.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    fn insert_identity_if_absent(&mut self, identity: IdentityRecord) -> bool {
        if self.identity.is_some() {
            return false;
        }
        self.identity = Some(identity);
        true
    }

    fn update_identity(&mut self, identity: IdentityRecord) -> ZkvResult<()> {
        match self.identity.as_mut() {
            Some(existing) => {
                *existing = identity;
                Ok(())
            }
            None => Err(ZkvError::storage("no identity to update")),
        }
    }
}

fn lock(state: &Mutex<Snapshot>) -> MutexGuard<'_, Snapshot> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local record store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    state: Mutex<Snapshot>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn insert(&self, record: UploadRecord) -> ZkvResult<Uuid> {
        lock(&self.state).insert(record)
    }

    fn get(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>> {
        Ok(lock(&self.state).uploads.get(id).cloned())
    }

    fn list(&self) -> ZkvResult<Vec<UploadRecord>> {
        Ok(lock(&self.state).list())
    }

    fn delete(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>> {
        Ok(lock(&self.state).uploads.remove(id))
    }

    fn get_identity(&self) -> ZkvResult<Option<IdentityRecord>> {
        Ok(lock(&self.state).identity.clone())
    }

    fn insert_identity_if_absent(&self, identity: IdentityRecord) -> ZkvResult<bool> {
        Ok(lock(&self.state).insert_identity_if_absent(identity))
    }

    fn update_identity(&self, identity: IdentityRecord) -> ZkvResult<()> {
        lock(&self.state).update_identity(identity)
    }
}

/// Record store persisted to a single JSON file.
///
/// A mutation that fails to reach disk is rolled back in memory.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl JsonMetadataStore {
    /// Load or create a store at `path`. A missing file starts empty.
    pub fn open(path: &Path) -> ZkvResult<Self> {
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                ZkvError::storage(format!("parsing metadata {}: {e}", path.display()))
            })?
        } else {
            Snapshot::default()
        };

        tracing::debug!(
            path = %path.display(),
            uploads = snapshot.uploads.len(),
            registered = snapshot.identity.is_some(),
            "opened metadata store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to a copy of the state, persist it, then publish it.
    fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> ZkvResult<T>) -> ZkvResult<T> {
        let mut guard = lock(&self.state);
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.flush(&next)?;
        *guard = next;
        Ok(out)
    }

    fn flush(&self, snapshot: &Snapshot) -> ZkvResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| ZkvError::storage(format!("serializing metadata: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl MetadataStore for JsonMetadataStore {
    fn insert(&self, record: UploadRecord) -> ZkvResult<Uuid> {
        self.mutate(|s| s.insert(record))
    }

    fn get(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>> {
        Ok(lock(&self.state).uploads.get(id).cloned())
    }

    fn list(&self) -> ZkvResult<Vec<UploadRecord>> {
        Ok(lock(&self.state).list())
    }

    fn delete(&self, id: &Uuid) -> ZkvResult<Option<UploadRecord>> {
        if !lock(&self.state).uploads.contains_key(id) {
            return Ok(None);
        }
        self.mutate(|s| Ok(s.uploads.remove(id)))
    }

    fn get_identity(&self) -> ZkvResult<Option<IdentityRecord>> {
        Ok(lock(&self.state).identity.clone())
    }

    fn insert_identity_if_absent(&self, identity: IdentityRecord) -> ZkvResult<bool> {
        if lock(&self.state).identity.is_some() {
            return Ok(false);
        }
        self.mutate(|s| Ok(s.insert_identity_if_absent(identity)))
    }

    fn update_identity(&self, identity: IdentityRecord) -> ZkvResult<()> {
        self.mutate(|s| s.update_identity(identity))
    }
}
