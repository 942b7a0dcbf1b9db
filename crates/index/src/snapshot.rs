//! Built index snapshots and their atomic publication.
//!
//! A snapshot is immutable once built. Readers hold an `Arc` to the
//! snapshot they started with; a rebuild publishes a new one by swapping
//! the pointer, so in-flight queries are never affected.

use crate::geometry::{IndexGeometry, IndexKind, VectorIndex};
use crate::types::IndexableDocument;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Descriptive header stored with every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Embedding model that produced the vectors
    pub model: String,
    pub dimension: usize,
    pub kind: IndexKind,
    pub clusters: Option<usize>,
    pub documents: usize,
    pub built_at: DateTime<Utc>,
}

/// An index together with the documents its rows refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    manifest: SnapshotManifest,
    documents: Vec<IndexableDocument>,
    index: IndexGeometry,
}

impl Snapshot {
    /// Assemble a snapshot, checking that documents and rows line up.
    pub fn new(
        manifest: SnapshotManifest,
        documents: Vec<IndexableDocument>,
        index: IndexGeometry,
    ) -> Result<Self, String> {
        index.validate()?;

        if documents.len() != index.len() {
            return Err(format!(
                "{} documents for {} index rows",
                documents.len(),
                index.len()
            ));
        }
        if manifest.documents != documents.len() {
            return Err(format!(
                "manifest declares {} documents, found {}",
                manifest.documents,
                documents.len()
            ));
        }
        if manifest.dimension != index.dimension() {
            return Err(format!(
                "manifest declares dimension {}, index has {}",
                manifest.dimension,
                index.dimension()
            ));
        }
        if manifest.kind != index.kind() {
            return Err(format!(
                "manifest declares a {} index, found {}",
                manifest.kind,
                index.kind()
            ));
        }
        if manifest.clusters != index.cluster_count() {
            return Err(format!(
                "manifest declares {:?} clusters, index has {:?}",
                manifest.clusters,
                index.cluster_count()
            ));
        }

        Ok(Self {
            manifest,
            documents,
            index,
        })
    }

    pub fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    pub fn documents(&self) -> &[IndexableDocument] {
        &self.documents
    }

    pub fn document(&self, row: usize) -> Option<&IndexableDocument> {
        self.documents.get(row)
    }

    pub fn index(&self) -> &IndexGeometry {
        &self.index
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Holder of the currently published value.
///
/// The lock guards only the pointer swap; readers clone the `Arc` and
/// release it immediately.
#[derive(Debug)]
pub struct Published<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Default for Published<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T> Published<T> {
    pub fn current(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    /// Replace the published value, returning the previous one.
    pub fn publish(&self, value: Arc<T>) -> Option<Arc<T>> {
        self.slot.write().replace(value)
    }
}

pub type SnapshotStore = Published<Snapshot>;

/// Ensures at most one build runs at a time.
#[derive(Debug, Default)]
pub struct BuildLock {
    busy: AtomicBool,
}

impl BuildLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock, or `None` when a build is already running.
    pub fn try_acquire(&self) -> Option<BuildPermit<'_>> {
        self.claim().then(|| BuildPermit { lock: self })
    }

    /// Like `try_acquire`, but the permit can move into a spawned task.
    pub fn try_acquire_owned(self: &Arc<Self>) -> Option<OwnedBuildPermit> {
        self.claim().then(|| OwnedBuildPermit { lock: self.clone() })
    }

    fn claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the build lock when dropped.
#[derive(Debug)]
pub struct BuildPermit<'a> {
    lock: &'a BuildLock,
}

impl Drop for BuildPermit<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

/// Owned form of [`BuildPermit`].
#[derive(Debug)]
pub struct OwnedBuildPermit {
    lock: Arc<BuildLock>,
}

impl Drop for OwnedBuildPermit {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlatIndex;
    use crate::types::RecordId;

    fn tiny_snapshot() -> Snapshot {
        let index = FlatIndex::from_rows(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let documents = vec![
            IndexableDocument {
                text: "first".to_string(),
                source_id: RecordId::Int(1),
            },
            IndexableDocument {
                text: "second".to_string(),
                source_id: RecordId::Int(2),
            },
        ];
        let manifest = SnapshotManifest {
            model: "test".to_string(),
            dimension: 2,
            kind: IndexKind::Flat,
            clusters: None,
            documents: 2,
            built_at: Utc::now(),
        };
        Snapshot::new(manifest, documents, IndexGeometry::Flat(index)).unwrap()
    }

    #[test]
    fn test_snapshot_rejects_misaligned_documents() {
        let snapshot = tiny_snapshot();
        let mut documents = snapshot.documents().to_vec();
        documents.pop();

        let mut manifest = snapshot.manifest().clone();
        manifest.documents = 1;

        let result = Snapshot::new(manifest, documents, snapshot.index().clone());
        assert!(result.unwrap_err().contains("documents for 2 index rows"));
    }

    #[test]
    fn test_snapshot_rejects_wrong_manifest_dimension() {
        let snapshot = tiny_snapshot();
        let mut manifest = snapshot.manifest().clone();
        manifest.dimension = 3;

        let result = Snapshot::new(
            manifest,
            snapshot.documents().to_vec(),
            snapshot.index().clone(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_swaps_without_disturbing_readers() {
        let store = SnapshotStore::default();
        assert!(store.current().is_none());

        let first = Arc::new(tiny_snapshot());
        assert!(store.publish(first.clone()).is_none());

        let reader = store.current().unwrap();
        let second = Arc::new(tiny_snapshot());
        let previous = store.publish(second.clone()).unwrap();

        assert!(Arc::ptr_eq(&previous, &first));
        assert!(Arc::ptr_eq(&reader, &first));
        assert!(Arc::ptr_eq(&store.current().unwrap(), &second));
    }

    #[test]
    fn test_build_lock_is_exclusive() {
        let lock = BuildLock::new();
        let permit = lock.try_acquire();
        assert!(permit.is_some());
        assert!(lock.is_busy());
        assert!(lock.try_acquire().is_none());

        drop(permit);
        assert!(!lock.is_busy());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_owned_permit_outlives_its_borrower() {
        let lock = Arc::new(BuildLock::new());
        let permit = lock.try_acquire_owned().unwrap();
        assert!(lock.try_acquire().is_none());
        assert!(lock.try_acquire_owned().is_none());

        let handle = std::thread::spawn(move || drop(permit));
        handle.join().unwrap();
        assert!(!lock.is_busy());
    }
}
