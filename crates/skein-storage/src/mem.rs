use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use skein_types::SkeinError;

use crate::keys::Namespace;
use crate::traits::{MeshRead, MeshStore};
use crate::types::{WriteBatch, WriteOp};

/// In-memory `MeshStore` backed by one `BTreeMap` keyed by namespace and key.
///
/// Intended for unit tests; not persisted across restarts. Clones share the
/// same data.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<Entries>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

type Entries = BTreeMap<(Namespace, String), Vec<u8>>;

fn scan_entries(map: &Entries, ns: Namespace) -> Vec<(String, Vec<u8>)> {
    map.range((ns, String::new())..)
        .take_while(|((n, _), _)| *n == ns)
        .map(|((_, k), v)| (k.clone(), v.clone()))
        .collect()
}

impl MeshRead for MemStore {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, SkeinError> {
        Ok(self.inner.read().await.get(&(ns, key.to_string())).cloned())
    }

    async fn scan(&self, ns: Namespace) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
        Ok(scan_entries(&*self.inner.read().await, ns))
    }
}

impl MeshStore for MemStore {
    type ReadView = MemReadView;

    /// Copies the map under one read guard.
    async fn read_view(&self) -> Result<MemReadView, SkeinError> {
        let entries = self.inner.read().await.clone();
        Ok(MemReadView { entries: Arc::new(entries) })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), SkeinError> {
        if batch.is_empty() {
            return Ok(());
        }
        // A single write guard makes the whole batch visible at once.
        let mut g = self.inner.write().await;
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { ns, key, value } => {
                    g.insert((ns, key), value);
                }
                WriteOp::Delete { ns, key } => {
                    g.remove(&(ns, key));
                }
            }
        }
        Ok(())
    }
}

/// Frozen copy of a [`MemStore`].
#[derive(Clone)]
pub struct MemReadView {
    entries: Arc<Entries>,
}

impl MeshRead for MemReadView {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, SkeinError> {
        Ok(self.entries.get(&(ns, key.to_string())).cloned())
    }

    async fn scan(&self, ns: Namespace) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
        Ok(scan_entries(&self.entries, ns))
    }
}
