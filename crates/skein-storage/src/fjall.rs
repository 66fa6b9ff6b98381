use std::path::Path;
use std::sync::Arc;

use fjall::Readable;
use skein_types::SkeinError;

use crate::keys::Namespace;
use crate::traits::{MeshRead, MeshStore};
use crate::types::{WriteBatch, WriteOp};

fn fjall_err(e: fjall::Error) -> SkeinError {
    SkeinError::Storage(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> SkeinError {
    SkeinError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// FjallStore: one keyspace per namespace in a shared database
// ---------------------------------------------------------------------------

struct FjallInner {
    db: fjall::Database,
    /// Indexed by `Namespace::ordinal`.
    keyspaces: Vec<fjall::Keyspace>,
}

impl FjallInner {
    fn keyspace(&self, ns: Namespace) -> &fjall::Keyspace {
        &self.keyspaces[ns.ordinal()]
    }
}

/// Durable `MeshStore`.
///
/// All namespaces live in a single fjall `Database` so that cross-namespace
/// write batches are atomic. All blocking I/O is wrapped in
/// `tokio::task::spawn_blocking`. Clones share the same database.
#[derive(Clone)]
pub struct FjallStore {
    inner: Arc<FjallInner>,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Self, SkeinError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let keyspaces = Namespace::ALL
            .iter()
            .map(|ns| db.keyspace(ns.as_str(), fjall::KeyspaceCreateOptions::default))
            .collect::<Result<Vec<_>, _>>()
            .map_err(fjall_err)?;
        tracing::debug!(path = %path.display(), "opened fjall store");
        Ok(FjallStore { inner: Arc::new(FjallInner { db, keyspaces }) })
    }
}

fn collect_scan(iter: fjall::Iter) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
    iter.map(|g| {
        g.into_inner().map_err(fjall_err).and_then(|(k, v)| {
            let key = String::from_utf8(k.to_vec()).map_err(|e| SkeinError::Storage(e.to_string()))?;
            Ok((key, v.to_vec()))
        })
    })
    .collect()
}

impl MeshRead for FjallStore {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, SkeinError> {
        let inner = self.inner.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, SkeinError> {
            Ok(inner
                .keyspace(ns)
                .get(key.as_bytes())
                .map_err(fjall_err)?
                .map(|v| v.to_vec()))
        })
        .await
        .map_err(join_err)?
    }

    async fn scan(&self, ns: Namespace) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || collect_scan(inner.keyspace(ns).prefix(b"")))
            .await
            .map_err(join_err)?
    }
}

impl MeshStore for FjallStore {
    type ReadView = FjallReadView;

    async fn read_view(&self) -> Result<FjallReadView, SkeinError> {
        Ok(FjallReadView { inner: self.inner.clone(), snapshot: self.inner.db.snapshot() })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), SkeinError> {
        if batch.is_empty() {
            return Ok(());
        }
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || -> Result<(), SkeinError> {
            let mut b = inner.db.batch();
            for op in batch.into_ops() {
                match op {
                    WriteOp::Put { ns, key, value } => {
                        b.insert(inner.keyspace(ns), key.into_bytes(), value);
                    }
                    WriteOp::Delete { ns, key } => {
                        b.remove(inner.keyspace(ns), key.into_bytes());
                    }
                }
            }
            b.commit().map_err(fjall_err)
        })
        .await
        .map_err(join_err)?
    }
}

/// A fjall cross-keyspace snapshot. Reads through it see the database as of
/// the sequence number it was opened at.
#[derive(Clone)]
pub struct FjallReadView {
    inner: Arc<FjallInner>,
    snapshot: fjall::Snapshot,
}

impl MeshRead for FjallReadView {
    async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, SkeinError> {
        let view = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, SkeinError> {
            Ok(view
                .snapshot
                .get(view.inner.keyspace(ns), key.as_bytes())
                .map_err(fjall_err)?
                .map(|v| v.to_vec()))
        })
        .await
        .map_err(join_err)?
    }

    async fn scan(&self, ns: Namespace) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
        let view = self.clone();
        tokio::task::spawn_blocking(move || {
            collect_scan(view.snapshot.prefix(view.inner.keyspace(ns), b""))
        })
        .await
        .map_err(join_err)?
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
