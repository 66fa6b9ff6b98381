use std::future::Future;

use skein_types::SkeinError;

use crate::keys::Namespace;
use crate::types::WriteBatch;

/// Read access to the store, or to a frozen view of it.
///
/// Methods use RPITIT (`-> impl Future + Send`) so that generic callers can
/// `.await` across thread boundaries without an `async-trait` dependency.
pub trait MeshRead: Send + Sync + 'static {
    /// Read one key.
    fn get(&self, ns: Namespace, key: &str)
        -> impl Future<Output = Result<Option<Vec<u8>>, SkeinError>> + Send;

    /// Every `(key, value)` in the namespace, in key order.
    fn scan(&self, ns: Namespace)
        -> impl Future<Output = Result<Vec<(String, Vec<u8>)>, SkeinError>> + Send;
}

/// Transactional backing store shared by every typed repository.
///
/// A handle is passed explicitly into every repository call; there is no
/// ambient store.
pub trait MeshStore: MeshRead {
    /// Point-in-time view returned by [`MeshStore::read_view`].
    type ReadView: MeshRead;

    /// Freeze the current state across all namespaces. Commits made after
    /// this returns are not visible through the view, and holding it blocks
    /// no writer.
    fn read_view(&self) -> impl Future<Output = Result<Self::ReadView, SkeinError>> + Send;

    /// Commit all operations of `batch` atomically, across namespaces.
    /// An empty batch is a no-op.
    fn commit(&self, batch: WriteBatch)
        -> impl Future<Output = Result<(), SkeinError>> + Send;
}
