//! Typed views over the shared store, one per entity kind.
//!
//! Reads go straight to a [`MeshRead`]; writes are staged into a
//! [`WriteBatch`] owned by the caller, so a single command (or a batch of
//! commands) lands in one atomic commit together with its checkpoint.

use skein_types::{
    Edge, Group, MeshNode, MeshState, NetworkAcl, Role, RoleBinding, Route, SkeinError,
};

use crate::codec::{decode, encode};
use crate::keys::{edge_key, Namespace, CHECKPOINT_KEY, MESH_STATE_KEY, RBAC_ENABLED_KEY};
use crate::traits::MeshRead;
use crate::types::{Checkpoint, WriteBatch};

/// An entity stored under a stable key in its own namespace.
pub trait Record: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + 'static {
    const NAMESPACE: Namespace;
    /// Used in `NotFound` errors.
    const KIND: &'static str;

    fn record_key(&self) -> String;
}

impl Record for MeshNode {
    const NAMESPACE: Namespace = Namespace::Nodes;
    const KIND: &'static str = "node";

    fn record_key(&self) -> String {
        self.id.clone()
    }
}

impl Record for Edge {
    const NAMESPACE: Namespace = Namespace::Edges;
    const KIND: &'static str = "edge";

    fn record_key(&self) -> String {
        edge_key(&self.source, &self.target)
    }
}

impl Record for Route {
    const NAMESPACE: Namespace = Namespace::Routes;
    const KIND: &'static str = "route";

    fn record_key(&self) -> String {
        self.name.clone()
    }
}

impl Record for NetworkAcl {
    const NAMESPACE: Namespace = Namespace::NetworkAcls;
    const KIND: &'static str = "network acl";

    fn record_key(&self) -> String {
        self.name.clone()
    }
}

impl Record for Role {
    const NAMESPACE: Namespace = Namespace::Roles;
    const KIND: &'static str = "role";

    fn record_key(&self) -> String {
        self.name.clone()
    }
}

impl Record for RoleBinding {
    const NAMESPACE: Namespace = Namespace::RoleBindings;
    const KIND: &'static str = "role binding";

    fn record_key(&self) -> String {
        self.name.clone()
    }
}

impl Record for Group {
    const NAMESPACE: Namespace = Namespace::Groups;
    const KIND: &'static str = "group";

    fn record_key(&self) -> String {
        self.name.clone()
    }
}

pub async fn find<T: Record, S: MeshRead>(store: &S, key: &str) -> Result<Option<T>, SkeinError> {
    match store.get(T::NAMESPACE, key).await? {
        Some(bytes) => Ok(Some(decode::<T>(&bytes)?)),
        None => Ok(None),
    }
}

/// Like [`find`] but absent keys are a `NotFound` error.
pub async fn get<T: Record, S: MeshRead>(store: &S, key: &str) -> Result<T, SkeinError> {
    find::<T, S>(store, key)
        .await?
        .ok_or_else(|| SkeinError::not_found(T::KIND, key))
}

pub async fn list<T: Record, S: MeshRead>(store: &S) -> Result<Vec<T>, SkeinError> {
    store
        .scan(T::NAMESPACE)
        .await?
        .into_iter()
        .map(|(_, v)| decode::<T>(&v))
        .collect()
}

pub fn put<T: Record>(batch: &mut WriteBatch, record: &T) -> Result<(), SkeinError> {
    batch.put(T::NAMESPACE, record.record_key(), encode(record)?);
    Ok(())
}

/// Deleting an absent key is not an error.
pub fn delete<T: Record>(batch: &mut WriteBatch, key: &str) {
    batch.delete(T::NAMESPACE, key);
}

/// Routes advertised by `node_id`.
pub async fn routes_by_node<S: MeshRead>(store: &S, node_id: &str) -> Result<Vec<Route>, SkeinError> {
    Ok(list::<Route, S>(store)
        .await?
        .into_iter()
        .filter(|r| r.node == node_id)
        .collect())
}

/// Edges with `node_id` at either end.
pub async fn edges_touching<S: MeshRead>(store: &S, node_id: &str) -> Result<Vec<Edge>, SkeinError> {
    Ok(list::<Edge, S>(store)
        .await?
        .into_iter()
        .filter(|e| e.source == node_id || e.target == node_id)
        .collect())
}

pub async fn mesh_state<S: MeshRead>(store: &S) -> Result<Option<MeshState>, SkeinError> {
    match store.get(Namespace::MeshState, MESH_STATE_KEY).await? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put_mesh_state(batch: &mut WriteBatch, state: &MeshState) -> Result<(), SkeinError> {
    batch.put(Namespace::MeshState, MESH_STATE_KEY, encode(state)?);
    Ok(())
}

/// RBAC is enabled unless explicitly switched off.
pub async fn rbac_enabled<S: MeshRead>(store: &S) -> Result<bool, SkeinError> {
    match store.get(Namespace::MeshState, RBAC_ENABLED_KEY).await? {
        Some(bytes) => decode(&bytes),
        None => Ok(true),
    }
}

pub fn put_rbac_enabled(batch: &mut WriteBatch, enabled: bool) -> Result<(), SkeinError> {
    batch.put(Namespace::MeshState, RBAC_ENABLED_KEY, encode(&enabled)?);
    Ok(())
}

/// The last applied position; a store that has applied nothing reports the
/// zero checkpoint.
pub async fn checkpoint<S: MeshRead>(store: &S) -> Result<Checkpoint, SkeinError> {
    let bytes = store
        .get(Namespace::Meta, CHECKPOINT_KEY)
        .await
        .map_err(|e| SkeinError::Checkpoint(e.to_string()))?;
    match bytes {
        Some(b) => decode(&b).map_err(|e| SkeinError::Checkpoint(e.to_string())),
        None => Ok(Checkpoint::default()),
    }
}

pub fn put_checkpoint(batch: &mut WriteBatch, checkpoint: Checkpoint) -> Result<(), SkeinError> {
    batch.put(Namespace::Meta, CHECKPOINT_KEY, encode(&checkpoint)?);
    Ok(())
}
