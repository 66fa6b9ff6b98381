//! The replicated state machine.
//!
//! Every replica applies the same ordered log entries to its local store.
//! Applying is idempotent: the store keeps a checkpoint of the last applied
//! `(term, index)` and entries at or below it are skipped, so replay after a
//! crash or restore cannot apply anything twice. Mutations and the advanced
//! checkpoint land in one atomic write.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tokio::sync::Mutex;

use skein_policy::{MeshView, RbacEvaluator};
use skein_storage::keys::edge_key;
use skein_storage::{
    codec, repo, Checkpoint, LogEntry, LogPayload, MeshRead, MeshStore, Namespace, Snapshot,
    SnapshotContents, SnapshotMeta, WriteBatch,
};
use skein_types::network::is_system_acl;
use skein_types::{
    ApplyResult, Command, Edge, Group, MeshNode, NetworkAcl, Role, RoleBinding, Route, SkeinError,
};

use crate::envelope::decode_command;

pub struct StateMachine<S: MeshStore> {
    store: S,
    /// Serialises apply, snapshot and restore. Reads go through store
    /// read views and never take it.
    apply_lock: Mutex<()>,
}

impl<S: MeshStore> StateMachine<S> {
    pub fn new(store: S) -> Self {
        StateMachine { store, apply_lock: Mutex::new(()) }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn checkpoint(&self) -> Result<Checkpoint, SkeinError> {
        repo::checkpoint(&self.store).await
    }

    /// Apply one committed entry.
    ///
    /// `Err` with [`SkeinError::is_fatal`] means the replica must stop
    /// applying. Any other `Err` left the store untouched and the entry may
    /// be retried.
    pub async fn apply(&self, entry: &LogEntry) -> Result<ApplyResult, SkeinError> {
        let _guard = self.apply_lock.lock().await;
        self.apply_locked(entry).await
    }

    /// Apply entries in order, stopping after the first fatal error.
    pub async fn apply_batch(&self, entries: &[LogEntry]) -> Vec<Result<ApplyResult, SkeinError>> {
        let _guard = self.apply_lock.lock().await;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let res = self.apply_locked(entry).await;
            let fatal = matches!(&res, Err(e) if e.is_fatal());
            out.push(res);
            if fatal {
                break;
            }
        }
        out
    }

    async fn apply_locked(&self, entry: &LogEntry) -> Result<ApplyResult, SkeinError> {
        let start = Instant::now();
        let current = repo::checkpoint(&self.store).await.map_err(|e| {
            tracing::error!(index = entry.index, error = %e, "cannot read checkpoint");
            e
        })?;
        if current.covers(entry.term, entry.index) {
            tracing::debug!(
                term = entry.term,
                index = entry.index,
                checkpoint_term = current.term,
                checkpoint_index = current.index,
                "skipping stale entry"
            );
            return Ok(ApplyResult { elapsed: start.elapsed(), error: None, stale: true });
        }

        let cmd = match &entry.payload {
            LogPayload::Blank | LogPayload::Membership(_) => None,
            LogPayload::Command(bytes) => Some(decode_command(bytes).map_err(|reason| {
                tracing::error!(term = entry.term, index = entry.index, %reason, "undecodable log entry");
                SkeinError::Decode { index: entry.index, reason }
            })?),
        };

        let mut batch = WriteBatch::new();
        let mut rejected = None;
        if let Some(cmd) = &cmd {
            match self.stage(cmd, &mut batch).await {
                Ok(()) => {}
                Err(SkeinError::InvalidArgument(reason)) => {
                    tracing::warn!(index = entry.index, kind = cmd.kind(), %reason, "command rejected");
                    batch = WriteBatch::new();
                    rejected = Some(reason);
                }
                Err(e) => return Err(e),
            }
        }

        let mutates = !batch.is_empty();
        repo::put_checkpoint(&mut batch, Checkpoint::new(entry.term, entry.index))?;
        if let Err(e) = self.store.commit(batch).await {
            if mutates {
                tracing::error!(index = entry.index, error = %e, "commit failed");
                return Err(e);
            }
            // Nothing but the checkpoint was at stake; the guard stays
            // correct because a replayed no-op is harmless.
            tracing::warn!(index = entry.index, error = %e, "checkpoint persist failed");
        }

        let elapsed = start.elapsed();
        tracing::trace!(
            term = entry.term,
            index = entry.index,
            kind = cmd.as_ref().map(Command::kind).unwrap_or("none"),
            ?elapsed,
            "applied entry"
        );
        Ok(ApplyResult { elapsed, error: rejected, stale: false })
    }

    /// Stage the writes of `cmd` into `batch`.
    ///
    /// `InvalidArgument` rejects the whole command; other errors are store
    /// failures.
    async fn stage(&self, cmd: &Command, batch: &mut WriteBatch) -> Result<(), SkeinError> {
        let mut leaves = Vec::new();
        flatten(cmd, &mut leaves);

        // The system ACL may only be written by the batch that seeds a mesh.
        let seeding = leaves.iter().any(|c| matches!(c, Command::SetMeshState(_)))
            && repo::mesh_state(&self.store).await?.is_none();

        // Edges put earlier in this batch, which a node delete must also
        // remove.
        let mut staged_edges: BTreeMap<String, Edge> = BTreeMap::new();
        for leaf in leaves {
            match leaf {
                Command::PutNode(node) => repo::put(batch, node)?,
                Command::DeleteNode { id } => {
                    repo::delete::<MeshNode>(batch, id);
                    let stored = repo::edges_touching(&self.store, id).await?;
                    let staged = staged_edges.values().filter(|e| e.source == *id || e.target == *id);
                    let doomed: BTreeSet<String> = stored
                        .iter()
                        .chain(staged)
                        .map(|e| edge_key(&e.source, &e.target))
                        .collect();
                    for key in doomed {
                        staged_edges.remove(&key);
                        repo::delete::<Edge>(batch, &key);
                    }
                }
                Command::PutEdge(edge) => {
                    repo::put(batch, edge)?;
                    staged_edges.insert(edge_key(&edge.source, &edge.target), edge.clone());
                }
                Command::DeleteEdge { source, target } => {
                    let key = edge_key(source, target);
                    staged_edges.remove(&key);
                    repo::delete::<Edge>(batch, &key)
                }
                Command::PutRoute(route) => repo::put(batch, route)?,
                Command::DeleteRoute { name } => repo::delete::<Route>(batch, name),
                Command::PutNetworkAcl(acl) => {
                    if acl.is_system() && !seeding {
                        return Err(system_acl_error(&acl.name));
                    }
                    acl.check_priority()?;
                    repo::put(batch, acl)?
                }
                Command::DeleteNetworkAcl { name } => {
                    if is_system_acl(name) {
                        return Err(system_acl_error(name));
                    }
                    repo::delete::<NetworkAcl>(batch, name)
                }
                Command::PutRole(role) => repo::put(batch, role)?,
                Command::DeleteRole { name } => repo::delete::<Role>(batch, name),
                Command::PutRoleBinding(rb) => repo::put(batch, &rb.clone().expand_all_subjects())?,
                Command::DeleteRoleBinding { name } => repo::delete::<RoleBinding>(batch, name),
                Command::PutGroup(group) => repo::put(batch, group)?,
                Command::DeleteGroup { name } => repo::delete::<Group>(batch, name),
                Command::SetMeshState(state) => repo::put_mesh_state(batch, state)?,
                Command::SetRbacEnabled(enabled) => repo::put_rbac_enabled(batch, *enabled)?,
                // Flattened above.
                Command::Batch(_) => {}
            }
        }
        Ok(())
    }

    /// Capture every data namespace together with the checkpoint it
    /// reflects.
    pub async fn snapshot(&self) -> Result<Snapshot, SkeinError> {
        let _guard = self.apply_lock.lock().await;
        let checkpoint = repo::checkpoint(&self.store).await?;
        let mut contents = SnapshotContents::default();
        for ns in Namespace::DATA {
            for (key, value) in self.store.scan(ns).await? {
                contents.entries.push((ns, key, value));
            }
        }
        let meta = SnapshotMeta {
            last_log_index: checkpoint.index,
            last_log_term: checkpoint.term,
            snapshot_id: uuid::Uuid::new_v4().to_string(),
        };
        tracing::info!(
            snapshot_id = %meta.snapshot_id,
            index = meta.last_log_index,
            term = meta.last_log_term,
            keys = contents.entries.len(),
            "snapshot taken"
        );
        Ok(Snapshot { meta, data: codec::encode(&contents)? })
    }

    /// Replace the whole state, checkpoint included, with `snapshot` in one
    /// atomic write.
    pub async fn restore(&self, snapshot: Snapshot) -> Result<(), SkeinError> {
        let _guard = self.apply_lock.lock().await;
        let contents: SnapshotContents = codec::decode(&snapshot.data)?;

        let mut keep = BTreeSet::new();
        let mut batch = WriteBatch::new();
        for (ns, key, value) in contents.entries {
            if ns == Namespace::Meta {
                return Err(SkeinError::InvalidArgument(
                    "snapshot carries checkpoint metadata".into(),
                ));
            }
            keep.insert((ns, key.clone()));
            batch.put(ns, key, value);
        }
        for ns in Namespace::DATA {
            for (key, _) in self.store.scan(ns).await? {
                if !keep.contains(&(ns, key.clone())) {
                    batch.delete(ns, key);
                }
            }
        }
        repo::put_checkpoint(
            &mut batch,
            Checkpoint::new(snapshot.meta.last_log_term, snapshot.meta.last_log_index),
        )?;
        self.store.commit(batch).await?;
        tracing::info!(
            snapshot_id = %snapshot.meta.snapshot_id,
            index = snapshot.meta.last_log_index,
            term = snapshot.meta.last_log_term,
            "snapshot restored"
        );
        Ok(())
    }

    /// A view of the topology that no concurrent apply can tear. Loaded
    /// from a store read view, so it neither waits for nor blocks applies.
    pub async fn mesh_view(&self) -> Result<MeshView, SkeinError> {
        MeshView::load(&self.store.read_view().await?).await
    }

    pub async fn rbac(&self) -> Result<RbacEvaluator, SkeinError> {
        RbacEvaluator::load(&self.store.read_view().await?).await
    }
}

fn flatten<'a>(cmd: &'a Command, out: &mut Vec<&'a Command>) {
    match cmd {
        Command::Batch(cmds) => cmds.iter().for_each(|c| flatten(c, out)),
        other => out.push(other),
    }
}

fn system_acl_error(name: &str) -> SkeinError {
    SkeinError::InvalidArgument(format!("network acl {name:?} is a system acl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{encode_command, Encoding};
    use skein_storage::MemStore;
    use skein_types::network::{BOOTSTRAP_NODES_ACL, SYSTEM_ACL_PRIORITY};
    use skein_types::{MeshState, Subject, SubjectType};

    fn entry(term: u64, index: u64, cmd: &Command) -> LogEntry {
        LogEntry {
            term,
            index,
            payload: LogPayload::Command(encode_command(cmd, Encoding::Plain).unwrap()),
        }
    }

    fn put_edge(s: &str, t: &str) -> Command {
        Command::PutEdge(Edge::new(s, t))
    }

    fn node(id: &str) -> MeshNode {
        MeshNode::new(id, format!("key-{id}"), "fd00::1/128".parse().unwrap())
    }

    fn mesh_state() -> MeshState {
        MeshState {
            ipv4_prefix: "172.16.0.0/12".parse().unwrap(),
            ipv6_prefix: "fd12:3456:789a::/48".parse().unwrap(),
            mesh_domain: "webmesh.internal".into(),
        }
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let fsm = StateMachine::new(MemStore::new());
        let e = entry(1, 1, &put_edge("a", "b"));
        let first = fsm.apply(&e).await.unwrap();
        assert!(!first.stale);
        let again = fsm.apply(&e).await.unwrap();
        assert!(again.stale);

        let edges: Vec<Edge> = repo::list(fsm.store()).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(1, 1));
    }

    #[tokio::test]
    async fn older_term_is_stale_even_with_higher_index() {
        let fsm = StateMachine::new(MemStore::new());
        fsm.apply(&entry(5, 10, &put_edge("a", "b"))).await.unwrap();
        let res = fsm.apply(&entry(4, 11, &put_edge("c", "d"))).await.unwrap();
        assert!(res.stale);
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(5, 10));
        assert!(repo::find::<Edge, _>(fsm.store(), "c/d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_entries_only_advance_checkpoint() {
        let fsm = StateMachine::new(MemStore::new());
        let res = fsm
            .apply(&LogEntry { term: 2, index: 7, payload: LogPayload::Blank })
            .await
            .unwrap();
        assert!(res.is_ok() && !res.stale);
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(2, 7));
        for ns in Namespace::DATA {
            assert!(fsm.store().scan(ns).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn undecodable_entry_is_fatal() {
        let fsm = StateMachine::new(MemStore::new());
        let bad = LogEntry { term: 1, index: 1, payload: LogPayload::Command(vec![0xff; 3]) };
        let err = fsm.apply(&bad).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SkeinError::Decode { index: 1, .. }));
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::default());
    }

    #[tokio::test]
    async fn apply_batch_stops_after_fatal() {
        let fsm = StateMachine::new(MemStore::new());
        let entries = vec![
            entry(1, 1, &put_edge("a", "b")),
            LogEntry { term: 1, index: 2, payload: LogPayload::Command(vec![0xff]) },
            entry(1, 3, &put_edge("c", "d")),
        ];
        let results = fsm.apply_batch(&entries).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_fatal());
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(1, 1));
    }

    #[tokio::test]
    async fn system_acl_mutations_are_rejected_but_advance() {
        let fsm = StateMachine::new(MemStore::new());
        fsm.apply(&entry(1, 1, &Command::SetMeshState(mesh_state()))).await.unwrap();

        let put = Command::PutNetworkAcl(NetworkAcl::allow_all(BOOTSTRAP_NODES_ACL, 0));
        let res = fsm.apply(&entry(1, 2, &put)).await.unwrap();
        assert!(res.error.is_some());
        let del = Command::DeleteNetworkAcl { name: BOOTSTRAP_NODES_ACL.into() };
        let res = fsm.apply(&entry(1, 3, &del)).await.unwrap();
        assert!(res.error.is_some());

        assert!(repo::list::<NetworkAcl, _>(fsm.store()).await.unwrap().is_empty());
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(1, 3));
    }

    #[tokio::test]
    async fn top_priority_is_refused_to_ordinary_acls() {
        let fsm = StateMachine::new(MemStore::new());
        let put = Command::PutNetworkAcl(NetworkAcl::allow_all("aaa-deny", SYSTEM_ACL_PRIORITY));
        let res = fsm.apply(&entry(1, 1, &put)).await.unwrap();
        assert!(res.error.is_some());
        assert!(repo::list::<NetworkAcl, _>(fsm.store()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seeding_batch_may_write_system_acl() {
        let fsm = StateMachine::new(MemStore::new());
        let seed = Command::Batch(vec![
            Command::SetMeshState(mesh_state()),
            Command::PutNetworkAcl(NetworkAcl::allow_all(BOOTSTRAP_NODES_ACL, SYSTEM_ACL_PRIORITY)),
        ]);
        let res = fsm.apply(&entry(1, 1, &seed)).await.unwrap();
        assert!(res.is_ok());
        // A second seeding attempt finds the mesh already set up.
        let res = fsm.apply(&entry(1, 2, &seed)).await.unwrap();
        assert!(res.error.is_some());
    }

    #[tokio::test]
    async fn rejected_batch_mutates_nothing() {
        let fsm = StateMachine::new(MemStore::new());
        let batch = Command::Batch(vec![
            put_edge("a", "b"),
            Command::DeleteNetworkAcl { name: BOOTSTRAP_NODES_ACL.into() },
        ]);
        let res = fsm.apply(&entry(1, 1, &batch)).await.unwrap();
        assert!(res.error.is_some());
        assert!(repo::list::<Edge, _>(fsm.store()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_node_removes_its_edges() {
        let fsm = StateMachine::new(MemStore::new());
        let setup = Command::Batch(vec![
            Command::PutNode(node("a")),
            Command::PutNode(node("b")),
            Command::PutNode(node("c")),
            put_edge("a", "b"),
            put_edge("c", "a"),
            put_edge("b", "c"),
        ]);
        fsm.apply(&entry(1, 1, &setup)).await.unwrap();
        fsm.apply(&entry(1, 2, &Command::DeleteNode { id: "a".into() })).await.unwrap();

        let edges: Vec<Edge> = repo::list(fsm.store()).await.unwrap();
        assert_eq!(edges, vec![Edge::new("b", "c")]);
        assert!(repo::find::<MeshNode, _>(fsm.store(), "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_absent_keys_is_not_an_error() {
        let fsm = StateMachine::new(MemStore::new());
        let res = fsm
            .apply(&entry(1, 1, &Command::DeleteRoute { name: "nope".into() }))
            .await
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn all_subjects_expand_on_write() {
        let fsm = StateMachine::new(MemStore::new());
        let rb = RoleBinding {
            name: "everyone".into(),
            role: "reader".into(),
            subjects: vec![Subject::new(SubjectType::All, "ops")],
        };
        fsm.apply(&entry(1, 1, &Command::PutRoleBinding(rb))).await.unwrap();
        let stored: RoleBinding = repo::get(fsm.store(), "everyone").await.unwrap();
        assert_eq!(
            stored.subjects,
            vec![Subject::node("ops"), Subject::user("ops"), Subject::group("ops")]
        );
    }

    #[tokio::test]
    async fn snapshot_restore_round_trip() {
        let source = StateMachine::new(MemStore::new());
        source.apply(&entry(3, 4, &put_edge("a", "b"))).await.unwrap();
        source.apply(&entry(3, 5, &Command::SetRbacEnabled(false))).await.unwrap();
        let snap = source.snapshot().await.unwrap();
        assert_eq!(snap.meta.last_log_index, 5);
        assert_eq!(snap.meta.last_log_term, 3);

        let target = StateMachine::new(MemStore::new());
        target.apply(&entry(1, 1, &put_edge("x", "y"))).await.unwrap();
        target.restore(snap.clone()).await.unwrap();

        let edges: Vec<Edge> = repo::list(target.store()).await.unwrap();
        assert_eq!(edges, vec![Edge::new("a", "b")]);
        assert!(!repo::rbac_enabled(target.store()).await.unwrap());
        assert_eq!(target.checkpoint().await.unwrap(), Checkpoint::new(3, 5));

        // Entries covered by the snapshot are now stale.
        assert!(target.apply(&entry(3, 5, &put_edge("p", "q"))).await.unwrap().stale);
        assert!(!target.apply(&entry(3, 6, &put_edge("p", "q"))).await.unwrap().stale);
    }

    #[tokio::test]
    async fn deleting_a_node_drops_edges_staged_in_the_same_batch() {
        let fsm = StateMachine::new(MemStore::new());
        let batch = Command::Batch(vec![
            Command::PutNode(node("a")),
            Command::PutNode(node("b")),
            Command::PutNode(node("c")),
            put_edge("a", "b"),
            put_edge("b", "c"),
            Command::DeleteNode { id: "a".into() },
        ]);
        let res = fsm.apply(&entry(1, 1, &batch)).await.unwrap();
        assert!(res.is_ok());

        let edges: Vec<Edge> = repo::list(fsm.store()).await.unwrap();
        assert_eq!(edges, vec![Edge::new("b", "c")]);

        // A node rejoining under the same ID starts without old edges.
        fsm.apply(&entry(1, 2, &Command::PutNode(node("a")))).await.unwrap();
        assert!(repo::edges_touching(fsm.store(), "a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshots_get_distinct_ids() {
        let fsm = StateMachine::new(MemStore::new());
        let a = fsm.snapshot().await.unwrap();
        let b = fsm.snapshot().await.unwrap();
        assert_ne!(a.meta.snapshot_id, b.meta.snapshot_id);
    }

    /// A store whose reads or commits can be made to fail or stall.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemStore,
        fail_commits: std::sync::Arc<std::sync::atomic::AtomicBool>,
        fail_reads: std::sync::Arc<std::sync::atomic::AtomicBool>,
        slow_commits: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl FlakyStore {
        fn flag(f: &std::sync::atomic::AtomicBool) -> bool {
            f.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl MeshRead for FlakyStore {
        async fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>, SkeinError> {
            if Self::flag(&self.fail_reads) {
                return Err(SkeinError::Storage("disk on fire".into()));
            }
            self.inner.get(ns, key).await
        }

        async fn scan(&self, ns: Namespace) -> Result<Vec<(String, Vec<u8>)>, SkeinError> {
            self.inner.scan(ns).await
        }
    }

    impl MeshStore for FlakyStore {
        type ReadView = skein_storage::MemReadView;

        async fn read_view(&self) -> Result<Self::ReadView, SkeinError> {
            self.inner.read_view().await
        }

        async fn commit(&self, batch: WriteBatch) -> Result<(), SkeinError> {
            if Self::flag(&self.fail_commits) {
                return Err(SkeinError::Storage("disk full".into()));
            }
            if Self::flag(&self.slow_commits) {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            self.inner.commit(batch).await
        }
    }

    #[tokio::test]
    async fn reads_do_not_wait_for_a_slow_apply() {
        use skein_policy::{with_deadline, Action};
        use skein_types::{Resource, Verb};
        use std::sync::Arc;
        use std::time::Duration;

        let store = FlakyStore::default();
        let fsm = Arc::new(StateMachine::new(store.clone()));
        fsm.apply(&entry(1, 1, &put_edge("a", "b"))).await.unwrap();

        store.slow_commits.store(true, std::sync::atomic::Ordering::SeqCst);
        let applying = {
            let fsm = fsm.clone();
            tokio::spawn(async move { fsm.apply(&entry(1, 2, &put_edge("c", "d"))).await })
        };
        // Let the apply take the lock and stall in its commit.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let view = with_deadline(Duration::from_millis(100), fsm.mesh_view()).await.unwrap();
        assert_eq!(view.edges, vec![Edge::new("a", "b")]);
        let rbac = with_deadline(Duration::from_millis(100), fsm.rbac()).await.unwrap();
        assert!(!rbac.evaluate("nobody", &Action::new(Resource::Nodes, Verb::Put, "n")));

        applying.await.unwrap().unwrap();
        assert_eq!(fsm.mesh_view().await.unwrap().edges.len(), 2);
    }

    #[tokio::test]
    async fn failed_checkpoint_only_write_is_tolerated() {
        let store = FlakyStore::default();
        let fsm = StateMachine::new(store.clone());
        store.fail_commits.store(true, std::sync::atomic::Ordering::SeqCst);
        let res = fsm
            .apply(&LogEntry { term: 1, index: 1, payload: LogPayload::Blank })
            .await
            .unwrap();
        assert!(res.is_ok());
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::default());
    }

    #[tokio::test]
    async fn failed_mutation_commit_is_retryable() {
        let store = FlakyStore::default();
        let fsm = StateMachine::new(store.clone());
        store.fail_commits.store(true, std::sync::atomic::Ordering::SeqCst);
        let e = entry(1, 1, &put_edge("a", "b"));
        let err = fsm.apply(&e).await.unwrap_err();
        assert!(matches!(err, SkeinError::Storage(_)));
        assert!(!err.is_fatal());

        store.fail_commits.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(!fsm.apply(&e).await.unwrap().stale);
        assert!(repo::find::<Edge, _>(fsm.store(), "a/b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unreadable_checkpoint_is_fatal() {
        let store = FlakyStore::default();
        let fsm = StateMachine::new(store.clone());
        store.fail_reads.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = fsm.apply(&entry(1, 1, &put_edge("a", "b"))).await.unwrap_err();
        assert!(matches!(err, SkeinError::Checkpoint(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn fjall_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let fsm = StateMachine::new(skein_storage::FjallStore::open(dir.path()).unwrap());
            fsm.apply(&entry(1, 1, &put_edge("a", "b"))).await.unwrap();
        }
        let fsm = StateMachine::new(skein_storage::FjallStore::open(dir.path()).unwrap());
        assert_eq!(fsm.checkpoint().await.unwrap(), Checkpoint::new(1, 1));
        assert!(fsm.apply(&entry(1, 1, &put_edge("a", "b"))).await.unwrap().stale);
    }
}
