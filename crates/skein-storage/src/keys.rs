/// Disjoint key spaces, one fjall keyspace each.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Namespace {
    /// `mesh` → bincode(MeshState), `rbac_enabled` → bincode(bool)
    MeshState,
    /// node id → bincode(MeshNode)
    Nodes,
    /// `source/target` → bincode(Edge)
    Edges,
    /// route name → bincode(Route)
    Routes,
    /// acl name → bincode(NetworkAcl)
    NetworkAcls,
    /// role name → bincode(Role)
    Roles,
    /// binding name → bincode(RoleBinding)
    RoleBindings,
    /// group name → bincode(Group)
    Groups,
    /// `checkpoint` → bincode(Checkpoint). Not part of snapshot data.
    Meta,
}

impl Namespace {
    pub const ALL: [Namespace; 9] = [
        Namespace::MeshState,
        Namespace::Nodes,
        Namespace::Edges,
        Namespace::Routes,
        Namespace::NetworkAcls,
        Namespace::Roles,
        Namespace::RoleBindings,
        Namespace::Groups,
        Namespace::Meta,
    ];

    /// Namespaces carried in a snapshot.
    pub const DATA: [Namespace; 8] = [
        Namespace::MeshState,
        Namespace::Nodes,
        Namespace::Edges,
        Namespace::Routes,
        Namespace::NetworkAcls,
        Namespace::Roles,
        Namespace::RoleBindings,
        Namespace::Groups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::MeshState => "mesh_state",
            Namespace::Nodes => "nodes",
            Namespace::Edges => "edges",
            Namespace::Routes => "routes",
            Namespace::NetworkAcls => "network_acls",
            Namespace::Roles => "roles",
            Namespace::RoleBindings => "role_bindings",
            Namespace::Groups => "groups",
            Namespace::Meta => "meta",
        }
    }

    pub(crate) fn ordinal(&self) -> usize {
        *self as usize
    }
}

pub const CHECKPOINT_KEY: &str = "checkpoint";
pub const MESH_STATE_KEY: &str = "mesh";
pub const RBAC_ENABLED_KEY: &str = "rbac_enabled";

/// `/` is forbidden in node IDs, so the separator is unambiguous.
pub fn edge_key(source: &str, target: &str) -> String {
    format!("{source}/{target}")
}

pub fn split_edge_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}
