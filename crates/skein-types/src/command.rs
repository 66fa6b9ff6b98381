use std::time::Duration;

use crate::network::{is_system_acl, Edge, MeshState, NetworkAcl, Route};
use crate::node::MeshNode;
use crate::rbac::{Group, Role, RoleBinding};
use crate::validate::{check_id, check_node_id};
use crate::{NodeId, SkeinError};

/// Mutations replicated through the consensus log.
///
/// Every variant is a pure put or delete so that re-applying an entry after
/// a crash leaves the same state as applying it once.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Command {
    PutNode(MeshNode),
    /// Also removes every edge touching the node.
    DeleteNode { id: NodeId },
    PutEdge(Edge),
    DeleteEdge { source: NodeId, target: NodeId },
    PutRoute(Route),
    DeleteRoute { name: String },
    PutNetworkAcl(NetworkAcl),
    DeleteNetworkAcl { name: String },
    PutRole(Role),
    DeleteRole { name: String },
    PutRoleBinding(RoleBinding),
    DeleteRoleBinding { name: String },
    PutGroup(Group),
    DeleteGroup { name: String },
    SetMeshState(MeshState),
    SetRbacEnabled(bool),
    /// Applied in a single atomic write.
    Batch(Vec<Command>),
}

impl Command {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::PutNode(_) => "put_node",
            Command::DeleteNode { .. } => "delete_node",
            Command::PutEdge(_) => "put_edge",
            Command::DeleteEdge { .. } => "delete_edge",
            Command::PutRoute(_) => "put_route",
            Command::DeleteRoute { .. } => "delete_route",
            Command::PutNetworkAcl(_) => "put_network_acl",
            Command::DeleteNetworkAcl { .. } => "delete_network_acl",
            Command::PutRole(_) => "put_role",
            Command::DeleteRole { .. } => "delete_role",
            Command::PutRoleBinding(_) => "put_role_binding",
            Command::DeleteRoleBinding { .. } => "delete_role_binding",
            Command::PutGroup(_) => "put_group",
            Command::DeleteGroup { .. } => "delete_group",
            Command::SetMeshState(_) => "set_mesh_state",
            Command::SetRbacEnabled(_) => "set_rbac_enabled",
            Command::Batch(_) => "batch",
        }
    }

    /// Rejects malformed commands before they are proposed. The system ACL
    /// is only ever written by the bootstrap sequencer, which builds its
    /// batch without going through this check.
    pub fn validate(&self) -> Result<(), SkeinError> {
        match self {
            Command::PutNode(node) => node.validate(),
            Command::DeleteNode { id } => check_node_id(id),
            Command::PutEdge(edge) => edge.validate(),
            Command::DeleteEdge { source, target } => {
                check_node_id(source)?;
                check_node_id(target)
            }
            Command::PutRoute(route) => route.validate(),
            Command::DeleteRoute { name } => check_id("route", name),
            Command::PutNetworkAcl(acl) => acl.validate(),
            Command::DeleteNetworkAcl { name } => {
                check_id("network acl", name)?;
                if is_system_acl(name) {
                    return Err(SkeinError::InvalidArgument(format!(
                        "network acl {name:?} is a system acl and cannot be deleted"
                    )));
                }
                Ok(())
            }
            Command::PutRole(role) => role.validate(),
            Command::DeleteRole { name } => check_id("role", name),
            Command::PutRoleBinding(rb) => rb.validate(),
            Command::DeleteRoleBinding { name } => check_id("role binding", name),
            Command::PutGroup(group) => group.validate(),
            Command::DeleteGroup { name } => check_id("group", name),
            Command::SetMeshState(state) => {
                if !state.ipv4_prefix.is_ipv4() || !state.ipv6_prefix.is_ipv6() {
                    return Err(SkeinError::InvalidArgument(
                        "mesh prefixes have the wrong address family".into(),
                    ));
                }
                if state.mesh_domain.is_empty() {
                    return Err(SkeinError::InvalidArgument("mesh domain is empty".into()));
                }
                Ok(())
            }
            Command::SetRbacEnabled(_) => Ok(()),
            Command::Batch(cmds) => cmds.iter().try_for_each(Command::validate),
        }
    }
}

/// Outcome of applying one log entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ApplyResult {
    pub elapsed: Duration,
    /// The command was rejected by the state machine; nothing was mutated
    /// but the checkpoint still advanced.
    pub error: Option<String>,
    /// The entry was at or below the checkpoint and was skipped.
    pub stale: bool,
}

impl ApplyResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::BOOTSTRAP_NODES_ACL;

    #[test]
    fn system_acl_commands_fail_validation() {
        let put = Command::PutNetworkAcl(NetworkAcl::allow_all(BOOTSTRAP_NODES_ACL, 1));
        assert!(put.validate().is_err());
        let del = Command::DeleteNetworkAcl { name: BOOTSTRAP_NODES_ACL.into() };
        assert!(del.validate().is_err());
    }

    #[test]
    fn batch_validation_checks_every_member() {
        let batch = Command::Batch(vec![
            Command::DeleteRole { name: "ok".into() },
            Command::DeleteNode { id: "leader".into() },
        ]);
        assert!(batch.validate().is_err());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(Command::DeleteEdge { source: "a/b".into(), target: "c".into() }
            .validate()
            .is_err());
        assert!(Command::DeleteGroup { name: String::new() }.validate().is_err());
    }
}
