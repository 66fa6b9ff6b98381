use std::sync::Arc;

use skein_policy::Action;
use skein_storage::MeshStore;
use skein_types::{ApplyResult, Command, Resource, SkeinError, Verb};

use crate::fsm::StateMachine;
use crate::log::ConsensusLog;

/// The only way callers reach the consensus log.
///
/// A command is validated, every action it implies is checked against a
/// fresh RBAC load, and only then is it proposed. A denied command never
/// reaches the log.
pub struct Gatekeeper<S: MeshStore, L: ConsensusLog> {
    fsm: Arc<StateMachine<S>>,
    log: L,
}

impl<S: MeshStore, L: ConsensusLog> Gatekeeper<S, L> {
    pub fn new(fsm: Arc<StateMachine<S>>, log: L) -> Self {
        Gatekeeper { fsm, log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub async fn submit(&self, caller: &str, cmd: Command) -> Result<ApplyResult, SkeinError> {
        cmd.validate()?;
        let actions = actions_for(&cmd)?;
        let rbac = self.fsm.rbac().await?;
        if let Some(denied) = actions.iter().find(|a| !rbac.evaluate(caller, a)) {
            tracing::warn!(
                caller,
                kind = cmd.kind(),
                resource = ?denied.resource,
                verb = ?denied.verb,
                target = %denied.target,
                "command denied"
            );
            return Err(SkeinError::PermissionDenied(format!(
                "{caller} may not {:?} {:?} {:?}",
                denied.verb, denied.resource, denied.target
            )));
        }
        self.log.propose(cmd).await
    }
}

/// The RBAC actions a command needs. Mesh-state and RBAC switches are only
/// ever written by the bootstrap sequencer and are refused here.
pub fn actions_for(cmd: &Command) -> Result<Vec<Action>, SkeinError> {
    let mut out = Vec::new();
    collect_actions(cmd, &mut out)?;
    Ok(out)
}

fn collect_actions(cmd: &Command, out: &mut Vec<Action>) -> Result<(), SkeinError> {
    let action = match cmd {
        Command::PutNode(node) => Action::new(Resource::Nodes, Verb::Put, &node.id),
        Command::DeleteNode { id } => Action::new(Resource::Nodes, Verb::Delete, id),
        Command::PutEdge(edge) => Action::new(Resource::Edges, Verb::Put, &edge.source),
        Command::DeleteEdge { source, .. } => Action::new(Resource::Edges, Verb::Delete, source),
        Command::PutRoute(route) => Action::new(Resource::Routes, Verb::Put, &route.name),
        Command::DeleteRoute { name } => Action::new(Resource::Routes, Verb::Delete, name),
        Command::PutNetworkAcl(acl) => Action::new(Resource::NetworkAcls, Verb::Put, &acl.name),
        Command::DeleteNetworkAcl { name } => Action::new(Resource::NetworkAcls, Verb::Delete, name),
        Command::PutRole(role) => Action::new(Resource::Roles, Verb::Put, &role.name),
        Command::DeleteRole { name } => Action::new(Resource::Roles, Verb::Delete, name),
        Command::PutRoleBinding(rb) => Action::new(Resource::RoleBindings, Verb::Put, &rb.name),
        Command::DeleteRoleBinding { name } => Action::new(Resource::RoleBindings, Verb::Delete, name),
        Command::PutGroup(group) => Action::new(Resource::Groups, Verb::Put, &group.name),
        Command::DeleteGroup { name } => Action::new(Resource::Groups, Verb::Delete, name),
        Command::SetMeshState(_) | Command::SetRbacEnabled(_) => {
            return Err(SkeinError::PermissionDenied(format!(
                "{} is reserved for mesh bootstrap",
                cmd.kind()
            )));
        }
        Command::Batch(cmds) => {
            for c in cmds {
                collect_actions(c, out)?;
            }
            return Ok(());
        }
    };
    out.push(action);
    Ok(())
}
