use std::net::{IpAddr, Ipv6Addr};

use skein_storage::{repo, MeshStore};
use skein_types::network::{BOOTSTRAP_NODES_ACL, SYSTEM_ACL_PRIORITY};
use skein_types::rbac::{
    BOOTSTRAP_VOTERS_ROLE_BINDING, MESH_ADMIN_ROLE, MESH_ADMIN_ROLE_BINDING, VOTERS_GROUP,
    VOTERS_ROLE,
};
use skein_types::validate::{check_id, check_node_id};
use skein_types::{
    AclAction, Command, Group, MeshState, NetworkAcl, NodeId, NodeSelector, Prefix, Resource,
    Role, RoleBinding, Rule, SkeinError, Subject, Verb,
};

use crate::fsm::StateMachine;
use crate::log::ConsensusLog;

pub const DEFAULT_MESH_DOMAIN: &str = "webmesh.internal";
pub const DEFAULT_IPV4_NETWORK: &str = "172.16.0.0/12";
pub const DEFAULT_MESH_ADMIN: &str = "admin";
pub const DEFAULT_ACCEPT_ACL: &str = "default-accept";

/// What happens to traffic no other ACL decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicy {
    #[default]
    Accept,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BootstrapOptions {
    pub mesh_domain: String,
    pub ipv4_network: Prefix,
    /// Identity bound to the mesh-admin role, as both a node and a user.
    pub admin: String,
    pub default_network_policy: NetworkPolicy,
    /// The initial voting servers.
    pub bootstrap_nodes: Vec<NodeId>,
    /// Additional voters beyond the bootstrap servers.
    pub voters: Vec<NodeId>,
    pub disable_rbac: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        BootstrapOptions {
            mesh_domain: DEFAULT_MESH_DOMAIN.to_string(),
            ipv4_network: Prefix::saturating(IpAddr::from([172, 16, 0, 0]), 12),
            admin: DEFAULT_MESH_ADMIN.to_string(),
            default_network_policy: NetworkPolicy::Accept,
            bootstrap_nodes: Vec::new(),
            voters: Vec::new(),
            disable_rbac: false,
        }
    }
}

impl BootstrapOptions {
    fn validate(&self) -> Result<(), SkeinError> {
        if self.mesh_domain.is_empty() {
            return Err(SkeinError::InvalidArgument("mesh domain is empty".into()));
        }
        if !self.ipv4_network.is_ipv4() {
            return Err(SkeinError::InvalidArgument(format!(
                "{} is not an IPv4 network",
                self.ipv4_network
            )));
        }
        check_id("admin", &self.admin)?;
        self.bootstrap_nodes.iter().chain(&self.voters).try_for_each(|id| check_node_id(id))
    }
}

/// The addressing of a mesh.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BootstrapResults {
    pub network_v4: Prefix,
    pub network_v6: Prefix,
    pub mesh_domain: String,
}

impl From<MeshState> for BootstrapResults {
    fn from(s: MeshState) -> Self {
        BootstrapResults {
            network_v4: s.ipv4_prefix,
            network_v6: s.ipv6_prefix,
            mesh_domain: s.mesh_domain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrapped {
    /// This call seeded the mesh.
    Fresh(BootstrapResults),
    /// The mesh was already seeded; nothing was written.
    Existing(BootstrapResults),
}

impl Bootstrapped {
    pub fn results(&self) -> &BootstrapResults {
        match self {
            Bootstrapped::Fresh(r) | Bootstrapped::Existing(r) => r,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Bootstrapped::Fresh(_))
    }
}

/// Seed an empty mesh in one atomic proposal, or report the existing
/// addressing if it is already seeded.
///
/// Losing a race against another bootstrapper is also reported as
/// `Existing`: the state machine refuses a second seeding batch.
pub async fn bootstrap<S: MeshStore, L: ConsensusLog>(
    fsm: &StateMachine<S>,
    log: &L,
    opts: &BootstrapOptions,
) -> Result<Bootstrapped, SkeinError> {
    opts.validate()?;
    if let Some(state) = repo::mesh_state(fsm.store()).await? {
        tracing::info!(domain = %state.mesh_domain, "mesh already bootstrapped");
        return Ok(Bootstrapped::Existing(state.into()));
    }

    let state = MeshState {
        ipv4_prefix: opts.ipv4_network,
        ipv6_prefix: generate_ula()?,
        mesh_domain: opts.mesh_domain.clone(),
    };
    let seed = seed_commands(&state, opts);
    let result = log.propose(Command::Batch(seed)).await?;
    if let Some(reason) = result.error {
        return match repo::mesh_state(fsm.store()).await? {
            Some(existing) => {
                tracing::info!(domain = %existing.mesh_domain, "mesh bootstrapped concurrently");
                Ok(Bootstrapped::Existing(existing.into()))
            }
            None => Err(SkeinError::Consensus(format!("bootstrap rejected: {reason}"))),
        };
    }
    tracing::info!(
        domain = %state.mesh_domain,
        ipv4 = %state.ipv4_prefix,
        ipv6 = %state.ipv6_prefix,
        voters = opts.bootstrap_nodes.len() + opts.voters.len(),
        rbac = !opts.disable_rbac,
        "mesh bootstrapped"
    );
    Ok(Bootstrapped::Fresh(state.into()))
}

fn seed_commands(state: &MeshState, opts: &BootstrapOptions) -> Vec<Command> {
    let voters_ref = NodeSelector::Group(VOTERS_GROUP.to_string());
    let voter_subjects = std::iter::once(&opts.admin)
        .chain(&opts.bootstrap_nodes)
        .chain(&opts.voters)
        .map(|id| Subject::node(id.clone()))
        .collect();

    let mut cmds = vec![
        Command::SetMeshState(state.clone()),
        Command::PutRole(Role {
            name: MESH_ADMIN_ROLE.to_string(),
            rules: vec![Rule::new(vec![Resource::All], vec![Verb::All])],
        }),
        Command::PutRoleBinding(RoleBinding {
            name: MESH_ADMIN_ROLE_BINDING.to_string(),
            role: MESH_ADMIN_ROLE.to_string(),
            subjects: vec![Subject::node(opts.admin.clone()), Subject::user(opts.admin.clone())],
        }),
        Command::PutRole(Role {
            name: VOTERS_ROLE.to_string(),
            rules: vec![Rule::new(vec![Resource::Votes], vec![Verb::Put])],
        }),
        Command::PutGroup(Group { name: VOTERS_GROUP.to_string(), subjects: voter_subjects }),
        Command::PutRoleBinding(RoleBinding {
            name: BOOTSTRAP_VOTERS_ROLE_BINDING.to_string(),
            role: VOTERS_ROLE.to_string(),
            subjects: vec![Subject::group(VOTERS_GROUP)],
        }),
        Command::PutNetworkAcl(NetworkAcl {
            name: BOOTSTRAP_NODES_ACL.to_string(),
            priority: SYSTEM_ACL_PRIORITY,
            action: AclAction::Accept,
            source_nodes: vec![voters_ref.clone()],
            destination_nodes: vec![voters_ref],
            source_cidrs: Vec::new(),
            destination_cidrs: Vec::new(),
            protocols: Vec::new(),
            ports: Vec::new(),
        }),
    ];
    if opts.default_network_policy == NetworkPolicy::Accept {
        cmds.push(Command::PutNetworkAcl(NetworkAcl::allow_all(DEFAULT_ACCEPT_ACL, i32::MIN)));
    }
    if opts.disable_rbac {
        cmds.push(Command::SetRbacEnabled(false));
    }
    cmds
}

/// A random /48 inside `fd00::/8`.
pub fn generate_ula() -> Result<Prefix, SkeinError> {
    let global_id: [u8; 5] = rand::random();
    let mut octets = [0u8; 16];
    octets[0] = 0xfd;
    octets[1..6].copy_from_slice(&global_id);
    Prefix::new(IpAddr::V6(Ipv6Addr::from(octets)), 48)
}
