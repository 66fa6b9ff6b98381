use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;

use skein_types::{
    AclAction, CidrSelector, Group, MeshNode, NetworkAcl, NodeId, NodeSelector, SubjectType,
};

use crate::graph::PeerGraph;
use crate::groups::{group_contains, names};

/// Node ID to the set of nodes it may hold a tunnel with.
pub type AdjacencyMap = BTreeMap<NodeId, BTreeSet<NodeId>>;

/// One direction of traffic between two nodes, as seen by ACL evaluation.
#[derive(Debug, Clone)]
pub struct NetworkAction {
    pub source_node: NodeId,
    pub destination_node: NodeId,
    pub source_addrs: Vec<IpAddr>,
    pub destination_addrs: Vec<IpAddr>,
    /// `None` matches rules regardless of their protocol list.
    pub protocol: Option<String>,
    /// `None` matches rules regardless of their port list.
    pub port: Option<u16>,
}

impl NetworkAction {
    /// Any traffic from `src` to `dst`.
    pub fn between(src: &MeshNode, dst: &MeshNode) -> Self {
        NetworkAction {
            source_node: src.id.clone(),
            destination_node: dst.id.clone(),
            source_addrs: src.private_addresses().map(|p| p.addr()).collect(),
            destination_addrs: dst.private_addresses().map(|p| p.addr()).collect(),
            protocol: None,
            port: None,
        }
    }
}

/// Network ACLs in evaluation order.
///
/// Rules are ordered by priority, highest first. On equal priority system
/// ACLs come first, then name order, so every replica evaluates
/// identically. The first rule
/// whose selectors all match decides. With no match the action is denied.
pub struct NetworkAcls<'a> {
    rules: Vec<&'a NetworkAcl>,
    groups: &'a BTreeMap<String, Group>,
}

impl<'a> NetworkAcls<'a> {
    pub fn new(acls: &'a [NetworkAcl], groups: &'a BTreeMap<String, Group>) -> Self {
        let mut rules: Vec<&NetworkAcl> = acls.iter().collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.is_system().cmp(&a.is_system()))
                .then_with(|| a.name.cmp(&b.name))
        });
        NetworkAcls { rules, groups }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule that decides `action`, if any matches.
    pub fn matching(&self, action: &NetworkAction) -> Option<&'a NetworkAcl> {
        self.rules.iter().copied().find(|acl| self.matches(acl, action))
    }

    pub fn accept(&self, action: &NetworkAction) -> bool {
        match self.matching(action) {
            Some(acl) => {
                tracing::trace!(
                    acl = %acl.name,
                    source = %action.source_node,
                    destination = %action.destination_node,
                    action = ?acl.action,
                    "network acl matched"
                );
                acl.action == AclAction::Accept
            }
            None => false,
        }
    }

    /// Tunnels carry traffic both ways, so both directions must be accepted.
    pub fn allow_nodes_to_communicate(&self, a: &MeshNode, b: &MeshNode) -> bool {
        self.accept(&NetworkAction::between(a, b)) && self.accept(&NetworkAction::between(b, a))
    }

    fn matches(&self, acl: &NetworkAcl, action: &NetworkAction) -> bool {
        self.nodes_match(&acl.source_nodes, &action.source_node)
            && self.nodes_match(&acl.destination_nodes, &action.destination_node)
            && cidrs_match(&acl.source_cidrs, &action.source_addrs)
            && cidrs_match(&acl.destination_cidrs, &action.destination_addrs)
            && protocol_matches(&acl.protocols, action.protocol.as_deref())
            && port_matches(&acl.ports, action.port)
    }

    fn nodes_match(&self, selectors: &[NodeSelector], node: &str) -> bool {
        selectors.is_empty()
            || selectors.iter().any(|sel| match sel {
                NodeSelector::Any => true,
                NodeSelector::Node(id) => id == node,
                NodeSelector::Group(group) => group_contains(self.groups, group, &|s| {
                    matches!(s.kind, SubjectType::Node | SubjectType::All) && names(s, node)
                }),
            })
    }
}

fn cidrs_match(selectors: &[CidrSelector], addrs: &[IpAddr]) -> bool {
    selectors.is_empty()
        || selectors.iter().any(|sel| match sel {
            CidrSelector::Any => true,
            CidrSelector::Prefix(p) => addrs.iter().any(|a| p.contains(a)),
        })
}

fn protocol_matches(protocols: &[String], protocol: Option<&str>) -> bool {
    match protocol {
        Some(proto) if !protocols.is_empty() => {
            protocols.iter().any(|p| p == "*" || p.eq_ignore_ascii_case(proto))
        }
        _ => true,
    }
}

fn port_matches(ports: &[u16], port: Option<u16>) -> bool {
    match port {
        Some(port) if !ports.is_empty() => ports.contains(&port),
        _ => true,
    }
}

/// Reduce `graph` to the tunnels `for_node` can take part in.
///
/// Every edge, in either direction, yields a symmetric adjacency when the
/// ACLs allow its endpoints to communicate. The result keeps only the
/// connected component containing `for_node`; nodes left with no permitted
/// neighbour are absent, so a mesh with no accepting ACL yields an empty map.
pub fn filter_graph(graph: &PeerGraph, acls: &NetworkAcls<'_>, for_node: &str) -> AdjacencyMap {
    let mut full = AdjacencyMap::new();
    for (source, target) in graph.edges() {
        let (Some(a), Some(b)) = (graph.vertex(source), graph.vertex(target)) else {
            continue;
        };
        if acls.allow_nodes_to_communicate(a, b) {
            full.entry(source.clone()).or_default().insert(target.clone());
            full.entry(target.clone()).or_default().insert(source.clone());
        } else {
            tracing::debug!(%source, %target, "edge denied by network acls");
        }
    }

    let mut out = AdjacencyMap::new();
    let mut queue = VecDeque::from([for_node.to_string()]);
    while let Some(id) = queue.pop_front() {
        if out.contains_key(&id) {
            continue;
        }
        let Some(neighbours) = full.remove(&id) else {
            continue;
        };
        queue.extend(neighbours.iter().cloned());
        out.insert(id, neighbours);
    }
    out
}
