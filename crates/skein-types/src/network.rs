use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::prefix::Prefix;
use crate::validate::{check_id, check_node_id};
use crate::{NodeId, SkeinError};

/// Name of the system ACL granting voters full mutual reachability. It is
/// written once at bootstrap and rejected by every ordinary command.
pub const BOOTSTRAP_NODES_ACL: &str = "bootstrap-nodes";

/// Priority of the system ACL. No other ACL may use it.
pub const SYSTEM_ACL_PRIORITY: i32 = i32::MAX;

pub fn is_system_acl(name: &str) -> bool {
    name == BOOTSTRAP_NODES_ACL
}

/// Directed adjacency between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: i32,
    pub attributes: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Edge { source: source.into(), target: target.into(), weight: 1, attributes: BTreeMap::new() }
    }

    pub fn validate(&self) -> Result<(), SkeinError> {
        check_node_id(&self.source)?;
        check_node_id(&self.target)?;
        if self.source == self.target {
            return Err(SkeinError::InvalidArgument(format!(
                "edge from {:?} to itself",
                self.source
            )));
        }
        Ok(())
    }
}

/// Prefixes reachable through a node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Route {
    pub name: String,
    /// The advertising node.
    pub node: NodeId,
    pub destination_cidrs: Vec<Prefix>,
    pub next_hop_nodes: Vec<NodeId>,
}

impl Route {
    pub fn validate(&self) -> Result<(), SkeinError> {
        check_id("route", &self.name)?;
        check_node_id(&self.node)?;
        if self.destination_cidrs.is_empty() {
            return Err(SkeinError::InvalidArgument(format!(
                "route {:?} has no destination prefixes",
                self.name
            )));
        }
        for hop in &self.next_hop_nodes {
            check_node_id(hop)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AclAction {
    Accept,
    Deny,
}

/// Node side of an ACL: `*`, a node ID, or `group:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeSelector {
    Any,
    Node(NodeId),
    Group(String),
}

const GROUP_REF_PREFIX: &str = "group:";

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeSelector::Any => f.write_str("*"),
            NodeSelector::Node(id) => f.write_str(id),
            NodeSelector::Group(g) => write!(f, "{GROUP_REF_PREFIX}{g}"),
        }
    }
}

impl FromStr for NodeSelector {
    type Err = SkeinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(NodeSelector::Any);
        }
        if let Some(group) = s.strip_prefix(GROUP_REF_PREFIX) {
            check_id("group", group)?;
            return Ok(NodeSelector::Group(group.to_string()));
        }
        check_node_id(s)?;
        Ok(NodeSelector::Node(s.to_string()))
    }
}

impl TryFrom<String> for NodeSelector {
    type Error = SkeinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeSelector> for String {
    fn from(s: NodeSelector) -> Self {
        s.to_string()
    }
}

/// Address side of an ACL: `*` or a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CidrSelector {
    Any,
    Prefix(Prefix),
}

impl fmt::Display for CidrSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidrSelector::Any => f.write_str("*"),
            CidrSelector::Prefix(p) => write!(f, "{p}"),
        }
    }
}

impl FromStr for CidrSelector {
    type Err = SkeinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(CidrSelector::Any)
        } else {
            s.parse().map(CidrSelector::Prefix)
        }
    }
}

impl TryFrom<String> for CidrSelector {
    type Error = SkeinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrSelector> for String {
    fn from(s: CidrSelector) -> Self {
        s.to_string()
    }
}

/// A prioritised accept/deny rule. Empty selector lists do not constrain
/// the match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NetworkAcl {
    pub name: String,
    pub priority: i32,
    pub action: AclAction,
    pub source_nodes: Vec<NodeSelector>,
    pub destination_nodes: Vec<NodeSelector>,
    pub source_cidrs: Vec<CidrSelector>,
    pub destination_cidrs: Vec<CidrSelector>,
    pub protocols: Vec<String>,
    pub ports: Vec<u16>,
}

impl NetworkAcl {
    /// `*` → `*` on every selector.
    pub fn allow_all(name: impl Into<String>, priority: i32) -> Self {
        NetworkAcl {
            name: name.into(),
            priority,
            action: AclAction::Accept,
            source_nodes: vec![NodeSelector::Any],
            destination_nodes: vec![NodeSelector::Any],
            source_cidrs: vec![CidrSelector::Any],
            destination_cidrs: vec![CidrSelector::Any],
            protocols: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        is_system_acl(&self.name)
    }

    pub fn validate(&self) -> Result<(), SkeinError> {
        check_id("network acl", &self.name)?;
        if self.is_system() {
            return Err(SkeinError::InvalidArgument(format!(
                "network acl {:?} is a system acl and cannot be modified",
                self.name
            )));
        }
        self.check_priority()
    }

    /// Only the system ACL may sit at [`SYSTEM_ACL_PRIORITY`].
    pub fn check_priority(&self) -> Result<(), SkeinError> {
        if self.priority == SYSTEM_ACL_PRIORITY && !self.is_system() {
            return Err(SkeinError::InvalidArgument(format!(
                "network acl {:?}: priority {} is reserved for system acls",
                self.name, SYSTEM_ACL_PRIORITY
            )));
        }
        Ok(())
    }
}

/// Mesh-wide settings written at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MeshState {
    pub ipv4_prefix: Prefix,
    pub ipv6_prefix: Prefix,
    pub mesh_domain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_selector_round_trip_through_strings() {
        assert_eq!("*".parse::<NodeSelector>().unwrap(), NodeSelector::Any);
        assert_eq!(
            "group:voters".parse::<NodeSelector>().unwrap(),
            NodeSelector::Group("voters".into())
        );
        assert_eq!("n1".parse::<NodeSelector>().unwrap(), NodeSelector::Node("n1".into()));
        assert_eq!(NodeSelector::Group("ops".into()).to_string(), "group:ops");
        assert!("group:".parse::<NodeSelector>().is_err());
        assert!("a,b".parse::<NodeSelector>().is_err());
    }

    #[test]
    fn cidr_selector_parses_wildcard() {
        assert_eq!("*".parse::<CidrSelector>().unwrap(), CidrSelector::Any);
        assert!(matches!(
            "10.0.0.0/8".parse::<CidrSelector>().unwrap(),
            CidrSelector::Prefix(_)
        ));
        assert!("10.0.0.0".parse::<CidrSelector>().is_err());
    }

    #[test]
    fn system_acl_cannot_be_validated_for_write() {
        let acl = NetworkAcl::allow_all(BOOTSTRAP_NODES_ACL, 0);
        assert!(acl.validate().is_err());
        assert!(NetworkAcl::allow_all("allow-all", 0).validate().is_ok());
    }

    #[test]
    fn top_priority_is_reserved() {
        let acl = NetworkAcl::allow_all("aaa-deny", SYSTEM_ACL_PRIORITY);
        assert!(matches!(acl.validate(), Err(SkeinError::InvalidArgument(_))));
        assert!(NetworkAcl::allow_all("high", SYSTEM_ACL_PRIORITY - 1).validate().is_ok());
        assert!(NetworkAcl::allow_all(BOOTSTRAP_NODES_ACL, SYSTEM_ACL_PRIORITY).check_priority().is_ok());
    }

    #[test]
    fn edge_self_loop_rejected() {
        assert!(Edge::new("a", "a").validate().is_err());
        assert!(Edge::new("a", "b").validate().is_ok());
    }
}
