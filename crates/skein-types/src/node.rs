use std::collections::HashSet;

use crate::prefix::Prefix;
use crate::validate::check_node_id;
use crate::{NodeId, SkeinError};

/// Services a node may expose on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Feature {
    Nodes,
    LeaderProxy,
    MeshApi,
    AdminApi,
    Membership,
    MeshDns,
    TurnServer,
    StorageProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeaturePort {
    pub feature: Feature,
    pub port: u16,
}

/// A participant in the mesh.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MeshNode {
    pub id: NodeId,
    /// WireGuard public key, base64.
    pub public_key: String,
    /// Preferred public address (no port); used to pick a tunnel endpoint.
    pub primary_endpoint: String,
    /// `host:port` tunnel endpoints.
    pub wireguard_endpoints: Vec<String>,
    pub zone_awareness_id: String,
    pub private_ipv4: Option<Prefix>,
    pub private_ipv6: Prefix,
    pub features: Vec<FeaturePort>,
    /// Unix seconds.
    pub joined_at: i64,
}

impl MeshNode {
    /// A node with only the mandatory fields set.
    pub fn new(id: impl Into<NodeId>, public_key: impl Into<String>, private_ipv6: Prefix) -> Self {
        MeshNode {
            id: id.into(),
            public_key: public_key.into(),
            primary_endpoint: String::new(),
            wireguard_endpoints: Vec::new(),
            zone_awareness_id: String::new(),
            private_ipv4: None,
            private_ipv6,
            features: Vec::new(),
            joined_at: 0,
        }
    }

    pub fn port_for(&self, feature: Feature) -> Option<u16> {
        self.features.iter().find(|f| f.feature == feature).map(|f| f.port)
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.port_for(feature).is_some()
    }

    pub fn rpc_port(&self) -> Option<u16> {
        self.port_for(Feature::Nodes)
    }

    pub fn dns_port(&self) -> Option<u16> {
        self.port_for(Feature::MeshDns)
    }

    pub fn turn_port(&self) -> Option<u16> {
        self.port_for(Feature::TurnServer)
    }

    pub fn storage_port(&self) -> Option<u16> {
        self.port_for(Feature::StorageProvider)
    }

    /// The tunnel endpoint to dial: the first one on the primary endpoint's
    /// host, otherwise the first advertised endpoint.
    pub fn preferred_endpoint(&self) -> Option<&str> {
        if !self.primary_endpoint.is_empty() {
            if let Some(ep) = self
                .wireguard_endpoints
                .iter()
                .find(|ep| ep.starts_with(&self.primary_endpoint))
            {
                return Some(ep);
            }
        }
        self.wireguard_endpoints.first().map(String::as_str)
    }

    /// Private addresses in the order they are handed to peers.
    pub fn private_addresses(&self) -> impl Iterator<Item = Prefix> + '_ {
        self.private_ipv4.into_iter().chain(std::iter::once(self.private_ipv6))
    }

    pub fn validate(&self) -> Result<(), SkeinError> {
        check_node_id(&self.id)?;
        if self.public_key.is_empty() {
            return Err(SkeinError::InvalidArgument(format!(
                "node {:?} has no public key",
                self.id
            )));
        }
        if !self.private_ipv6.is_ipv6() {
            return Err(SkeinError::InvalidArgument(format!(
                "node {:?} private_ipv6 {} is not an IPv6 prefix",
                self.id, self.private_ipv6
            )));
        }
        if let Some(v4) = self.private_ipv4 {
            if !v4.is_ipv4() {
                return Err(SkeinError::InvalidArgument(format!(
                    "node {:?} private_ipv4 {v4} is not an IPv4 prefix",
                    self.id
                )));
            }
        }
        let mut seen = HashSet::new();
        for fp in &self.features {
            if !seen.insert(fp.feature) {
                return Err(SkeinError::InvalidArgument(format!(
                    "node {:?} lists feature {:?} more than once",
                    self.id, fp.feature
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> MeshNode {
        MeshNode {
            id: "n1".into(),
            public_key: "key".into(),
            primary_endpoint: "198.51.100.7".into(),
            wireguard_endpoints: vec!["203.0.113.1:51820".into(), "198.51.100.7:51820".into()],
            zone_awareness_id: String::new(),
            private_ipv4: Some("172.16.0.1/32".parse().unwrap()),
            private_ipv6: "fd00::1/128".parse().unwrap(),
            features: vec![
                FeaturePort { feature: Feature::Nodes, port: 8443 },
                FeaturePort { feature: Feature::MeshDns, port: 5353 },
            ],
            joined_at: 0,
        }
    }

    #[test]
    fn preferred_endpoint_follows_primary() {
        let mut n = node();
        assert_eq!(n.preferred_endpoint(), Some("198.51.100.7:51820"));
        n.primary_endpoint.clear();
        assert_eq!(n.preferred_endpoint(), Some("203.0.113.1:51820"));
        n.wireguard_endpoints.clear();
        assert_eq!(n.preferred_endpoint(), None);
    }

    #[test]
    fn feature_ports() {
        let n = node();
        assert_eq!(n.rpc_port(), Some(8443));
        assert_eq!(n.dns_port(), Some(5353));
        assert_eq!(n.turn_port(), None);
        assert!(!n.has_feature(Feature::StorageProvider));
    }

    #[test]
    fn validate_rejects_duplicate_features_and_bad_families() {
        assert!(node().validate().is_ok());

        let mut n = node();
        n.features.push(FeaturePort { feature: Feature::Nodes, port: 1 });
        assert!(n.validate().is_err());

        let mut n = node();
        n.private_ipv6 = "10.0.0.1/32".parse().unwrap();
        assert!(n.validate().is_err());

        let mut n = node();
        n.id = "self".into();
        assert!(n.validate().is_err());
    }
}
