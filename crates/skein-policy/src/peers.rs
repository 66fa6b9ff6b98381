//! Per-node tunnel peer configuration.
//!
//! A node tunnels directly only to its ACL-filtered neighbours, but every
//! node reachable through a neighbour must be routable through that
//! neighbour's tunnel. Each direct peer therefore carries the addresses of
//! everything reachable behind it that is not itself a direct peer.

use std::collections::{BTreeSet, VecDeque};

use skein_storage::MeshStore;
use skein_types::{MeshNode, NodeId, Prefix, SkeinError};

use crate::acl::{filter_graph, AdjacencyMap};
use crate::graph::PeerGraph;
use crate::view::MeshView;

/// Tunnel configuration for one direct peer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub public_key: String,
    pub zone_awareness_id: String,
    pub primary_endpoint: Option<String>,
    pub wireguard_endpoints: Vec<String>,
    pub address_ipv4: Option<Prefix>,
    pub address_ipv6: Option<Prefix>,
    /// Destinations routed into this peer's tunnel.
    pub allowed_ips: Vec<Prefix>,
    /// Our own advertised prefixes this peer should route back to us.
    pub allowed_routes: Vec<Prefix>,
}

/// The direct peers of `node_id`, sorted by ID.
pub fn peers_for(view: &MeshView, node_id: &str) -> Result<Vec<Peer>, SkeinError> {
    let graph = view.graph();
    if !graph.contains(node_id) {
        return Err(SkeinError::not_found("node", node_id));
    }
    let acls = view.network_acls();
    let adjacency = filter_graph(&graph, &acls, node_id);
    let our_routes = view.route_prefixes(node_id);
    let resolver = Resolver { view, graph: &graph, adjacency: &adjacency, this: node_id, our_routes };

    let Some(direct) = adjacency.get(node_id) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::with_capacity(direct.len());
    // BTreeSet iteration keeps the output sorted by ID.
    for id in direct {
        let node = graph
            .vertex(id)
            .ok_or_else(|| SkeinError::not_found("node", id.as_str()))?;
        let (allowed_ips, allowed_routes) = resolver.reachable_through(node, direct)?;
        out.push(Peer {
            id: node.id.clone(),
            public_key: node.public_key.clone(),
            zone_awareness_id: node.zone_awareness_id.clone(),
            primary_endpoint: node.preferred_endpoint().map(str::to_string),
            wireguard_endpoints: node.wireguard_endpoints.clone(),
            address_ipv4: node.private_ipv4,
            address_ipv6: Some(node.private_ipv6),
            allowed_ips,
            allowed_routes,
        });
    }
    tracing::debug!(node_id, peers = out.len(), "resolved peers");
    Ok(out)
}

/// Resolve the peers of `node_id` against a point-in-time view of `store`.
pub async fn resolve_peers<S: MeshStore>(store: &S, node_id: &str) -> Result<Vec<Peer>, SkeinError> {
    let view = MeshView::load(&store.read_view().await?).await?;
    peers_for(&view, node_id)
}

struct Resolver<'a> {
    view: &'a MeshView,
    graph: &'a PeerGraph,
    adjacency: &'a AdjacencyMap,
    this: &'a str,
    our_routes: Vec<Prefix>,
}

impl Resolver<'_> {
    /// Breadth-first walk from `peer` collecting what is reachable through
    /// it. The requester and the other direct peers are not crossed; they
    /// are reached over their own tunnels.
    fn reachable_through(
        &self,
        peer: &MeshNode,
        direct: &BTreeSet<NodeId>,
    ) -> Result<(Vec<Prefix>, Vec<Prefix>), SkeinError> {
        let mut ips = Vec::new();
        let mut routes = Vec::new();
        self.collect(peer, &mut ips, &mut routes);

        let mut visited = BTreeSet::from([peer.id.as_str()]);
        let mut queue = VecDeque::from([peer.id.as_str()]);
        while let Some(current) = queue.pop_front() {
            for target in self.adjacency.get(current).into_iter().flatten() {
                if target == self.this || direct.contains(target) || !visited.insert(target) {
                    continue;
                }
                let node = self
                    .graph
                    .vertex(target)
                    .ok_or_else(|| SkeinError::not_found("node", target.as_str()))?;
                self.collect(node, &mut ips, &mut routes);
                queue.push_back(target);
            }
        }
        Ok((ips, routes))
    }

    /// A node contributes its private addresses. A node advertising routes
    /// contributes those prefixes, minus ones we advertise ourselves. A node
    /// without routes is handed our prefixes instead. When both sides
    /// advertise routes nothing is exchanged in the other direction.
    fn collect(&self, node: &MeshNode, ips: &mut Vec<Prefix>, routes: &mut Vec<Prefix>) {
        for addr in node.private_addresses() {
            push_unique(ips, addr);
        }
        let theirs = self.view.route_prefixes(&node.id);
        if !theirs.is_empty() {
            for prefix in theirs {
                if !self.our_routes.contains(&prefix) {
                    push_unique(ips, prefix);
                }
            }
        } else {
            for prefix in &self.our_routes {
                push_unique(routes, *prefix);
            }
        }
    }
}

fn push_unique(out: &mut Vec<Prefix>, prefix: Prefix) {
    if !out.contains(&prefix) {
        out.push(prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_types::{Edge, NetworkAcl, Route};

    fn node(id: &str, v4: &str, v6: &str) -> MeshNode {
        let mut n = MeshNode::new(id, format!("key-{id}"), v6.parse().unwrap());
        n.private_ipv4 = Some(v4.parse().unwrap());
        n
    }

    fn prefixes(list: &[&str]) -> Vec<Prefix> {
        let mut out: Vec<Prefix> = list.iter().map(|p| p.parse().unwrap()).collect();
        out.sort();
        out
    }

    fn sorted(mut list: Vec<Prefix>) -> Vec<Prefix> {
        list.sort();
        list
    }

    fn open_view(nodes: Vec<MeshNode>, edges: &[(&str, &str)]) -> MeshView {
        MeshView {
            nodes,
            edges: edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
            acls: vec![NetworkAcl::allow_all("all", 0)],
            ..Default::default()
        }
    }

    fn allowed(view: &MeshView, of: &str, peer: &str) -> Vec<Prefix> {
        let peers = peers_for(view, of).unwrap();
        let p = peers.iter().find(|p| p.id == peer).unwrap();
        sorted(p.allowed_ips.clone())
    }

    #[test]
    fn simple_one_to_one() {
        let view = open_view(
            vec![
                node("peer1", "172.16.0.1/32", "2001:db8::1/128"),
                node("peer2", "172.16.0.2/32", "2001:db8::2/128"),
            ],
            &[("peer1", "peer2")],
        );
        assert_eq!(
            allowed(&view, "peer1", "peer2"),
            prefixes(&["172.16.0.2/32", "2001:db8::2/128"])
        );
        assert_eq!(
            allowed(&view, "peer2", "peer1"),
            prefixes(&["172.16.0.1/32", "2001:db8::1/128"])
        );
    }

    #[test]
    fn full_mesh_of_three() {
        let view = open_view(
            vec![
                node("peer1", "172.16.0.1/32", "2001:db8::1/128"),
                node("peer2", "172.16.0.2/32", "2001:db8::2/128"),
                node("peer3", "172.16.0.3/32", "2001:db8::3/128"),
            ],
            &[
                ("peer1", "peer2"),
                ("peer1", "peer3"),
                ("peer2", "peer1"),
                ("peer2", "peer3"),
                ("peer3", "peer1"),
                ("peer3", "peer2"),
            ],
        );
        // Each peer is direct, so nothing is relayed.
        for (of, peer, v4, v6) in [
            ("peer1", "peer2", "172.16.0.2/32", "2001:db8::2/128"),
            ("peer1", "peer3", "172.16.0.3/32", "2001:db8::3/128"),
            ("peer2", "peer1", "172.16.0.1/32", "2001:db8::1/128"),
            ("peer2", "peer3", "172.16.0.3/32", "2001:db8::3/128"),
            ("peer3", "peer1", "172.16.0.1/32", "2001:db8::1/128"),
            ("peer3", "peer2", "172.16.0.2/32", "2001:db8::2/128"),
        ] {
            assert_eq!(allowed(&view, of, peer), prefixes(&[v4, v6]), "{of} -> {peer}");
        }
    }

    #[test]
    fn site_to_site_relays_through_routers() {
        let view = open_view(
            vec![
                node("site1-router", "172.16.0.1/32", "2001:db8::1/128"),
                node("site2-router", "172.16.0.2/32", "2001:db8::2/128"),
                node("site1-follower", "172.16.0.3/32", "2001:db8::3/128"),
                node("site2-follower", "172.16.0.4/32", "2001:db8::4/128"),
            ],
            &[
                ("site1-router", "site2-router"),
                ("site1-router", "site1-follower"),
                ("site2-router", "site1-router"),
                ("site2-router", "site2-follower"),
            ],
        );

        assert_eq!(
            allowed(&view, "site1-router", "site2-router"),
            prefixes(&["172.16.0.2/32", "2001:db8::2/128", "172.16.0.4/32", "2001:db8::4/128"])
        );
        assert_eq!(
            allowed(&view, "site1-router", "site1-follower"),
            prefixes(&["172.16.0.3/32", "2001:db8::3/128"])
        );
        assert_eq!(
            allowed(&view, "site2-router", "site1-router"),
            prefixes(&["172.16.0.1/32", "2001:db8::1/128", "172.16.0.3/32", "2001:db8::3/128"])
        );
        assert_eq!(
            allowed(&view, "site1-follower", "site1-router"),
            prefixes(&[
                "172.16.0.1/32",
                "2001:db8::1/128",
                "172.16.0.2/32",
                "2001:db8::2/128",
                "172.16.0.4/32",
                "2001:db8::4/128",
            ])
        );
        assert_eq!(
            allowed(&view, "site2-follower", "site2-router"),
            prefixes(&[
                "172.16.0.1/32",
                "2001:db8::1/128",
                "172.16.0.2/32",
                "2001:db8::2/128",
                "172.16.0.3/32",
                "2001:db8::3/128",
            ])
        );
        assert_eq!(peers_for(&view, "site1-follower").unwrap().len(), 1);
    }

    #[test]
    fn transitive_node_reached_through_directed_chain() {
        let view = open_view(
            vec![
                node("a", "172.16.0.1/32", "fd00::a/128"),
                node("b", "172.16.0.2/32", "fd00::b/128"),
                node("c", "172.16.0.3/32", "fd00::c/128"),
            ],
            &[("a", "b"), ("b", "c")],
        );
        let peers = peers_for(&view, "a").unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, "b");
        assert_eq!(
            sorted(peers[0].allowed_ips.clone()),
            prefixes(&["172.16.0.2/32", "fd00::b/128", "172.16.0.3/32", "fd00::c/128"])
        );
    }

    #[test]
    fn routes_flow_one_way() {
        let mut view = open_view(
            vec![
                node("x", "172.16.0.1/32", "fd00::1/128"),
                node("y", "172.16.0.2/32", "fd00::2/128"),
            ],
            &[("x", "y")],
        );
        view.routes.push(Route {
            name: "x-lan".into(),
            node: "x".into(),
            destination_cidrs: vec!["10.0.0.0/24".parse().unwrap()],
            next_hop_nodes: Vec::new(),
        });
        let lan: Prefix = "10.0.0.0/24".parse().unwrap();

        let from_x = peers_for(&view, "x").unwrap();
        assert_eq!(from_x[0].allowed_routes, vec![lan]);
        assert!(!from_x[0].allowed_ips.contains(&lan));

        let from_y = peers_for(&view, "y").unwrap();
        assert!(from_y[0].allowed_ips.contains(&lan));
        assert!(from_y[0].allowed_routes.is_empty());
    }

    #[test]
    fn denied_mesh_has_no_peers() {
        let mut view = open_view(
            vec![
                node("a", "172.16.0.1/32", "fd00::a/128"),
                node("b", "172.16.0.2/32", "fd00::b/128"),
            ],
            &[("a", "b")],
        );
        view.acls.clear();
        assert!(peers_for(&view, "a").unwrap().is_empty());
    }

    #[test]
    fn unknown_node_is_not_found() {
        let view = MeshView::default();
        let err = peers_for(&view, "ghost").unwrap_err();
        assert!(matches!(err, SkeinError::NotFound { kind: "node", .. }));
    }

    #[test]
    fn preferred_endpoint_is_reported() {
        let mut a = node("a", "172.16.0.1/32", "fd00::a/128");
        let mut b = node("b", "172.16.0.2/32", "fd00::b/128");
        b.primary_endpoint = "203.0.113.7".into();
        b.wireguard_endpoints = vec!["198.51.100.1:51820".into(), "203.0.113.7:51820".into()];
        a.zone_awareness_id = "zone-a".into();
        let view = open_view(vec![a, b], &[("a", "b")]);
        let peers = peers_for(&view, "a").unwrap();
        assert_eq!(peers[0].primary_endpoint.as_deref(), Some("203.0.113.7:51820"));
        let peers = peers_for(&view, "b").unwrap();
        assert_eq!(peers[0].zone_awareness_id, "zone-a");
        assert_eq!(peers[0].primary_endpoint, None);
    }
}
