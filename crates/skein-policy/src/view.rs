use std::collections::BTreeMap;

use skein_storage::{repo, MeshRead};
use skein_types::{Edge, Group, MeshNode, NetworkAcl, Prefix, Route, SkeinError};

use crate::acl::NetworkAcls;
use crate::graph::PeerGraph;

/// The topology and network policy needed to derive peer configuration,
/// loaded in one pass so every derivation sees the same state.
#[derive(Debug, Clone, Default)]
pub struct MeshView {
    pub nodes: Vec<MeshNode>,
    pub edges: Vec<Edge>,
    pub routes: Vec<Route>,
    pub acls: Vec<NetworkAcl>,
    pub groups: BTreeMap<String, Group>,
}

impl MeshView {
    pub async fn load<S: MeshRead>(store: &S) -> Result<Self, SkeinError> {
        let nodes = repo::list::<MeshNode, S>(store).await?;
        let edges = repo::list::<Edge, S>(store).await?;
        let routes = repo::list::<Route, S>(store).await?;
        let acls = repo::list::<NetworkAcl, S>(store).await?;
        let groups = repo::list::<Group, S>(store)
            .await?
            .into_iter()
            .map(|g| (g.name.clone(), g))
            .collect();
        tracing::trace!(
            nodes = nodes.len(),
            edges = edges.len(),
            routes = routes.len(),
            acls = acls.len(),
            "loaded mesh view"
        );
        Ok(MeshView { nodes, edges, routes, acls, groups })
    }

    pub fn graph(&self) -> PeerGraph {
        PeerGraph::new(self.nodes.iter().cloned(), self.edges.iter())
    }

    pub fn network_acls(&self) -> NetworkAcls<'_> {
        NetworkAcls::new(&self.acls, &self.groups)
    }

    /// Every prefix advertised by routes owned by `node`, first occurrence
    /// order, without duplicates.
    pub fn route_prefixes(&self, node: &str) -> Vec<Prefix> {
        let mut out = Vec::new();
        for route in self.routes.iter().filter(|r| r.node == node) {
            for prefix in &route.destination_cidrs {
                if !out.contains(prefix) {
                    out.push(*prefix);
                }
            }
        }
        out
    }
}
