use std::collections::{BTreeMap, BTreeSet};

use skein_types::{Edge, MeshNode, NodeId};

/// Directed topology built from every node and edge in the mesh.
///
/// Vertices are keyed by node ID; each vertex carries its out-edge targets.
/// Edges that name a node with no record are dropped with a warning, which
/// can happen transiently while a node is being removed.
#[derive(Debug, Clone, Default)]
pub struct PeerGraph {
    vertices: BTreeMap<NodeId, MeshNode>,
    out_edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl PeerGraph {
    pub fn new<'a>(
        nodes: impl IntoIterator<Item = MeshNode>,
        edges: impl IntoIterator<Item = &'a Edge>,
    ) -> Self {
        let vertices: BTreeMap<NodeId, MeshNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        let mut out_edges: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for edge in edges {
            if !vertices.contains_key(&edge.source) || !vertices.contains_key(&edge.target) {
                tracing::warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "skipping edge with unknown endpoint"
                );
                continue;
            }
            out_edges.entry(edge.source.clone()).or_default().insert(edge.target.clone());
        }
        PeerGraph { vertices, out_edges }
    }

    pub fn vertex(&self, id: &str) -> Option<&MeshNode> {
        self.vertices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn targets(&self, id: &str) -> impl Iterator<Item = &NodeId> {
        self.out_edges.get(id).into_iter().flatten()
    }

    /// All `(source, target)` pairs, ordered by source then target.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.out_edges.iter().flat_map(|(s, ts)| ts.iter().map(move |t| (s, t)))
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
