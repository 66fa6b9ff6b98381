//! Read-side derivations over the replicated mesh state: the filtered
//! topology, per-node peer configuration and RBAC decisions.

pub mod acl;
pub mod graph;
mod groups;
pub mod peers;
pub mod rbac;
pub mod view;

use std::future::Future;
use std::time::Duration;

use skein_types::SkeinError;

pub use acl::{filter_graph, AdjacencyMap, NetworkAcls, NetworkAction};
pub use graph::PeerGraph;
pub use peers::{peers_for, resolve_peers, Peer};
pub use rbac::{Action, RbacEvaluator};
pub use view::MeshView;

/// Run a read-path future under a deadline.
///
/// Expiry drops `fut`, which holds no locks or staged writes, and surfaces as
/// `SkeinError::Timeout`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, SkeinError>
where
    F: Future<Output = Result<T, SkeinError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(SkeinError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_passes_through_result() {
        let out = with_deadline(Duration::from_secs(1), async { Ok::<_, SkeinError>(7) }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn deadline_expiry_is_timeout() {
        let out = with_deadline(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SkeinError>(())
        })
        .await;
        assert_eq!(out, Err(SkeinError::Timeout));
    }
}
