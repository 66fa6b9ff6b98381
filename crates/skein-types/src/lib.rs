pub mod command;
pub mod network;
pub mod node;
pub mod prefix;
pub mod rbac;
pub mod validate;

pub use command::{ApplyResult, Command};
pub use network::{
    AclAction, CidrSelector, Edge, MeshState, NetworkAcl, NodeSelector, Route,
    BOOTSTRAP_NODES_ACL, SYSTEM_ACL_PRIORITY,
};
pub use node::{Feature, FeaturePort, MeshNode};
pub use prefix::Prefix;
pub use rbac::{Group, Resource, Role, RoleBinding, Rule, Subject, SubjectType, Verb};

pub type NodeId = String;
pub type Term = u64;
pub type LogIndex = u64;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SkeinError {
    /// A committed log entry could not be decoded. The replica must stop
    /// applying and be rebuilt from a snapshot.
    #[error("undecodable log entry at index {index}: {reason}")]
    Decode { index: LogIndex, reason: String },
    /// The last-applied checkpoint could not be read, so ordering cannot be
    /// validated.
    #[error("checkpoint unreadable: {0}")]
    Checkpoint(String),
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("consensus error: {0}")]
    Consensus(String),
    #[error("operation timed out")]
    Timeout,
}

impl SkeinError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        SkeinError::NotFound { kind, name: name.into() }
    }

    /// Fatal errors halt the apply path; everything else is reported to the
    /// caller and the replica keeps going.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SkeinError::Decode { .. } | SkeinError::Checkpoint(_))
    }
}
