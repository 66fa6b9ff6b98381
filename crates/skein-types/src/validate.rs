//! Identifier rules shared by every entity kind.

use crate::SkeinError;

/// Characters that may not appear in any entity identifier. `/` doubles as
/// the edge key separator in storage.
pub const INVALID_ID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '\'', '<', '>', '|', ','];

/// Names a node may never take.
pub const RESERVED_NODE_IDS: &[&str] = &["self", "local", "localhost", "leader", "voters", "observers"];

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(INVALID_ID_CHARS) && !id.contains('\0')
}

pub fn is_valid_node_id(id: &str) -> bool {
    is_valid_id(id) && !RESERVED_NODE_IDS.contains(&id)
}

pub fn check_id(kind: &str, id: &str) -> Result<(), SkeinError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(SkeinError::InvalidArgument(format!("invalid {kind} name {id:?}")))
    }
}

pub fn check_node_id(id: &str) -> Result<(), SkeinError> {
    if is_valid_node_id(id) {
        Ok(())
    } else {
        Err(SkeinError::InvalidArgument(format!("invalid node id {id:?}")))
    }
}
