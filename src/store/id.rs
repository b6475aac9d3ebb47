//! Node handles for [`ConfigurationStore`](super::ConfigurationStore).
//!
//! A `NodeId` is the position of a node in the store arena. Ids are never
//! reused: deleting a subtree tombstones its slots, so a stale id resolves to
//! an error instead of to an unrelated node.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    /// Parent of the root. Never refers to a slot.
    pub const DETACHED: NodeId = NodeId(u32::MAX);

    /// Handle for arena slot `index`, or `None` once the arena outgrows `u32`.
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .filter(|&raw| raw != u32::MAX)
            .map(NodeId)
    }

    #[inline]
    pub fn is_attached(self) -> bool {
        self != Self::DETACHED
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_attached() {
            true => write!(f, "#{}", self.0),
            false => f.write_str("#detached"),
        }
    }
}
