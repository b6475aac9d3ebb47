//! Debug text form of a store.
//!
//! Renders the tree in the `Name = { ... }` / `Leaf = value` layout used by
//! configuration authors. This is a debugging aid, not a stable format.

use super::{ConfigurationStore, NodeId};
use std::fmt;

const INDENT: &str = "    ";

impl ConfigurationStore {
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        for child in self.children(id) {
            let name = self.name(child).unwrap_or("");
            let indent = INDENT.repeat(depth);
            if self.is_leaf(child) {
                match self.value(child) {
                    Some(value) => writeln!(f, "{}{} = {}", indent, name, value)?,
                    None => writeln!(f, "{}{} = {{}}", indent, name)?,
                }
            } else {
                writeln!(f, "{}{} = {{", indent, name)?;
                self.fmt_node(f, child, depth + 1)?;
                writeln!(f, "{}}}", indent)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigurationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, Self::ROOT, 0)
    }
}
