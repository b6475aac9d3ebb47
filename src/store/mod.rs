//! Hierarchical configuration store.
//!
//! An ordered tree of named nodes stored in a flat arena indexed by [`NodeId`].
//! Interior nodes hold ordered children with unique names; leaf nodes hold a
//! [`Value`]. This is the data-exchange format shared by the builder's inputs
//! (Functions, Data and States stores) and its exported outputs.
//!
//! ```text
//! <root>
//! +-- GAM1                    (interior)
//! |   +-- InputSignals        (interior)
//! |   |   +-- Signal1         (interior)
//! |   |       +-- Type        (leaf "uint32")
//! |   |       +-- DataSource  (leaf "DDB1")
//! ```
//!
//! Nodes are addressed by dotted paths (`"GAM1.InputSignals.Signal1.Type"`) or by id.
//! Child names may contain dots themselves (member alias keys such as `"Sig.a1"`);
//! such children are reachable through [`ConfigurationStore::child`] only.
//!
//! Traversal that needs a notion of "current node" uses a borrowed [`Cursor`]
//! instead of state stored in the tree.

pub mod convert;
pub mod error;
pub mod id;
mod printer;

pub use error::{StoreError, StoreResult};
pub use id::NodeId;

use crate::types::Value;

/// Kind tag given when a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Holds named children
    Interior,
    /// Holds a value
    Leaf,
}

/// A single node in the store arena.
#[derive(Debug, Clone)]
struct StoreNode {
    name: String,
    parent: NodeId,
    children: Vec<NodeId>,
    kind: NodeKind,
    value: Option<Value>,
    /// Removed nodes stay in the arena (ids are indices) but are unreachable.
    removed: bool,
}

/// Arena-backed hierarchical store.
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    nodes: Vec<StoreNode>,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationStore {
    /// The root node always has index 0.
    pub const ROOT: NodeId = NodeId::ROOT;

    pub fn new() -> Self {
        Self {
            nodes: vec![StoreNode {
                name: String::new(),
                parent: NodeId::DETACHED,
                children: Vec::new(),
                kind: NodeKind::Interior,
                value: None,
                removed: false,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Number of reachable nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.removed).count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.child_count(Self::ROOT) == 0
    }

    fn node(&self, id: NodeId) -> StoreResult<&StoreNode> {
        self.nodes
            .get(id.index())
            .filter(|n| !n.removed)
            .ok_or(StoreError::InvalidNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> StoreResult<&mut StoreNode> {
        self.nodes
            .get_mut(id.index())
            .filter(|n| !n.removed)
            .ok_or(StoreError::InvalidNode(id))
    }

    /// Short name of a node (empty for the root).
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(|n| n.name.as_str())
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).ok().map(|n| n.kind)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.kind(id) == Some(NodeKind::Leaf)
    }

    pub fn is_interior(&self, id: NodeId) -> bool {
        self.kind(id) == Some(NodeKind::Interior)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().map(|n| n.parent).filter(|p| p.is_attached())
    }

    /// Walk `levels` ancestors up from `id`.
    pub fn ancestor(&self, id: NodeId, levels: usize) -> Option<NodeId> {
        let mut current = id;
        self.node(current).ok()?;
        for _ in 0..levels {
            current = self.parent(current)?;
        }
        Some(current)
    }

    /// Iterate over the children of a node in insertion order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).map(|n| n.children.len()).unwrap_or(0)
    }

    pub fn child_names(&self, id: NodeId) -> Vec<&str> {
        self.children(id).filter_map(|c| self.name(c)).collect()
    }

    pub fn child_at(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self.node(id).ok()?.children.get(position).copied()
    }

    /// Look up a direct child by exact name.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id).find(|&c| self.name(c) == Some(name))
    }

    /// Resolve a dotted path relative to `base`. The empty path resolves to `base`.
    pub fn resolve_from(&self, base: NodeId, path: &str) -> Option<NodeId> {
        self.node(base).ok()?;
        if path.is_empty() {
            return Some(base);
        }
        path.split('.')
            .try_fold(base, |current, segment| self.child(current, segment))
    }

    /// Resolve an absolute dotted path from the root.
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        self.resolve_from(Self::ROOT, path)
    }

    /// Dotted path of a node from the root (empty for the root).
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Ok(node) = self.node(current) {
            if !node.parent.is_attached() {
                break;
            }
            segments.push(node.name.as_str());
            current = node.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Value held by a leaf.
    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.node(id).ok().and_then(|n| n.value.as_ref())
    }

    /// Value of the leaf child `name` of `parent`.
    pub fn read(&self, parent: NodeId, name: &str) -> Option<&Value> {
        self.child(parent, name).and_then(|c| self.value(c))
    }

    /// Value of the leaf at an absolute path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.resolve(path).and_then(|id| self.value(id))
    }

    /// Create a child node with the given kind tag.
    pub fn create_node(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
    ) -> StoreResult<NodeId> {
        if name.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if self.node(parent)?.kind != NodeKind::Interior {
            return Err(StoreError::NotInterior(self.path(parent)));
        }
        if self.child(parent, name).is_some() {
            return Err(StoreError::DuplicateName {
                parent: self.path(parent),
                name: name.to_string(),
            });
        }

        let id = NodeId::from_index(self.nodes.len()).ok_or(StoreError::Full)?;
        self.nodes.push(StoreNode {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            kind,
            value: None,
            removed: false,
        });
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Create (or reuse) every interior node along an absolute dotted path.
    pub fn create_path(&mut self, path: &str) -> StoreResult<NodeId> {
        self.create_path_from(Self::ROOT, path)
    }

    /// Create (or reuse) every interior node along a path relative to `base`.
    pub fn create_path_from(&mut self, base: NodeId, path: &str) -> StoreResult<NodeId> {
        let mut current = base;
        self.node(current)?;
        if path.is_empty() {
            return Ok(current);
        }
        for segment in path.split('.') {
            current = match self.child(current, segment) {
                Some(existing) if self.is_interior(existing) => existing,
                Some(existing) => return Err(StoreError::NotInterior(self.path(existing))),
                None => self.create_node(current, segment, NodeKind::Interior)?,
            };
        }
        Ok(current)
    }

    /// Write a leaf child, replacing the value if the leaf already exists.
    pub fn write(
        &mut self,
        parent: NodeId,
        name: &str,
        value: impl Into<Value>,
    ) -> StoreResult<NodeId> {
        let id = match self.child(parent, name) {
            Some(existing) if self.is_leaf(existing) => existing,
            Some(existing) => return Err(StoreError::NotLeaf(self.path(existing))),
            None => self.create_node(parent, name, NodeKind::Leaf)?,
        };
        self.node_mut(id)?.value = Some(value.into());
        Ok(id)
    }

    /// Write a leaf at an absolute dotted path, creating intermediate nodes.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> StoreResult<NodeId> {
        let (parent_path, name) = match path.rsplit_once('.') {
            Some((parent, name)) => (parent, name),
            None => ("", path),
        };
        let parent = self.create_path(parent_path)?;
        self.write(parent, name, value)
    }

    /// Delete a node and its subtree. The root cannot be deleted.
    pub fn delete(&mut self, id: NodeId) -> StoreResult<()> {
        let parent = self.node(id)?.parent;
        if !parent.is_attached() {
            return Err(StoreError::InvalidNode(id));
        }
        self.node_mut(parent)?.children.retain(|&c| c != id);

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Ok(node) = self.node_mut(current) {
                node.removed = true;
                pending.extend(node.children.iter().copied());
            }
        }
        Ok(())
    }

    /// Deep-copy `src_id` of `src` as a new child of `dst_parent`, optionally renamed.
    pub fn copy_subtree(
        &mut self,
        dst_parent: NodeId,
        src: &ConfigurationStore,
        src_id: NodeId,
        name: Option<&str>,
    ) -> StoreResult<NodeId> {
        let source = src.node(src_id)?;
        let name = name.unwrap_or(&source.name);
        let copy = self.create_node(dst_parent, name, source.kind)?;
        if let Some(value) = &source.value {
            self.node_mut(copy)?.value = Some(value.clone());
        }
        for child in src.children(src_id) {
            self.copy_subtree(copy, src, child, None)?;
        }
        Ok(copy)
    }

    /// A new store whose root children are copies of the children of `id`.
    pub fn subtree(&self, id: NodeId) -> StoreResult<ConfigurationStore> {
        if !self.is_interior(id) {
            return Err(StoreError::NotInterior(self.path(id)));
        }
        let mut out = ConfigurationStore::new();
        for child in self.children(id) {
            out.copy_subtree(Self::ROOT, self, child, None)?;
        }
        Ok(out)
    }

    /// A read cursor positioned at the root.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            store: self,
            current: Self::ROOT,
        }
    }
}

/// A borrowed "current node" over a store.
///
/// Each cursor is an independent value, so recursive traversals can hold
/// several without interfering with one another.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    store: &'a ConfigurationStore,
    current: NodeId,
}

impl<'a> Cursor<'a> {
    pub fn node(&self) -> NodeId {
        self.current
    }

    pub fn name(&self) -> &'a str {
        self.store.name(self.current).unwrap_or("")
    }

    pub fn path(&self) -> String {
        self.store.path(self.current)
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.store.value(self.current)
    }

    pub fn read(&self, name: &str) -> Option<&'a Value> {
        self.store.read(self.current, name)
    }

    pub fn child_count(&self) -> usize {
        self.store.child_count(self.current)
    }

    pub fn child_names(&self) -> Vec<&'a str> {
        self.store.child_names(self.current)
    }

    pub fn move_to_root(&mut self) {
        self.current = ConfigurationStore::ROOT;
    }

    pub fn move_absolute(&mut self, path: &str) -> StoreResult<()> {
        self.current = self
            .store
            .resolve(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(())
    }

    pub fn move_relative(&mut self, path: &str) -> StoreResult<()> {
        self.current = self
            .store
            .resolve_from(self.current, path)
            .ok_or_else(|| StoreError::NotFound(join_path(&self.path(), path)))?;
        Ok(())
    }

    pub fn move_to_child(&mut self, position: usize) -> StoreResult<()> {
        self.current = self.store.child_at(self.current, position).ok_or_else(|| {
            StoreError::NotFound(join_path(&self.path(), &format!("[{}]", position)))
        })?;
        Ok(())
    }

    pub fn move_to_ancestor(&mut self, levels: usize) -> StoreResult<()> {
        self.current = self
            .store
            .ancestor(self.current, levels)
            .ok_or(StoreError::InvalidNode(self.current))?;
        Ok(())
    }
}

/// Join two dotted path fragments, skipping empty ones.
pub fn join_path(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}.{}", prefix, name),
    }
}
