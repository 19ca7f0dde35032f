//! Node addressing within a route tree

use serde::Serialize;
use std::fmt;

/// Index of a node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root node always occupies the first arena slot
    pub const ROOT: NodeId = NodeId(0);

    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Child indices from the root down to a node.
///
/// The empty path is the root. Displayed in configuration notation, e.g.
/// `route.routes[1].routes[0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Path of the root route
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the `index`-th child of this node
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Child indices from the root
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Distance from the root
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True for the empty path
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("route")?;
        for index in &self.0 {
            write!(f, ".routes[{index}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path_display() {
        assert_eq!(NodePath::root().to_string(), "route");
        assert!(NodePath::root().is_root());
    }

    #[test]
    fn test_child_path() {
        let path = NodePath::root().child(2).child(0);
        assert_eq!(path.indices(), &[2, 0]);
        assert_eq!(path.depth(), 2);
        assert_eq!(path.to_string(), "route.routes[2].routes[0]");
    }

    #[test]
    fn test_path_serializes_as_indices() {
        let path = NodePath::from(vec![0, 3]);
        assert_eq!(serde_json::to_string(&path).unwrap(), "[0,3]");
    }
}
