//! Children nodes of a nested set.

use std::sync::Arc;

use crate::{Error, Result};

/// An internal node of the DAG underlying a nested set.
///
/// Nodes are immutable once built and shared behind [`Arc`] handles;
/// the same node may be reached from many parents.  Graph identity is
/// handle identity, not structural equality; see [`Node::ptr_eq`].
#[derive(Debug)]
pub enum Node<T> {
    /// The empty children.  Never referenced from a branch and never
    /// written as its own frame.
    Empty,
    /// A single element.
    Leaf(T),
    /// An ordered sequence of two or more entries.
    Branch(Vec<Entry<T>>),
}

/// One entry of a branch node.
#[derive(Debug)]
pub enum Entry<T> {
    /// An element stored directly in the branch.
    Payload(T),
    /// A reference to another children node.
    Ref(Arc<Node<T>>),
}

impl<T> Node<T> {
    /// Returns the empty children.
    pub fn empty() -> Arc<Self> {
        Arc::new(Node::Empty)
    }

    /// Returns a leaf holding `payload`.
    pub fn leaf(payload: T) -> Arc<Self> {
        Arc::new(Node::Leaf(payload))
    }

    /// Builds a branch from `entries`.
    ///
    /// A branch holds at least two entries and never references the
    /// empty children: an empty child contributes nothing to the
    /// union, and the builder layer drops it before a branch is
    /// formed.
    pub fn branch(entries: Vec<Entry<T>>) -> Result<Arc<Self>> {
        if entries.len() < 2 {
            return Err(Error::InvalidArgument(format!(
                "branch needs at least 2 entries, got {}",
                entries.len())).into());
        }
        if entries.iter().any(
            |e| matches!(e, Entry::Ref(child) if child.is_empty()))
        {
            return Err(Error::InvalidArgument(
                "branch must not reference the empty children".into()).into());
        }
        Ok(Arc::new(Node::Branch(entries)))
    }

    /// Whether this is the empty children.
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Identity comparison of two handles.
    ///
    /// Two empty nodes always compare equal: the empty children
    /// carries no state, so every handle to one denotes the same
    /// process-wide empty.
    pub fn ptr_eq(a: &Arc<Self>, b: &Arc<Self>) -> bool {
        Arc::ptr_eq(a, b) || (a.is_empty() && b.is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn branch_arity() {
        assert!(Node::branch(vec![Entry::Payload("a"), Entry::Payload("b")])
                .is_ok());
        assert!(Node::branch(vec![Entry::Payload("a")]).is_err());
        assert!(Node::<&str>::branch(vec![]).is_err());
    }

    #[test]
    fn branch_rejects_empty_children() {
        let result = Node::branch(vec![
            Entry::Payload("a"),
            Entry::Ref(Node::empty()),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn identity() {
        let leaf = Node::leaf("x");
        assert!(Node::ptr_eq(&leaf, &leaf.clone()));
        assert!(!Node::ptr_eq(&leaf, &Node::leaf("x")));

        // All empties are the same node.
        assert!(Node::<&str>::ptr_eq(&Node::empty(), &Node::empty()));
        assert!(!Node::ptr_eq(&Node::empty(), &Node::leaf("x")));
    }
}
