//! Topological ordering of the nodes reachable from a root.

use std::collections::HashMap;
use std::sync::Arc;

use crate::node::{Entry, Node};
use crate::{Error, Result};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    /// On the traversal stack; some descendants are still pending.
    Open,
    /// Emitted.
    Done,
}

/// Returns every distinct children node reachable from `root`, ordered
/// so that a node appears after all nodes it references.  The root is
/// the last element.
///
/// Nodes are deduplicated by handle identity; ties are broken by
/// first-visit order of a depth-first traversal that descends into
/// branch entries in their stored order.  Payload entries induce no
/// edges, and the empty children is never part of the output.
///
/// The traversal keeps its own stack, so chains limited only by the
/// graph's size do not overflow the call stack.
pub(crate) fn topological_order<T>(root: &Arc<Node<T>>)
    -> Result<Vec<Arc<Node<T>>>>
{
    let mut order = Vec::new();
    let mut marks: HashMap<*const Node<T>, Mark> = HashMap::new();

    // Each stack slot remembers where to resume scanning the node's
    // entries once the child being descended into has been emitted.
    let mut stack: Vec<(Arc<Node<T>>, usize)> = vec![(root.clone(), 0)];
    marks.insert(Arc::as_ptr(root), Mark::Open);

    while let Some((node, resume_at)) = stack.pop() {
        let mut descend = None;
        if let Node::Branch(entries) = &*node {
            for (i, entry) in entries.iter().enumerate().skip(resume_at) {
                let child = match entry {
                    Entry::Ref(child) if !child.is_empty() => child,
                    _ => continue,
                };
                match marks.get(&Arc::as_ptr(child)) {
                    Some(Mark::Open) => return Err(Error::CycleDetected.into()),
                    Some(Mark::Done) => continue,
                    None => {
                        descend = Some((i + 1, child.clone()));
                        break;
                    }
                }
            }
        }

        match descend {
            Some((resume_at, child)) => {
                marks.insert(Arc::as_ptr(&child), Mark::Open);
                stack.push((node, resume_at));
                stack.push((child, 0));
            }
            None => {
                marks.insert(Arc::as_ptr(&node), Mark::Done);
                order.push(node);
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod test {
    use super::*;

    fn branch<T>(entries: Vec<Entry<T>>) -> Arc<Node<T>> {
        Node::branch(entries).unwrap()
    }

    #[test]
    fn single_leaf() {
        let leaf = Node::leaf("x");
        let order = topological_order(&leaf).unwrap();
        assert_eq!(order.len(), 1);
        assert!(Node::ptr_eq(&order[0], &leaf));
    }

    #[test]
    fn payload_only_branch_has_no_edges() {
        let root = branch(vec![Entry::Payload("a"), Entry::Payload("b")]);
        let order = topological_order(&root).unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn shared_child_appears_once() {
        let shared = branch(vec![Entry::Payload("p"), Entry::Payload("q")]);
        let root = branch(vec![
            Entry::Ref(shared.clone()),
            Entry::Ref(shared.clone()),
            Entry::Payload("r"),
        ]);
        let order = topological_order(&root).unwrap();
        assert_eq!(order.len(), 2);
        assert!(Node::ptr_eq(&order[0], &shared));
        assert!(Node::ptr_eq(&order[1], &root));
    }

    #[test]
    fn diamond() {
        let a = branch(vec![Entry::Payload("1"), Entry::Payload("1b")]);
        let b = branch(vec![Entry::Ref(a.clone()), Entry::Payload("2")]);
        let c = branch(vec![Entry::Ref(a.clone()), Entry::Payload("3")]);
        let root = branch(vec![Entry::Ref(b.clone()), Entry::Ref(c.clone())]);

        let order = topological_order(&root).unwrap();
        assert_eq!(order.len(), 4);
        // First-visit depth-first order: a through b, then b, c, root.
        assert!(Node::ptr_eq(&order[0], &a));
        assert!(Node::ptr_eq(&order[1], &b));
        assert!(Node::ptr_eq(&order[2], &c));
        assert!(Node::ptr_eq(&order[3], &root));
    }

    #[test]
    fn leaf_children_are_emitted() {
        let leaf = Node::leaf("x");
        let root = branch(vec![Entry::Ref(leaf.clone()), Entry::Payload("y")]);
        let order = topological_order(&root).unwrap();
        assert_eq!(order.len(), 2);
        assert!(Node::ptr_eq(&order[0], &leaf));
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut node = branch(vec![Entry::Payload(0u32), Entry::Payload(0)]);
        for i in 1..=2000u32 {
            node = branch(vec![Entry::Ref(node), Entry::Payload(i)]);
        }
        let order = topological_order(&node).unwrap();
        assert_eq!(order.len(), 2001);
        assert!(Node::ptr_eq(order.last().unwrap(), &node));
    }
}
