//! Nested-set serialization with structural sharing.
//!
//! A nested set is an immutable, rooted, directed acyclic graph whose
//! leaves carry element payloads and whose internal nodes denote
//! unions of their children.  The same sub-graph is typically
//! referenced from many roots, and holders depend on that sharing for
//! memory footprint and identity fast paths.  A naive traversal would
//! duplicate shared sub-graphs exponentially on the wire and would
//! lose the sharing on the way back in.
//!
//! This crate therefore combines three mechanisms:
//!
//!   - content addressing: every children node is identified by an
//!     MD5 digest of its serialized body (see [`digest`]);
//!   - topological emission: a node's frame is written only after the
//!     frames of every node it references, so a child's digest is
//!     always known before a parent needs it;
//!   - process-wide interning: a weak-valued map from digest to node
//!     (see [`intern`]) collapses equal sub-graphs across independent
//!     deserializations to a single materialization.
//!
//! The codec is parametric over the element type: payloads are handed
//! off to a caller-supplied [`PayloadCodec`] and are otherwise opaque.
//! The digest is used for identity and deduplication only; it
//! authenticates nothing.
//!
//! # Examples
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use nested_set::{
//!     read_nested_set, write_nested_set, Entry, Interner, NestedSet, Node,
//!     Order, PayloadCodec, Result,
//! };
//!
//! struct ByteCodec;
//!
//! impl PayloadCodec<u8> for ByteCodec {
//!     fn serialize(&self, payload: &u8, out: &mut dyn Write) -> Result<()> {
//!         out.write_all(&[*payload])?;
//!         Ok(())
//!     }
//!
//!     fn deserialize(&self, input: &mut dyn Read) -> Result<u8> {
//!         let mut buf = [0u8; 1];
//!         input.read_exact(&mut buf)?;
//!         Ok(buf[0])
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let shared = Node::branch(vec![Entry::Payload(1), Entry::Payload(2)])?;
//! let root = Node::branch(vec![
//!     Entry::Ref(shared.clone()),
//!     Entry::Ref(shared),
//!     Entry::Payload(3),
//! ])?;
//! let set = NestedSet::new(Order::Stable, root);
//!
//! let mut blob = Vec::new();
//! write_nested_set(&mut blob, &set, &ByteCodec)?;
//!
//! let interner = Interner::new();
//! let copy = read_nested_set(&mut blob.as_slice(), &ByteCodec, &interner)?;
//! assert_eq!(copy.order(), Order::Stable);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

use std::fmt;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

pub mod digest;
pub mod intern;
pub mod node;
pub mod parse;
pub mod serialize;
mod topo;

pub use crate::digest::Digest;
pub use crate::intern::Interner;
pub use crate::node::{Entry, Node};
pub use crate::parse::read_nested_set;
pub use crate::serialize::{write_nested_set, PayloadCodec};

/// Crate result specialization.
pub type Result<T> = ::std::result::Result<T, anyhow::Error>;

/// Errors returned by this crate.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The envelope does not conform to the wire format.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A frame does not conform to the wire format.
    #[error("Malformed frame {0}: {1}")]
    Malformed(usize, String),

    /// An entry named a digest that no earlier frame declared.
    #[error("Frame {0} references unknown digest {1}")]
    MissingReference(usize, Digest),

    /// A child's digest was needed before it was computed.
    #[error("Child digest needed before it was computed")]
    OrderingViolation,

    /// The references among branch nodes form a cycle.
    #[error("Cycle among branch nodes")]
    CycleDetected,
}

/// Traversal orderings a nested set can carry.
///
/// The order is metadata travelling alongside the children; the codec
/// never reorders entries.  Wire ordinals follow declaration order and
/// are stable across versions: new kinds append at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Left-to-right insertion order.
    Stable,
    /// Children-before-parents order, as on compiler command lines.
    Compile,
    /// Parents-before-children order, as on linker command lines.
    Link,
    /// Left-to-right variant of [`Order::Link`].
    NaiveLink,
}

impl Order {
    /// The wire ordinal of this kind.
    pub fn ordinal(self) -> u64 {
        match self {
            Order::Stable => 0,
            Order::Compile => 1,
            Order::Link => 2,
            Order::NaiveLink => 3,
        }
    }

    pub(crate) fn from_ordinal(ordinal: u64) -> Option<Self> {
        match ordinal {
            0 => Some(Order::Stable),
            1 => Some(Order::Compile),
            2 => Some(Order::Link),
            3 => Some(Order::NaiveLink),
            _ => None,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Order::Stable => f.write_str("stable"),
            Order::Compile => f.write_str("compile"),
            Order::Link => f.write_str("link"),
            Order::NaiveLink => f.write_str("naive-link"),
        }
    }
}

/// An immutable (order, children) pair forming a DAG of element
/// payloads.
///
/// Cheap to clone: the children are shared behind an [`Arc`].  Two
/// nested sets are equal iff their orders are equal and their children
/// are the same node, in the sense of [`Node::ptr_eq`].
pub struct NestedSet<T> {
    order: Order,
    children: Arc<Node<T>>,
}

impl<T> NestedSet<T> {
    /// Creates a nested set over an existing children node.
    pub fn new(order: Order, children: Arc<Node<T>>) -> Self {
        NestedSet { order, children }
    }

    /// The empty set of the given order.
    ///
    /// Empty sets never hit the wire: callers encode emptiness out of
    /// band, and the envelope always carries at least one frame.
    pub fn empty(order: Order) -> Self {
        NestedSet::new(order, Node::empty())
    }

    /// A set holding a single element.
    pub fn leaf(order: Order, payload: T) -> Self {
        NestedSet::new(order, Node::leaf(payload))
    }

    /// The traversal ordering this set carries.
    pub fn order(&self) -> Order {
        self.order
    }

    /// The root children node.
    pub fn children(&self) -> &Arc<Node<T>> {
        &self.children
    }

    /// Whether this is an empty set.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<T> Clone for NestedSet<T> {
    fn clone(&self) -> Self {
        NestedSet {
            order: self.order,
            children: self.children.clone(),
        }
    }
}

impl<T> PartialEq for NestedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
            && Node::ptr_eq(&self.children, &other.children)
    }
}

impl<T> Eq for NestedSet<T> {}

impl<T: fmt::Debug> fmt::Debug for NestedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NestedSet")
            .field("order", &self.order)
            .field("children", &self.children)
            .finish()
    }
}

static SERIALIZATION_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enables or disables the codec for the whole process.
///
/// With serialization disabled, [`write_nested_set`] emits nothing and
/// [`read_nested_set`] consumes nothing and returns the empty
/// [`Order::Stable`] set.  Reads therefore discard whatever the input
/// held; this switch is meant for test environments that instantiate
/// the codec without exercising its output.
pub fn set_serialization_enabled(enabled: bool) {
    SERIALIZATION_ENABLED.store(enabled, atomic::Ordering::Relaxed);
}

/// Whether serialization is currently enabled in this process.
pub fn serialization_enabled() -> bool {
    SERIALIZATION_ENABLED.load(atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_ordinals_are_stable() {
        for order in [Order::Stable, Order::Compile, Order::Link,
                      Order::NaiveLink] {
            assert_eq!(Order::from_ordinal(order.ordinal()), Some(order));
        }
        assert_eq!(Order::Stable.ordinal(), 0);
        assert_eq!(Order::NaiveLink.ordinal(), 3);
        assert_eq!(Order::from_ordinal(4), None);
    }

    #[test]
    fn equality_is_identity() {
        let a = NestedSet::leaf(Order::Stable, "x");
        let b = NestedSet::leaf(Order::Stable, "x");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        // Empty sets of one order are all the same set.
        assert_eq!(NestedSet::<&str>::empty(Order::Link),
                   NestedSet::<&str>::empty(Order::Link));
        assert_ne!(NestedSet::<&str>::empty(Order::Link),
                   NestedSet::<&str>::empty(Order::Stable));
    }
}
