//! The process-wide digest interner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::digest::Digest;
use crate::node::Node;

/// How many installations may elapse between opportunistic sweeps of
/// dead entries.
const PURGE_INTERVAL: usize = 4096;

/// A concurrent map from digest to previously materialized children
/// node, holding its values weakly.
///
/// The interner is what restores structural sharing across independent
/// deserializations: the first fully parsed node for a digest wins,
/// and every later occurrence of that digest adopts the winner for as
/// long as some strong holder keeps it alive.  Entries whose node has
/// been dropped are swept out opportunistically as installations
/// accumulate, or eagerly via [`Interner::purge`].
///
/// Rust cannot express one global instance covering every payload
/// type, so the embedder owns one `Interner<T>` per payload type
/// (typically in a `static`) and hands it to
/// [`read_nested_set`](crate::read_nested_set).
pub struct Interner<T> {
    nodes: DashMap<Digest, Weak<Node<T>>>,
    installs: AtomicUsize,
}

impl<T> Interner<T> {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Interner {
            nodes: DashMap::new(),
            installs: AtomicUsize::new(0),
        }
    }

    /// Returns the node interned for `digest`, installing `candidate`
    /// if there is none, or only a dead one.
    ///
    /// Installation is atomic with single-winner semantics: of several
    /// concurrent calls with the same digest, exactly one candidate is
    /// installed, and the losers adopt the winner while their
    /// candidates are dropped.
    pub fn get_or_insert(&self, digest: Digest, candidate: Arc<Node<T>>)
        -> Arc<Node<T>>
    {
        let (node, installed) = match self.nodes.entry(digest) {
            MapEntry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(winner) => (winner, false),
                None => {
                    occupied.insert(Arc::downgrade(&candidate));
                    (candidate, true)
                }
            },
            MapEntry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(&candidate));
                (candidate, true)
            }
        };

        if installed
            && self.installs.fetch_add(1, Ordering::Relaxed)
                % PURGE_INTERVAL == PURGE_INTERVAL - 1
        {
            self.purge();
        }

        node
    }

    /// Looks up a live node for `digest`.
    pub fn get(&self, digest: &Digest) -> Option<Arc<Node<T>>> {
        self.nodes.get(digest).and_then(|weak| weak.upgrade())
    }

    /// Drops every entry whose node is no longer alive, returning how
    /// many were dropped.
    pub fn purge(&self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, node| node.strong_count() > 0);
        before.saturating_sub(self.nodes.len())
    }

    /// Number of entries, dead ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the interner holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<T> Default for Interner<T> {
    fn default() -> Self {
        Interner::new()
    }
}
