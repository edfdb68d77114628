//! Writing nested sets.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::Context as _;
use integer_encoding::VarIntWriter;

use crate::digest::{Digest, Hasher};
use crate::node::{Entry, Node};
use crate::topo::topological_order;
use crate::{Error, NestedSet, Result};

/// Caller-supplied codec for element payloads.
///
/// The nested-set codec is parametric over the element type `T` and
/// makes no assumption about payload equality, hashability, or size.
/// Payload encodings must be self-delimiting: entries are concatenated
/// on the wire with no per-payload length prefix.  Payload errors
/// propagate to the caller unchanged, with context naming the frame
/// that was in flight.
pub trait PayloadCodec<T> {
    /// Encodes `payload` into `out`.
    fn serialize(&self, payload: &T, out: &mut dyn Write) -> Result<()>;

    /// Decodes one payload from `input`.
    fn deserialize(&self, input: &mut dyn Read) -> Result<T>;
}

/// Serializes `set` into `out`.
///
/// Every distinct children node reachable from the set's root is
/// written exactly once, as a self-delimited frame of the shape
/// `[digest][length][body]`, children before parents, the root last.
/// Branch entries referencing other nodes are emitted as the digest of
/// the referenced node's frame.
///
/// Empty sets are refused: the envelope always carries at least one
/// frame, and callers encode emptiness out of band.
///
/// When serialization is disabled for the process (see
/// [`set_serialization_enabled`](crate::set_serialization_enabled)),
/// nothing is written.
#[tracing::instrument(level = "trace", skip_all)]
pub fn write_nested_set<T, C, W>(out: &mut W, set: &NestedSet<T>, codec: &C)
    -> Result<()>
where
    C: PayloadCodec<T>,
    W: Write,
{
    if !crate::serialization_enabled() {
        return Ok(());
    }
    if set.is_empty() {
        return Err(Error::InvalidArgument(
            "the empty set is encoded out of band".into()).into());
    }

    let nodes = topological_order(set.children())?;
    out.write_varint(nodes.len() as u64)?;
    out.write_varint(set.order().ordinal())?;

    let mut digests: HashMap<*const Node<T>, Digest> =
        HashMap::with_capacity(nodes.len());
    let mut body = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        body.clear();
        let mut hasher = Hasher::with_target(&mut body);
        write_body(&mut hasher, node, &digests, codec)
            .with_context(|| format!("frame {}", index))?;
        let (digest, _) = hasher.finish();
        digests.insert(Arc::as_ptr(node), digest);

        out.write_varint(Digest::LEN as u64)?;
        out.write_all(digest.as_bytes())?;
        out.write_varint(body.len() as u64)?;
        out.write_all(&body)?;
    }

    tracing::trace!(frames = nodes.len(), "wrote nested set");
    Ok(())
}

/// Writes one node's body.  The caller layers the body through a
/// [`Hasher`], so these bytes are exactly the node's digest input.
fn write_body<T, C, W>(out: &mut W,
                       node: &Node<T>,
                       digests: &HashMap<*const Node<T>, Digest>,
                       codec: &C)
    -> Result<()>
where
    C: PayloadCodec<T>,
    W: Write,
{
    match node {
        Node::Empty => {
            out.write_varint(0u64)?;
        }
        Node::Leaf(payload) => {
            out.write_varint(1u64)?;
            codec.serialize(payload, out)?;
        }
        Node::Branch(entries) => {
            out.write_varint(entries.len() as u64)?;
            for entry in entries {
                match entry {
                    Entry::Payload(payload) => {
                        out.write_all(&[0])?;
                        codec.serialize(payload, out)?;
                    }
                    Entry::Ref(child) => {
                        if child.is_empty() {
                            return Err(Error::InvalidArgument(
                                "branch references the empty children"
                                    .into()).into());
                        }
                        let digest = digests.get(&Arc::as_ptr(child))
                            .ok_or(Error::OrderingViolation)?;
                        out.write_all(&[1])?;
                        out.write_varint(Digest::LEN as u64)?;
                        out.write_all(digest.as_bytes())?;
                    }
                }
            }
        }
    }
    Ok(())
}
