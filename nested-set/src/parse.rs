//! Reading nested sets.

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use anyhow::Context as _;
use integer_encoding::VarIntReader;

use crate::digest::Digest;
use crate::intern::Interner;
use crate::node::{Entry, Node};
use crate::serialize::PayloadCodec;
use crate::{Error, NestedSet, Order, Result};

/// Deserializes one nested set from `input`.
///
/// Frames are consumed in the order the writer emitted them, each one
/// resolving its references against the nodes of earlier frames; the
/// node of the final frame is the root.  Every completed non-empty
/// node is funneled through `interner` under the digest its frame
/// declares, so equal sub-graphs collapse to a single node even
/// across blobs and across concurrently reading threads, for as long
/// as some strong holder keeps them alive.
///
/// The declared digest is trusted as the interning key and is not
/// recomputed from the body: the sender is in-process-trusted, and the
/// digest is a content-addressed name, not an authenticator.
///
/// When serialization is disabled for the process (see
/// [`set_serialization_enabled`](crate::set_serialization_enabled)),
/// nothing is read and the empty [`Order::Stable`] set is returned.
#[tracing::instrument(level = "trace", skip_all)]
pub fn read_nested_set<T, C, R>(input: &mut R, codec: &C,
                                interner: &Interner<T>)
    -> Result<NestedSet<T>>
where
    C: PayloadCodec<T>,
    R: Read,
{
    if !crate::serialization_enabled() {
        return Ok(NestedSet::empty(Order::Stable));
    }

    let count: u64 = input.read_varint()
        .map_err(|e| envelope_read_error("frame count", e))?;
    if count == 0 {
        return Err(Error::MalformedEnvelope(
            "frame count must be at least 1".into()).into());
    }
    let ordinal: u64 = input.read_varint()
        .map_err(|e| envelope_read_error("order kind", e))?;
    let order = Order::from_ordinal(ordinal)
        .ok_or_else(|| Error::MalformedEnvelope(
            format!("unknown order kind {}", ordinal)))?;

    let mut by_digest: HashMap<Digest, Arc<Node<T>>> = HashMap::new();
    let mut root = None;
    for index in 0..count {
        let index = index as usize;
        let (digest, node) = read_frame(input, index, codec, &by_digest)
            .with_context(|| format!("frame {}", index))?;

        // The empty children is canonical on its own; everything else
        // goes through the interner, which either adopts this node or
        // hands back the one already materialized for the digest.
        let node = if node.is_empty() {
            node
        } else {
            interner.get_or_insert(digest, node)
        };
        by_digest.insert(digest, node.clone());
        root = Some(node);
    }

    tracing::trace!(frames = count, "read nested set");
    // count >= 1, so the last frame exists.
    Ok(NestedSet::new(order, root.expect("at least one frame")))
}

fn malformed(frame: usize, what: impl Into<String>) -> anyhow::Error {
    Error::Malformed(frame, what.into()).into()
}

/// Like [`read_error`], for the envelope fields that precede the
/// first frame.
fn envelope_read_error(what: &str, e: io::Error) -> anyhow::Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof =>
            Error::MalformedEnvelope(format!("{} truncated", what)).into(),
        io::ErrorKind::InvalidData =>
            Error::MalformedEnvelope(format!("{}: {}", what, e)).into(),
        _ => e.into(),
    }
}

/// Maps an I/O error on an in-flight frame to the right kind: running
/// out of bytes or hitting an undecodable varint means the frame is
/// malformed, anything else is a real stream error.
fn read_error(frame: usize, what: &str, e: io::Error) -> anyhow::Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof =>
            malformed(frame, format!("{} truncated", what)),
        io::ErrorKind::InvalidData =>
            malformed(frame, format!("{}: {}", what, e)),
        _ => e.into(),
    }
}

fn read_frame<T, C, R>(input: &mut R, index: usize, codec: &C,
                       by_digest: &HashMap<Digest, Arc<Node<T>>>)
    -> Result<(Digest, Arc<Node<T>>)>
where
    C: PayloadCodec<T>,
    R: Read,
{
    let digest = read_digest(input, index)?;

    let len: u64 = input.read_varint()
        .map_err(|e| read_error(index, "body length", e))?;
    let len = usize::try_from(len)
        .map_err(|_| malformed(index, "impossible body length"))?;
    let mut body = vec![0; len];
    input.read_exact(&mut body)
        .map_err(|e| read_error(index, "body", e))?;

    let mut cursor = Cursor::new(&body[..]);
    let node = read_body(&mut cursor, index, codec, by_digest)?;
    let consumed = cursor.position() as usize;
    if consumed < body.len() {
        return Err(malformed(index, format!(
            "{} trailing bytes after the body", body.len() - consumed)));
    }
    Ok((digest, node))
}

fn read_body<T, C>(cursor: &mut Cursor<&[u8]>, index: usize, codec: &C,
                   by_digest: &HashMap<Digest, Arc<Node<T>>>)
    -> Result<Arc<Node<T>>>
where
    C: PayloadCodec<T>,
{
    let k: u64 = cursor.read_varint()
        .map_err(|e| read_error(index, "entry count", e))?;
    match k {
        0 => Ok(Node::empty()),
        1 => Ok(Node::leaf(codec.deserialize(cursor)?)),
        k => {
            let k = usize::try_from(k)
                .map_err(|_| malformed(index, "impossible entry count"))?;
            // Every entry takes at least its tag byte, which bounds a
            // sane k by the bytes left in the body.
            let remaining = cursor.get_ref().len() - cursor.position() as usize;
            let mut entries = Vec::with_capacity(k.min(remaining));
            for _ in 0..k {
                let mut tag = [0u8; 1];
                cursor.read_exact(&mut tag)
                    .map_err(|e| read_error(index, "entry tag", e))?;
                match tag[0] {
                    0 => entries.push(Entry::Payload(codec.deserialize(cursor)?)),
                    1 => {
                        let digest = read_digest(cursor, index)?;
                        let child = by_digest.get(&digest).ok_or(
                            Error::MissingReference(index, digest))?;
                        entries.push(Entry::Ref(child.clone()));
                    }
                    tag => return Err(malformed(index, format!(
                        "invalid entry tag {:#04x}", tag))),
                }
            }
            Ok(Arc::new(Node::Branch(entries)))
        }
    }
}

/// Reads a length-prefixed digest into an owned value.
fn read_digest<R: Read>(input: &mut R, index: usize) -> Result<Digest> {
    let len: u64 = input.read_varint()
        .map_err(|e| read_error(index, "digest length", e))?;
    if len as usize != Digest::LEN {
        return Err(malformed(index, format!(
            "digest length {} (expected {})", len, Digest::LEN)));
    }
    let mut bytes = [0u8; Digest::LEN];
    input.read_exact(&mut bytes)
        .map_err(|e| read_error(index, "digest", e))?;
    Ok(Digest::from(bytes))
}
