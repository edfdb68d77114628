//! Digests and the streaming engine that computes them.
//!
//! A children node is identified by the MD5 of its body encoding.
//! The digest is a content address, not an authenticator: 128 bits
//! keep the collision probability negligible at the graph sizes this
//! codec sees, and the sharing machinery relies on that.

use std::fmt;
use std::io::{self, Write};

use md5::{Digest as _, Md5};

/// A 16 byte content address of one children node.
///
/// Computed over the node's body encoding only; a frame's own digest
/// header is not part of its digest input.  Digests are owned values,
/// never views into an input buffer, so they can outlive the buffer
/// they were read from and serve as interner keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 16]);

impl Digest {
    /// Width of a digest in bytes.
    pub const LEN: usize = 16;

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Digest {
    fn from(bytes: [u8; 16]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Computes a [`Digest`] from the bytes written to it.
///
/// A write-through target can optionally be supplied with
/// [`Hasher::with_target`].  In that form the hasher forwards every
/// byte to the target while maintaining the running digest, so a frame
/// body can be buffered and hashed in a single pass.
pub struct Hasher<W = io::Sink> {
    ctx: Md5,
    target: W,
}

impl Hasher {
    /// Creates a hasher that only computes a digest.
    pub fn new() -> Self {
        Hasher {
            ctx: Md5::new(),
            target: io::sink(),
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Hasher::new()
    }
}

impl<W> Hasher<W> {
    /// The target receives a copy of every byte written to the hasher.
    pub fn with_target(target: W) -> Self {
        Hasher {
            ctx: Md5::new(),
            target,
        }
    }

    /// Writes data into the hash function, bypassing the target.
    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        self.ctx.update(data.as_ref());
    }

    /// Finalizes the hash function, returning the digest and the
    /// target.
    pub fn finish(self) -> (Digest, W) {
        (Digest(self.ctx.finalize().into()), self.target)
    }
}

impl<W: Write> Write for Hasher<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.target.write_all(buf)?;
        self.ctx.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.target.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_value() {
        let mut h = Hasher::new();
        h.update(b"abc");
        let (digest, _) = h.finish();
        assert_eq!(digest.to_string(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn deterministic() {
        let digest = |data: &[u8]| {
            let mut h = Hasher::new();
            h.update(data);
            h.finish().0
        };
        assert_eq!(digest(b"payload"), digest(b"payload"));
        assert_ne!(digest(b"payload"), digest(b"payloae"));
    }

    #[test]
    fn writes_through() {
        let mut h = Hasher::with_target(Vec::new());
        h.write_all(b"some ").unwrap();
        h.write_all(b"bytes").unwrap();
        let (digest, target) = h.finish();
        assert_eq!(target, b"some bytes");

        let mut reference = Hasher::new();
        reference.update(b"some bytes");
        assert_eq!(digest, reference.finish().0);
    }
}
