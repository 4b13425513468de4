//! Owned, appendable byte container used to build and hold wire messages.
//!
//! Mirrors the role of `struct ofpbuf` in the original implementation: a
//! single growable allocation that callers append fixed-width integers and
//! raw byte strings to, then freeze into a finished wire message.

use byteorder::{ByteOrder, NetworkEndian};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer { data: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(cap),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends `n` zeroed bytes and returns their offset, for callers that
    /// want to fill a region in place (e.g. a header whose length field is
    /// patched once the body is known).
    pub fn put_uninit(&mut self, n: usize) -> usize {
        let off = self.data.len();
        self.data.resize(off + n, 0);
        off
    }

    pub fn put_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        let off = self.put_uninit(2);
        NetworkEndian::write_u16(&mut self.data[off..], v);
    }

    pub fn put_u32(&mut self, v: u32) {
        let off = self.put_uninit(4);
        NetworkEndian::write_u32(&mut self.data[off..], v);
    }

    pub fn put_u64(&mut self, v: u64) {
        let off = self.put_uninit(8);
        NetworkEndian::write_u64(&mut self.data[off..], v);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends `bytes` into a fixed-width field of length `width`, zero
    /// padding (or truncating) as needed. Used for `name[16]`/`name[32]`
    /// style fields.
    pub fn put_fixed(&mut self, bytes: &[u8], width: usize) {
        let n = bytes.len().min(width);
        self.put_bytes(&bytes[..n]);
        if n < width {
            self.put_zeros(width - n);
        }
    }

    pub fn put_zeros(&mut self, n: usize) {
        self.data.resize(self.data.len() + n, 0);
    }

    /// Overwrites the two bytes at `offset` with `v`, network byte order.
    /// Used to patch a `length` field once the full message size is known.
    pub fn patch_u16(&mut self, offset: usize, v: u16) {
        NetworkEndian::write_u16(&mut self.data[offset..], v);
    }

    /// Overwrites `bytes.len()` bytes at `offset` verbatim. Used by callers
    /// (e.g. netlink framing) whose fields are native-endian rather than
    /// network-endian.
    pub fn patch_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn consume_head(&mut self, n: usize) {
        self.data.drain(..n.min(self.data.len()));
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Buffer {
        Buffer { data }
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_a_length_field_after_the_fact() {
        let mut buf = Buffer::new();
        let len_off = buf.put_uninit(2);
        buf.put_u32(0xdead_beef);
        let total = buf.len() as u16;
        buf.patch_u16(len_off, total);
        assert_eq!(&buf.as_slice()[0..2], &total.to_be_bytes());
    }

    #[test]
    fn fixed_field_zero_pads_short_input() {
        let mut buf = Buffer::new();
        buf.put_fixed(b"eth0", 16);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf.as_slice()[0..4], b"eth0");
        assert!(buf.as_slice()[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn consume_head_drops_a_prefix() {
        let mut buf = Buffer::from_vec(vec![1, 2, 3, 4, 5]);
        buf.consume_head(2);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }
}
