//! Fixed-size reassembly buffer for newline-terminated text.

use std::io::{self, Read};

/// Bytes received but not yet consumed, always a prefix of the stream.
///
/// Holds at most `capacity - 1` bytes. A buffer that reaches that limit
/// without containing a newline can never produce a line again, which callers
/// detect with [`is_full`](Self::is_full) and treat as a protocol error.
#[derive(Debug)]
pub struct LineBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl LineBuffer {
    /// # Panics
    ///
    /// If `capacity < 2`; such a buffer could not hold a single newline.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "line buffer capacity {} is too small", capacity);
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Most bytes the buffer will hold at once.
    pub fn limit(&self) -> usize {
        self.data.len() - 1
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn spare(&self) -> usize {
        self.limit() - self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.limit()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// One `read` into the free region. `Ok(0)` means end of stream.
    ///
    /// Must not be called on a full buffer.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        debug_assert!(!self.is_full(), "fill_from on a full line buffer");
        let limit = self.limit();
        let n = reader.read(&mut self.data[self.len..limit])?;
        self.len += n;
        Ok(n)
    }

    /// Copy as much of `bytes` as fits and return how much that was.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.spare());
        self.data[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Offset of the first newline, if a whole line is buffered.
    pub fn find_line(&self) -> Option<usize> {
        self.as_bytes().iter().position(|&b| b == b'\n')
    }

    /// The first complete line, without its newline.
    pub fn line(&self) -> Option<&[u8]> {
        self.find_line().map(|end| &self.data[..end])
    }

    /// Drop the first `n` bytes and shift the rest to the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        let buffer = LineBuffer::with_capacity(8);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.limit(), 7);
        assert_eq!(buffer.spare(), 7);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    #[should_panic(expected = "too small")]
    fn test_capacity_one_rejected() {
        LineBuffer::with_capacity(1);
    }

    #[test]
    fn test_append_stops_at_limit() {
        let mut buffer = LineBuffer::with_capacity(8);
        assert_eq!(buffer.append(b"0123456789"), 7);
        assert!(buffer.is_full());
        assert_eq!(buffer.spare(), 0);
        assert_eq!(buffer.as_bytes(), b"0123456");
        assert_eq!(buffer.append(b"x"), 0);
    }

    #[test]
    fn test_line_and_consume() {
        let mut buffer = LineBuffer::with_capacity(32);
        buffer.append(b"LOCK 1\nUNBL");
        assert_eq!(buffer.line(), Some(&b"LOCK 1"[..]));

        buffer.consume(7);
        assert_eq!(buffer.as_bytes(), b"UNBL");
        assert_eq!(buffer.line(), None);

        buffer.append(b"ANK 2\n");
        assert_eq!(buffer.line(), Some(&b"UNBLANK 2"[..]));
    }

    #[test]
    fn test_fill_from_reads_into_free_region() {
        let mut buffer = LineBuffer::with_capacity(6);
        buffer.append(b"ab");
        let mut source: &[u8] = b"cdefgh";
        assert_eq!(buffer.fill_from(&mut source).unwrap(), 3);
        assert_eq!(buffer.as_bytes(), b"abcde");
        assert!(buffer.is_full());
    }

    #[test]
    fn test_fill_from_eof() {
        let mut buffer = LineBuffer::with_capacity(6);
        let mut source: &[u8] = b"";
        assert_eq!(buffer.fill_from(&mut source).unwrap(), 0);
        assert!(buffer.is_empty());
    }
}
