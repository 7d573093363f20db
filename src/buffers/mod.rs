use core::fmt;

/// Error returned when a write does not fit in the remaining buffer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DidntWrite;

impl fmt::Display for DidntWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("insufficient buffer capacity")
    }
}

impl std::error::Error for DidntWrite {}

/// A fixed-capacity transmission buffer that tracks both capacity and
/// current length.
///
/// `BatchBuf` wraps a `Box<[u8]>` and maintains a separate length field to
/// track how much data has been written. One buffer backs all flush cycles
/// of a pipeline: it is filled with serialized points, transmitted, and
/// reused by calling [`clear()`](Self::clear) without reallocating.
///
/// Writes never grow the buffer. A failed multi-part write can be rolled
/// back with [`mark()`](Self::mark)/[`rewind()`](Self::rewind) so a half
/// serialized record never reaches the wire.
pub(crate) struct BatchBuf {
    buffer: Box<[u8]>,
    len: usize,
}

impl BatchBuf {
    /// Creates a buffer with the specified capacity.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Returns the total capacity of the buffer.
    pub(crate) const fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of bytes written so far.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the capacity still available for writing.
    pub(crate) const fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Returns a slice containing the written data.
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Clears the buffer, resetting its length to zero.
    ///
    /// This does not deallocate or modify the underlying capacity.
    pub(crate) const fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends `bytes` in full, or fails without writing anything.
    pub(crate) fn write_exact(&mut self, bytes: &[u8]) -> Result<(), DidntWrite> {
        if self.remaining() < bytes.len() {
            return Err(DidntWrite);
        }
        self.buffer[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Records the current write position.
    pub(crate) const fn mark(&self) -> usize {
        self.len
    }

    /// Rewinds the write position to a previously recorded mark, discarding
    /// everything written after it.
    pub(crate) const fn rewind(&mut self, mark: usize) {
        debug_assert!(mark <= self.len);
        self.len = mark;
    }
}

impl fmt::Debug for BatchBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x?}", self.as_slice())
    }
}

/// Allows formatting values directly into the buffer with `write!`.
///
/// An overflowing write fails with `UnexpectedEof` and may leave a partial
/// formatting result behind; callers roll back via [`BatchBuf::rewind`].
impl std::io::Write for BatchBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.write_exact(buf) {
            Ok(()) => Ok(buf.len()),
            Err(_) => Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, DidntWrite)),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
