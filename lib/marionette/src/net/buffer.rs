use std::io;

/// A linear byte accumulator for one connection. Data is appended at the
/// tail by `ingress`, inspected in place as a contiguous prefix, and dropped
/// from the head by `consume`. The head cursor is compacted lazily so repeated
/// consumes stay cheap.
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    limit: usize,
}

impl Buffer {
    /// Creates a buffer that will refuse to grow beyond `limit` bytes of
    /// pending data.
    #[inline]
    pub fn new(limit: usize) -> Buffer {
        Buffer {
            data: Vec::new(),
            head: 0,
            limit,
        }
    }

    /// The number of pending bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The pending bytes as one contiguous slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Drops `count` bytes from the head.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        assert!(count <= self.len(), "consume past end of buffer");
        self.head += count;

        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head > 4096 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Appends bytes directly. Used by the response path before egress.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reads from the supplied reader until it would block, the reader is
    /// exhausted, or the limit is hit. Returns the number of bytes read; a
    /// peer that closed its half surfaces as `Ok(0)` with `closed` observable
    /// via the returned flag.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<(usize, bool)> {
        let mut total = 0;
        let mut chunk = [0u8; 4096];

        loop {
            if self.len() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "Buffer overrun"));
            }

            match reader.read(&mut chunk) {
                Ok(0) => return Ok((total, true)),
                Ok(count) => {
                    let take = count.min(self.limit - self.len());
                    self.data.extend_from_slice(&chunk[..take]);
                    total += take;
                    if take < count {
                        return Err(io::Error::new(io::ErrorKind::Other, "Buffer overrun"));
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok((total, false)),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes pending bytes to the supplied writer until it would block or
    /// the buffer is drained. Returns the number of bytes written.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total = 0;

        while !self.is_empty() {
            match writer.write(self.as_slice()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => {
                    self.consume(count);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }
}
