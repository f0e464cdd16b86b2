//! Reply buffer for a single exchange

use bytes::{Bytes, BytesMut};

/// Append-only buffer owned by the dispatcher handling one exchange
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buf: BytesMut,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copy of everything received so far
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Consume the buffer at the end of the exchange
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
