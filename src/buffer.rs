//! An append-only buffer of chunks.
//!
//! Reading a [`Buffer`] never blocks: when every chunk has been read, the end of the stream is
//! reported immediately rather than waiting for another write.  This makes it useful for seeding a
//! pipeline with chunks that are known up front.

use crate::{error::Infallible, Sink, Source};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    task::{Context, Poll},
};

/// A growable, order-preserving sequence of chunks with a shared read cursor.
///
/// Chunks are never removed, so reads produce clones.  Use `Arc<T>` chunks to share them instead.
#[derive(Debug)]
pub struct Buffer<T> {
    chunks: RwLock<Vec<T>>,
    cursor: AtomicUsize, // index of the next chunk to read
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for Buffer<T> {
    fn from(chunks: Vec<T>) -> Self {
        Self {
            chunks: RwLock::new(chunks),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl<T> FromIterator<T> for Buffer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T> Buffer<T> {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    // A panic while holding the lock can't leave the vector half-updated.
    fn chunks(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn chunks_mut(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.chunks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk to the end of the buffer.
    pub fn push(&self, chunk: T) {
        self.chunks_mut().push(chunk);
    }

    /// Returns the number of chunks ever written to the buffer.
    pub fn len(&self) -> usize {
        self.chunks().len()
    }

    /// Returns `true` if nothing has been written to the buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of chunks that have not been read yet.
    pub fn remaining(&self) -> usize {
        let chunks = self.chunks();
        chunks.len() - self.cursor.load(Ordering::Acquire)
    }

    /// Return the original chunks, read or not.
    pub fn into_inner(self) -> Vec<T> {
        self.chunks
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Buffer<T> {
    /// Read the chunk at the cursor and advance past it.
    ///
    /// Returns `None` if every chunk has already been read.  Concurrent readers never observe the
    /// same chunk.
    pub fn next_chunk(&self) -> Option<T> {
        let chunks = self.chunks();
        // The length can't change while the read lock is held, so claiming an index only races
        // with other readers.
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                (index < chunks.len()).then(|| index + 1)
            })
            .ok()?;
        Some(chunks[index].clone())
    }
}

impl<T: Clone> Source for &Buffer<T> {
    type Item = T;
    type Error = Infallible;

    fn poll_read(self: Pin<&mut Self>, _: &mut Context) -> Poll<Result<Option<T>, Infallible>> {
        Poll::Ready(Ok(self.next_chunk()))
    }
}

impl<T: Clone> Source for Buffer<T> {
    type Item = T;
    type Error = Infallible;

    fn poll_read(self: Pin<&mut Self>, _: &mut Context) -> Poll<Result<Option<T>, Infallible>> {
        Poll::Ready(Ok(self.next_chunk()))
    }
}

impl<T> Sink for &Buffer<T> {
    type Item = T;
    type Error = Infallible;

    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context,
        item: &mut Option<T>,
    ) -> Poll<Result<(), Infallible>> {
        if let Some(chunk) = item.take() {
            self.push(chunk);
        }
        Poll::Ready(Ok(()))
    }
}

impl<T> Sink for Buffer<T> {
    type Item = T;
    type Error = Infallible;

    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context,
        item: &mut Option<T>,
    ) -> Poll<Result<(), Infallible>> {
        if let Some(chunk) = item.take() {
            self.push(chunk);
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_stops_at_len() {
        let buffer = Buffer::from(vec![1, 2]);
        assert_eq!(buffer.remaining(), 2);
        assert_eq!(buffer.next_chunk(), Some(1));
        assert_eq!(buffer.next_chunk(), Some(2));
        assert_eq!(buffer.next_chunk(), None);
        assert_eq!(buffer.next_chunk(), None);
        assert_eq!(buffer.remaining(), 0);

        // A later write is readable again.
        buffer.push(3);
        assert_eq!(buffer.remaining(), 1);
        assert_eq!(buffer.next_chunk(), Some(3));
        assert_eq!(buffer.into_inner(), vec![1, 2, 3]);
    }
}
