//! Traits defining common chunk stream interfaces.

use crate::error::Cause;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use pin_project::pin_project;
use std::sync::Arc;

/// Future produced by [`Source::read`].
#[pin_project]
pub struct Read<'a, T> {
    #[pin]
    handle: &'a mut T,
}

impl<'a, T> Future for Read<'a, T>
where
    T: Source + Unpin,
{
    type Output = Result<Option<T::Item>, T::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let pinned = self.project();
        Pin::new(&mut **pinned.handle.get_mut()).poll_read(cx)
    }
}

/// Future produced by [`Sink::write`].
///
/// The chunk is kept in the future until the sink accepts it.  If the write fails before the sink
/// takes the chunk, it can be recovered with [`into_inner`](`Self::into_inner`).
#[pin_project]
pub struct Write<'a, T>
where
    T: Sink,
{
    #[pin]
    handle: &'a mut T,
    item: Option<T::Item>,
}

impl<'a, T> Write<'a, T>
where
    T: Sink,
{
    /// Return the chunk, if the sink has not taken it yet.
    pub fn into_inner(self) -> Option<T::Item> {
        self.item
    }
}

impl<'a, T> Future for Write<'a, T>
where
    T: Sink + Unpin,
{
    type Output = Result<(), T::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let pinned = self.project();
        Pin::new(&mut **pinned.handle.get_mut()).poll_write(cx, pinned.item)
    }
}

/// Read chunks from a stream, one at a time.
pub trait Source {
    /// The streamed type.
    type Item;

    /// The error produced by [`poll_read`](`Self::poll_read`).
    type Error: core::fmt::Debug;

    /// Attempt to read the next chunk.
    ///
    /// Returns `Ok(None)` once the end of the stream has been reached.  Streams should keep
    /// returning the same terminal outcome for every subsequent read.
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
    ) -> Poll<Result<Option<Self::Item>, Self::Error>>;

    /// Create a future that reads the next chunk.
    ///
    /// See [`poll_read`](`Self::poll_read`).
    fn read(&mut self) -> Read<'_, Self>
    where
        Self: Sized + Unpin,
    {
        Read { handle: self }
    }

    /// Read the next chunk, blocking the current thread.
    ///
    /// See [`poll_read`](`Self::poll_read`).
    fn blocking_read(&mut self) -> Result<Option<Self::Item>, Self::Error>
    where
        Self: Sized + Unpin,
    {
        futures::executor::block_on(self.read())
    }
}

impl<S: ?Sized + Source + Unpin> Source for &mut S {
    type Item = S::Item;
    type Error = S::Error;

    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
    ) -> Poll<Result<Option<Self::Item>, Self::Error>> {
        S::poll_read(Pin::new(&mut **self), cx)
    }
}

/// Write chunks to a stream, one at a time.
pub trait Sink {
    /// The streamed type.
    type Item;

    /// The error produced by [`poll_write`](`Self::poll_write`).
    type Error: core::fmt::Debug;

    /// Attempt to write the chunk in `item`.
    ///
    /// The sink takes the chunk out of `item` once it has accepted it.  A write may remain pending
    /// after the chunk was taken, until the stream has handed it off.  If the write fails before
    /// the chunk was taken, `item` is left untouched.
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context,
        item: &mut Option<Self::Item>,
    ) -> Poll<Result<(), Self::Error>>;

    /// Create a future that writes `item`.
    ///
    /// See [`poll_write`](`Self::poll_write`).
    fn write(&mut self, item: Self::Item) -> Write<'_, Self>
    where
        Self: Sized + Unpin,
    {
        Write {
            handle: self,
            item: Some(item),
        }
    }

    /// Write `item`, blocking the current thread.
    ///
    /// See [`poll_write`](`Self::poll_write`).
    fn blocking_write(&mut self, item: Self::Item) -> Result<(), Self::Error>
    where
        Self: Sized + Unpin,
    {
        futures::executor::block_on(self.write(item))
    }
}

impl<S: ?Sized + Sink + Unpin> Sink for &mut S {
    type Item = S::Item;
    type Error = S::Error;

    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context,
        item: &mut Option<Self::Item>,
    ) -> Poll<Result<(), Self::Error>> {
        S::poll_write(Pin::new(&mut **self), cx, item)
    }
}

/// Terminate a stream, optionally with an error.
///
/// Closing never blocks and never fails.  Only the first close has an effect.
pub trait Closer {
    /// Close the stream without an error.
    fn close(&self);

    /// Close the stream, storing `cause` as the error observed by readers.
    fn close_with_cause(&self, cause: Cause);

    /// Close the stream with an error.
    ///
    /// Accepts anything convertible to a boxed error, including string messages.
    fn close_with_error<E>(&self, error: E)
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
        Self: Sized,
    {
        self.close_with_cause(Arc::from(error.into()))
    }
}

impl<C: ?Sized + Closer> Closer for &C {
    fn close(&self) {
        C::close(self)
    }

    fn close_with_cause(&self, cause: Cause) {
        C::close_with_cause(self, cause)
    }
}

/// Read every chunk from `source` until the end of the stream.
///
/// Returns the chunks in read order, or the first error encountered.
pub async fn read_all<S>(mut source: S) -> Result<Vec<S::Item>, S::Error>
where
    S: Source + Unpin,
{
    let mut chunks = Vec::new();
    while let Some(chunk) = source.read().await? {
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Read every chunk from `source` until the end of the stream, blocking the current thread.
///
/// See [`read_all`].
pub fn blocking_read_all<S>(source: S) -> Result<Vec<S::Item>, S::Error>
where
    S: Source + Unpin,
{
    futures::executor::block_on(read_all(source))
}
