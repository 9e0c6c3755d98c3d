//! Synchronous, unbounded pipes of chunks.
//!
//! A pipe is created with [`pipe`] as a connected [`PipeReader`] and [`PipeWriter`].  Each write
//! is a rendezvous: it completes once a reader has taken the chunk (or the pipe is closed, in which
//! case the chunk stays queued and is still delivered).  Both endpoints can be cloned to get
//! multiple producers and consumers.
//!
//! Closing is cooperative.  The first call to [`close`](`Closer::close`) or
//! [`close_with_error`](`Closer::close_with_error`) determines what readers observe after the
//! queued chunks are drained; every later close is accepted and ignored.
//!
//! ```
//! use culvert::{pipe, Closer, Sink, Source};
//!
//! let (mut reader, mut writer) = pipe();
//! let handle = std::thread::spawn(move || {
//!     writer.blocking_write("hi").unwrap();
//!     writer.close();
//! });
//!
//! assert_eq!(reader.blocking_read().unwrap(), Some("hi"));
//! assert_eq!(reader.blocking_read().unwrap(), None);
//! handle.join().unwrap();
//! ```

use crate::{
    error::{Cause, Error},
    Closer, Sink, Source,
};
use futures::stream::{FusedStream, Stream};
use log::{debug, trace};
use once_cell::sync::OnceCell;
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

/// Create a connected pipe.
pub fn pipe<T>() -> (PipeReader<T>, PipeWriter<T>) {
    let shared = Arc::new(Shared {
        terminal: OnceCell::new(),
        state: Mutex::new(State {
            offers: VecDeque::new(),
            offered: 0,
            delivered: 0,
            read_closed: false,
            readers: 1,
            writers: 1,
            read_wakers: Vec::new(),
        }),
    });

    (
        PipeReader {
            shared: shared.clone(),
            done: false,
        },
        PipeWriter {
            shared,
            pending: None,
        },
    )
}

// How the write side was closed.
#[derive(Clone, Debug)]
enum Terminal {
    Closed,
    Failed(Cause),
}

// A chunk waiting to be taken by a reader.
struct Offer<T> {
    chunk: T,
    waker: Option<Waker>, // the writer waiting for the handoff
}

struct State<T> {
    offers: VecDeque<Offer<T>>,
    offered: u64,   // ticket of the next offer
    delivered: u64, // ticket of the next offer to be taken
    read_closed: bool,
    readers: usize,
    writers: usize,
    read_wakers: Vec<Waker>,
}

impl<T> State<T> {
    fn wake_readers(&mut self) {
        for waker in self.read_wakers.drain(..) {
            waker.wake();
        }
    }

    fn register_reader(&mut self, waker: &Waker) {
        if !self.read_wakers.iter().any(|w| w.will_wake(waker)) {
            self.read_wakers.push(waker.clone());
        }
    }
}

struct Shared<T> {
    // Set exactly once, by the first close.  Never overwritten.
    terminal: OnceCell<Terminal>,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    // No code panics while the lock is held with the state partially updated.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn terminate(&self, terminal: Terminal) {
        match self.terminal.set(terminal) {
            Ok(()) => {
                debug!("pipe closed: {:?}", self.terminal.get());
                // Waiters check `terminal` with the lock held, so taking the lock after setting it
                // guarantees that every waiter either saw the terminal state or is woken here.
                let mut state = self.lock();
                state.wake_readers();
                for offer in state.offers.iter_mut() {
                    if let Some(waker) = offer.waker.take() {
                        waker.wake();
                    }
                }
            }
            Err(_) => trace!("pipe already closed, ignoring close"),
        }
    }

    fn close_read(&self) {
        let mut state = self.lock();
        if state.read_closed {
            return;
        }
        debug!(
            "pipe read side closed, dropping {} queued chunks",
            state.offers.len()
        );
        state.read_closed = true;
        state.wake_readers();
        for offer in state.offers.drain(..) {
            if let Some(waker) = offer.waker {
                waker.wake();
            }
        }
    }
}

/// The read endpoint of a [`pipe`].
///
/// Cloning the reader creates another consumer of the same pipe.  Each chunk is delivered to
/// exactly one reader.  Dropping every reader closes the read side of the pipe (see
/// [`close_read`](`Self::close_read`)).
pub struct PipeReader<T> {
    shared: Arc<Shared<T>>,
    done: bool, // the terminal outcome was yielded through `Stream`
}

impl<T> PipeReader<T> {
    /// Close the read side of the pipe.
    ///
    /// Queued chunks are dropped.  Pending and future writes fail with [`Error::ClosedPipe`], as
    /// do future reads from any reader of this pipe.
    pub fn close_read(&self) {
        self.shared.close_read();
    }

    /// Returns `true` if the pipe has been closed and every queued chunk has been read.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.lock();
        state.read_closed || (state.offers.is_empty() && self.shared.terminal.get().is_some())
    }
}

impl<T> Clone for PipeReader<T> {
    fn clone(&self) -> Self {
        self.shared.lock().readers += 1;
        Self {
            shared: self.shared.clone(),
            done: false,
        }
    }
}

impl<T> Drop for PipeReader<T> {
    fn drop(&mut self) {
        let last = {
            let mut state = self.shared.lock();
            state.readers -= 1;
            state.readers == 0
        };
        if last {
            self.shared.close_read();
        }
    }
}

impl<T> core::fmt::Debug for PipeReader<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PipeReader")
            .field("terminal", &self.shared.terminal.get())
            .finish_non_exhaustive()
    }
}

impl<T> Source for PipeReader<T> {
    type Item = T;
    type Error = Error;

    fn poll_read(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<Option<T>, Error>> {
        let mut state = self.shared.lock();
        if state.read_closed {
            return Poll::Ready(Err(Error::ClosedPipe));
        }

        // Queued chunks are delivered even after the pipe is closed.
        if let Some(offer) = state.offers.pop_front() {
            trace!("pipe handoff of chunk {}", state.delivered);
            state.delivered += 1;
            if let Some(waker) = offer.waker {
                waker.wake();
            }
            return Poll::Ready(Ok(Some(offer.chunk)));
        }

        match self.shared.terminal.get() {
            Some(Terminal::Closed) => Poll::Ready(Ok(None)),
            Some(Terminal::Failed(cause)) => Poll::Ready(Err(Error::Closed(cause.clone()))),
            None => {
                state.register_reader(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T> Stream for PipeReader<T> {
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.as_mut().poll_read(cx) {
            Poll::Ready(Ok(Some(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Ok(None)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Err(e)) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> FusedStream for PipeReader<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

/// The write endpoint of a [`pipe`].
///
/// Cloning the writer creates another producer for the same pipe.  Dropping every writer closes
/// the pipe without an error, if it wasn't already closed.
pub struct PipeWriter<T> {
    shared: Arc<Shared<T>>,
    pending: Option<u64>, // ticket of the offered chunk this writer is waiting on
}

impl<T> PipeWriter<T> {
    /// Returns `true` if the write side of the pipe has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.terminal.get().is_some()
    }

    // Check on a chunk this writer already offered.
    fn poll_handoff(&mut self, cx: &mut Context, ticket: u64) -> Poll<Result<(), Error>> {
        let mut state = self.shared.lock();
        if ticket < state.delivered {
            self.pending = None;
            return Poll::Ready(Ok(()));
        }
        if state.read_closed {
            self.pending = None;
            return Poll::Ready(Err(Error::ClosedPipe));
        }
        if self.shared.terminal.get().is_some() {
            // The chunk stays queued and is delivered after the close.
            self.pending = None;
            return Poll::Ready(Ok(()));
        }

        // Offers are only removed from the front, in ticket order.
        let index = (ticket - state.delivered) as usize;
        let offer = &mut state.offers[index];
        if !offer
            .waker
            .as_ref()
            .map_or(false, |waker| waker.will_wake(cx.waker()))
        {
            offer.waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> Clone for PipeWriter<T> {
    fn clone(&self) -> Self {
        self.shared.lock().writers += 1;
        Self {
            shared: self.shared.clone(),
            pending: None,
        }
    }
}

impl<T> Drop for PipeWriter<T> {
    fn drop(&mut self) {
        let last = {
            let mut state = self.shared.lock();
            state.writers -= 1;
            state.writers == 0
        };
        if last {
            self.shared.terminate(Terminal::Closed);
        }
    }
}

impl<T> core::fmt::Debug for PipeWriter<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("terminal", &self.shared.terminal.get())
            .field("pending", &self.pending)
            .finish()
    }
}

impl<T> Sink for PipeWriter<T> {
    type Item = T;
    type Error = Error;

    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context,
        item: &mut Option<T>,
    ) -> Poll<Result<(), Error>> {
        let this = self.get_mut();

        // A previous write future was dropped mid-handoff; finish that one first.
        if let Some(ticket) = this.pending {
            match this.poll_handoff(cx, ticket) {
                Poll::Ready(Ok(())) => {}
                other => return other,
            }
        }

        let chunk = match item.take() {
            Some(chunk) => chunk,
            None => return Poll::Ready(Ok(())),
        };

        let ticket = {
            let mut state = this.shared.lock();
            if state.read_closed || this.shared.terminal.get().is_some() {
                *item = Some(chunk);
                return Poll::Ready(Err(Error::ClosedPipe));
            }
            let ticket = state.offered;
            state.offered += 1;
            state.offers.push_back(Offer {
                chunk,
                waker: Some(cx.waker().clone()),
            });
            state.wake_readers();
            ticket
        };
        trace!("pipe offered chunk {}", ticket);

        // A reader may already have taken it.
        this.pending = Some(ticket);
        this.poll_handoff(cx, ticket)
    }
}

impl<T> Closer for PipeWriter<T> {
    fn close(&self) {
        self.shared.terminate(Terminal::Closed);
    }

    fn close_with_cause(&self, cause: Cause) {
        self.shared.terminate(Terminal::Failed(cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    #[test]
    fn write_waits_for_handoff() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let (mut reader, mut writer) = pipe::<u32>();

        let mut item = Some(7);
        assert!(Pin::new(&mut writer)
            .poll_write(&mut cx, &mut item)
            .is_pending());
        assert!(item.is_none());
        assert_eq!(writer.pending, Some(0));

        match Pin::new(&mut reader).poll_read(&mut cx) {
            Poll::Ready(Ok(Some(7))) => {}
            other => panic!("unexpected read: {:?}", other),
        }

        // Polling again with nothing to write completes the first handoff.
        let mut empty = None;
        assert!(matches!(
            Pin::new(&mut writer).poll_write(&mut cx, &mut empty),
            Poll::Ready(Ok(()))
        ));
        assert_eq!(writer.pending, None);
    }

    #[test]
    fn rejected_chunk_is_returned() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let (_reader, mut writer) = pipe::<u32>();
        writer.close();

        let mut item = Some(7);
        assert!(matches!(
            Pin::new(&mut writer).poll_write(&mut cx, &mut item),
            Poll::Ready(Err(Error::ClosedPipe))
        ));
        assert_eq!(item, Some(7));
    }

    #[test]
    fn close_releases_pending_writer() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let (reader, mut writer) = pipe::<u32>();

        let mut item = Some(1);
        assert!(Pin::new(&mut writer)
            .poll_write(&mut cx, &mut item)
            .is_pending());
        writer.close();
        assert!(matches!(
            Pin::new(&mut writer).poll_write(&mut cx, &mut None),
            Poll::Ready(Ok(()))
        ));
        assert!(!reader.is_finished());
    }

    #[test]
    fn counts_endpoints() {
        let (reader, writer) = pipe::<u32>();
        let second = writer.clone();
        drop(writer);
        assert!(!second.is_closed());
        drop(second);
        assert!(reader.is_finished());
        assert_eq!(reader.shared.lock().readers, 1);
    }
}
