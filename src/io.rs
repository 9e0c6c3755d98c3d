//! Utilities for working with [`std::io`].

use crate::{error::Error, Sink, Source};
use std::marker::Unpin;

/// Implements `std::io::Read` for a source of byte chunks.
///
/// Chunks that don't fit in the caller's buffer are kept and finished by the next read.
pub struct Reader<S>
where
    S: Source + Unpin,
{
    source: S,
    chunk: Option<S::Item>,
    offset: usize,
}

impl<S> Reader<S>
where
    S: Source + Unpin,
{
    /// Create a new `Reader`
    pub fn new(source: S) -> Self {
        Self {
            source,
            chunk: None,
            offset: 0,
        }
    }

    /// Return the original `Source`
    ///
    /// Any partially read chunk is discarded.
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S> std::io::Read for Reader<S>
where
    S: Source + Unpin,
    S::Item: AsRef<[u8]>,
    S::Error: Into<Error>,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Skip empty chunks, they don't signal the end of the stream.
        loop {
            if let Some(chunk) = &self.chunk {
                let remaining = &chunk.as_ref()[self.offset..];
                if !remaining.is_empty() {
                    let len = buf.len().min(remaining.len());
                    buf[..len].copy_from_slice(&remaining[..len]);
                    self.offset += len;
                    return Ok(len);
                }
            }

            match self.source.blocking_read() {
                Ok(Some(chunk)) => {
                    self.chunk = Some(chunk);
                    self.offset = 0;
                }
                Ok(None) => {
                    self.chunk = None;
                    return Ok(0);
                }
                Err(e) => return Err(Into::<Error>::into(e).to_io()),
            }
        }
    }
}

/// Implements `std::io::Write` for a sink of byte chunks.
///
/// Every call to `write` sends one chunk.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Writer<S>(S);

impl<S> Writer<S>
where
    S: Sink<Item = Vec<u8>> + Unpin,
{
    /// Create a new `Writer`
    pub fn new(sink: S) -> Self {
        Self(sink)
    }

    /// Return the original `Sink`
    pub fn into_inner(self) -> S {
        self.0
    }
}

impl<S> std::io::Write for Writer<S>
where
    S: Sink<Item = Vec<u8>> + Unpin,
    S::Error: Into<Error>,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0
            .blocking_write(buf.to_vec())
            .map_err(|e| Into::<Error>::into(e).to_io())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
