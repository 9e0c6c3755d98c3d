//! Culvert provides typed, synchronous pipes of chunks for composing in-process pipelines.
//!
//! Chunks flow through [`Source`]s and into [`Sink`]s one at a time.  A [`pipe`] hands each chunk
//! from a writer to a reader and carries the first close (and its error, if any) to every reader.
//! A [`Buffer`](buffer::Buffer) stores chunks for non-blocking reads.  The [`stage`] module chains
//! them into pipelines.

mod base;
pub use base::*;

pub mod buffer;
pub mod error;
pub mod io;
pub mod pipe;
pub mod stage;

pub use pipe::{pipe, PipeReader, PipeWriter};
