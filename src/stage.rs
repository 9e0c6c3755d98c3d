//! Tasks for transforming chunk streams into new pipes.
//!
//! A stage owns a fresh [`pipe`] and a spawned task that drains its input into the pipe's writer,
//! transforming each chunk.  When the input ends the output is closed; when the input fails the
//! output is closed with the same error.  Stages chain by passing one stage's reader as the next
//! stage's input.
//!
//! ```
//! use culvert::{buffer::Buffer, stage};
//! use futures::executor::ThreadPool;
//!
//! let pool = ThreadPool::new().unwrap();
//! let input = Buffer::from(vec![1, 2, 3, 4]);
//! let evens = stage::stage(&pool, input, |x| (x % 2 == 0).then(|| x * 10)).unwrap();
//! assert_eq!(culvert::blocking_read_all(evens).unwrap(), vec![20, 40]);
//! ```

use crate::{
    error::{Error, Infallible},
    pipe::{pipe, PipeReader, PipeWriter},
    Closer, Sink, Source,
};
use futures::task::{Spawn, SpawnError, SpawnExt};
use log::debug;

/// Spawn a stage that filters and maps each chunk of `input` with `f`.
///
/// Chunks for which `f` returns `None` are skipped.
pub fn stage<Sp, S, F, U>(spawner: &Sp, input: S, mut f: F) -> Result<PipeReader<U>, SpawnError>
where
    Sp: Spawn + ?Sized,
    S: Source + Unpin + Send + 'static,
    S::Item: Send,
    S::Error: Into<Error> + Send,
    F: FnMut(S::Item) -> Option<U> + Send + 'static,
    U: Send + 'static,
{
    try_stage(spawner, input, move |chunk| Ok::<_, Infallible>(f(chunk)))
}

/// Spawn a stage that filters and maps each chunk of `input` with the fallible `f`.
///
/// If `f` returns an error, the output is closed with that error and the rest of the input is
/// left unread.
pub fn try_stage<Sp, S, F, U, E>(
    spawner: &Sp,
    mut input: S,
    mut f: F,
) -> Result<PipeReader<U>, SpawnError>
where
    Sp: Spawn + ?Sized,
    S: Source + Unpin + Send + 'static,
    S::Item: Send,
    S::Error: Into<Error> + Send,
    F: FnMut(S::Item) -> Result<Option<U>, E> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    U: Send + 'static,
{
    let (reader, mut writer) = pipe();
    spawner.spawn(async move {
        loop {
            let chunk = match input.read().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    debug!("stage input exhausted");
                    writer.close();
                    return;
                }
                Err(e) => {
                    forward(&writer, e.into());
                    return;
                }
            };

            let output = match f(chunk) {
                Ok(Some(output)) => output,
                Ok(None) => continue,
                Err(e) => {
                    let e: Box<dyn std::error::Error + Send + Sync> = e.into();
                    debug!("stage failed: {}", e);
                    writer.close_with_error(e);
                    return;
                }
            };
            if writer.write(output).await.is_err() {
                debug!("stage output closed, dropping input");
                return;
            }
        }
    })?;
    Ok(reader)
}

// Close `writer` with an upstream error, keeping a propagated cause intact.
fn forward<T>(writer: &PipeWriter<T>, error: Error) {
    debug!("stage input failed: {}", error);
    match error {
        Error::Closed(cause) => writer.close_with_cause(cause),
        other => writer.close_with_error(other),
    }
}
