//! Errors produced by sources and sinks.

use std::sync::Arc;

/// An application-supplied error stored when a pipe is closed with an error.
///
/// Every reader observes the same `Cause`, so it is reference counted rather than boxed.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Error used when a read or write will never fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Infallible {}

impl core::fmt::Display for Infallible {
    fn fmt(&self, _: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {}
    }
}

impl std::error::Error for Infallible {}

impl From<Infallible> for Error {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

/// Error produced by a pipe.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// A write was attempted on a closed pipe, or the read side went away.
    #[error("write on closed pipe")]
    ClosedPipe,

    /// The pipe was closed with an error.
    ///
    /// The cause is the one passed to the first close, unmodified.
    #[error("{0}")]
    Closed(Cause),
}

impl Error {
    /// Return the stored cause, if the pipe was closed with an error.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Closed(cause) => Some(cause),
            Self::ClosedPipe => None,
        }
    }

    /// Convert to a [`std::io::Error`].
    pub fn to_io(self) -> std::io::Error {
        match self {
            Self::ClosedPipe => std::io::Error::new(std::io::ErrorKind::BrokenPipe, self),
            Self::Closed(_) => std::io::Error::new(std::io::ErrorKind::Other, self),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        e.to_io()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cause_is_displayed_verbatim() {
        let cause: Cause = Arc::from(Box::<dyn std::error::Error + Send + Sync>::from("oh noz"));
        let e = Error::Closed(cause.clone());
        assert_eq!(e.to_string(), "oh noz");
        assert!(Arc::ptr_eq(e.cause().unwrap(), &cause));
    }

    #[test]
    fn io_kinds() {
        assert_eq!(
            Error::ClosedPipe.to_io().kind(),
            std::io::ErrorKind::BrokenPipe
        );
        let cause: Cause = Arc::new(std::fmt::Error);
        assert_eq!(
            Error::Closed(cause).to_io().kind(),
            std::io::ErrorKind::Other
        );
    }
}
