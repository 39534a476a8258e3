//! Loader-wide [`Result`] type convertible from [`Status`]
//!
//! [`Status`] warnings and errors map to [`Err`], success maps to [`Ok`],
//! which makes every firmware call and every internal check compose with
//! the `?` operator.
//!
//! The abstract error taxonomy of the loader maps onto status codes as
//! follows: not-found → [`Status::NOT_FOUND`], invalid parameter →
//! [`Status::INVALID_PARAMETER`], invalid data (bad PE header, malformed
//! config) → [`Status::COMPROMISED_DATA`], I/O failure →
//! [`Status::DEVICE_ERROR`] (or whatever firmware reported), out of
//! resources → [`Status::OUT_OF_RESOURCES`], access denied →
//! [`Status::ACCESS_DENIED`], timeout → [`Status::TIMEOUT`].

/// Loader-friendly Rust result
pub type Result<T> = core::result::Result<T, Error>;

pub use crate::base::Status;

/// A non-success [`Status`]
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Error {
    inner: Status,
}

impl Error {
    /// Create a new [`Error`]
    ///
    /// # Panics
    ///
    /// - If `inner` is [`Status::SUCCESS`]
    #[inline]
    pub const fn new(inner: Status) -> Self {
        assert!(
            !inner.is_success(),
            "tried to construct an Error from a success status"
        );
        Self { inner }
    }

    /// The [`Status`] for this error
    #[inline]
    pub const fn status(self) -> Status {
        self.inner
    }
}

impl From<Status> for Result<()> {
    #[inline]
    fn from(value: Status) -> Self {
        if value.is_success() {
            Ok(())
        } else {
            Err(Error::new(value))
        }
    }
}

impl From<Status> for Error {
    #[inline]
    fn from(value: Status) -> Self {
        Error::new(value)
    }
}

/// [`core::fmt::Write`] failures are treated as
/// [`Status::DEVICE_ERROR`]
impl From<core::fmt::Error> for Error {
    #[inline]
    fn from(_: core::fmt::Error) -> Self {
        Error::new(Status::DEVICE_ERROR)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.status())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Error")
            .field("inner", &self.inner)
            .field("[Display]", &format_args!("{}", self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_into_result() {
        assert_eq!(Result::from(Status::SUCCESS), Ok(()));
        let e: Result<()> = Status::NOT_FOUND.into();
        assert_eq!(e.unwrap_err().status(), Status::NOT_FOUND);
    }
}
