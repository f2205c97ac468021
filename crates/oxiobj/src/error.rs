//! Status codes for `oxiobj` operations.
//!
//! Every fallible runtime operation returns [`Result`]. The variants form a
//! closed set; [`Error::code`] gives each one a stable numeric status where
//! `0` is reserved for success. Richer, message-carrying errors are runtime
//! instances of the `Error` class (see [`crate::runtime::ErrorObject`]).

use std::fmt;

/// Errors reported by the `oxiobj` runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Something inside the runtime is broken.
    Internal,

    /// A precondition on the arguments was violated.
    InvalidArgument,

    /// A runtime facility failed.
    Runtime,

    /// A class or the runtime was used before it was initialized.
    NotInitialized,

    /// A position is outside the valid range.
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The number of valid positions.
        size: usize,
    },

    /// A message part has the wrong type.
    MsgPartType,

    /// A received message is malformed.
    MsgInvalid,

    /// The slot for this operation is not filled in.
    NotImplemented,

    /// A read or write reached its timeout.
    Timeout,

    /// The two objects cannot be compared.
    Incomparable,

    /// The object's class has no copy operation.
    NotCopyable,

    /// Unspecified failure.
    Unexpected,

    /// Memory for an instance or class could not be obtained.
    OutOfMemory,
}

impl Error {
    /// Returns the numeric status code for this error.
    ///
    /// ```
    /// use oxiobj::Error;
    ///
    /// assert_eq!(Error::InvalidArgument.code(), 2);
    /// assert_eq!(Error::IndexOutOfRange { index: 3, size: 1 }.code(), 5);
    /// ```
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Error::Internal => 1,
            Error::InvalidArgument => 2,
            Error::Runtime | Error::OutOfMemory => 3,
            Error::NotInitialized => 4,
            Error::IndexOutOfRange { .. } => 5,
            Error::MsgPartType => 6,
            Error::MsgInvalid => 7,
            Error::NotImplemented => 8,
            Error::Timeout => 9,
            Error::Incomparable => 10,
            Error::NotCopyable => 11,
            Error::Unexpected => 12,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Internal => write!(f, "Internal runtime error"),
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::Runtime => write!(f, "Runtime error"),
            Error::NotInitialized => write!(f, "Class or runtime not initialized"),
            Error::IndexOutOfRange { index, size } => {
                write!(f, "Index {index} out of range for size {size}")
            }
            Error::MsgPartType => write!(f, "Incorrect message part type"),
            Error::MsgInvalid => write!(f, "Invalid message"),
            Error::NotImplemented => write!(f, "Operation not implemented"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Incomparable => write!(f, "Objects are not comparable"),
            Error::NotCopyable => write!(f, "Object is not copyable"),
            Error::Unexpected => write!(f, "Unexpected error"),
            Error::OutOfMemory => write!(f, "Out of memory"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `oxiobj` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::OutOfMemory.to_string(), "Out of memory");
        assert_eq!(
            Error::IndexOutOfRange { index: 7, size: 2 }.to_string(),
            "Index 7 out of range for size 2"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let all = [
            Error::Internal,
            Error::InvalidArgument,
            Error::Runtime,
            Error::NotInitialized,
            Error::IndexOutOfRange { index: 0, size: 0 },
            Error::MsgPartType,
            Error::MsgInvalid,
            Error::NotImplemented,
            Error::Timeout,
            Error::Incomparable,
            Error::NotCopyable,
            Error::Unexpected,
        ];
        for (expected, err) in (1..).zip(all.iter()) {
            assert_eq!(err.code(), expected, "{err}");
        }
        assert_eq!(Error::OutOfMemory.code(), Error::Runtime.code());
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::NotCopyable, Error::NotCopyable);
        assert_ne!(
            Error::IndexOutOfRange { index: 1, size: 0 },
            Error::IndexOutOfRange { index: 2, size: 0 }
        );
    }
}
