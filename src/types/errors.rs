use core::error::Error;
use core::fmt;

pub use crate::alloc::AllocError;

/// This enum lets one figure out what kind of error occurred while
/// allocating a flexible object.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Adding up the header and trailing array sizes overflowed `usize`.
    SizeOverflow = 1,
    /// The total size does not form a valid `Layout` (it exceeds `isize::MAX`).
    LayoutFailure,
    /// The allocator could not provide the memory.
    AllocFailure,
}

/// A type alias for `Result<T, FlexError>`
pub type FlexResult<T> = Result<T, FlexError>;

/// This is used to indicate an error while allocating a flexible object.
///
/// These errors are always reported before any user constructor has run.
/// Construction functions that accept fallible constructors require the user
/// error type to implement `From<FlexError>`.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlexError(ErrorKind);

impl FlexError {
    pub(crate) const fn new(kind: ErrorKind) -> Self {
        return Self(kind);
    }
    pub const fn kind(self) -> ErrorKind {
        return self.0;
    }
}

impl Error for FlexError {}

impl fmt::Display for FlexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ErrorKind::SizeOverflow => f.write_str("usize overflowed while sizing the object."),
            ErrorKind::LayoutFailure => f.write_str("Failed to create layout."),
            ErrorKind::AllocFailure => f.write_str("An allocation failure occurred."),
        }
    }
}

impl From<AllocError> for FlexError {
    fn from(_: AllocError) -> Self {
        return Self(ErrorKind::AllocFailure);
    }
}
