use std::fmt::Formatter;

use thiserror::Error;

/// An error that is localised to a particular instruction offset in the
/// batch that was being executed when it occurred.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The offset of the instruction at which the error occurred.
    pub location: u32,

    /// The error data
    pub payload: E,
}

/// Displays the error together with the offset of the instruction at which it
/// occurred.
impl<E> std::fmt::Display for Located<E>
where
    E: std::fmt::Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[instruction {}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have an instruction offset attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached instruction offset.
    type Located;

    /// Attach the location described by `offset` (an index into the
    /// instruction batch being executed) to the error.
    fn locate(self, offset: u32) -> Self::Located;
}

/// A blanket implementation that allows for attaching a location to any
/// result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, offset: u32) -> Self::Located {
        self.map_err(|e| Located {
            location: offset,
            payload:  e,
        })
    }
}
