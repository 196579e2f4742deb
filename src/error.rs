//! Library-wide error type.
use crate::mapping::UpdateFlags;
use std::fmt;
use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The configuration, or a request derived from it, cannot be realized.
    Configuration,
    /// The caller violated the contract of the operation, e.g. by passing a buffer of the wrong size.
    PreconditionViolation,
    /// An internal consistency check failed. This indicates a bug in this library.
    InternalInvariant,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The field configuration is invalid.
    InvalidConfiguration(String),
    /// No point evaluation is available for the requested number of components.
    UnsupportedCardinality { requested: usize, max: usize },
    /// The requested update flags are not supported by the operation.
    UnsupportedFlags(UpdateFlags),
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// No compositional field with the given name has been declared.
    CompositionNotFound(String),
    /// No variable with the given name exists in the layout.
    VariableNotFound(String),
    /// The cell Jacobian is singular at the evaluation point with the given index.
    SingularJacobian { point: usize },
    /// The basis functions are not unisolvent on the given cell.
    SingularInterpolation,
    /// A component was not assigned to any block.
    IncompleteBlockMapping { component: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            InvalidConfiguration(_)
            | UnsupportedCardinality { .. }
            | SingularJacobian { .. }
            | SingularInterpolation => ErrorKind::Configuration,
            UnsupportedFlags(_)
            | DimensionMismatch { .. }
            | IndexOutOfBounds { .. }
            | CompositionNotFound(_)
            | VariableNotFound(_) => ErrorKind::PreconditionViolation,
            IncompleteBlockMapping { .. } => ErrorKind::InternalInvariant,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(reason) => write!(f, "Invalid field configuration: {}", reason),
            Error::UnsupportedCardinality { requested, max } => write!(
                f,
                "Point evaluation is not implemented for {} components (supported: 1 to {})",
                requested, max
            ),
            Error::UnsupportedFlags(flags) => write!(f, "Unsupported update flags: {:?}", flags),
            Error::DimensionMismatch { what, expected, actual } => {
                write!(f, "Dimension mismatch for {}: expected {}, got {}", what, expected, actual)
            }
            Error::IndexOutOfBounds { what, index, len } => {
                write!(f, "Index {} out of bounds for {} of length {}", index, what, len)
            }
            Error::CompositionNotFound(name) => write!(
                f,
                "The compositional field {} you asked for is not used in the simulation.",
                name
            ),
            Error::VariableNotFound(name) => write!(f, "No variable named {} in the field layout", name),
            Error::SingularJacobian { point } => {
                write!(f, "Singular cell Jacobian encountered at evaluation point {}", point)
            }
            Error::SingularInterpolation => write!(f, "Interpolation matrix is singular"),
            Error::IncompleteBlockMapping { component } => {
                write!(f, "Internal error: component {} is not assigned to any block", component)
            }
        }
    }
}

impl std::error::Error for Error {}
