use std::fmt;

/// Register code whose embedded data is inconsistent with itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataIntegrityError {
    /// Payload does not start with the `fill-array-data-payload` identifier
    BadPayloadIdent(u16),

    /// Payload element width is not 1, 2, 4, or 8
    BadElementWidth(u16),

    /// Payload is shorter than its header claims
    TruncatedPayload { expected: usize, found: usize },

    /// Register count of a `filled-new-array` is not a multiple of the element width
    RegisterCount { count: usize, element_width: usize },

    /// Payload element width does not match the size of the array elements being filled
    ElementWidthMismatch { expected: usize, found: usize },
}

impl fmt::Display for DataIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataIntegrityError::BadPayloadIdent(ident) => {
                write!(f, "array payload has identifier {:#06x}", ident)
            }
            DataIntegrityError::BadElementWidth(width) => {
                write!(f, "array payload has element width {}", width)
            }
            DataIntegrityError::TruncatedPayload { expected, found } => write!(
                f,
                "array payload needs {} bytes but only {} are present",
                expected, found
            ),
            DataIntegrityError::RegisterCount {
                count,
                element_width,
            } => write!(
                f,
                "{} registers cannot hold elements {} registers wide",
                count, element_width
            ),
            DataIntegrityError::ElementWidthMismatch { expected, found } => write!(
                f,
                "array elements are {} bytes wide but the payload has {} byte elements",
                expected, found
            ),
        }
    }
}

impl std::error::Error for DataIntegrityError {}
