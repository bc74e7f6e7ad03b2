use std::fmt;

/// Errors reported synchronously to a configuration writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitError {
    /// Malformed number, value outside the frequency table or outside an allowed range.
    InvalidArgument(String),
    /// The frequency table could not be read.
    ResourceUnavailable(String),
}

impl LimitError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LimitError::InvalidArgument(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        LimitError::ResourceUnavailable(msg.into())
    }

    /// HTTP status used by the transport.
    pub fn status_code(&self) -> u16 {
        match self {
            LimitError::InvalidArgument(_) => 400,
            LimitError::ResourceUnavailable(_) => 503,
        }
    }
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitError::InvalidArgument(m) => write!(f, "invalid argument: {}", m),
            LimitError::ResourceUnavailable(m) => write!(f, "resource unavailable: {}", m),
        }
    }
}

impl std::error::Error for LimitError {}
