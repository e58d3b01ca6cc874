use thiserror::Error;

/// The engine's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes surfaced to the delegate (`error(ErrorKind, description)`).
///
/// Numeric values are part of the public contract: do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    Open = 1,
    Parse = 2,
    Network = 3,
    UnsupportedFormat = 4,
    Bouncing = 5,
}

impl ErrorKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The engine's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream embedders aren't forced to
/// adopt `anyhow` in their own public APIs. Each variant corresponds 1:1 to an [`ErrorKind`].
#[derive(Debug, Error)]
pub enum Error {
    /// Input unreachable, or the response's content-type was rejected under strict checking.
    #[error("open failed: {message}")]
    Open {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parser rejected the bytes fed to it, or hit unexpected EOF mid-parse.
    #[error("parse failed: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input dropped, a continuous stream ended, or an I/O error occurred.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parser reports a non-optimized format, or the converter reports `FormatNotSupported`.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// The bounce detector tripped (repeated underrun cycles within its window).
    #[error("bouncing: exceeded {bounce_count} underrun cycles")]
    Bouncing { bounce_count: u32 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } => ErrorKind::Open,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Network { .. } => ErrorKind::Network,
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::Bouncing { .. } => ErrorKind::Bouncing,
        }
    }

    pub fn open(message: impl Into<String>) -> Self {
        Error::Open {
            message: message.into(),
            source: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Error::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn bouncing(bounce_count: u32) -> Self {
        Error::Bouncing { bounce_count }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Network {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;
        match &err {
            SymphoniaError::Unsupported(_) => Error::UnsupportedFormat {
                message: err.to_string(),
            },
            SymphoniaError::IoError(_) => Error::Network {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
            _ => Error::Parse {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Parse {
            message: format!("{err:#}"),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Error::open("x").kind(), ErrorKind::Open);
        assert_eq!(Error::parse("x").kind(), ErrorKind::Parse);
        assert_eq!(Error::network("x").kind(), ErrorKind::Network);
        assert_eq!(
            Error::unsupported_format("x").kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(Error::bouncing(3).kind(), ErrorKind::Bouncing);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorKind::Open.code(), 1);
        assert_eq!(ErrorKind::Parse.code(), 2);
        assert_eq!(ErrorKind::Network.code(), 3);
        assert_eq!(ErrorKind::UnsupportedFormat.code(), 4);
        assert_eq!(ErrorKind::Bouncing.code(), 5);
    }
}
