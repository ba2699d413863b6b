//! Error types for the simulator.

use thiserror::Error;

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding frames, loading workloads, or
/// building scenarios.
#[derive(Error, Debug)]
pub enum Error {
    /// Frame shorter than the fixed headers + trailer
    #[error("short frame: need {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    /// Integrity trailer does not carry the expected value
    #[error("bad integrity trailer: 0x{found:08x}")]
    BadTrailer { found: u32 },

    /// Trace file I/O error
    #[error("trace I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Trace file could not be interpreted
    #[error("trace parse error: {0}")]
    Trace(String),

    /// Scenario configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new trace parse error
    pub fn trace(msg: impl Into<String>) -> Self {
        Error::Trace(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ShortFrame {
            expected: 20,
            actual: 3,
        };
        assert_eq!(err.to_string(), "short frame: need 20 bytes, got 3");

        let err = Error::BadTrailer { found: 0xdeadbeef };
        assert_eq!(err.to_string(), "bad integrity trailer: 0xdeadbeef");
    }
}
