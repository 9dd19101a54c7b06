//! Error types for NNA driver operations

use thiserror::Error;

/// Result type alias for NNA operations
pub type Result<T> = std::result::Result<T, NnaError>;

/// Errors that can occur while compiling or running an NNA operation
#[derive(Debug, Error)]
pub enum NnaError {
    /// Cube or operation geometry the hardware cannot express
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry {
        /// What is wrong with the descriptor
        reason: String,
    },

    /// Data format with no defined buffer layout on this hardware generation
    #[error("Unsupported data format: {format}")]
    UnsupportedFormat {
        /// Name of the rejected format
        format: &'static str,
    },

    /// Completion flags did not match before the deadline
    #[error(
        "Operation timeout after {polls} polls ({elapsed_us}µs): \
         status={status:#010x}, expected={expected:#010x}"
    )]
    Timeout {
        /// Last value read from the interrupt status register
        status: u32,
        /// Value the masked status was compared against
        expected: u32,
        /// Number of status polls performed
        polls: u32,
        /// Wall-clock time spent waiting, in microseconds
        elapsed_us: u64,
    },

    /// Convolution buffer never reported flushed
    #[error("Convolution buffer flush not observed after {polls} polls")]
    FlushTimeout {
        /// Number of flush-status polls performed
        polls: u32,
    },

    /// Caller cancelled the wait
    #[error("Operation cancelled after {polls} polls")]
    Cancelled {
        /// Number of status polls performed before cancellation
        polls: u32,
    },

    /// I/O error while opening the memory device
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Register window could not be mapped
    #[error("Failed to map register window: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Session or configuration is in an invalid state
    #[error("Invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Physical buffer region cannot satisfy a request
    #[error("Buffer exhausted: requested {requested} bytes, {available} available")]
    BufferExhausted {
        /// Requested byte count
        requested: u64,
        /// Bytes remaining in the region
        available: u64,
    },
}

impl NnaError {
    /// Create an invalid geometry error
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Create a map failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// True for errors raised before any register was written.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry { .. } | Self::UnsupportedFormat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_carries_diagnostics() {
        let err = NnaError::Timeout {
            status: 0x0015_0000,
            expected: 0x0015_0001,
            polls: 20_000,
            elapsed_us: 401_234,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x00150000"), "{msg}");
        assert!(msg.contains("0x00150001"), "{msg}");
        assert!(msg.contains("20000 polls"), "{msg}");
    }

    #[test]
    fn contract_violations_are_classified() {
        assert!(NnaError::invalid_geometry("zero width").is_contract_violation());
        assert!(NnaError::UnsupportedFormat { format: "pixel" }.is_contract_violation());
        assert!(!NnaError::Cancelled { polls: 3 }.is_contract_violation());
    }
}
