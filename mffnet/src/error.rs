use thiserror::Error;

/// The error type for MFF-Net decoder operations.
///
/// Every error is fatal for the call that produced it: the decoder is a pure function
/// over tensors, so nothing is retried and nothing is recovered internally.
#[derive(Error, Debug)]
pub enum MffNetError {
    /// A configuration record is logically inconsistent (divisibility, fold geometry,
    /// head counts, a fused stage without skip features, ...).
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// An input tensor does not have the shape the configured model expects.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Dataset listing or loading failed.
    #[error("Dataset error: {message}")]
    DatasetError {
        /// The error message.
        message: String,
    },
}

impl MffNetError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidTensorShape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// A specialized `Result` type for MFF-Net operations.
pub type MffNetResult<T> = Result<T, MffNetError>;
