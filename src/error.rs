use thiserror::Error;

/// Failures surfaced by the viewer.
///
/// Payloads are plain strings so an error can be cloned into an outbound
/// engine event and compared in tests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    /// The container could not be opened or one of its entries could not be inflated.
    #[error("material archive is corrupt: {reason}")]
    ArchiveCorrupt { reason: String },

    /// A descriptor references an archive path that does not exist.
    #[error("archive entry '{path}' is missing")]
    EntryMissing { path: String },

    /// The descriptor is not valid JSON or lacks a node the format requires.
    #[error("descriptor '{descriptor}' is invalid: {reason}")]
    DescriptorInvalid { descriptor: String, reason: String },

    /// Image (or panorama) bytes could not be decoded.
    #[error("failed to decode {what}: {reason}")]
    DecodeFailed { what: String, reason: String },

    /// The resource could not be fetched.
    #[error("failed to fetch {resource}: {reason}")]
    NetworkFailure { resource: String, reason: String },

    #[error("model is not usable: {reason}")]
    ModelInvalid { reason: String },

    #[error("no environment at catalog index {0}")]
    UnknownEnvironment(usize),

    #[error("gpu error: {0}")]
    Gpu(String),
}

impl ViewerError {
    pub(crate) fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeFailed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn descriptor(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DescriptorInvalid {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
