use thiserror::Error;

/// The single error type returned by every public entry point in this crate.
///
/// Variants line up with the taxonomy in the design document: parse errors
/// carry the byte offset where the problem was detected, unsupported
/// features are named explicitly rather than folded into a generic parse
/// failure, and authentication/capacity/placeholder errors are distinguished
/// so callers can react differently (e.g. retry with another password vs.
/// give up).
#[derive(Debug, Error)]
pub enum PdfCraftError {
    #[error("malformed PDF at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("signature of {needed} bytes does not fit in the {available}-byte reserved slot")]
    SignatureTooLarge { needed: usize, available: usize },

    #[error("signature placeholder missing or corrupted: {0}")]
    PlaceholderMissing(&'static str),

    #[error("font has no usable cmap table")]
    FontMissingCmap,

    #[error("font is not an OpenType/TrueType outline font")]
    FontNotOpenType,

    #[error("field {0:?} not found in AcroForm")]
    FieldNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PdfCraftError>;
