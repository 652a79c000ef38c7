//! TrueType parsing, subsetting, embedding, and the process-wide font registry.

pub mod embed;
pub mod registry;
pub mod subset;
pub mod truetype;

pub use truetype::TrueTypeFont;
