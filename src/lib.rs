//! Byte-level PDF authoring: object graph assembly, TrueType subsetting,
//! standard-handler decryption, detached CMS signing, and content-level
//! redaction/form-filling.
//!
//! Three families of entry points live here. [`Generator::build`]
//! synthesizes a document from scratch out of [`model::Document`]. The
//! remaining four — [`sign::sign_in_place`], [`decrypt::decrypt`],
//! [`redact::redact`] and [`formfill::fill`] — each take an
//! already-assembled PDF byte stream and return a new one, built on the
//! shared parse/re-emit machinery in [`rebuild`].

pub mod decrypt;
pub mod draw;
pub mod emitter;
pub mod error;
pub mod font;
pub mod formfill;
pub mod generator;
pub mod lexer;
pub mod model;
pub mod page;
pub mod rebuild;
pub mod redact;
pub mod sign;
pub mod util;

pub use error::{PdfCraftError, Result};
pub use generator::Generator;
pub use model::Document;
