//! # Encoding Primitives
//!
//! Low-level integer encodings shared by the block codecs.
//!
//! - [`varbyte`]: LEB128-style variable-length u32 encoding used for the
//!   delta-coded key block bodies

pub mod varbyte;

pub use varbyte::{decode_varbyte, encode_varbyte, varbyte_len};
