//! Byte-level access to method bodies.
//!
//! - [`crate::file::io`] - Generic little-endian reads of primitive values
//! - [`crate::file::parser::Parser`] - A cursor used by the instruction decoder

pub mod io;
pub mod parser;
