//! In-memory program metadata the front end operates on.
//!
//! The decoder, the plug index, the scanner and the layout engine never read a binary
//! themselves; they query the descriptors in this module. A [`typesystem::TypeRegistry`]
//! owns every type, field and method of a compilation run, and
//! [`typesystem::ProgramBuilder`] fills it declaratively.
//!
//! # Key Components
//!
//! - [`typesystem`] - Types, fields, modules, generic instantiation and name rendering
//! - [`method`] - Methods, parameters, bodies and exception regions
//! - [`annotations`] - Plug, inline and layout annotations
//! - [`token`] - Metadata tokens as they appear in instruction operands
//! - [`diagnostics`] - Non-fatal findings collected during a run
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilfront::metadata::typesystem::{ProgramBuilder, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let program = ProgramBuilder::new(&registry, "App");
//! let foo = program.class("App", "Foo").build()?;
//!
//! assert_eq!(foo.full_name(), "App.Foo");
//! assert_eq!(foo.base().unwrap().full_name(), "System.Object");
//! # Ok::<(), cilfront::Error>(())
//! ```

/// Custom annotations steering plugs, inlining and layout
pub mod annotations;
/// Non-fatal findings of a compilation run
pub mod diagnostics;
/// Methods, bodies and exception regions
pub mod method;
/// Metadata tokens
pub mod token;
/// Types, fields, modules and the registry that owns them
pub mod typesystem;
