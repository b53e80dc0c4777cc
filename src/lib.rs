// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # cilfront
//!
//! The front end of an ahead-of-time compiler for CIL (Common Intermediate Language)
//! programs targeting freestanding machines. Given a program held in a
//! [`metadata::typesystem::TypeRegistry`], `cilfront` computes the minimal closed set of
//! types, methods and fields that must be code generated, replaces methods that depend on
//! host services with target specific substitutes ("plugs"), and computes the memory
//! layout of every type the code generator lays out.
//!
//! ## Features
//!
//! - **Bytecode decoding** - Full ECMA-335 opcode catalog, shortcut expansion, resolved
//!   operands, branch validation and exception region tagging
//! - **Plugs** - Exact, inheritable and generic substitutes with signature matching
//! - **Reachability** - A worklist closure from entry points with deterministic UIDs
//! - **Layout** - Reference and value type field tables for sequential, auto and explicit
//!   layouts
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cilfront::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let app = ProgramBuilder::new(&registry, "App");
//! let program = app.class("App", "Program").build()?;
//! let main = app
//!     .method(&program, "Main")
//!     .static_method()
//!     .il(vec![0x2A]) // ret
//!     .build()?;
//!
//! let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
//! let mut generator = RecordingGenerator::default();
//! scanner.execute(&main, &mut generator)?;
//!
//! assert!(scanner.contains(&ProgramItem::Method(main.clone())));
//! assert!(scanner.contains(&ProgramItem::Type(program.clone())));
//! # Ok::<(), cilfront::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`layout`] - Field tables, offsets and sizes; a leaf with no dependency on the others
//! - [`disassembler`] - Decodes method bodies into typed instruction sequences
//! - [`plugs`] - Indexes substitute types and resolves substitutes for methods
//! - [`scanner`] - Drives the closure and hands the result to a [`scanner::CodeGenerator`]
//! - [`metadata`] - The in-memory program model the other modules query
//!
//! ## Logging
//!
//! All modules log through the [`tracing`] facade. The library never installs a
//! subscriber.

#[macro_use]
pub(crate) mod error;

pub mod disassembler;
pub mod file;
pub mod layout;
pub mod metadata;
pub mod plugs;
pub mod prelude;
pub mod scanner;

#[cfg(test)]
pub(crate) mod test;

/// The error type of this crate
pub use error::Error;

/// `cilfront` Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Bounds checked little endian reader over a byte slice
pub use file::parser::Parser;
