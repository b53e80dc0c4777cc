//! Reachability scanning.
//!
//! The scanner computes the closed set of types, methods and fields a program needs,
//! starting from its entry point (or a boot list), and hands that set to a
//! [`CodeGenerator`]. Methods with a plug are never decoded: the plug is scanned and
//! emitted instead, and the original is emitted as a forward to it.
//!
//! # Key Types
//! - [`Scanner`] - The driver
//! - [`ScannerConfig`] - Plug modules, explicit runtime entries, array helper
//! - [`WorkQueue`] - The item set and its FIFO worklist
//! - [`UidTable`] - Method and type identities shared along override chains
//! - [`CompiledMethod`] - What the code generator receives per method
//! - [`CodeGenerator`] / [`RecordingGenerator`] - The emission interface and a recorder
//!
//! # What gets queued
//! | Item | Queued references |
//! |------|-------------------|
//! | Method | parameter types, declaring type, return type, plug, call targets, type and field operands |
//! | Type | base type, static constructor, array helpers, instance field types, interfaces |
//! | Field | nothing |
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use cilfront::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let app = ProgramBuilder::new(&registry, "App");
//! let program = app.class("App", "Program").build()?;
//! let main = app.method(&program, "Main").static_method().il(vec![0x2A]).build()?;
//!
//! let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
//! let mut generator = RecordingGenerator::new();
//! scanner.execute(&main, &mut generator)?;
//!
//! assert_eq!(generator.compiled_methods(), vec![main.full_name()]);
//! assert_eq!(scanner.counters().pushes, scanner.items().len());
//! # Ok::<(), cilfront::Error>(())
//! ```

mod config;
mod driver;
mod emit;
mod methodinfo;
mod queue;
mod uid;

pub use config::{ScannerConfig, DEFAULT_ARRAY_HELPER};
pub use driver::{ScanState, Scanner};
pub use emit::{CodeGenerator, Emission, RecordingGenerator};
pub use methodinfo::{CompiledMethod, MethodKind, PLUG_LABEL_PREFIX};
pub use queue::{QueueCounters, QueueItem, QueueReason, WorkQueue};
pub use uid::{UidLookup, UidResolver, UidTable};
