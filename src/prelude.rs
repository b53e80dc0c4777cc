//! # cilfront Prelude
//!
//! This module re-exports the types most programs driving the front end need: the
//! program model and its builder, the decoder, the plug manager, the scanner with its
//! code generator interface, and the layout engine.
//!
//! ```rust
//! use cilfront::prelude::*;
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilfront operations
pub use crate::Error;

/// The result type used throughout cilfront
pub use crate::Result;

/// Bounds checked reader over raw bytes
pub use crate::Parser;

// ================================================================================================
// Program Model
// ================================================================================================

/// Types, fields, modules and the registry owning them
pub use crate::metadata::typesystem::{
    CilField, CilFlavor, CilModule, CilType, CilTypeRc, CilTypeRef, FieldRc, GenericContext,
    ModuleRc, ProgramItem, TypeLayout, TypeRegistry,
};

/// Declarative program construction
pub use crate::metadata::typesystem::{MethodBuilder, ProgramBuilder, TypeBuilder};

/// Methods, bodies and exception regions
pub use crate::metadata::method::{
    ExceptionHandler, ExceptionHandlerFlags, Method, MethodBody, MethodRc, Param,
};

/// Annotations steering plugs, inlining and layout
pub use crate::metadata::annotations::{
    Annotation, PlugAnnotation, PlugFieldAnnotation, PlugMethodAnnotation,
};

/// Metadata tokens
pub use crate::metadata::token::Token;

/// Non-fatal findings
pub use crate::metadata::diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics,
};

// ================================================================================================
// Decoding
// ================================================================================================

/// Opcode catalog and decoded instructions
pub use crate::disassembler::{
    decode_method, FlowType, Instruction, MethodDecoder, OpCode, Operand, OperandType,
    StackEffect, TokenOperand,
};

// ================================================================================================
// Plugs
// ================================================================================================

/// Plug discovery and resolution
pub use crate::plugs::{FieldPlugs, PlugIndex, PlugKind, PlugManager};

// ================================================================================================
// Scanning
// ================================================================================================

/// The scan driver and its configuration
pub use crate::scanner::{ScanState, Scanner, ScannerConfig};

/// Code generator interface and compiled method records
pub use crate::scanner::{
    CodeGenerator, CompiledMethod, Emission, MethodKind, RecordingGenerator, UidLookup,
};

// ================================================================================================
// Layout
// ================================================================================================

/// Field tables and sizes
pub use crate::layout::{DebugSink, FieldInfo, LayoutEngine, TargetConfig};
