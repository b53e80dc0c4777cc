//! CIL bytecode decoding.
//!
//! This module turns method bodies into typed instruction sequences the scanner and a
//! code generator can work with. It contains the full opcode catalog of the common
//! intermediate language, the operand decoder, the evaluation stack table and the
//! replacement bodies of a handful of runtime intrinsics.
//!
//! # Key Types
//! - [`OpCode`] - One entry of the opcode catalog
//! - [`Instruction`] - A decoded instruction with resolved operand
//! - [`Operand`] - Instruction operands (immediates, members, branch targets)
//! - [`StackEffect`] - Values an instruction pops and pushes
//! - [`MethodDecoder`] - Decodes whole method bodies against a type registry
//!
//! # Decoding rules
//! - Shortcut opcodes (`ldarg.0`, `ldc.i4.s`, `br.s`, ...) are reported in their general
//!   form; the encoded opcode is kept in [`Instruction::encoded`].
//! - Branch targets are absolute offsets inside the body. A target outside the body is
//!   [`crate::Error::BranchOutOfRange`].
//! - Metadata tokens are resolved under the generic context of the decoded method.
//! - Each instruction carries the index of the innermost exception region enclosing it.
//!
//! # Example
//! ```rust
//! use cilfront::disassembler::{OpCode, OperandType};
//!
//! assert_eq!(OpCode::from_primary(0x2A), Some(OpCode::Ret));
//! assert_eq!(OpCode::BrS.general_form(), OpCode::Br);
//! assert_eq!(OpCode::Br.operand_type(), OperandType::Branch);
//! ```

mod decoder;
mod instruction;
mod intrinsics;
mod opcodes;
mod stack;

pub use decoder::{decode_method, decode_opcode, enclosing_region, MethodDecoder};
pub use instruction::{Instruction, Operand, StackEffect, TokenOperand};
pub use intrinsics::{ARRAY_POOL, BY_REFERENCE, RUNTIME_HELPERS, UNSAFE_FACADE, UNSAFE_IMPLEMENTATION};
pub use opcodes::{FlowType, OpCode, OperandType, ESCAPE_BYTE, OPCODE_COUNT};
