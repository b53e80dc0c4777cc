//! Decoded instructions and their operands.
//!
//! An [`Instruction`] is produced once per decode of a method body. Operands are fully
//! resolved: metadata tokens have already been turned into the types, methods and fields
//! they denote under the generic context of the decoded method, and branch displacements
//! into absolute offsets. The only field the scanner changes after decoding is the UID
//! stamped on call targets.

use std::fmt;

use crate::{
    disassembler::{FlowType, OpCode},
    metadata::{
        method::MethodRc,
        typesystem::{CallSite, CilTypeRc, FieldRc},
    },
};

/// The resolution of an `ldtoken` operand.
#[derive(Debug, Clone)]
pub enum TokenOperand {
    /// The token denotes a type
    Type(CilTypeRc),
    /// The token denotes a method
    Method(MethodRc),
    /// The token denotes a field
    Field(FieldRc),
}

impl TokenOperand {
    fn key(&self) -> String {
        match self {
            TokenOperand::Type(ty) => ty.key(),
            TokenOperand::Method(method) => method.key(),
            TokenOperand::Field(field) => field.key(),
        }
    }
}

/// The operand of an instruction.
#[derive(Debug, Clone)]
pub enum Operand {
    /// No operand
    None,
    /// A 32-bit integer (`ldc.i4` and its shortcuts)
    Int(i32),
    /// A 64-bit integer
    Int64(i64),
    /// A 32-bit float
    Single(f32),
    /// A 64-bit float
    Double(f64),
    /// A user string
    String(String),
    /// Absolute branch target
    Branch(usize),
    /// Absolute targets of a jump table
    Switch(Vec<usize>),
    /// Argument or local index
    Var(u16),
    /// Alignment or check-suppression byte of a prefix
    Byte(u8),
    /// A called or referenced method
    Method {
        /// The method, canonicalized by the scanner after decoding
        method: MethodRc,
        /// UID stamped by the scanner
        uid: Option<u32>,
    },
    /// A field
    Field(FieldRc),
    /// A type
    Type(CilTypeRc),
    /// The resolution of an `ldtoken` token
    Token(TokenOperand),
    /// The call site signature of `calli`
    Signature(CallSite),
}

impl Operand {
    /// A method operand without UID
    #[must_use]
    pub fn method(method: MethodRc) -> Self {
        Operand::Method { method, uid: None }
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::None, Operand::None) => true,
            (Operand::Int(a), Operand::Int(b)) => a == b,
            (Operand::Int64(a), Operand::Int64(b)) => a == b,
            (Operand::Single(a), Operand::Single(b)) => a.to_bits() == b.to_bits(),
            (Operand::Double(a), Operand::Double(b)) => a.to_bits() == b.to_bits(),
            (Operand::String(a), Operand::String(b)) => a == b,
            (Operand::Branch(a), Operand::Branch(b)) => a == b,
            (Operand::Switch(a), Operand::Switch(b)) => a == b,
            (Operand::Var(a), Operand::Var(b)) => a == b,
            (Operand::Byte(a), Operand::Byte(b)) => a == b,
            (
                Operand::Method { method: a, uid: ua },
                Operand::Method { method: b, uid: ub },
            ) => ua == ub && a.key() == b.key(),
            (Operand::Field(a), Operand::Field(b)) => a.key() == b.key(),
            (Operand::Type(a), Operand::Type(b)) => a.key() == b.key(),
            (Operand::Token(a), Operand::Token(b)) => a.key() == b.key(),
            (Operand::Signature(a), Operand::Signature(b)) => {
                a.param_count == b.param_count
                    && a.has_this == b.has_this
                    && a.returns_value() == b.returns_value()
            }
            _ => false,
        }
    }
}

/// Stack operands an instruction consumes and produces.
///
/// Types are the evaluation stack types where the opcode alone determines them; an
/// entry is `None` where only dataflow could tell (`dup`, arithmetic).
#[derive(Debug, Clone, Default)]
pub struct StackEffect {
    /// Number of values popped
    pub pops: usize,
    /// Number of values pushed
    pub pushes: usize,
    /// Types of the popped values, only known for synthesized bodies
    pub pop_types: Vec<Option<CilTypeRc>>,
    /// Types of the pushed values, one entry per pushed value
    pub push_types: Vec<Option<CilTypeRc>>,
}

impl StackEffect {
    /// Pops `pops` values and pushes `push_types`
    #[must_use]
    pub fn new(pops: usize, push_types: Vec<Option<CilTypeRc>>) -> Self {
        StackEffect {
            pops,
            pushes: push_types.len(),
            pop_types: Vec::new(),
            push_types,
        }
    }

    /// Net change of the stack depth
    #[must_use]
    pub fn net(&self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

fn same_types(a: &[Option<CilTypeRc>], b: &[Option<CilTypeRc>]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(l, r)| match (l, r) {
            (Some(l), Some(r)) => l.is_same(r),
            (None, None) => true,
            _ => false,
        })
}

impl PartialEq for StackEffect {
    fn eq(&self, other: &Self) -> bool {
        self.pops == other.pops
            && self.pushes == other.pushes
            && same_types(&self.pop_types, &other.pop_types)
            && same_types(&self.push_types, &other.push_types)
    }
}

/// One decoded instruction of a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Opcode after shortcut expansion
    pub opcode: OpCode,
    /// Opcode as encoded in the body
    pub encoded: OpCode,
    /// Offset of the first byte
    pub offset: usize,
    /// Offset of the following instruction
    pub next_offset: usize,
    /// Resolved operand
    pub operand: Operand,
    /// Index of the innermost exception region enclosing the instruction
    pub exception_region: Option<usize>,
    /// Stack operands consumed and produced
    pub stack: StackEffect,
}

impl Instruction {
    pub(crate) fn new(opcode: OpCode, offset: usize, next_offset: usize, operand: Operand) -> Self {
        Instruction {
            opcode: opcode.general_form(),
            encoded: opcode,
            offset,
            next_offset,
            operand,
            exception_region: None,
            stack: StackEffect::default(),
        }
    }

    /// Mnemonic of the expanded opcode
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.opcode.name()
    }

    /// Control flow behaviour
    #[must_use]
    pub fn flow(&self) -> FlowType {
        self.opcode.flow()
    }

    /// Encoded length in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.next_offset - self.offset
    }

    /// Absolute targets of a branch, leave or switch
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// The method operand, if any
    #[must_use]
    pub fn method(&self) -> Option<&MethodRc> {
        match &self.operand {
            Operand::Method { method, .. } | Operand::Token(TokenOperand::Method(method)) => {
                Some(method)
            }
            _ => None,
        }
    }

    /// The field operand, if any
    #[must_use]
    pub fn field(&self) -> Option<&FieldRc> {
        match &self.operand {
            Operand::Field(field) | Operand::Token(TokenOperand::Field(field)) => Some(field),
            _ => None,
        }
    }

    /// The type operand, if any
    #[must_use]
    pub fn type_operand(&self) -> Option<&CilTypeRc> {
        match &self.operand {
            Operand::Type(ty) | Operand::Token(TokenOperand::Type(ty)) => Some(ty),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.offset, self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Single(value) => write!(f, " {value}"),
            Operand::Double(value) => write!(f, " {value}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Branch(target) => write!(f, " IL_{target:04X}"),
            Operand::Switch(targets) => {
                let targets: Vec<String> =
                    targets.iter().map(|t| format!("IL_{t:04X}")).collect();
                write!(f, " ({})", targets.join(", "))
            }
            Operand::Var(index) => write!(f, " {index}"),
            Operand::Byte(value) => write!(f, " {value}"),
            Operand::Method { method, .. } => write!(f, " {}", method.full_name()),
            Operand::Field(field) => write!(f, " {}", field.full_name()),
            Operand::Type(ty) => write!(f, " {}", ty.full_name()),
            Operand::Token(token) => match token {
                TokenOperand::Type(ty) => write!(f, " {}", ty.full_name()),
                TokenOperand::Method(method) => write!(f, " {}", method.full_name()),
                TokenOperand::Field(field) => write!(f, " {}", field.full_name()),
            },
            Operand::Signature(site) => write!(
                f,
                " ({} params{})",
                site.param_count,
                if site.has_this { ", instance" } else { "" }
            ),
        }
    }
}
