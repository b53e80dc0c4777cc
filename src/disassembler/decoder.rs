//! Method body decoding.
//!
//! This module turns the instruction bytes of a method into a sequence of
//! [`Instruction`]s. Shortcut opcodes are expanded into their general forms, metadata
//! tokens are resolved under the generic context of the method, branch displacements
//! become absolute offsets that are checked against the body length, and every
//! instruction is tagged with the innermost exception region that encloses it.
//!
//! # Example: Decoding a Single Opcode
//!
//! ```rust
//! use cilfront::{Parser, disassembler::{decode_opcode, OpCode}};
//! let code = [0xFE, 0x01]; // ceq
//! let mut parser = Parser::new(&code);
//! assert_eq!(decode_opcode(&mut parser)?, OpCode::Ceq);
//! # Ok::<(), cilfront::Error>(())
//! ```
//!
//! # Example: Decoding a Method
//!
//! ```rust
//! use std::sync::Arc;
//! use cilfront::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let app = ProgramBuilder::new(&registry, "App");
//! let program = app.class("App", "Program").build()?;
//! let answer = app
//!     .method(&program, "Answer")
//!     .static_method()
//!     .returns(&app.primitive("Int32")?)
//!     .il(vec![0x1F, 0x2A, 0x2A]) // ldc.i4.s 42; ret
//!     .build()?;
//!
//! let instructions = MethodDecoder::new(registry.clone()).decode(&answer)?;
//! assert_eq!(instructions[0].opcode, OpCode::LdcI4);
//! assert_eq!(instructions[0].operand, Operand::Int(42));
//! # Ok::<(), cilfront::Error>(())
//! ```

use std::sync::Arc;

use tracing::trace;

use crate::{
    disassembler::{
        intrinsics::{intrinsic_body, IntrinsicBody},
        stack::StackShapes,
        Instruction, OpCode, Operand, OperandType, TokenOperand, ESCAPE_BYTE,
    },
    file::parser::Parser,
    metadata::{
        method::{ExceptionHandler, MethodRc},
        token::Token,
        typesystem::{CilModule, GenericContext, ResolvedToken, TypeRegistry},
    },
    Error, Result,
};

/// Read one opcode, following the `0xFE` escape into the secondary table.
///
/// # Errors
/// Returns [`Error::Malformed`] for unassigned opcodes and [`Error::OutOfBounds`] for a
/// truncated stream.
pub fn decode_opcode(parser: &mut Parser) -> Result<OpCode> {
    let first_byte = parser.read_le::<u8>()?;
    if first_byte == ESCAPE_BYTE {
        let second_byte = parser.read_le::<u8>()?;
        return OpCode::from_secondary(second_byte)
            .ok_or_else(|| malformed_error!("Invalid opcode: FE {:02X}", second_byte));
    }

    OpCode::from_primary(first_byte).ok_or_else(|| malformed_error!("Invalid opcode: {:X}", first_byte))
}

/// The innermost exception region enclosing `pos`, as an index into `handlers`.
///
/// A protected block or handler replaces the current candidate only if it starts later
/// and ends earlier; among filters the one starting last wins. Once a handler was
/// taken for its protected block its handler and filter ranges are not looked at.
#[must_use]
pub fn enclosing_region(handlers: &[ExceptionHandler], pos: usize) -> Option<usize> {
    let pos = u32::try_from(pos).unwrap_or(u32::MAX);
    let mut current: Option<usize> = None;

    for (index, handler) in handlers.iter().enumerate() {
        if handler.try_contains(pos) {
            match current.map(|c| &handlers[c]) {
                None => {
                    current = Some(index);
                    continue;
                }
                Some(cur)
                    if handler.try_offset > cur.try_offset && handler.try_end() < cur.try_end() =>
                {
                    current = Some(index);
                    continue;
                }
                _ => {}
            }
        }

        if handler.handler_offset > 0 && handler.handler_contains(pos) {
            match current.map(|c| &handlers[c]) {
                None => {
                    current = Some(index);
                    continue;
                }
                Some(cur)
                    if handler.handler_offset > cur.handler_offset
                        && handler.handler_end() < cur.handler_end() =>
                {
                    current = Some(index);
                    continue;
                }
                _ => {}
            }
        }

        if handler.is_filter() && handler.filter_offset > 0 && handler.filter_offset <= pos {
            match current.map(|c| &handlers[c]) {
                None => current = Some(index),
                Some(cur) if handler.filter_offset > cur.filter_offset => current = Some(index),
                _ => {}
            }
        }
    }

    current
}

/// Decodes method bodies against a [`TypeRegistry`].
#[derive(Clone)]
pub struct MethodDecoder {
    registry: Arc<TypeRegistry>,
}

impl MethodDecoder {
    /// Create a decoder resolving tokens through `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        MethodDecoder { registry }
    }

    /// The registry tokens are resolved against
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Decode the body of `method`.
    ///
    /// Methods without a body decode to an empty sequence. Intrinsic runtime methods
    /// decode to their replacement body.
    ///
    /// # Errors
    /// Returns an error for invalid opcodes, truncated operands, tokens that do not
    /// resolve, and branch targets outside the body.
    pub fn decode(&self, method: &MethodRc) -> Result<Vec<Instruction>> {
        let (body, module) = match intrinsic_body(&self.registry, method)? {
            Some(IntrinsicBody::Synthesized(code)) => return Ok(code),
            Some(IntrinsicBody::Redirect { body, module }) => (body, module),
            None => {
                let Some(body) = method.body() else {
                    return Ok(Vec::new());
                };
                let Some(module) = method.declaring_type().map(|t| t.module.clone()) else {
                    return Err(Error::NotSupported(format!(
                        "Dynamic method {} has a body but no module to resolve it in",
                        method.full_name()
                    )));
                };
                (body, module)
            }
        };

        trace!("Decoding {}", method.full_name());
        let mut decoder = Decoder {
            registry: &self.registry,
            module: &module,
            context: GenericContext::for_method(method),
            method,
            parser: Parser::new(&body.code),
        };
        let mut instructions = decoder.decode_all(&body.exception_handlers)?;

        let shapes = StackShapes::new(&self.registry, method);
        for instruction in &mut instructions {
            instruction.stack = shapes.effect(instruction);
        }
        Ok(instructions)
    }
}

/// Decode the body of `method` with a throwaway [`MethodDecoder`].
///
/// # Errors
/// See [`MethodDecoder::decode`].
pub fn decode_method(registry: &Arc<TypeRegistry>, method: &MethodRc) -> Result<Vec<Instruction>> {
    MethodDecoder::new(registry.clone()).decode(method)
}

struct Decoder<'a> {
    registry: &'a TypeRegistry,
    module: &'a CilModule,
    context: GenericContext,
    method: &'a MethodRc,
    parser: Parser<'a>,
}

impl Decoder<'_> {
    fn decode_all(&mut self, handlers: &[ExceptionHandler]) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();
        while self.parser.has_more_data() {
            let offset = self.parser.pos();
            let region = enclosing_region(handlers, offset);
            let mut instruction = self.decode_next()?;
            instruction.exception_region = region;
            instructions.push(instruction);
        }
        Ok(instructions)
    }

    fn check_branch(&self, offset: usize, target: i64) -> Result<usize> {
        match usize::try_from(target) {
            Ok(target) if target < self.parser.len() => Ok(target),
            _ => Err(Error::BranchOutOfRange {
                method: self.method.full_name().to_string(),
                offset,
                target,
            }),
        }
    }

    fn resolve(&self, token: u32) -> Result<ResolvedToken> {
        self.registry
            .resolve_token(self.module, Token::new(token), &self.context)
    }

    fn decode_next(&mut self) -> Result<Instruction> {
        let offset = self.parser.pos();
        let opcode = decode_opcode(&mut self.parser)?;

        let operand = match opcode.operand_type() {
            OperandType::None => match opcode.implicit_operand() {
                Some(value) if opcode.general_form() == OpCode::LdcI4 => Operand::Int(value),
                Some(value) => Operand::Var(value as u16),
                None => Operand::None,
            },
            OperandType::ShortBranch => {
                let delta = self.parser.read_le::<i8>()?;
                let target = self.parser.pos() as i64 + i64::from(delta);
                Operand::Branch(self.check_branch(offset, target)?)
            }
            OperandType::Branch => {
                let delta = self.parser.read_le::<i32>()?;
                let target = self.parser.pos() as i64 + i64::from(delta);
                Operand::Branch(self.check_branch(offset, target)?)
            }
            OperandType::ShortInt => Operand::Int(i32::from(self.parser.read_le::<i8>()?)),
            OperandType::Byte => Operand::Byte(self.parser.read_le::<u8>()?),
            OperandType::Int => Operand::Int(self.parser.read_le::<i32>()?),
            OperandType::Int64 => Operand::Int64(self.parser.read_le::<i64>()?),
            OperandType::ShortFloat => Operand::Single(self.parser.read_le::<f32>()?),
            OperandType::Float => Operand::Double(self.parser.read_le::<f64>()?),
            OperandType::ShortVar => Operand::Var(u16::from(self.parser.read_le::<u8>()?)),
            OperandType::Var => Operand::Var(self.parser.read_le::<u16>()?),
            OperandType::Switch => {
                let count = self.parser.read_le::<u32>()? as usize;
                let table_end = self.parser.pos() + count * 4;
                let mut targets = Vec::with_capacity(count.min(self.parser.remaining() / 4));
                for _ in 0..count {
                    let delta = self.parser.read_le::<i32>()?;
                    let target = table_end as i64 + i64::from(delta);
                    targets.push(self.check_branch(offset, target)?);
                }
                Operand::Switch(targets)
            }
            OperandType::Method => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::Method(method) => Operand::method(method),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
            OperandType::Field => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::Field(field) => Operand::Field(field),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
            OperandType::Type => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::Type(ty) => Operand::Type(ty),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
            OperandType::Token => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::Type(ty) => Operand::Token(TokenOperand::Type(ty)),
                    ResolvedToken::Method(method) => Operand::Token(TokenOperand::Method(method)),
                    ResolvedToken::Field(field) => Operand::Token(TokenOperand::Field(field)),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
            OperandType::String => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::String(value) => Operand::String(value),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
            OperandType::Signature => {
                let token = self.parser.read_le::<u32>()?;
                match self.resolve(token)? {
                    ResolvedToken::Signature(site) => Operand::Signature(site),
                    other => return Err(self.unexpected(opcode, token, &other)),
                }
            }
        };

        Ok(Instruction::new(opcode, offset, self.parser.pos(), operand))
    }

    fn unexpected(&self, opcode: OpCode, token: u32, found: &ResolvedToken) -> Error {
        let kind = match found {
            ResolvedToken::Type(_) => "type",
            ResolvedToken::Method(_) => "method",
            ResolvedToken::Field(_) => "field",
            ResolvedToken::String(_) => "string",
            ResolvedToken::Signature(_) => "signature",
        };
        malformed_error!(
            "Operand 0x{:08X} of {} in {} resolves to a {}",
            token,
            opcode,
            self.method.full_name(),
            kind
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        disassembler::{decode_method, decode_opcode, enclosing_region, OpCode, Operand},
        metadata::{
            method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
            typesystem::{ProgramBuilder, TypeRegistry},
        },
        Error, Parser,
    };

    fn program() -> (Arc<TypeRegistry>, ProgramBuilder) {
        let registry = Arc::new(TypeRegistry::new());
        let program = ProgramBuilder::new(&registry, "App");
        (registry, program)
    }

    #[test]
    fn opcode_lookup() {
        let mut parser = Parser::new(&[0x2A, 0xFE, 0x06, 0xFE, 0xFF, 0x24]);
        assert_eq!(decode_opcode(&mut parser).unwrap(), OpCode::Ret);
        assert_eq!(decode_opcode(&mut parser).unwrap(), OpCode::Ldftn);
        assert!(decode_opcode(&mut parser).is_err());
        assert!(decode_opcode(&mut parser).is_err());
    }

    #[test]
    fn shortcuts_are_expanded() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let int32 = program.primitive("Int32").unwrap();
        let method = program
            .method(&ty, "Run")
            .static_method()
            .param("a", &int32)
            .body(
                MethodBody::new(vec![0x02, 0x15, 0x1F, 0xF0, 0x0A, 0x06, 0x26, 0x26, 0x2A])
                    .with_locals(&[int32.clone()]),
            )
            .build()
            .unwrap();

        let code = decode_method(&registry, &method).unwrap();
        assert_eq!(code.len(), 8);
        assert_eq!(code[0].opcode, OpCode::Ldarg);
        assert_eq!(code[0].encoded, OpCode::Ldarg0);
        assert_eq!(code[0].operand, Operand::Var(0));
        assert_eq!(code[1].operand, Operand::Int(-1));
        assert_eq!(code[2].opcode, OpCode::LdcI4);
        assert_eq!(code[2].operand, Operand::Int(-16));
        assert_eq!(code[3].opcode, OpCode::Stloc);
        assert_eq!(code[4].opcode, OpCode::Ldloc);
        assert_eq!(code[4].stack.push_types[0].as_ref().unwrap().full_name(), "System.Int32");
        assert_eq!(code[2].offset, 2);
        assert_eq!(code[2].next_offset, 4);
    }

    #[test]
    fn branches_are_absolute_and_checked() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let ok = program
            .method(&ty, "Ok")
            .static_method()
            .il(vec![0x16, 0x2C, 0x01, 0x00, 0x2A])
            .build()
            .unwrap();
        let code = decode_method(&registry, &ok).unwrap();
        assert_eq!(code[1].opcode, OpCode::Brfalse);
        assert_eq!(code[1].branch_targets(), vec![4]);

        let past_end = program
            .method(&ty, "PastEnd")
            .static_method()
            .il(vec![0x2B, 0x01, 0x2A])
            .build()
            .unwrap();
        match decode_method(&registry, &past_end) {
            Err(Error::BranchOutOfRange { offset, target, .. }) => {
                assert_eq!((offset, target), (0, 3));
            }
            other => panic!("Expected BranchOutOfRange, got {other:?}"),
        }

        let before_start = program
            .method(&ty, "BeforeStart")
            .static_method()
            .il(vec![0x38, 0xFA, 0xFF, 0xFF, 0xFF, 0x2A])
            .build()
            .unwrap();
        assert!(matches!(
            decode_method(&registry, &before_start),
            Err(Error::BranchOutOfRange { target: -1, .. })
        ));
    }

    #[test]
    fn switch_targets() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let method = program
            .method(&ty, "Switch")
            .static_method()
            .il(vec![
                0x16, // ldc.i4.0
                0x45, 0x02, 0x00, 0x00, 0x00, // switch (2 targets)
                0x00, 0x00, 0x00, 0x00, // +0
                0x01, 0x00, 0x00, 0x00, // +1
                0x00, // nop
                0x2A, // ret
            ])
            .build()
            .unwrap();

        let code = decode_method(&registry, &method).unwrap();
        assert_eq!(code[1].operand, Operand::Switch(vec![14, 15]));
        assert_eq!(code[1].next_offset, 14);
    }

    #[test]
    fn tokens_resolve() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let int32 = program.primitive("Int32").unwrap();
        let counter = program.add_field(&ty, "counter", &int32, true);
        let callee = program.method(&ty, "Callee").static_method().build().unwrap();

        let mut code = vec![0x72];
        code.extend_from_slice(&program.string_token("hi").to_le_bytes());
        code.push(0x26);
        code.push(0x7E);
        code.extend_from_slice(&program.field_token(&counter).to_le_bytes());
        code.push(0x26);
        code.push(0x28);
        code.extend_from_slice(&program.method_token(&callee).to_le_bytes());
        code.push(0xD0);
        code.extend_from_slice(&program.type_token(&int32).to_le_bytes());
        code.push(0x26);
        code.push(0x2A);
        let method = program.method(&ty, "Main").static_method().il(code).build().unwrap();

        let decoded = decode_method(&registry, &method).unwrap();
        assert_eq!(decoded[0].operand, Operand::String("hi".to_string()));
        assert_eq!(decoded[2].field().unwrap().name, "counter");
        assert_eq!(decoded[4].method().unwrap().name, "Callee");
        assert_eq!(decoded[5].type_operand().unwrap().full_name(), "System.Int32");
    }

    #[test]
    fn wrong_token_kind_is_malformed() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let mut code = vec![0x28];
        code.extend_from_slice(&program.type_token(&ty).to_le_bytes());
        code.push(0x2A);
        let method = program.method(&ty, "Main").static_method().il(code).build().unwrap();

        assert!(matches!(
            decode_method(&registry, &method),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn exception_regions_prefer_narrowest() {
        let outer = ExceptionHandler::new(ExceptionHandlerFlags::FINALLY, 0, 20, 20, 4, 0);
        let inner = ExceptionHandler::new(ExceptionHandlerFlags::FINALLY, 4, 8, 12, 2, 0);
        let handlers = vec![outer, inner];

        assert_eq!(enclosing_region(&handlers, 0), Some(0));
        assert_eq!(enclosing_region(&handlers, 5), Some(1));
        assert_eq!(enclosing_region(&handlers, 14), Some(0));
        assert_eq!(enclosing_region(&handlers, 21), Some(0));
        assert_eq!(enclosing_region(&handlers, 30), None);

        let filter = ExceptionHandler::new(ExceptionHandlerFlags::FILTER, 0, 4, 8, 4, 4);
        assert_eq!(enclosing_region(&[filter], 5), Some(0));
    }

    #[test]
    fn bodiless_methods_decode_empty() {
        let (registry, program) = program();
        let ty = program.class("App", "Program").build().unwrap();
        let method = program.method(&ty, "Extern").static_method().build().unwrap();
        assert!(decode_method(&registry, &method).unwrap().is_empty());
    }
}
