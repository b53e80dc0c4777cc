//! Static stack shapes of decoded instructions.
//!
//! The pop and push counts of an instruction follow from its opcode and operand alone.
//! Pushed types are filled in where the opcode determines them; no dataflow runs here, so
//! `dup` and the arithmetic opcodes push values of unknown type.

use crate::{
    disassembler::{Instruction, OpCode, Operand, StackEffect, TokenOperand},
    metadata::{
        method::Method,
        typesystem::{CilTypeRc, TypeRegistry},
    },
};

/// Computes stack effects for the instructions of one method.
pub(crate) struct StackShapes<'a> {
    registry: &'a TypeRegistry,
    method: &'a Method,
    locals: Vec<CilTypeRc>,
}

impl<'a> StackShapes<'a> {
    pub(crate) fn new(registry: &'a TypeRegistry, method: &'a Method) -> Self {
        let locals = method
            .body()
            .map(|body| body.locals.iter().filter_map(|l| l.upgrade()).collect())
            .unwrap_or_default();
        StackShapes {
            registry,
            method,
            locals,
        }
    }

    fn known(&self, name: &str) -> Option<CilTypeRc> {
        self.registry.find(name)
    }

    fn arg_type(&self, index: u16) -> Option<CilTypeRc> {
        let index = usize::from(index);
        if self.method.is_static() {
            return self.method.params.get(index)?.param_type();
        }
        if index == 0 {
            let declaring = self.method.declaring_type()?;
            if declaring.is_value_type() {
                return Some(self.registry.make_by_ref(&declaring));
            }
            return Some(declaring);
        }
        self.method.params.get(index - 1)?.param_type()
    }

    fn local_type(&self, index: u16) -> Option<CilTypeRc> {
        self.locals.get(usize::from(index)).cloned()
    }

    fn by_ref(&self, ty: Option<CilTypeRc>) -> Option<CilTypeRc> {
        ty.map(|t| self.registry.make_by_ref(&t))
    }

    /// The stack effect of `instruction`
    pub(crate) fn effect(&self, instruction: &Instruction) -> StackEffect {
        let operand = &instruction.operand;
        let var = match operand {
            Operand::Var(index) => Some(*index),
            _ => None,
        };
        let type_operand = match operand {
            Operand::Type(ty) => Some(ty.clone()),
            _ => None,
        };
        let field_type = match operand {
            Operand::Field(field) => field.field_type(),
            _ => None,
        };

        let push = |ty: Option<CilTypeRc>| StackEffect::new(0, vec![ty]);
        let unary = |ty: Option<CilTypeRc>| StackEffect::new(1, vec![ty]);
        let binary = |ty: Option<CilTypeRc>| StackEffect::new(2, vec![ty]);
        let consume = |pops: usize| StackEffect::new(pops, Vec::new());

        match instruction.opcode.general_form() {
            OpCode::Nop
            | OpCode::Break
            | OpCode::Jmp
            | OpCode::Br
            | OpCode::Leave
            | OpCode::Endfinally
            | OpCode::Rethrow
            | OpCode::Unaligned
            | OpCode::Volatile
            | OpCode::Tail
            | OpCode::Constrained
            | OpCode::Readonly
            | OpCode::No => consume(0),

            OpCode::Ldarg => push(var.and_then(|v| self.arg_type(v))),
            OpCode::Ldarga => push(self.by_ref(var.and_then(|v| self.arg_type(v)))),
            OpCode::Ldloc => push(var.and_then(|v| self.local_type(v))),
            OpCode::Ldloca => push(self.by_ref(var.and_then(|v| self.local_type(v)))),
            OpCode::Starg | OpCode::Stloc | OpCode::Pop => consume(1),

            OpCode::Ldnull => push(self.known("System.Object")),
            OpCode::LdcI4 => push(self.known("System.Int32")),
            OpCode::LdcI8 => push(self.known("System.Int64")),
            OpCode::LdcR4 => push(self.known("System.Single")),
            OpCode::LdcR8 => push(self.known("System.Double")),
            OpCode::Ldstr => push(self.known("System.String")),
            OpCode::Dup => StackEffect::new(1, vec![None, None]),

            OpCode::Call | OpCode::Callvirt => match operand {
                Operand::Method { method, .. } => {
                    let this = usize::from(!method.is_static());
                    let pushes = if method.returns_value() {
                        vec![method.return_type()]
                    } else {
                        Vec::new()
                    };
                    StackEffect::new(method.params.len() + this, pushes)
                }
                _ => consume(0),
            },
            OpCode::Newobj => match operand {
                Operand::Method { method, .. } => {
                    StackEffect::new(method.params.len(), vec![method.declaring_type()])
                }
                _ => push(None),
            },
            OpCode::Calli => match operand {
                Operand::Signature(site) => {
                    let pushes = if site.returns_value() {
                        vec![site.return_type.as_ref().and_then(|t| t.upgrade())]
                    } else {
                        Vec::new()
                    };
                    StackEffect::new(site.param_count + usize::from(site.has_this) + 1, pushes)
                }
                _ => consume(1),
            },
            OpCode::Ret => consume(usize::from(self.method.returns_value())),

            OpCode::Brfalse | OpCode::Brtrue | OpCode::Switch => consume(1),
            OpCode::Beq
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::BneUn
            | OpCode::BgeUn
            | OpCode::BgtUn
            | OpCode::BleUn
            | OpCode::BltUn => consume(2),

            OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4 => unary(self.known("System.Int32")),
            OpCode::LdindI8 => unary(self.known("System.Int64")),
            OpCode::LdindI => unary(self.known("System.IntPtr")),
            OpCode::LdindR4 => unary(self.known("System.Single")),
            OpCode::LdindR8 => unary(self.known("System.Double")),
            OpCode::LdindRef => unary(self.known("System.Object")),
            OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindI => consume(2),

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::DivUn
            | OpCode::Rem
            | OpCode::RemUn
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::ShrUn
            | OpCode::AddOvf
            | OpCode::AddOvfUn
            | OpCode::MulOvf
            | OpCode::MulOvfUn
            | OpCode::SubOvf
            | OpCode::SubOvfUn => binary(None),
            OpCode::Neg | OpCode::Not | OpCode::Ckfinite => unary(None),
            OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn => {
                binary(self.known("System.Int32"))
            }

            OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvU1
            | OpCode::ConvU2
            | OpCode::ConvU4
            | OpCode::ConvOvfI1
            | OpCode::ConvOvfU1
            | OpCode::ConvOvfI2
            | OpCode::ConvOvfU2
            | OpCode::ConvOvfI4
            | OpCode::ConvOvfU4
            | OpCode::ConvOvfI1Un
            | OpCode::ConvOvfI2Un
            | OpCode::ConvOvfI4Un
            | OpCode::ConvOvfU1Un
            | OpCode::ConvOvfU2Un
            | OpCode::ConvOvfU4Un => unary(self.known("System.Int32")),
            OpCode::ConvI8 | OpCode::ConvOvfI8 | OpCode::ConvOvfI8Un => {
                unary(self.known("System.Int64"))
            }
            OpCode::ConvU8 | OpCode::ConvOvfU8 | OpCode::ConvOvfU8Un => {
                unary(self.known("System.UInt64"))
            }
            OpCode::ConvR4 => unary(self.known("System.Single")),
            OpCode::ConvR8 | OpCode::ConvRUn => unary(self.known("System.Double")),
            OpCode::ConvI | OpCode::ConvOvfI | OpCode::ConvOvfIUn => {
                unary(self.known("System.IntPtr"))
            }
            OpCode::ConvU | OpCode::ConvOvfU | OpCode::ConvOvfUUn => {
                unary(self.known("System.UIntPtr"))
            }

            OpCode::Cpobj | OpCode::Stobj => consume(2),
            OpCode::Ldobj | OpCode::Castclass | OpCode::Isinst | OpCode::UnboxAny => {
                unary(type_operand)
            }
            OpCode::Unbox | OpCode::Refanyval => unary(self.by_ref(type_operand)),
            OpCode::Box => unary(self.known("System.Object")),
            OpCode::Throw | OpCode::Endfilter | OpCode::Initobj => consume(1),

            OpCode::Ldfld => unary(field_type),
            OpCode::Ldflda => unary(self.by_ref(field_type)),
            OpCode::Stfld => consume(2),
            OpCode::Ldsfld => push(field_type),
            OpCode::Ldsflda => push(self.by_ref(field_type)),
            OpCode::Stsfld => consume(1),

            OpCode::Newarr => unary(type_operand.map(|t| self.registry.make_sz_array(&t))),
            OpCode::Ldlen => unary(self.known("System.UIntPtr")),
            OpCode::Ldelema => binary(self.by_ref(type_operand)),
            OpCode::Ldelem => binary(type_operand),
            OpCode::LdelemI1
            | OpCode::LdelemU1
            | OpCode::LdelemI2
            | OpCode::LdelemU2
            | OpCode::LdelemI4
            | OpCode::LdelemU4 => binary(self.known("System.Int32")),
            OpCode::LdelemI8 => binary(self.known("System.Int64")),
            OpCode::LdelemI => binary(self.known("System.IntPtr")),
            OpCode::LdelemR4 => binary(self.known("System.Single")),
            OpCode::LdelemR8 => binary(self.known("System.Double")),
            OpCode::LdelemRef => binary(self.known("System.Object")),
            OpCode::Stelem
            | OpCode::StelemI
            | OpCode::StelemI1
            | OpCode::StelemI2
            | OpCode::StelemI4
            | OpCode::StelemI8
            | OpCode::StelemR4
            | OpCode::StelemR8
            | OpCode::StelemRef
            | OpCode::Cpblk
            | OpCode::Initblk => consume(3),

            OpCode::Mkrefany => unary(self.known("System.TypedReference")),
            OpCode::Refanytype => unary(self.known("System.RuntimeTypeHandle")),
            OpCode::Ldtoken => push(match operand {
                Operand::Token(TokenOperand::Type(_)) => self.known("System.RuntimeTypeHandle"),
                Operand::Token(TokenOperand::Method(_)) => {
                    self.known("System.RuntimeMethodHandle")
                }
                Operand::Token(TokenOperand::Field(_)) => self.known("System.RuntimeFieldHandle"),
                _ => None,
            }),
            OpCode::Arglist => push(self.known("System.RuntimeArgumentHandle")),
            OpCode::Ldftn => push(self.known("System.IntPtr")),
            OpCode::Ldvirtftn => unary(self.known("System.IntPtr")),
            OpCode::Localloc => unary(self.known("System.IntPtr")),
            OpCode::Sizeof => push(self.known("System.UInt32")),

            // Shortcut forms never reach this point; general_form maps them above
            _ => consume(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        disassembler::{stack::StackShapes, Instruction, OpCode, Operand},
        metadata::typesystem::{ProgramBuilder, TypeRegistry},
    };

    #[test]
    fn constants_and_strings() {
        let registry = Arc::new(TypeRegistry::new());
        let program = ProgramBuilder::new(&registry, "App");
        let ty = program.class("App", "Program").build().unwrap();
        let main = program.method(&ty, "Main").static_method().build().unwrap();
        let shapes = StackShapes::new(&registry, &main);

        let ldc = Instruction::new(OpCode::LdcI4, 0, 5, Operand::Int(7));
        let effect = shapes.effect(&ldc);
        assert_eq!((effect.pops, effect.pushes), (0, 1));
        assert_eq!(effect.push_types[0].as_ref().unwrap().full_name(), "System.Int32");

        let ldstr = Instruction::new(OpCode::Ldstr, 0, 5, Operand::String("x".into()));
        let effect = shapes.effect(&ldstr);
        assert_eq!(effect.push_types[0].as_ref().unwrap().full_name(), "System.String");

        let unaligned = Instruction::new(OpCode::Unaligned, 0, 3, Operand::Byte(1));
        assert_eq!(shapes.effect(&unaligned).net(), 0);
    }

    #[test]
    fn calls_and_arguments() {
        let registry = Arc::new(TypeRegistry::new());
        let program = ProgramBuilder::new(&registry, "App");
        let int32 = program.primitive("Int32").unwrap();
        let point = program.value_type("App", "Point").build().unwrap();
        let add = program
            .method(&point, "Add")
            .param("dx", &int32)
            .param("dy", &int32)
            .returns(&int32)
            .build()
            .unwrap();
        let shapes = StackShapes::new(&registry, &add);

        let call = Instruction::new(OpCode::Call, 0, 5, Operand::method(add.clone()));
        let effect = shapes.effect(&call);
        assert_eq!((effect.pops, effect.pushes), (3, 1));

        let this = Instruction::new(OpCode::Ldarg0, 0, 1, Operand::Var(0));
        let effect = shapes.effect(&this);
        assert_eq!(effect.push_types[0].as_ref().unwrap().full_name(), "&App.Point");

        let dy = Instruction::new(OpCode::Ldarg2, 0, 1, Operand::Var(2));
        let effect = shapes.effect(&dy);
        assert_eq!(effect.push_types[0].as_ref().unwrap().full_name(), "System.Int32");

        let ret = Instruction::new(OpCode::Ret, 0, 1, Operand::None);
        assert_eq!(shapes.effect(&ret).pops, 1);
    }
}
