//! Bodies of well-known runtime methods that cannot be decoded from their bytes.
//!
//! Some core library methods are implemented by the host runtime or the compiler that
//! produced the library: they carry no bytes, or bytes that only make sense to a JIT.
//! For these the decoder either reads another method's body instead, or uses a short
//! instruction sequence built here.

use std::sync::Arc;

use crate::{
    disassembler::{stack::StackShapes, Instruction, OpCode, Operand, StackEffect},
    layout,
    metadata::{
        method::{MethodBody, MethodRc},
        typesystem::{CilTypeRc, ModuleRc, TypeRegistry},
    },
    Error, Result,
};

/// Facade whose methods are implemented by [`UNSAFE_IMPLEMENTATION`]
pub const UNSAFE_FACADE: &str = "Internal.Runtime.CompilerServices.Unsafe";
/// Type providing the real bodies of the unsafe helper facade
pub const UNSAFE_IMPLEMENTATION: &str = "System.Runtime.CompilerServices.Unsafe";
/// Byref wrapper whose constructor and getter are compiler intrinsics
pub const BY_REFERENCE: &str = "System.ByReference`1";
/// Generic array pool whose static constructor is skipped
pub const ARRAY_POOL: &str = "System.Buffers.ArrayPool`1";
/// Declaring type of `IsBitwiseEquatable`
pub const RUNTIME_HELPERS: &str = "System.Runtime.CompilerServices.RuntimeHelpers";

/// What to decode instead of a method's own body.
pub(crate) enum IntrinsicBody {
    /// Decode `body`, resolving its tokens in `module`
    Redirect {
        /// The replacement body
        body: Arc<MethodBody>,
        /// Module the replacement body's tokens belong to
        module: ModuleRc,
    },
    /// Use these instructions as the decoded body
    Synthesized(Vec<Instruction>),
}

/// The replacement body of `method`, if it is one of the intrinsics.
///
/// # Errors
/// Returns an error if an intrinsic refers to runtime types or members that are not
/// present in the registry, or for `ByReference` members that have no replacement.
pub(crate) fn intrinsic_body(
    registry: &TypeRegistry,
    method: &MethodRc,
) -> Result<Option<IntrinsicBody>> {
    let Some(declaring) = method.declaring_type() else {
        return Ok(None);
    };

    if declaring.full_name() == UNSAFE_FACADE {
        return unsafe_redirect(registry, method);
    }

    let definition_name = declaring
        .generic_definition()
        .map(|def| def.full_name().to_string());

    if definition_name.as_deref() == Some(BY_REFERENCE) {
        return by_reference(registry, method, &declaring).map(Some);
    }

    if declaring.name == "RuntimeType" && method.name == ".ctor" {
        return Ok(Some(single_return(registry, method)));
    }

    if declaring.name == "TypeImpl" && method.name == "CreateRuntimeTypeHandle" {
        return create_runtime_type_handle(registry).map(Some);
    }

    if definition_name.as_deref() == Some(ARRAY_POOL) && method.name == ".cctor" {
        return Ok(Some(single_return(registry, method)));
    }

    if declaring.full_name() == RUNTIME_HELPERS && method.name == "IsBitwiseEquatable" {
        return is_bitwise_equatable(registry, method).map(Some);
    }

    Ok(None)
}

fn with_shapes(registry: &TypeRegistry, method: &MethodRc, mut code: Vec<Instruction>) -> IntrinsicBody {
    let shapes = StackShapes::new(registry, method);
    for instruction in &mut code {
        instruction.stack = shapes.effect(instruction);
    }
    IntrinsicBody::Synthesized(code)
}

fn single_return(registry: &TypeRegistry, method: &MethodRc) -> IntrinsicBody {
    with_shapes(
        registry,
        method,
        vec![Instruction::new(OpCode::Ret, 0, 1, Operand::None)],
    )
}

fn unsafe_redirect(registry: &TypeRegistry, method: &MethodRc) -> Result<Option<IntrinsicBody>> {
    let Some(implementation) = registry.find(UNSAFE_IMPLEMENTATION) else {
        return Err(Error::TypeNotFound(UNSAFE_IMPLEMENTATION.to_string()));
    };

    let definition = method
        .generic_definition()
        .unwrap_or_else(|| method.clone());
    let original = definition.param_types();
    let candidates: Vec<MethodRc> = implementation
        .methods
        .iter()
        .map(|(_, m)| m)
        .filter(|candidate| {
            candidate.name == method.name
                && candidate.generic_arity() == definition.generic_arity()
                && candidate.params.len() == definition.params.len()
                && candidate
                    .param_types()
                    .iter()
                    .zip(&original)
                    .all(|(p, o)| parameter_shape_matches(registry, p, o))
        })
        .cloned()
        .collect();

    if candidates.len() > 1 {
        return Err(malformed_error!(
            "Ambiguous implementation of {} on {}",
            method.full_name(),
            UNSAFE_IMPLEMENTATION
        ));
    }

    Ok(candidates.first().and_then(|found| {
        let body = found.body()?;
        let module = found.declaring_type()?.module.clone();
        Some(IntrinsicBody::Redirect { body, module })
    }))
}

// Same element structure, and an assignable or generic innermost type
fn parameter_shape_matches(registry: &TypeRegistry, candidate: &CilTypeRc, original: &CilTypeRc) -> bool {
    let mut candidate = candidate.clone();
    let mut original = original.clone();
    while candidate.flavor.has_element() {
        if !original.flavor.has_element() {
            return false;
        }
        if (candidate.is_array() && !original.is_array())
            || (candidate.is_by_ref() && !original.is_by_ref())
            || (candidate.is_pointer() && !original.is_pointer())
        {
            return false;
        }
        match (candidate.element(), original.element()) {
            (Some(c), Some(o)) => {
                candidate = c;
                original = o;
            }
            _ => return false,
        }
    }

    candidate.is_generic_parameter() || registry.is_assignable_from(&candidate, &original)
}

fn by_reference(
    registry: &TypeRegistry,
    method: &MethodRc,
    declaring: &CilTypeRc,
) -> Result<IntrinsicBody> {
    let value_field = declaring
        .find_field("_value")
        .ok_or_else(|| Error::FieldNotFound(format!("{}._value", declaring.full_name())))?;

    let code = match method.name.as_str() {
        ".ctor" => vec![
            Instruction::new(OpCode::Ldarg, 0, 1, Operand::Var(0)),
            Instruction::new(OpCode::Ldarg, 1, 2, Operand::Var(1)),
            Instruction::new(OpCode::Stfld, 2, 8, Operand::Field(value_field)),
            Instruction::new(OpCode::Ret, 8, 9, Operand::None),
        ],
        "get_Value" => vec![
            Instruction::new(OpCode::Ldarg, 0, 1, Operand::Var(0)),
            Instruction::new(OpCode::Ldfld, 1, 6, Operand::Field(value_field)),
            Instruction::new(OpCode::Ret, 6, 7, Operand::None),
        ],
        _ => {
            return Err(Error::NotSupported(format!(
                "ByReference intrinsic method '{}' not implemented!",
                method.full_name()
            )))
        }
    };

    Ok(with_shapes(registry, method, code))
}

// Creates a RuntimeType, stores the handle argument in it and wraps it in a
// RuntimeTypeHandle
fn create_runtime_type_handle(registry: &TypeRegistry) -> Result<IntrinsicBody> {
    let runtime_type = registry.well_known("System.RuntimeType")?;
    let handle_type = registry.well_known("System.RuntimeTypeHandle")?;
    let int32 = registry.well_known("System.Int32")?;

    let type_ctor = registry
        .find_method(&runtime_type, ".ctor", false, &[])
        .ok_or_else(|| Error::MethodNotFound(format!("{}..ctor()", runtime_type.full_name())))?;
    let handle_field = runtime_type
        .find_field("m_handle")
        .ok_or_else(|| Error::FieldNotFound(format!("{}.m_handle", runtime_type.full_name())))?;
    let handle_ctor = registry
        .find_method(&handle_type, ".ctor", false, std::slice::from_ref(&runtime_type))
        .ok_or_else(|| {
            Error::MethodNotFound(format!(
                "{}..ctor({})",
                handle_type.full_name(),
                runtime_type.full_name()
            ))
        })?;

    let explicit = |mut instruction: Instruction,
                    pops: Vec<&CilTypeRc>,
                    pushes: Vec<&CilTypeRc>| {
        instruction.stack = StackEffect {
            pops: pops.len(),
            pushes: pushes.len(),
            pop_types: pops.into_iter().map(|t| Some(t.clone())).collect(),
            push_types: pushes.into_iter().map(|t| Some(t.clone())).collect(),
        };
        instruction
    };

    Ok(IntrinsicBody::Synthesized(vec![
        explicit(
            Instruction::new(OpCode::Newobj, 0, 1, Operand::method(type_ctor)),
            vec![],
            vec![&runtime_type],
        ),
        explicit(
            Instruction::new(OpCode::Dup, 1, 2, Operand::None),
            vec![&runtime_type],
            vec![&runtime_type, &runtime_type],
        ),
        explicit(
            Instruction::new(OpCode::Ldarg, 2, 3, Operand::Var(0)),
            vec![],
            vec![&int32],
        ),
        explicit(
            Instruction::new(OpCode::Stfld, 3, 4, Operand::Field(handle_field)),
            vec![&int32, &runtime_type],
            vec![],
        ),
        explicit(
            Instruction::new(OpCode::Newobj, 4, 5, Operand::method(handle_ctor)),
            vec![&runtime_type],
            vec![&handle_type],
        ),
        explicit(Instruction::new(OpCode::Ret, 5, 6, Operand::None), vec![], vec![]),
    ]))
}

/// `ldc.i4 1; ret` for integer, native integer, pointer and by-ref arguments, `ldc.i4 0; ret`
/// for anything else. Floats and structs answer 0 so callers take the field-wise
/// comparison path.
fn is_bitwise_equatable(registry: &TypeRegistry, method: &MethodRc) -> Result<IntrinsicBody> {
    let args = method.generic_arguments();
    let Some(arg) = args.first() else {
        return Err(malformed_error!(
            "IsBitwiseEquatable needs a generic argument - {}",
            method.full_name()
        ));
    };

    let value = i32::from(layout::is_integral_or_pointer(arg));
    Ok(with_shapes(
        registry,
        method,
        vec![
            Instruction::new(OpCode::LdcI4, 0, 1, Operand::Int(value)),
            Instruction::new(OpCode::Ret, 1, 2, Operand::None),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use crate::{
        disassembler::{decode_method, OpCode, Operand},
        metadata::{
            method::MethodRc,
            typesystem::{CilTypeRc, ProgramBuilder},
        },
        test::Fixture,
    };

    fn is_bitwise_equatable(fixture: &Fixture) -> MethodRc {
        let corelib = ProgramBuilder::new(&fixture.registry, "System.Private.CoreLib");
        let helpers = corelib
            .class("System.Runtime.CompilerServices", "RuntimeHelpers")
            .build()
            .unwrap();
        let t = corelib.generic_parameter("T", 0, true);
        corelib
            .method(&helpers, "IsBitwiseEquatable")
            .static_method()
            .generic_params(&[t])
            .returns(&fixture.primitive("Boolean"))
            .build()
            .unwrap()
    }

    fn answer(fixture: &Fixture, definition: &MethodRc, arg: &CilTypeRc) -> i32 {
        let method = fixture
            .registry
            .make_generic_method(definition, &[arg.clone()])
            .unwrap();
        let code = decode_method(&fixture.registry, &method).unwrap();
        assert_eq!(code.len(), 2);
        assert_eq!(code[1].opcode, OpCode::Ret);
        match code[0].operand {
            Operand::Int(value) if code[0].opcode == OpCode::LdcI4 => value,
            ref other => panic!("expected ldc.i4, got {other:?}"),
        }
    }

    #[test]
    fn bitwise_equatable_integers_and_pointers() {
        let fixture = Fixture::new();
        let definition = is_bitwise_equatable(&fixture);
        let int32 = fixture.primitive("Int32");

        assert_eq!(answer(&fixture, &definition, &int32), 1);
        assert_eq!(answer(&fixture, &definition, &fixture.primitive("Int64")), 1);
        assert_eq!(answer(&fixture, &definition, &fixture.primitive("IntPtr")), 1);
        let pointer = fixture.registry.make_pointer(&int32);
        assert_eq!(answer(&fixture, &definition, &pointer), 1);
    }

    #[test]
    fn bitwise_equatable_other_types() {
        let fixture = Fixture::new();
        let definition = is_bitwise_equatable(&fixture);
        let pair = fixture.app.value_type("App", "Pair").build().unwrap();
        fixture.app.add_field(&pair, "A", &fixture.primitive("Int32"), false);

        assert_eq!(answer(&fixture, &definition, &fixture.primitive("Double")), 0);
        assert_eq!(answer(&fixture, &definition, &pair), 0);
        assert_eq!(answer(&fixture, &definition, &fixture.class("Node")), 0);
    }
}
