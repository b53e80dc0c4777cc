//! The interface to the code generator the scanner feeds.

use crate::{
    disassembler::Instruction,
    metadata::{
        method::MethodRc,
        typesystem::{CilTypeRc, FieldRc},
    },
    scanner::{
        methodinfo::{CompiledMethod, MethodKind},
        uid::UidLookup,
    },
    Result,
};

/// Consumer of a finished scan.
///
/// The scanner calls [`CodeGenerator::process_field`] and [`CodeGenerator::process_method`]
/// or [`CodeGenerator::generate_method_forward`] once per reachable item in discovery
/// order, then [`CodeGenerator::generate_vmt_code`] once, then
/// [`CodeGenerator::emit_entrypoint`] once. Any error aborts the run.
pub trait CodeGenerator {
    /// Emit the body of `method` from its decoded instructions.
    ///
    /// # Errors
    /// Generator specific.
    fn process_method(&mut self, method: &CompiledMethod, code: &[Instruction]) -> Result<()>;

    /// Emit `method` as a forward to `plug`.
    ///
    /// # Errors
    /// Generator specific.
    fn generate_method_forward(&mut self, method: &CompiledMethod, plug: &CompiledMethod) -> Result<()>;

    /// Emit the storage of a static field.
    ///
    /// # Errors
    /// Generator specific.
    fn process_field(&mut self, field: &FieldRc) -> Result<()>;

    /// Emit the virtual method tables of all reachable types.
    ///
    /// # Errors
    /// Generator specific, or a UID lookup for an unreachable type.
    fn generate_vmt_code(
        &mut self,
        types: &[CilTypeRc],
        methods: &[MethodRc],
        uids: &mut dyn UidLookup,
    ) -> Result<()>;

    /// Emit the program entry. `entry` is `None` for a boot list scan.
    ///
    /// # Errors
    /// Generator specific.
    fn emit_entrypoint(&mut self, entry: Option<&MethodRc>, boot_entries: &[MethodRc]) -> Result<()>;
}

/// One call the scanner made into a [`RecordingGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// A compiled body
    Method {
        /// Label of the body
        label: String,
        /// Full name of the compiled method
        name: String,
        /// Record kind
        kind: MethodKind,
        /// Number of instructions handed over
        instructions: usize,
        /// Assembler override
        assembler: Option<String>,
    },
    /// A forward from a plugged method to its plug
    Forward {
        /// Full name of the plugged method
        from: String,
        /// Label of the plug body
        to: String,
    },
    /// A field
    Field(String),
    /// Method tables with the UIDs the generator looked up
    VmtCode {
        /// Type names with their UIDs
        types: Vec<(String, u32)>,
        /// Method names with their UIDs
        methods: Vec<(String, u32)>,
    },
    /// The program entry
    Entrypoint {
        /// Entry point, if any
        entry: Option<String>,
        /// Boot list
        boot: Vec<String>,
    },
}

/// A [`CodeGenerator`] that only records what it is asked to emit.
#[derive(Debug, Default)]
pub struct RecordingGenerator {
    /// Every call in order
    pub emissions: Vec<Emission>,
}

impl RecordingGenerator {
    /// An empty recorder
    #[must_use]
    pub fn new() -> Self {
        RecordingGenerator::default()
    }

    /// Full names of the methods whose bodies were compiled
    #[must_use]
    pub fn compiled_methods(&self) -> Vec<&str> {
        self.emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Method { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Labels of the compiled bodies
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Method { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// (plugged method, plug label) pairs
    #[must_use]
    pub fn forwards(&self) -> Vec<(&str, &str)> {
        self.emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Forward { from, to } => Some((from.as_str(), to.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Full names of the emitted fields
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Field(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The recorded method tables
    #[must_use]
    pub fn vmt(&self) -> Option<&Emission> {
        self.emissions
            .iter()
            .find(|e| matches!(e, Emission::VmtCode { .. }))
    }
}

impl CodeGenerator for RecordingGenerator {
    fn process_method(&mut self, method: &CompiledMethod, code: &[Instruction]) -> Result<()> {
        self.emissions.push(Emission::Method {
            label: method.label.clone(),
            name: method.method.full_name().to_string(),
            kind: method.kind,
            instructions: code.len(),
            assembler: method.assembler.clone(),
        });
        Ok(())
    }

    fn generate_method_forward(&mut self, method: &CompiledMethod, plug: &CompiledMethod) -> Result<()> {
        self.emissions.push(Emission::Forward {
            from: method.method.full_name().to_string(),
            to: plug.label.clone(),
        });
        Ok(())
    }

    fn process_field(&mut self, field: &FieldRc) -> Result<()> {
        self.emissions.push(Emission::Field(field.full_name().to_string()));
        Ok(())
    }

    fn generate_vmt_code(
        &mut self,
        types: &[CilTypeRc],
        methods: &[MethodRc],
        uids: &mut dyn UidLookup,
    ) -> Result<()> {
        let types = types
            .iter()
            .map(|ty| Ok((ty.full_name().to_string(), uids.type_uid(ty)?)))
            .collect::<Result<Vec<_>>>()?;
        let methods = methods
            .iter()
            .map(|m| (m.full_name().to_string(), uids.method_uid(m)))
            .collect();
        self.emissions.push(Emission::VmtCode { types, methods });
        Ok(())
    }

    fn emit_entrypoint(&mut self, entry: Option<&MethodRc>, boot_entries: &[MethodRc]) -> Result<()> {
        self.emissions.push(Emission::Entrypoint {
            entry: entry.map(|m| m.full_name().to_string()),
            boot: boot_entries
                .iter()
                .map(|m| m.full_name().to_string())
                .collect(),
        });
        Ok(())
    }
}
