use crate::metadata::{
    method::ExceptionHandler,
    typesystem::{CilTypeRc, CilTypeRef},
};

/// The instruction bytes of a method, together with its exception regions and locals.
///
/// Bodies are assembled from code bytes with [`MethodBody::new`], then extended with
/// exception regions and locals.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Instruction stream
    pub code: Vec<u8>,
    /// Maximum evaluation stack depth
    pub max_stack: usize,
    /// Locals are zero-initialized
    pub is_init_local: bool,
    /// Exception regions in declaration order
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Types of the local variables
    pub locals: Vec<CilTypeRef>,
}

impl MethodBody {
    /// Create a body from plain instruction bytes
    #[must_use]
    pub fn new(code: Vec<u8>) -> Self {
        MethodBody {
            code,
            max_stack: 8,
            ..Default::default()
        }
    }

    /// Attach exception regions
    #[must_use]
    pub fn with_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }

    /// Attach local variable types
    #[must_use]
    pub fn with_locals(mut self, locals: &[CilTypeRc]) -> Self {
        self.locals = locals.iter().map(CilTypeRef::new).collect();
        self
    }

    /// Length of the instruction stream
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True for a body without instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
