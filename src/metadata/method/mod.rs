//! Method descriptors.
//!
//! A [`Method`] is immutable once built, except for its body which may be attached
//! after construction (a body can reference its own method through a token). Methods
//! are owned by their declaring [`crate::metadata::typesystem::CilType`], or by the
//! registry for generic method instantiations.
//!
//! # Key Components
//! - [`Method`] - A method or constructor, possibly a generic instantiation
//! - [`Param`] - A parameter with its annotations
//! - [`MethodBody`] - Instruction bytes, exception regions and locals
//! - [`ExceptionHandler`] - An exception region

mod body;
mod exceptions;
mod types;

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;

use crate::metadata::{
    annotations::{self, Annotation, PlugMethodAnnotation},
    token::Token,
    typesystem::{names, CilTypeRc, CilTypeRef},
};

/// A reference counted pointer to a [`Method`]
pub type MethodRc = Arc<Method>;

/// A weak reference to a [`Method`]
#[derive(Clone, Default)]
pub struct MethodRef {
    weak: Weak<Method>,
}

impl MethodRef {
    /// Create a weak reference from a strong one
    #[must_use]
    pub fn new(strong_ref: &MethodRc) -> Self {
        Self {
            weak: Arc::downgrade(strong_ref),
        }
    }

    /// Upgrade to a strong reference
    #[must_use]
    pub fn upgrade(&self) -> Option<MethodRc> {
        self.weak.upgrade()
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(method) => write!(f, "MethodRef({})", method.full_name()),
            None => write!(f, "MethodRef(<dropped>)"),
        }
    }
}

/// A method parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Custom annotations
    pub annotations: Vec<Annotation>,
    param_type: CilTypeRef,
}

impl Param {
    /// Create a parameter
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: &CilTypeRc) -> Self {
        Param {
            name: name.into(),
            annotations: Vec::new(),
            param_type: CilTypeRef::new(param_type),
        }
    }

    /// Attach an annotation
    #[must_use]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// The declared parameter type
    #[must_use]
    pub fn param_type(&self) -> Option<CilTypeRc> {
        self.param_type.upgrade()
    }

    /// True for `FieldAccess` parameters of plug methods
    #[must_use]
    pub fn is_field_access(&self) -> bool {
        annotations::has_field_access(&self.annotations)
    }

    /// True for `ObjectPointerAccess` parameters of plug methods
    #[must_use]
    pub fn is_object_pointer_access(&self) -> bool {
        annotations::has_object_pointer_access(&self.annotations)
    }
}

/// Construction data for a [`Method`].
#[derive(Clone)]
pub struct MethodSpec {
    /// Metadata token
    pub token: Token,
    /// Method name, `.ctor`/`.cctor` for constructors
    pub name: String,
    /// Accessibility
    pub access: MethodAccessFlags,
    /// Attribute flags
    pub flags: MethodModifiers,
    /// Implementation flags
    pub impl_flags: MethodImplOptions,
    /// Declaring type, `None` for dynamic methods
    pub declaring_type: Option<CilTypeRc>,
    /// Return type, `System.Void` for none
    pub return_type: CilTypeRc,
    /// Parameters without `this`
    pub params: Vec<Param>,
    /// Generic parameters of a definition, or arguments of an instantiation
    pub generic_args: Vec<CilTypeRc>,
    /// Open generic method definition of an instantiation
    pub generic_definition: Option<MethodRc>,
    /// Corresponding method on the open generic type, for members of generic instances
    pub member_definition: Option<MethodRc>,
    /// Custom annotations
    pub annotations: Vec<Annotation>,
}

/// A method, constructor or generic method instantiation.
pub struct Method {
    /// Metadata token within the declaring module
    pub token: Token,
    /// Method name
    pub name: String,
    /// Accessibility
    pub access: MethodAccessFlags,
    /// Attribute flags
    pub flags: MethodModifiers,
    /// Implementation flags
    pub impl_flags: MethodImplOptions,
    /// Parameters without `this`
    pub params: Vec<Param>,
    /// Custom annotations
    pub annotations: Vec<Annotation>,
    declaring_type: Option<CilTypeRef>,
    return_type: CilTypeRef,
    generic_args: Vec<CilTypeRef>,
    generic_definition: Option<MethodRef>,
    member_definition: Option<MethodRef>,
    body: OnceLock<Arc<MethodBody>>,
    full_name: OnceLock<String>,
}

impl Method {
    /// Create a method from its construction data
    #[must_use]
    pub fn new(spec: MethodSpec) -> Self {
        Method {
            token: spec.token,
            name: spec.name,
            access: spec.access,
            flags: spec.flags,
            impl_flags: spec.impl_flags,
            params: spec.params,
            annotations: spec.annotations,
            declaring_type: spec.declaring_type.as_ref().map(CilTypeRef::new),
            return_type: CilTypeRef::new(&spec.return_type),
            generic_args: spec.generic_args.iter().map(CilTypeRef::new).collect(),
            generic_definition: spec.generic_definition.as_ref().map(MethodRef::new),
            member_definition: spec.member_definition.as_ref().map(MethodRef::new),
            body: OnceLock::new(),
            full_name: OnceLock::new(),
        }
    }

    /// The declaring type, `None` for dynamic methods
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilTypeRc> {
        self.declaring_type.as_ref().and_then(CilTypeRef::upgrade)
    }

    /// The return type (`System.Void` for constructors and void methods)
    #[must_use]
    pub fn return_type(&self) -> Option<CilTypeRc> {
        self.return_type.upgrade()
    }

    /// True if the method returns a value
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.is_constructor()
            && self
                .return_type()
                .is_some_and(|t| t.full_name() != "System.Void")
    }

    /// Parameter types in order, without `this`
    #[must_use]
    pub fn param_types(&self) -> Vec<CilTypeRc> {
        self.params.iter().filter_map(Param::param_type).collect()
    }

    /// Generic parameters (definitions) or arguments (instantiations)
    #[must_use]
    pub fn generic_arguments(&self) -> Vec<CilTypeRc> {
        self.generic_args
            .iter()
            .filter_map(CilTypeRef::upgrade)
            .collect()
    }

    /// Number of generic parameters or arguments
    #[must_use]
    pub fn generic_arity(&self) -> usize {
        self.generic_args.len()
    }

    /// The open definition of a generic method instantiation
    #[must_use]
    pub fn generic_definition(&self) -> Option<MethodRc> {
        self.generic_definition
            .as_ref()
            .and_then(MethodRef::upgrade)
    }

    /// For members of generic type instances, the method on the open definition
    #[must_use]
    pub fn member_definition(&self) -> Option<MethodRc> {
        self.member_definition.as_ref().and_then(MethodRef::upgrade)
    }

    /// True for a generic method definition with unbound parameters
    #[must_use]
    pub fn is_generic_method_definition(&self) -> bool {
        !self.generic_args.is_empty() && self.generic_definition.is_none()
    }

    /// True for an instantiation of a generic method
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        self.generic_definition.is_some()
    }

    /// The method body, following instantiations back to their definition
    #[must_use]
    pub fn body(&self) -> Option<Arc<MethodBody>> {
        if let Some(body) = self.body.get() {
            return Some(body.clone());
        }
        if let Some(def) = self.generic_definition() {
            return def.body();
        }
        self.member_definition().and_then(|def| def.body())
    }

    /// Attach the method body. Returns `false` if one was already attached.
    pub fn set_body(&self, body: MethodBody) -> bool {
        self.body.set(Arc::new(body)).is_ok()
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodModifiers::STATIC)
    }

    /// True for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodModifiers::VIRTUAL)
    }

    /// True for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodModifiers::ABSTRACT)
    }

    /// True for public methods
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.access == MethodAccessFlags::PUBLIC
    }

    /// True for instance and static constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// True for static constructors
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.name == ".cctor"
    }

    /// True for methods without declaring type
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.declaring_type.is_none()
    }

    /// True for p/invoke, native and internal-call methods that have no managed body
    #[must_use]
    pub fn requires_native_code(&self) -> bool {
        self.flags.is_pinvoke() || self.impl_flags.is_native()
    }

    /// True if annotated `Inline`
    #[must_use]
    pub fn is_inline(&self) -> bool {
        annotations::has_inline(&self.annotations)
    }

    /// The `PlugMethod` annotation of this method, if any
    #[must_use]
    pub fn plug_method_annotation(&self) -> Option<&PlugMethodAnnotation> {
        annotations::plug_method(&self.annotations)
    }

    /// Rendered full name, see [`names::method_full_name`]
    pub fn full_name(&self) -> &str {
        self.full_name
            .get_or_init(|| names::method_full_name(self))
    }

    /// Module-qualified identity key
    #[must_use]
    pub fn key(&self) -> String {
        let module = self
            .declaring_type()
            .map(|t| t.module.name.clone())
            .unwrap_or_default();
        format!("M:{}:{}", module, self.full_name())
    }

    /// Structural identity check
    #[must_use]
    pub fn is_same(&self, other: &Method) -> bool {
        std::ptr::eq(self, other) || self.key() == other.key()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.full_name())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}
