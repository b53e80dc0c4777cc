//! Type system of the programs being compiled.
//!
//! This module holds the in-memory descriptors the front end works on: types, fields,
//! and (in [`crate::metadata::method`]) methods. Descriptors are reference counted and
//! owned by a [`TypeRegistry`]; cross references between descriptors are weak
//! ([`CilTypeRef`], [`crate::metadata::method::MethodRef`]) so cyclic programs do not
//! leak.
//!
//! # Key Components
//!
//! - [`CilType`] - A type definition, generic instantiation, or constructed type
//! - [`CilField`] - A field of a type
//! - [`CilFlavor`] - What kind of type a [`CilType`] is
//! - [`TypeRegistry`] - Owner of all descriptors, lookups and generic instantiation
//! - [`ProgramBuilder`] - Declarative construction of modules, types and bodies
//! - [`names`] - Full-name rendering and label generation
//!
//! # Identity
//!
//! Two descriptors denote the same program element when their module-qualified
//! rendered names match (see [`CilType::key`]). Handle equality is not enough: the same
//! internal helper type may be loaded from more than one module.

mod builder;
mod module;
pub mod names;
mod registry;

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

pub use builder::{MethodBuilder, ProgramBuilder, TypeBuilder};
pub use module::{CallSite, CilModule, ModuleRc, TokenTarget};
pub use registry::{same_types, GenericContext, ResolvedToken, TypeRegistry, CORELIB};

use crate::metadata::{
    annotations::{Annotation, PlugAnnotation, PlugFieldAnnotation},
    method::MethodRc,
    token::Token,
};

/// A reference counted pointer to a [`CilType`]
pub type CilTypeRc = Arc<CilType>;
/// A reference counted pointer to a [`CilField`]
pub type FieldRc = Arc<CilField>;

/// A weak reference to a [`CilType`], used for all references stored inside descriptors.
#[derive(Clone, Default)]
pub struct CilTypeRef {
    weak: Weak<CilType>,
}

impl CilTypeRef {
    /// Create a weak reference from a strong one
    #[must_use]
    pub fn new(strong_ref: &CilTypeRc) -> Self {
        Self {
            weak: Arc::downgrade(strong_ref),
        }
    }

    /// Upgrade to a strong reference, `None` if the registry was dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<CilTypeRc> {
        self.weak.upgrade()
    }
}

impl From<&CilTypeRc> for CilTypeRef {
    fn from(value: &CilTypeRc) -> Self {
        CilTypeRef::new(value)
    }
}

impl fmt::Debug for CilTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(ty) => write!(f, "CilTypeRef({})", ty.full_name()),
            None => write!(f, "CilTypeRef(<dropped>)"),
        }
    }
}

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class is public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Use this mask to retrieve class layout information
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Class fields are auto-laid out
    pub const AUTO_LAYOUT: u32 = 0x0000_0000;
    /// Class fields are laid out sequentially
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Layout is supplied explicitly
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// All possible flags for `FieldAttributes`
pub mod FieldAttributes {
    /// These 3 bits contain the accessibility
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessibly by anyone who has visibility to this scope
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant
    pub const LITERAL: u32 = 0x0040;
    /// Field is special
    pub const SPECIAL_NAME: u32 = 0x0200;
}

/// Field packing discipline of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLayout {
    /// The runtime chooses; packed like sequential
    Auto,
    /// Declaration order with natural alignment
    Sequential,
    /// Every field carries its own offset
    Explicit,
}

/// The kind of a [`CilType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CilFlavor {
    /// A reference type
    Class,
    /// A value type
    ValueType,
    /// An interface
    Interface,
    /// An enum, laid out as its `value__` field
    Enum,
    /// A single-dimensional, zero based array
    SzArray,
    /// A multi-dimensional array
    Array {
        /// Number of dimensions
        rank: u32,
    },
    /// An unmanaged pointer
    Pointer,
    /// A managed reference
    ByRef,
    /// A generic parameter of a type (`!n`) or a method (`!!n`)
    GenericParameter {
        /// Position in the owner's parameter list
        index: usize,
        /// True for method generic parameters
        method: bool,
    },
}

impl CilFlavor {
    /// True for array, pointer and by-ref types, which are constructed from an element type
    #[must_use]
    pub fn has_element(&self) -> bool {
        matches!(
            self,
            CilFlavor::SzArray | CilFlavor::Array { .. } | CilFlavor::Pointer | CilFlavor::ByRef
        )
    }

    /// True for arrays of any rank
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, CilFlavor::SzArray | CilFlavor::Array { .. })
    }
}

/// Construction data for a [`CilType`], consumed by [`TypeRegistry`].
#[derive(Clone)]
pub struct TypeSpec {
    /// Owning module
    pub module: ModuleRc,
    /// Metadata token within the module
    pub token: Token,
    /// Namespace, empty for nested and constructed types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Kind of type
    pub flavor: CilFlavor,
    /// `TypeAttributes` flags
    pub flags: u32,
    /// Element type of arrays, pointers and by-refs
    pub element: Option<CilTypeRc>,
    /// Open definition of a generic instantiation
    pub generic_definition: Option<CilTypeRc>,
    /// Generic parameters of a definition, or arguments of an instantiation
    pub generic_args: Vec<CilTypeRc>,
}

/// A type known to the front end.
///
/// Covers type definitions, generic instantiations (a definition plus arguments),
/// generic parameters and constructed types (arrays, pointers, by-refs). Fields set at
/// construction are immutable; members and relations are filled in once through
/// `OnceLock` and append-only `boxcar` vectors while the program is being built.
pub struct CilType {
    /// Position in the registry arena
    pub id: usize,
    /// Owning module
    pub module: ModuleRc,
    /// Metadata token within the module
    pub token: Token,
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Kind of type
    pub flavor: CilFlavor,
    /// `TypeAttributes` flags
    pub flags: u32,
    /// Explicit packing size (`0` selects the pointer size)
    pub packing_size: OnceLock<u16>,
    /// Explicit total size of a value type
    pub class_size: OnceLock<u32>,
    /// For definitions their generic parameters, for instantiations their arguments
    pub generic_args: boxcar::Vec<CilTypeRef>,
    /// Fields declared directly on this type
    pub fields: boxcar::Vec<FieldRc>,
    /// Methods declared directly on this type
    pub methods: boxcar::Vec<MethodRc>,
    /// Directly implemented interfaces
    pub interfaces: boxcar::Vec<CilTypeRef>,
    /// Custom annotations on the type
    pub annotations: boxcar::Vec<Annotation>,
    base: OnceLock<CilTypeRef>,
    enclosing: OnceLock<CilTypeRef>,
    element: Option<CilTypeRef>,
    generic_definition: Option<CilTypeRef>,
    full_name: OnceLock<String>,
}

impl CilType {
    pub(crate) fn new(id: usize, spec: TypeSpec) -> Self {
        let generic_args = boxcar::Vec::new();
        for arg in &spec.generic_args {
            generic_args.push(CilTypeRef::new(arg));
        }

        CilType {
            id,
            module: spec.module,
            token: spec.token,
            namespace: spec.namespace,
            name: spec.name,
            flavor: spec.flavor,
            flags: spec.flags,
            packing_size: OnceLock::new(),
            class_size: OnceLock::new(),
            generic_args,
            fields: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            interfaces: boxcar::Vec::new(),
            annotations: boxcar::Vec::new(),
            base: OnceLock::new(),
            enclosing: OnceLock::new(),
            element: spec.element.as_ref().map(CilTypeRef::new),
            generic_definition: spec.generic_definition.as_ref().map(CilTypeRef::new),
            full_name: OnceLock::new(),
        }
    }

    /// The direct base type, `None` for `System.Object`, interfaces and generic parameters
    #[must_use]
    pub fn base(&self) -> Option<CilTypeRc> {
        self.base.get().and_then(CilTypeRef::upgrade)
    }

    /// Set the base type. Returns `false` if one was already set.
    pub fn set_base(&self, base: &CilTypeRc) -> bool {
        self.base.set(CilTypeRef::new(base)).is_ok()
    }

    /// The enclosing type of a nested type
    #[must_use]
    pub fn enclosing(&self) -> Option<CilTypeRc> {
        self.enclosing.get().and_then(CilTypeRef::upgrade)
    }

    /// Mark this type as nested in `outer`. Returns `false` if already nested.
    pub fn set_enclosing(&self, outer: &CilTypeRc) -> bool {
        self.enclosing.set(CilTypeRef::new(outer)).is_ok()
    }

    /// Element type of an array, pointer or by-ref
    #[must_use]
    pub fn element(&self) -> Option<CilTypeRc> {
        self.element.as_ref().and_then(CilTypeRef::upgrade)
    }

    /// Open generic definition of a generic instantiation
    #[must_use]
    pub fn generic_definition(&self) -> Option<CilTypeRc> {
        self.generic_definition
            .as_ref()
            .and_then(CilTypeRef::upgrade)
    }

    /// Generic parameters (definitions) or arguments (instantiations) in order
    #[must_use]
    pub fn generic_arguments(&self) -> Vec<CilTypeRc> {
        self.generic_args
            .iter()
            .filter_map(|(_, arg)| arg.upgrade())
            .collect()
    }

    /// Directly implemented interfaces in declaration order
    #[must_use]
    pub fn interface_list(&self) -> Vec<CilTypeRc> {
        self.interfaces
            .iter()
            .filter_map(|(_, iface)| iface.upgrade())
            .collect()
    }

    /// Declared fields in declaration order
    #[must_use]
    pub fn field_list(&self) -> Vec<FieldRc> {
        self.fields.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Declared methods in declaration order
    #[must_use]
    pub fn method_list(&self) -> Vec<MethodRc> {
        self.methods.iter().map(|(_, m)| m.clone()).collect()
    }

    /// True for a generic type definition with unbound parameters
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        self.generic_definition.is_none() && self.generic_args.count() > 0
    }

    /// True for a generic instantiation (open or closed)
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        self.generic_definition.is_some()
    }

    /// True for generic parameters
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.flavor, CilFlavor::GenericParameter { .. })
    }

    /// True for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(self.flavor, CilFlavor::Interface)
    }

    /// True for value types, enums and primitives
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(self.flavor, CilFlavor::ValueType | CilFlavor::Enum)
    }

    /// True for enums
    #[must_use]
    pub fn is_enum(&self) -> bool {
        matches!(self.flavor, CilFlavor::Enum)
    }

    /// True for unmanaged pointers
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.flavor, CilFlavor::Pointer)
    }

    /// True for managed references
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self.flavor, CilFlavor::ByRef)
    }

    /// True for arrays of any rank
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.flavor.is_array()
    }

    /// True for abstract classes and interfaces
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// Declared layout kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for the reserved layout mask value.
    pub fn layout(&self) -> crate::Result<TypeLayout> {
        match self.flags & TypeAttributes::LAYOUT_MASK {
            TypeAttributes::AUTO_LAYOUT => Ok(TypeLayout::Auto),
            TypeAttributes::SEQUENTIAL_LAYOUT => Ok(TypeLayout::Sequential),
            TypeAttributes::EXPLICIT_LAYOUT => Ok(TypeLayout::Explicit),
            other => Err(crate::Error::NotSupported(format!(
                "Layout kind 0x{:X} of {}",
                other,
                self.full_name()
            ))),
        }
    }

    /// Rendered full name, see [`names::type_full_name`]
    pub fn full_name(&self) -> &str {
        self.full_name.get_or_init(|| names::type_full_name(self))
    }

    /// Module-qualified identity key
    #[must_use]
    pub fn key(&self) -> String {
        format!("T:{}:{}", self.module.name, self.full_name())
    }

    /// Namespace-qualified definition name (no generic arguments, nesting with `+`)
    #[must_use]
    pub fn qualified_name(&self) -> String {
        if let Some(outer) = self.enclosing() {
            return format!("{}+{}", outer.qualified_name(), self.name);
        }
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Structural identity check
    #[must_use]
    pub fn is_same(&self, other: &CilType) -> bool {
        self.id == other.id || self.key() == other.key()
    }

    /// All `Plug` annotations on this type
    #[must_use]
    pub fn plug_annotations(&self) -> Vec<PlugAnnotation> {
        self.annotations
            .iter()
            .filter_map(|(_, a)| match a {
                Annotation::Plug(plug) => Some(plug.clone()),
                _ => None,
            })
            .collect()
    }

    /// All `PlugField` annotations on this type
    #[must_use]
    pub fn plug_field_annotations(&self) -> Vec<PlugFieldAnnotation> {
        self.annotations
            .iter()
            .filter_map(|(_, a)| match a {
                Annotation::PlugField(field) => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    /// Find a declared field by name
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<FieldRc> {
        self.fields
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(_, f)| f.clone())
    }

    /// Find declared methods by name
    #[must_use]
    pub fn find_methods(&self, name: &str) -> Vec<MethodRc> {
        self.methods
            .iter()
            .filter(|(_, m)| m.name == name)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl fmt::Debug for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CilType")
            .field("id", &self.id)
            .field("name", &self.full_name())
            .field("flavor", &self.flavor)
            .finish()
    }
}

impl fmt::Display for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// A field declared on a type.
pub struct CilField {
    /// Metadata token; value types lay out their fields in token order
    pub token: Token,
    /// Field name
    pub name: String,
    /// `FieldAttributes` flags
    pub flags: u32,
    /// Custom annotations on the field
    pub annotations: Vec<Annotation>,
    declaring_type: CilTypeRef,
    field_type: CilTypeRef,
    full_name: OnceLock<String>,
}

impl CilField {
    /// Create a new field descriptor.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        flags: u32,
        declaring_type: &CilTypeRc,
        field_type: &CilTypeRc,
        annotations: Vec<Annotation>,
    ) -> Self {
        CilField {
            token,
            name: name.into(),
            flags,
            annotations,
            declaring_type: CilTypeRef::new(declaring_type),
            field_type: CilTypeRef::new(field_type),
            full_name: OnceLock::new(),
        }
    }

    /// The type that declares this field
    #[must_use]
    pub fn declaring_type(&self) -> Option<CilTypeRc> {
        self.declaring_type.upgrade()
    }

    /// The type of the field's value
    #[must_use]
    pub fn field_type(&self) -> Option<CilTypeRc> {
        self.field_type.upgrade()
    }

    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// The offset from a `FieldOffset` annotation, if any
    #[must_use]
    pub fn explicit_offset(&self) -> Option<u32> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::FieldOffset(offset) => Some(*offset),
            _ => None,
        })
    }

    /// Rendered full name, `<field type> <declaring type>.<name>`
    pub fn full_name(&self) -> &str {
        self.full_name.get_or_init(|| names::field_full_name(self))
    }

    /// Module-qualified identity key
    #[must_use]
    pub fn key(&self) -> String {
        let module = self
            .declaring_type()
            .map(|t| t.module.name.clone())
            .unwrap_or_default();
        format!("F:{}:{}", module, self.full_name())
    }
}

impl fmt::Debug for CilField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CilField({})", self.full_name())
    }
}

/// A reachable program element, the closed set of items the scanner works on.
#[derive(Clone, Debug)]
pub enum ProgramItem {
    /// A method (definition, generic instantiation or member of a generic instance)
    Method(MethodRc),
    /// A type
    Type(CilTypeRc),
    /// A field
    Field(FieldRc),
}

impl ProgramItem {
    /// Module-qualified identity key of the item
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            ProgramItem::Method(method) => method.key(),
            ProgramItem::Type(ty) => ty.key(),
            ProgramItem::Field(field) => field.key(),
        }
    }

    /// Rendered full name of the item
    #[must_use]
    pub fn full_name(&self) -> &str {
        match self {
            ProgramItem::Method(method) => method.full_name(),
            ProgramItem::Type(ty) => ty.full_name(),
            ProgramItem::Field(field) => field.full_name(),
        }
    }

    /// The method, if this is a method item
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodRc> {
        match self {
            ProgramItem::Method(method) => Some(method),
            _ => None,
        }
    }

    /// The type, if this is a type item
    #[must_use]
    pub fn as_type(&self) -> Option<&CilTypeRc> {
        match self {
            ProgramItem::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// The field, if this is a field item
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldRc> {
        match self {
            ProgramItem::Field(field) => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

impl From<MethodRc> for ProgramItem {
    fn from(value: MethodRc) -> Self {
        ProgramItem::Method(value)
    }
}

impl From<CilTypeRc> for ProgramItem {
    fn from(value: CilTypeRc) -> Self {
        ProgramItem::Type(value)
    }
}

impl From<FieldRc> for ProgramItem {
    fn from(value: FieldRc) -> Self {
        ProgramItem::Field(value)
    }
}
