//! Declarative construction of in-memory programs.
//!
//! The builders are the metadata provider of this crate: they create modules, types,
//! fields, methods and bodies inside a [`TypeRegistry`] and bind the metadata tokens
//! that instruction streams refer to.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilfront::metadata::typesystem::{ProgramBuilder, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let program = ProgramBuilder::new(&registry, "App");
//!
//! let point = program.value_type("Geometry", "Point").build()?;
//! let int32 = program.primitive("Int32")?;
//! program.add_field(&point, "X", &int32, false);
//! program.add_field(&point, "Y", &int32, false);
//!
//! let length = program
//!     .method(&point, "Length")
//!     .returns(&int32)
//!     .il(vec![0x16, 0x2A]) // ldc.i4.0; ret
//!     .build()?;
//! assert_eq!(length.full_name(), "System.Int32  Geometry.Point.Length()");
//! # Ok::<(), cilfront::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    metadata::{
        annotations::Annotation,
        method::{
            Method, MethodAccessFlags, MethodBody, MethodImplOptions, MethodModifiers, MethodRc,
            MethodRef, MethodSpec, Param,
        },
        token::{TABLE_FIELD, TABLE_METHOD_DEF, TABLE_TYPE_DEF},
        typesystem::{
            CallSite, CilField, CilFlavor, CilTypeRc, CilTypeRef, FieldAttributes, FieldRc,
            ModuleRc, TokenTarget, TypeAttributes, TypeLayout, TypeRegistry, TypeSpec,
        },
    },
    Result,
};

/// Builds the contents of one module.
pub struct ProgramBuilder {
    registry: Arc<TypeRegistry>,
    module: ModuleRc,
}

impl ProgramBuilder {
    /// Start building module `name` (created if it does not exist yet).
    #[must_use]
    pub fn new(registry: &Arc<TypeRegistry>, name: &str) -> Self {
        ProgramBuilder {
            registry: registry.clone(),
            module: registry.create_module(name),
        }
    }

    /// The module being built
    #[must_use]
    pub fn module(&self) -> &ModuleRc {
        &self.module
    }

    /// The registry all descriptors are created in
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// A core library type by simple name, e.g. `"Int32"` for `System.Int32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] for unknown names.
    pub fn primitive(&self, name: &str) -> Result<CilTypeRc> {
        self.registry.well_known(&format!("System.{name}"))
    }

    /// Start a reference type deriving from `System.Object`
    #[must_use]
    pub fn class(&self, namespace: &str, name: &str) -> TypeBuilder<'_> {
        TypeBuilder::new(self, namespace, name, CilFlavor::Class, 0)
    }

    /// Start a value type with sequential layout
    #[must_use]
    pub fn value_type(&self, namespace: &str, name: &str) -> TypeBuilder<'_> {
        TypeBuilder::new(
            self,
            namespace,
            name,
            CilFlavor::ValueType,
            TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
        )
    }

    /// Start an interface
    #[must_use]
    pub fn interface(&self, namespace: &str, name: &str) -> TypeBuilder<'_> {
        TypeBuilder::new(
            self,
            namespace,
            name,
            CilFlavor::Interface,
            TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        )
    }

    /// Create an enum with a `value__` field of type `underlying`.
    ///
    /// # Errors
    /// Returns an error if `System.Enum` is missing from the registry.
    pub fn enumeration(
        &self,
        namespace: &str,
        name: &str,
        underlying: &CilTypeRc,
    ) -> Result<CilTypeRc> {
        let ty = TypeBuilder::new(
            self,
            namespace,
            name,
            CilFlavor::Enum,
            TypeAttributes::SEALED,
        )
        .build()?;
        self.add_field_annotated(
            &ty,
            "value__",
            underlying,
            FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME,
            Vec::new(),
        );
        Ok(ty)
    }

    /// Add a field to `declaring` and bind a field token for it.
    pub fn add_field(
        &self,
        declaring: &CilTypeRc,
        name: &str,
        field_type: &CilTypeRc,
        is_static: bool,
    ) -> FieldRc {
        let mut flags = FieldAttributes::PUBLIC;
        if is_static {
            flags |= FieldAttributes::STATIC;
        }
        self.add_field_annotated(declaring, name, field_type, flags, Vec::new())
    }

    /// Add a field with explicit flags and annotations.
    pub fn add_field_annotated(
        &self,
        declaring: &CilTypeRc,
        name: &str,
        field_type: &CilTypeRc,
        flags: u32,
        annotations: Vec<Annotation>,
    ) -> FieldRc {
        let token = self.module.reserve_token(TABLE_FIELD);
        let field = Arc::new(CilField::new(
            token,
            name,
            flags,
            declaring,
            field_type,
            annotations,
        ));
        self.module
            .bind_token(token, TokenTarget::Field(Arc::downgrade(&field)));
        declaring.fields.push(field.clone());
        field
    }

    /// Start a method declared on `declaring`
    #[must_use]
    pub fn method(&self, declaring: &CilTypeRc, name: &str) -> MethodBuilder<'_> {
        MethodBuilder::new(self, Some(declaring.clone()), name)
    }

    /// Start a method without declaring type
    #[must_use]
    pub fn dynamic_method(&self, name: &str) -> MethodBuilder<'_> {
        MethodBuilder::new(self, None, name).static_method()
    }

    /// Create a generic parameter; `method` selects `!!index` over `!index`.
    pub fn generic_parameter(&self, name: &str, index: usize, method: bool) -> CilTypeRc {
        self.registry
            .create_generic_parameter(&self.module, name, index, method)
    }

    /// Bind a token for `ty`
    pub fn type_token(&self, ty: &CilTypeRc) -> u32 {
        self.module.type_token(ty).value()
    }

    /// Bind a token for `method`
    pub fn method_token(&self, method: &MethodRc) -> u32 {
        self.module.method_token(method).value()
    }

    /// Bind a token for `field`
    pub fn field_token(&self, field: &FieldRc) -> u32 {
        self.module.field_token(field).value()
    }

    /// Bind a user string token
    pub fn string_token(&self, value: &str) -> u32 {
        self.module.string_token(value).value()
    }

    /// Bind a stand-alone signature token for `calli`
    pub fn signature_token(
        &self,
        param_count: usize,
        has_this: bool,
        return_type: Option<&CilTypeRc>,
    ) -> u32 {
        self.module
            .signature_token(CallSite {
                param_count,
                has_this,
                return_type: return_type.map(CilTypeRef::new),
            })
            .value()
    }
}

enum BaseChoice {
    Default,
    Explicit(CilTypeRc),
    None,
}

/// Builds one type; finish with [`TypeBuilder::build`].
pub struct TypeBuilder<'a> {
    program: &'a ProgramBuilder,
    namespace: String,
    name: String,
    flavor: CilFlavor,
    flags: u32,
    base: BaseChoice,
    interfaces: Vec<CilTypeRc>,
    generic: Vec<String>,
    packing: Option<u16>,
    class_size: Option<u32>,
    annotations: Vec<Annotation>,
    enclosing: Option<CilTypeRc>,
}

impl<'a> TypeBuilder<'a> {
    fn new(
        program: &'a ProgramBuilder,
        namespace: &str,
        name: &str,
        flavor: CilFlavor,
        flags: u32,
    ) -> Self {
        TypeBuilder {
            program,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flavor,
            flags: flags | TypeAttributes::PUBLIC,
            base: BaseChoice::Default,
            interfaces: Vec::new(),
            generic: Vec::new(),
            packing: None,
            class_size: None,
            annotations: Vec::new(),
            enclosing: None,
        }
    }

    /// Declare generic parameters; the name gets the arity suffix (`` List`1 ``)
    #[must_use]
    pub fn generic(mut self, params: &[&str]) -> Self {
        self.generic = params.iter().map(ToString::to_string).collect();
        self
    }

    /// Derive from `base`
    #[must_use]
    pub fn base(mut self, base: &CilTypeRc) -> Self {
        self.base = BaseChoice::Explicit(base.clone());
        self
    }

    /// Do not derive from anything
    #[must_use]
    pub fn no_base(mut self) -> Self {
        self.base = BaseChoice::None;
        self
    }

    /// Implement `iface`
    #[must_use]
    pub fn implements(mut self, iface: &CilTypeRc) -> Self {
        self.interfaces.push(iface.clone());
        self
    }

    /// Add raw `TypeAttributes` flags
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Select the field layout kind
    #[must_use]
    pub fn layout(mut self, layout: TypeLayout) -> Self {
        self.flags &= !TypeAttributes::LAYOUT_MASK;
        self.flags |= match layout {
            TypeLayout::Auto => TypeAttributes::AUTO_LAYOUT,
            TypeLayout::Sequential => TypeAttributes::SEQUENTIAL_LAYOUT,
            TypeLayout::Explicit => TypeAttributes::EXPLICIT_LAYOUT,
        };
        self
    }

    /// Declared packing size
    #[must_use]
    pub fn packing(mut self, packing: u16) -> Self {
        self.packing = Some(packing);
        self
    }

    /// Declared total size
    #[must_use]
    pub fn class_size(mut self, size: u32) -> Self {
        self.class_size = Some(size);
        self
    }

    /// Attach an annotation
    #[must_use]
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Nest the type inside `outer`
    #[must_use]
    pub fn nested_in(mut self, outer: &CilTypeRc) -> Self {
        self.enclosing = Some(outer.clone());
        self
    }

    /// Register the type.
    ///
    /// # Errors
    /// Returns an error if the default base type is missing from the registry.
    pub fn build(self) -> Result<CilTypeRc> {
        let program = self.program;
        let registry = &program.registry;

        let base = match self.base {
            BaseChoice::Explicit(base) => Some(base),
            BaseChoice::None => None,
            BaseChoice::Default => match self.flavor {
                CilFlavor::Class => Some(registry.well_known("System.Object")?),
                CilFlavor::ValueType => Some(registry.well_known("System.ValueType")?),
                CilFlavor::Enum => Some(registry.well_known("System.Enum")?),
                _ => None,
            },
        };

        let name = if self.generic.is_empty() {
            self.name
        } else {
            format!("{}`{}", self.name, self.generic.len())
        };
        let generic_args: Vec<CilTypeRc> = self
            .generic
            .iter()
            .enumerate()
            .map(|(index, param)| program.generic_parameter(param, index, false))
            .collect();

        let token = program.module.reserve_token(TABLE_TYPE_DEF);
        let spec = TypeSpec {
            module: program.module.clone(),
            token,
            namespace: if self.enclosing.is_some() {
                String::new()
            } else {
                self.namespace
            },
            name,
            flavor: self.flavor,
            flags: self.flags,
            element: None,
            generic_definition: None,
            generic_args,
        };
        let ty = match &self.enclosing {
            Some(outer) => registry.define_nested_type(spec, outer),
            None => registry.define_type(spec),
        };
        program
            .module
            .bind_token(token, TokenTarget::Type(CilTypeRef::new(&ty)));

        if let Some(base) = base {
            ty.set_base(&base);
        }
        for iface in &self.interfaces {
            ty.interfaces.push(CilTypeRef::new(iface));
        }
        if let Some(packing) = self.packing {
            let _ = ty.packing_size.set(packing);
        }
        if let Some(size) = self.class_size {
            let _ = ty.class_size.set(size);
        }
        for annotation in self.annotations {
            ty.annotations.push(annotation);
        }

        Ok(ty)
    }
}

/// Builds one method; finish with [`MethodBuilder::build`].
pub struct MethodBuilder<'a> {
    program: &'a ProgramBuilder,
    declaring: Option<CilTypeRc>,
    name: String,
    access: MethodAccessFlags,
    flags: MethodModifiers,
    impl_flags: MethodImplOptions,
    return_type: Option<CilTypeRc>,
    params: Vec<Param>,
    generic_args: Vec<CilTypeRc>,
    annotations: Vec<Annotation>,
    body: Option<MethodBody>,
}

impl<'a> MethodBuilder<'a> {
    fn new(program: &'a ProgramBuilder, declaring: Option<CilTypeRc>, name: &str) -> Self {
        MethodBuilder {
            program,
            declaring,
            name: name.to_string(),
            access: MethodAccessFlags::PUBLIC,
            flags: MethodModifiers::HIDE_BY_SIG,
            impl_flags: MethodImplOptions::empty(),
            return_type: None,
            params: Vec::new(),
            generic_args: Vec::new(),
            annotations: Vec::new(),
            body: None,
        }
    }

    /// Make the method static
    #[must_use]
    pub fn static_method(mut self) -> Self {
        self.flags |= MethodModifiers::STATIC;
        self
    }

    /// Make the method virtual (overriding by default)
    #[must_use]
    pub fn virtual_method(mut self) -> Self {
        self.flags |= MethodModifiers::VIRTUAL;
        self
    }

    /// Start a new virtual slot instead of overriding
    #[must_use]
    pub fn new_slot(mut self) -> Self {
        self.flags |= MethodModifiers::VIRTUAL | MethodModifiers::NEW_SLOT;
        self
    }

    /// Make the method abstract (and virtual)
    #[must_use]
    pub fn abstract_method(mut self) -> Self {
        self.flags |= MethodModifiers::ABSTRACT | MethodModifiers::VIRTUAL;
        self
    }

    /// Make the method private
    #[must_use]
    pub fn private(mut self) -> Self {
        self.access = MethodAccessFlags::PRIVATE;
        self
    }

    /// Implemented by the runtime
    #[must_use]
    pub fn internal_call(mut self) -> Self {
        self.impl_flags |= MethodImplOptions::INTERNAL_CALL;
        self
    }

    /// Forwarded to native code through p/invoke
    #[must_use]
    pub fn pinvoke(mut self) -> Self {
        self.flags |= MethodModifiers::PINVOKE_IMPL | MethodModifiers::STATIC;
        self
    }

    /// Set the return type (default `System.Void`)
    #[must_use]
    pub fn returns(mut self, ty: &CilTypeRc) -> Self {
        self.return_type = Some(ty.clone());
        self
    }

    /// Append a parameter
    #[must_use]
    pub fn param(mut self, name: &str, ty: &CilTypeRc) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    /// Append an annotated parameter
    #[must_use]
    pub fn param_annotated(mut self, name: &str, ty: &CilTypeRc, annotation: Annotation) -> Self {
        self.params
            .push(Param::new(name, ty).with_annotation(annotation));
        self
    }

    /// Declare method generic parameters created with
    /// [`ProgramBuilder::generic_parameter`]
    #[must_use]
    pub fn generic_params(mut self, params: &[CilTypeRc]) -> Self {
        self.generic_args = params.to_vec();
        self
    }

    /// Attach an annotation
    #[must_use]
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Attach a complete body
    #[must_use]
    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a body consisting of `code` only
    #[must_use]
    pub fn il(self, code: Vec<u8>) -> Self {
        self.body(MethodBody::new(code))
    }

    /// Create the method and add it to its declaring type.
    ///
    /// # Errors
    /// Returns an error if `System.Void` is missing from the registry.
    pub fn build(self) -> Result<MethodRc> {
        let program = self.program;
        let return_type = match self.return_type {
            Some(ty) => ty,
            None => program.registry.well_known("System.Void")?,
        };

        let token = program.module.reserve_token(TABLE_METHOD_DEF);
        let method = Arc::new(Method::new(MethodSpec {
            token,
            name: self.name,
            access: self.access,
            flags: self.flags,
            impl_flags: self.impl_flags,
            declaring_type: self.declaring.clone(),
            return_type,
            params: self.params,
            generic_args: self.generic_args,
            generic_definition: None,
            member_definition: None,
            annotations: self.annotations,
        }));
        program
            .module
            .bind_token(token, TokenTarget::Method(MethodRef::new(&method)));

        if let Some(body) = self.body {
            method.set_body(body);
        }
        match &self.declaring {
            Some(declaring) => {
                declaring.methods.push(method.clone());
            }
            None => program.registry.register_method(&method),
        }

        Ok(method)
    }
}
