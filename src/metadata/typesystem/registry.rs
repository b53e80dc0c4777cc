//! Central registry of all types, modules and generic instantiations of a run.
//!
//! The [`TypeRegistry`] plays the role of the metadata provider: it owns every
//! descriptor, answers name lookups, builds constructed and generic types on demand and
//! resolves the tokens that appear in method bodies under a [`GenericContext`].
//!
//! # Registry Architecture
//!
//! - **Arenas**: `boxcar::Vec` of types, modules and instantiated methods; descriptors
//!   are only ever appended
//! - **Name indices**: `DashMap` from full name and (module, full name) to the
//!   first type registered under that name
//! - **Instantiation memo**: `DashMap` from structural key to the constructed type or
//!   instantiated method, so every instantiation exists exactly once
//!
//! A fresh registry already contains the core library module ([`CORELIB`]) with
//! `System.Object`, `System.ValueType`, `System.Enum`, `System.Array`, `System.String`,
//! `System.Void` and the primitive value types.
//!
//! # Examples
//!
//! ```rust
//! use cilfront::metadata::typesystem::TypeRegistry;
//!
//! let registry = TypeRegistry::new();
//! let int32 = registry.well_known("System.Int32")?;
//! let array = registry.make_sz_array(&int32);
//! assert_eq!(array.full_name(), "System.Int32[]");
//! assert_eq!(array.base().unwrap().full_name(), "System.Array");
//! # Ok::<(), cilfront::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashMap;

use crate::{
    metadata::{
        method::{Method, MethodModifiers, MethodRc, MethodSpec, Param},
        token::Token,
        typesystem::{
            CallSite, CilField, CilFlavor, CilModule, CilType, CilTypeRc, CilTypeRef, FieldRc,
            ModuleRc, TokenTarget, TypeAttributes, TypeSpec,
        },
    },
    Error, Result,
};

/// Name of the core library module every registry starts with
pub const CORELIB: &str = "System.Private.CoreLib";

/// Maximum nesting of generic instantiations before giving up
const MAX_INSTANTIATION_DEPTH: usize = 64;

const PRIMITIVES: &[&str] = &[
    "Void", "Boolean", "Char", "SByte", "Byte", "Int16", "UInt16", "Int32", "UInt32", "Int64",
    "UInt64", "Single", "Double", "IntPtr", "UIntPtr",
];

/// Generic arguments in scope while resolving a signature or token.
#[derive(Debug, Clone, Default)]
pub struct GenericContext {
    /// Arguments for `!n`
    pub type_args: Vec<CilTypeRc>,
    /// Arguments for `!!n`
    pub method_args: Vec<CilTypeRc>,
}

impl GenericContext {
    /// Context with explicit type and method arguments
    #[must_use]
    pub fn new(type_args: Vec<CilTypeRc>, method_args: Vec<CilTypeRc>) -> Self {
        GenericContext {
            type_args,
            method_args,
        }
    }

    /// The context a method body is resolved in: the arguments of its declaring type
    /// and its own generic arguments.
    #[must_use]
    pub fn for_method(method: &Method) -> Self {
        let type_args = method
            .declaring_type()
            .map(|t| t.generic_arguments())
            .unwrap_or_default();
        GenericContext {
            type_args,
            method_args: method.generic_arguments(),
        }
    }

    /// True if nothing can be substituted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty() && self.method_args.is_empty()
    }
}

/// A token resolved to strong descriptors.
#[derive(Debug, Clone)]
pub enum ResolvedToken {
    /// A type
    Type(CilTypeRc),
    /// A method
    Method(MethodRc),
    /// A field
    Field(FieldRc),
    /// A user string
    String(String),
    /// A call site signature
    Signature(CallSite),
}

/// Owner of every module, type and instantiated method of a run.
pub struct TypeRegistry {
    types: boxcar::Vec<CilTypeRc>,
    methods: boxcar::Vec<MethodRc>,
    modules: boxcar::Vec<ModuleRc>,
    by_name: DashMap<String, CilTypeRc>,
    by_module: DashMap<(String, String), CilTypeRc>,
    instances: DashMap<String, CilTypeRc>,
    method_instances: DashMap<String, MethodRc>,
    next_id: AtomicUsize,
    depth: AtomicUsize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a registry that contains the core library types.
    #[must_use]
    pub fn new() -> Self {
        let registry = TypeRegistry {
            types: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            modules: boxcar::Vec::new(),
            by_name: DashMap::new(),
            by_module: DashMap::new(),
            instances: DashMap::new(),
            method_instances: DashMap::new(),
            next_id: AtomicUsize::new(0),
            depth: AtomicUsize::new(0),
        };
        registry.add_corelib();
        registry
    }

    fn add_corelib(&self) {
        let corelib = self.create_module(CORELIB);
        let class = |name: &str, flavor: CilFlavor, flags: u32, base: Option<&CilTypeRc>| {
            let ty = self.define_type(TypeSpec {
                module: corelib.clone(),
                token: Token::default(),
                namespace: "System".to_string(),
                name: name.to_string(),
                flavor,
                flags: flags | TypeAttributes::PUBLIC,
                element: None,
                generic_definition: None,
                generic_args: Vec::new(),
            });
            if let Some(base) = base {
                ty.set_base(base);
            }
            ty
        };

        let object = class("Object", CilFlavor::Class, 0, None);
        let value_type = class("ValueType", CilFlavor::Class, TypeAttributes::ABSTRACT, Some(&object));
        class("Enum", CilFlavor::Class, TypeAttributes::ABSTRACT, Some(&value_type));
        class("Array", CilFlavor::Class, TypeAttributes::ABSTRACT, Some(&object));
        class("String", CilFlavor::Class, TypeAttributes::SEALED, Some(&object));
        for name in PRIMITIVES {
            class(
                name,
                CilFlavor::ValueType,
                TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
                Some(&value_type),
            );
        }
    }

    /// Create a module, or return the existing module of that name.
    pub fn create_module(&self, name: &str) -> ModuleRc {
        if let Some(module) = self.module(name) {
            return module;
        }
        let module = Arc::new(CilModule::new(name));
        self.modules.push(module.clone());
        module
    }

    /// Find a module by name
    #[must_use]
    pub fn module(&self, name: &str) -> Option<ModuleRc> {
        self.modules
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(_, m)| m.clone())
    }

    /// All modules in creation order
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleRc> {
        self.modules.iter().map(|(_, m)| m.clone()).collect()
    }

    /// The core library module
    #[must_use]
    pub fn corelib(&self) -> Option<ModuleRc> {
        self.module(CORELIB)
    }

    /// Register a new type definition and index it by name.
    pub fn define_type(&self, spec: TypeSpec) -> CilTypeRc {
        let ty = self.insert(spec);
        self.index(&ty);
        ty
    }

    /// Register a type nested in `outer`; it is indexed as `Outer+Name`.
    pub fn define_nested_type(&self, spec: TypeSpec, outer: &CilTypeRc) -> CilTypeRc {
        let ty = self.insert(spec);
        ty.set_enclosing(outer);
        self.index(&ty);
        ty
    }

    fn insert(&self, spec: TypeSpec) -> CilTypeRc {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ty = Arc::new(CilType::new(id, spec));
        self.types.push(ty.clone());
        ty
    }

    fn index(&self, ty: &CilTypeRc) {
        ty.module.types.push(CilTypeRef::new(ty));

        let full_name = ty.qualified_name();
        self.by_name
            .entry(full_name.clone())
            .or_insert_with(|| ty.clone());
        self.by_module
            .entry((ty.module.name.clone(), full_name))
            .or_insert_with(|| ty.clone());
    }

    /// Create a generic parameter type named `name` at position `index`.
    pub fn create_generic_parameter(
        &self,
        module: &ModuleRc,
        name: &str,
        index: usize,
        method: bool,
    ) -> CilTypeRc {
        self.insert(TypeSpec {
            module: module.clone(),
            token: Token::default(),
            namespace: String::new(),
            name: name.to_string(),
            flavor: CilFlavor::GenericParameter { index, method },
            flags: 0,
            element: None,
            generic_definition: None,
            generic_args: Vec::new(),
        })
    }

    /// Keep an instantiated or dynamic method alive for the run
    pub fn register_method(&self, method: &MethodRc) {
        self.methods.push(method.clone());
    }

    /// Type by arena id
    #[must_use]
    pub fn get(&self, id: usize) -> Option<CilTypeRc> {
        self.types
            .iter()
            .find(|(_, t)| t.id == id)
            .map(|(_, t)| t.clone())
    }

    /// Number of types, including constructed ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.count()
    }

    /// True if the registry holds no types
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.count() == 0
    }

    /// All types in creation order
    pub fn iter(&self) -> impl Iterator<Item = &CilTypeRc> {
        self.types.iter().map(|(_, t)| t)
    }

    /// The first type registered under the qualified name `full_name`
    #[must_use]
    pub fn find(&self, full_name: &str) -> Option<CilTypeRc> {
        self.by_name.get(full_name).map(|t| t.value().clone())
    }

    /// The type named `full_name` defined in `module`
    #[must_use]
    pub fn find_in_module(&self, module: &str, full_name: &str) -> Option<CilTypeRc> {
        self.by_module
            .get(&(module.to_string(), full_name.to_string()))
            .map(|t| t.value().clone())
    }

    /// Like [`TypeRegistry::find`], but a missing type is an error.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] if no type of that name exists.
    pub fn well_known(&self, full_name: &str) -> Result<CilTypeRc> {
        self.find(full_name)
            .ok_or_else(|| Error::TypeNotFound(full_name.to_string()))
    }

    /// Resolve an assembly-qualified name, `"Namespace.Type, Module"` or `"Namespace.Type"`.
    #[must_use]
    pub fn resolve_type_name(&self, name: &str) -> Option<CilTypeRc> {
        match name.split_once(',') {
            Some((type_name, rest)) => {
                let module = rest.split(',').next().unwrap_or_default().trim();
                self.find_in_module(module, type_name.trim())
            }
            None => self.find(name.trim()),
        }
    }

    fn constructed(&self, element: &CilTypeRc, flavor: CilFlavor) -> CilTypeRc {
        let key = format!("{}|{:?}", element.key(), flavor);
        if let Some(existing) = self.instances.get(&key) {
            return existing.value().clone();
        }

        let ty = self.insert(TypeSpec {
            module: element.module.clone(),
            token: Token::default(),
            namespace: String::new(),
            name: String::new(),
            flavor,
            flags: TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            element: Some(element.clone()),
            generic_definition: None,
            generic_args: Vec::new(),
        });
        if flavor.is_array() {
            if let Some(array) = self.find("System.Array") {
                ty.set_base(&array);
            }
        }
        self.instances.insert(key, ty.clone());
        ty
    }

    /// The single-dimensional array type of `element`
    pub fn make_sz_array(&self, element: &CilTypeRc) -> CilTypeRc {
        self.constructed(element, CilFlavor::SzArray)
    }

    /// The multi-dimensional array type of `element` with `rank` dimensions
    pub fn make_array(&self, element: &CilTypeRc, rank: u32) -> CilTypeRc {
        self.constructed(element, CilFlavor::Array { rank })
    }

    /// The unmanaged pointer type to `element`
    pub fn make_pointer(&self, element: &CilTypeRc) -> CilTypeRc {
        self.constructed(element, CilFlavor::Pointer)
    }

    /// The managed reference type to `element`
    pub fn make_by_ref(&self, element: &CilTypeRc) -> CilTypeRc {
        self.constructed(element, CilFlavor::ByRef)
    }

    /// Instantiate the generic type definition `definition` with `args`.
    ///
    /// Instantiations are memoized; instantiating with the definition's own parameters
    /// returns the definition. Members are created eagerly with their signatures
    /// substituted.
    ///
    /// # Errors
    /// Returns an error if the argument count does not match, or if instantiation
    /// nests deeper than the recursion limit.
    pub fn make_generic_type(
        &self,
        definition: &CilTypeRc,
        args: &[CilTypeRc],
    ) -> Result<CilTypeRc> {
        let definition = definition
            .generic_definition()
            .unwrap_or_else(|| definition.clone());
        let params = definition.generic_arguments();
        if params.len() != args.len() || params.is_empty() {
            return Err(Error::Error(format!(
                "Generic type {} expects {} arguments, got {}",
                definition.full_name(),
                params.len(),
                args.len()
            )));
        }
        if params.iter().zip(args).all(|(p, a)| Arc::ptr_eq(p, a)) {
            return Ok(definition);
        }

        let key = instance_key(&definition.key(), args);
        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing.value().clone());
        }

        let depth = self.depth.fetch_add(1, Ordering::Relaxed);
        if depth >= MAX_INSTANTIATION_DEPTH {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::RecursionLimit(MAX_INSTANTIATION_DEPTH));
        }

        let instance = self.insert(TypeSpec {
            module: definition.module.clone(),
            token: definition.token,
            namespace: definition.namespace.clone(),
            name: definition.name.clone(),
            flavor: definition.flavor,
            flags: definition.flags,
            element: None,
            generic_definition: Some(definition.clone()),
            generic_args: args.to_vec(),
        });
        self.instances.insert(key, instance.clone());

        let result = self.populate_instance(&definition, &instance, args);
        self.depth.fetch_sub(1, Ordering::Relaxed);
        result?;

        Ok(instance)
    }

    fn populate_instance(
        &self,
        definition: &CilTypeRc,
        instance: &CilTypeRc,
        args: &[CilTypeRc],
    ) -> Result<()> {
        let ctx = GenericContext::new(args.to_vec(), Vec::new());

        if let Some(enclosing) = definition.enclosing() {
            instance.set_enclosing(&enclosing);
        }
        if let Some(base) = definition.base() {
            instance.set_base(&self.substitute(&base, &ctx)?);
        }
        if let Some(packing) = definition.packing_size.get() {
            let _ = instance.packing_size.set(*packing);
        }
        if let Some(size) = definition.class_size.get() {
            let _ = instance.class_size.set(*size);
        }
        for (_, annotation) in definition.annotations.iter() {
            instance.annotations.push(annotation.clone());
        }
        for iface in definition.interface_list() {
            let iface = self.substitute(&iface, &ctx)?;
            instance.interfaces.push(CilTypeRef::new(&iface));
        }
        for field in definition.field_list() {
            let Some(field_type) = field.field_type() else {
                continue;
            };
            let field_type = self.substitute(&field_type, &ctx)?;
            instance.fields.push(Arc::new(CilField::new(
                field.token,
                field.name.clone(),
                field.flags,
                instance,
                &field_type,
                field.annotations.clone(),
            )));
        }
        for method in definition.method_list() {
            let member = self.instantiate_member(&method, instance, &ctx)?;
            instance.methods.push(member);
        }

        Ok(())
    }

    fn instantiate_member(
        &self,
        method: &MethodRc,
        instance: &CilTypeRc,
        ctx: &GenericContext,
    ) -> Result<MethodRc> {
        let return_type = match method.return_type() {
            Some(ret) => self.substitute(&ret, ctx)?,
            None => self.well_known("System.Void")?,
        };

        Ok(Arc::new(Method::new(MethodSpec {
            token: method.token,
            name: method.name.clone(),
            access: method.access,
            flags: method.flags,
            impl_flags: method.impl_flags,
            declaring_type: Some(instance.clone()),
            return_type,
            params: self.substitute_params(&method.params, ctx)?,
            generic_args: method.generic_arguments(),
            generic_definition: None,
            member_definition: Some(method.clone()),
            annotations: method.annotations.clone(),
        })))
    }

    fn substitute_params(&self, params: &[Param], ctx: &GenericContext) -> Result<Vec<Param>> {
        let mut result = Vec::with_capacity(params.len());
        for param in params {
            let Some(param_type) = param.param_type() else {
                return Err(Error::TypeNotFound(format!("parameter {}", param.name)));
            };
            let param_type = self.substitute(&param_type, ctx)?;
            let mut substituted = Param::new(param.name.clone(), &param_type);
            substituted.annotations = param.annotations.clone();
            result.push(substituted);
        }
        Ok(result)
    }

    /// Instantiate the generic method definition `definition` with `args`.
    ///
    /// # Errors
    /// Returns an error if `definition` is not a generic method definition or the
    /// argument count does not match its arity.
    pub fn make_generic_method(
        &self,
        definition: &MethodRc,
        args: &[CilTypeRc],
    ) -> Result<MethodRc> {
        let definition = definition
            .generic_definition()
            .unwrap_or_else(|| definition.clone());
        if definition.generic_arity() != args.len() || args.is_empty() {
            return Err(Error::Error(format!(
                "Generic method {} expects {} arguments, got {}",
                definition.full_name(),
                definition.generic_arity(),
                args.len()
            )));
        }

        let key = instance_key(&definition.key(), args);
        if let Some(existing) = self.method_instances.get(&key) {
            return Ok(existing.value().clone());
        }

        let type_args = definition
            .declaring_type()
            .map(|t| t.generic_arguments())
            .unwrap_or_default();
        let ctx = GenericContext::new(type_args, args.to_vec());
        let return_type = match definition.return_type() {
            Some(ret) => self.substitute(&ret, &ctx)?,
            None => self.well_known("System.Void")?,
        };

        let method = Arc::new(Method::new(MethodSpec {
            token: definition.token,
            name: definition.name.clone(),
            access: definition.access,
            flags: definition.flags,
            impl_flags: definition.impl_flags,
            declaring_type: definition.declaring_type(),
            return_type,
            params: self.substitute_params(&definition.params, &ctx)?,
            generic_args: args.to_vec(),
            generic_definition: Some(definition.clone()),
            member_definition: None,
            annotations: definition.annotations.clone(),
        }));
        self.register_method(&method);
        self.method_instances.insert(key, method.clone());
        Ok(method)
    }

    /// True if `ty` mentions a generic parameter anywhere.
    #[must_use]
    pub fn contains_generic_parameters(&self, ty: &CilType) -> bool {
        if ty.is_generic_parameter() || ty.is_generic_definition() {
            return true;
        }
        if let Some(element) = ty.element() {
            return self.contains_generic_parameters(&element);
        }
        ty.generic_definition().is_some()
            && ty
                .generic_arguments()
                .iter()
                .any(|arg| self.contains_generic_parameters(arg))
    }

    /// Replace the generic parameters in `ty` with the arguments from `ctx`.
    ///
    /// Parameters without a matching argument are kept.
    ///
    /// # Errors
    /// Propagates instantiation failures.
    pub fn substitute(&self, ty: &CilTypeRc, ctx: &GenericContext) -> Result<CilTypeRc> {
        if ctx.is_empty() || !self.contains_generic_parameters(ty) {
            return Ok(ty.clone());
        }

        match ty.flavor {
            CilFlavor::GenericParameter { index, method } => {
                let args = if method {
                    &ctx.method_args
                } else {
                    &ctx.type_args
                };
                Ok(args.get(index).cloned().unwrap_or_else(|| ty.clone()))
            }
            CilFlavor::SzArray | CilFlavor::Array { .. } | CilFlavor::Pointer | CilFlavor::ByRef => {
                let Some(element) = ty.element() else {
                    return Ok(ty.clone());
                };
                let element = self.substitute(&element, ctx)?;
                Ok(self.constructed(&element, ty.flavor))
            }
            _ => {
                let definition = ty.generic_definition().unwrap_or_else(|| ty.clone());
                let mut args = Vec::new();
                for arg in ty.generic_arguments() {
                    args.push(self.substitute(&arg, ctx)?);
                }
                self.make_generic_type(&definition, &args)
            }
        }
    }

    /// Map `method` into generic context `ctx`: re-home it on the substituted
    /// declaring type and re-instantiate its method arguments.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if the substituted declaring type has no
    /// corresponding member.
    pub fn substitute_method(&self, method: &MethodRc, ctx: &GenericContext) -> Result<MethodRc> {
        let (base, method_args) = match method.generic_definition() {
            Some(def) => (def, Some(method.generic_arguments())),
            None => (method.clone(), None),
        };

        let mut target = base.clone();
        if let Some(declaring) = base.declaring_type() {
            if !ctx.is_empty() && self.contains_generic_parameters(&declaring) {
                let new_declaring = self.substitute(&declaring, ctx)?;
                if !Arc::ptr_eq(&new_declaring, &declaring) {
                    target = self.corresponding_method(&new_declaring, &base)?;
                }
            }
        }

        match method_args {
            Some(args) => {
                let mut substituted = Vec::with_capacity(args.len());
                for arg in &args {
                    substituted.push(self.substitute(arg, ctx)?);
                }
                self.make_generic_method(&target, &substituted)
            }
            None => Ok(target),
        }
    }

    /// The member of `owner` that stems from the same definition as `method`.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if `owner` has no such member.
    pub fn corresponding_method(&self, owner: &CilTypeRc, method: &MethodRc) -> Result<MethodRc> {
        let root = method.member_definition().unwrap_or_else(|| method.clone());
        owner
            .methods
            .iter()
            .map(|(_, m)| m)
            .find(|m| {
                Arc::ptr_eq(m, &root)
                    || m.member_definition()
                        .is_some_and(|def| Arc::ptr_eq(&def, &root))
            })
            .cloned()
            .ok_or_else(|| {
                Error::MethodNotFound(format!("{} on {}", method.full_name(), owner.full_name()))
            })
    }

    /// Map `field` into generic context `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::FieldNotFound`] if the substituted declaring type lacks the field.
    pub fn substitute_field(&self, field: &FieldRc, ctx: &GenericContext) -> Result<FieldRc> {
        let Some(declaring) = field.declaring_type() else {
            return Ok(field.clone());
        };
        if ctx.is_empty() || !self.contains_generic_parameters(&declaring) {
            return Ok(field.clone());
        }

        let new_declaring = self.substitute(&declaring, ctx)?;
        new_declaring
            .find_field(&field.name)
            .ok_or_else(|| Error::FieldNotFound(field.full_name().to_string()))
    }

    /// Resolve `token` of `module` under `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for unknown tokens or targets that were dropped.
    pub fn resolve_token(
        &self,
        module: &CilModule,
        token: Token,
        ctx: &GenericContext,
    ) -> Result<ResolvedToken> {
        let Some(target) = module.lookup(token) else {
            return Err(malformed_error!(
                "Token {} does not resolve in module {}",
                token,
                module.name
            ));
        };

        match target {
            TokenTarget::Type(ty) => {
                let ty = ty
                    .upgrade()
                    .ok_or_else(|| malformed_error!("Token {} refers to a dropped type", token))?;
                Ok(ResolvedToken::Type(self.substitute(&ty, ctx)?))
            }
            TokenTarget::Method(method) => {
                let method = method.upgrade().ok_or_else(|| {
                    malformed_error!("Token {} refers to a dropped method", token)
                })?;
                Ok(ResolvedToken::Method(self.substitute_method(&method, ctx)?))
            }
            TokenTarget::Field(field) => {
                let field = field
                    .upgrade()
                    .ok_or_else(|| malformed_error!("Token {} refers to a dropped field", token))?;
                Ok(ResolvedToken::Field(self.substitute_field(&field, ctx)?))
            }
            TokenTarget::String(value) => Ok(ResolvedToken::String(value)),
            TokenTarget::Signature(site) => Ok(ResolvedToken::Signature(site)),
        }
    }

    /// True if `ty` strictly derives from `ancestor`.
    #[must_use]
    pub fn is_subclass_of(&self, ty: &CilType, ancestor: &CilType) -> bool {
        let mut current = ty.base();
        while let Some(base) = current {
            if base.is_same(ancestor) {
                return true;
            }
            current = base.base();
        }
        false
    }

    /// True if `ty` implements `iface` directly, through its bases, or through
    /// interface inheritance.
    #[must_use]
    pub fn implements(&self, ty: &CilType, iface: &CilType) -> bool {
        let mut pending: Vec<CilTypeRc> = ty.interface_list();
        let mut current = ty.base();
        while let Some(base) = current {
            pending.extend(base.interface_list());
            current = base.base();
        }

        let mut depth = 0;
        while let Some(candidate) = pending.pop() {
            if candidate.is_same(iface) {
                return true;
            }
            depth += 1;
            if depth > 1024 {
                break;
            }
            pending.extend(candidate.interface_list());
        }
        false
    }

    /// True if a value of type `source` can be stored in a location of type `target`.
    #[must_use]
    pub fn is_assignable_from(&self, target: &CilType, source: &CilType) -> bool {
        if target.is_same(source) || self.is_subclass_of(source, target) {
            return true;
        }
        if target.is_interface() {
            return self.implements(source, target);
        }
        false
    }

    /// The method `method` overrides in the nearest base type, if any.
    ///
    /// Non-virtual and new-slot methods override nothing.
    #[must_use]
    pub fn overridden_method(&self, method: &Method) -> Option<MethodRc> {
        if !method.is_virtual()
            || method.flags.contains(MethodModifiers::NEW_SLOT)
        {
            return None;
        }

        let declaring = method.declaring_type()?;
        let signature: Vec<String> = method.param_types().iter().map(|t| t.key()).collect();
        let mut current = declaring.base();
        while let Some(base) = current {
            let found = base.methods.iter().map(|(_, m)| m).find(|candidate| {
                candidate.name == method.name
                    && candidate.is_virtual()
                    && candidate.generic_arity() == method.generic_arity()
                    && candidate
                        .param_types()
                        .iter()
                        .map(|t| t.key())
                        .eq(signature.iter().cloned())
            });
            if let Some(found) = found {
                return Some(found.clone());
            }
            current = base.base();
        }
        None
    }

    /// The root definition of the override chain of `method` (the method itself if it
    /// overrides nothing).
    #[must_use]
    pub fn ultimate_base_method(&self, method: &MethodRc) -> MethodRc {
        let mut current = method.clone();
        while let Some(base) = self.overridden_method(&current) {
            if Arc::ptr_eq(&base, &current) {
                break;
            }
            current = base;
        }
        current
    }

    /// Find a method declared on `ty` by name, staticness and exact parameter types.
    #[must_use]
    pub fn find_method(
        &self,
        ty: &CilType,
        name: &str,
        is_static: bool,
        param_types: &[CilTypeRc],
    ) -> Option<MethodRc> {
        ty.methods
            .iter()
            .map(|(_, m)| m)
            .find(|m| {
                m.name == name
                    && m.is_static() == is_static
                    && same_types(&m.param_types(), param_types)
            })
            .cloned()
    }

    /// Like [`TypeRegistry::find_method`], also searching the base type chain.
    #[must_use]
    pub fn find_method_in_hierarchy(
        &self,
        ty: &CilTypeRc,
        name: &str,
        is_static: bool,
        param_types: &[CilTypeRc],
    ) -> Option<MethodRc> {
        let mut current = Some(ty.clone());
        while let Some(candidate) = current {
            if let Some(found) = self.find_method(&candidate, name, is_static, param_types) {
                return Some(found);
            }
            current = candidate.base();
        }
        None
    }
}

/// True if both lists denote the same types in the same order
#[must_use]
pub fn same_types(left: &[CilTypeRc], right: &[CilTypeRc]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.is_same(r))
}

fn instance_key(definition_key: &str, args: &[CilTypeRc]) -> String {
    let args: Vec<String> = args.iter().map(|a| a.key()).collect();
    format!("{}<{}>", definition_key, args.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corelib_types() {
        let registry = TypeRegistry::new();
        let int32 = registry.well_known("System.Int32").unwrap();
        assert!(int32.is_value_type());
        assert_eq!(int32.base().unwrap().full_name(), "System.ValueType");
        assert_eq!(int32.module.name, CORELIB);
        assert!(registry.find("System.Object").unwrap().base().is_none());
        assert!(registry.well_known("System.Nope").is_err());
    }

    #[test]
    fn resolve_names() {
        let registry = TypeRegistry::new();
        assert!(registry
            .resolve_type_name("System.String, System.Private.CoreLib")
            .is_some());
        assert!(registry
            .resolve_type_name("System.String, Other.Module")
            .is_none());
        assert!(registry.resolve_type_name("System.String").is_some());
    }

    #[test]
    fn constructed_types_are_memoized() {
        let registry = TypeRegistry::new();
        let byte = registry.well_known("System.Byte").unwrap();

        let a = registry.make_sz_array(&byte);
        let b = registry.make_sz_array(&byte);
        assert!(Arc::ptr_eq(&a, &b));

        let ptr = registry.make_pointer(&byte);
        assert_eq!(ptr.full_name(), "System.Byte*");
        assert!(ptr.base().is_none());

        let by_ref = registry.make_by_ref(&byte);
        assert_eq!(by_ref.full_name(), "&System.Byte");

        let matrix = registry.make_array(&byte, 3);
        assert_eq!(matrix.full_name(), "System.Byte[,,]");
    }

    #[test]
    fn subclass_and_assignability() {
        let registry = TypeRegistry::new();
        let object = registry.well_known("System.Object").unwrap();
        let value_type = registry.well_known("System.ValueType").unwrap();
        let int32 = registry.well_known("System.Int32").unwrap();

        assert!(registry.is_subclass_of(&int32, &object));
        assert!(registry.is_subclass_of(&int32, &value_type));
        assert!(!registry.is_subclass_of(&int32, &int32));
        assert!(registry.is_assignable_from(&object, &int32));
        assert!(registry.is_assignable_from(&int32, &int32));
        assert!(!registry.is_assignable_from(&int32, &object));
    }
}
