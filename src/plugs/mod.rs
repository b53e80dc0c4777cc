//! Plug discovery and resolution.
//!
//! A plug is a replacement implementation for a method (or field) of another type,
//! used when the original depends on services the compilation target does not have.
//! Plug types announce their target with a `Plug` annotation; their public static
//! methods replace the target's members of the same name and signature.
//!
//! # Key Types
//! - [`PlugManager`] - Owns the plug index, the field plugs and the resolution cache
//! - [`PlugIndex`] - Plug types filed by target in four buckets, see [`PlugKind`]
//! - [`FieldPlugs`] - Field plugs per plugged type
//!
//! # Resolution order
//! 1. Plugs registered for exactly the declaring type of the method
//! 2. Inheritable plugs registered for any ancestor of the declaring type; the first
//!    registration (in discovery order) that yields a plug wins
//! 3. For a method of a closed generic type, plugs registered for its open definition.
//!    The plug type must itself be generic; it is closed over the same type arguments.
//!    A non-generic plug type leaves the method unplugged.
//!
//! Results, including "no plug", are cached per method for the lifetime of the manager.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use cilfront::prelude::*;
//! use cilfront::metadata::annotations::{Annotation, PlugAnnotation};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! let app = ProgramBuilder::new(&registry, "App");
//! let console = app.class("App", "Console").build()?;
//! let beep = app.method(&console, "Beep").static_method().internal_call().build()?;
//!
//! let plugs = ProgramBuilder::new(&registry, "Plugs");
//! let console_impl = plugs
//!     .class("Plugs", "ConsoleImpl")
//!     .annotate(Annotation::Plug(PlugAnnotation::for_type(&console)))
//!     .build()?;
//! let beep_plug = plugs.method(&console_impl, "Beep").static_method().build()?;
//!
//! let mut manager = PlugManager::new(registry.clone());
//! manager.find_plug_implementors(&[plugs.module().clone()])?;
//! manager.scan_found_plugs()?;
//! let found = manager.resolve_plug(&beep)?.expect("plugged");
//! assert!(Arc::ptr_eq(&found, &beep_plug));
//! # Ok::<(), cilfront::Error>(())
//! ```

mod index;
mod resolver;
mod validate;

pub use index::{PlugBucket, PlugIndex, PlugKind};
pub use validate::{matches_target_member, scan_found_plugs, FieldPlugs};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::{
    metadata::{
        annotations::PlugFieldAnnotation,
        diagnostics::Diagnostics,
        method::MethodRc,
        typesystem::{CilTypeRc, ModuleRc, TypeRegistry},
    },
    Result,
};

/// Finds plug types, checks them and resolves plugs for methods.
pub struct PlugManager {
    registry: Arc<TypeRegistry>,
    index: PlugIndex,
    fields: FieldPlugs,
    resolved: DashMap<String, Option<MethodRc>>,
    diagnostics: Arc<Diagnostics>,
}

impl PlugManager {
    /// A manager without any plugs
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        PlugManager {
            registry,
            index: PlugIndex::new(),
            fields: FieldPlugs::default(),
            resolved: DashMap::new(),
            diagnostics: Arc::new(Diagnostics::new()),
        }
    }

    /// Report plug warnings to `diagnostics`
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Collected warnings
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// The plug index
    #[must_use]
    pub fn index(&self) -> &PlugIndex {
        &self.index
    }

    /// All collected field plugs
    #[must_use]
    pub fn field_plugs(&self) -> &FieldPlugs {
        &self.fields
    }

    /// The plug for field `field_id` of `target`
    #[must_use]
    pub fn field_plug(&self, target: &CilTypeRc, field_id: &str) -> Option<&PlugFieldAnnotation> {
        self.fields.get(target, field_id)
    }

    /// Number of methods with a cached resolution
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Register the plug types declared in `modules`.
    ///
    /// # Errors
    /// Returns [`crate::Error::PlugTargetNotFound`] for unresolvable non-optional targets.
    pub fn find_plug_implementors(&mut self, modules: &[ModuleRc]) -> Result<()> {
        self.index.find_implementors(&self.registry, modules)
    }

    /// Check registered plug methods against their targets and collect field plugs.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicatePlugField`] for a field plugged twice by one type.
    pub fn scan_found_plugs(&mut self) -> Result<()> {
        let fields = scan_found_plugs(&self.registry, &self.index, &self.diagnostics)?;
        self.fields = fields;
        Ok(())
    }

    /// The plug replacing `method`, if any.
    ///
    /// # Errors
    /// Returns an error if a plug names an unknown `FieldType` or instantiating a
    /// generic plug fails.
    pub fn resolve_plug(&self, method: &MethodRc) -> Result<Option<MethodRc>> {
        let key = method.key();
        if let Some(cached) = self.resolved.get(&key) {
            return Ok(cached.value().clone());
        }

        let result = self.resolve_uncached(method)?;
        if let Some(plug) = &result {
            debug!("Plug for {} is {}", method.full_name(), plug.full_name());
        }
        self.resolved.insert(key, result.clone());
        Ok(result)
    }

    fn resolve_uncached(&self, method: &MethodRc) -> Result<Option<MethodRc>> {
        let Some(declaring) = method.declaring_type() else {
            return Ok(None);
        };

        if let Some(plugs) = self.index.bucket(PlugKind::Exact).get(&declaring) {
            if let Some(found) = resolver::resolve_in(&self.registry, &declaring, plugs, method)? {
                return Ok(Some(found));
            }
        }

        // An exact plug type without a matching method still lets inheritable ones match
        for (ancestor, plugs) in self.index.bucket(PlugKind::Inheritable).iter() {
            if self.registry.is_subclass_of(&declaring, ancestor) {
                if let Some(found) = resolver::resolve_in(&self.registry, &declaring, plugs, method)? {
                    return Ok(Some(found));
                }
            }
        }

        if declaring.is_generic_instance() {
            return self.resolve_generic(method, &declaring);
        }

        Ok(None)
    }

    fn resolve_generic(&self, method: &MethodRc, declaring: &CilTypeRc) -> Result<Option<MethodRc>> {
        let Some(definition) = declaring.generic_definition() else {
            return Ok(None);
        };

        // The member of the open definition this method was instantiated from
        let candidates: Vec<MethodRc> = definition
            .method_list()
            .into_iter()
            .filter(|m| {
                m.name == method.name
                    && m.is_static() == method.is_static()
                    && m.is_public() == method.is_public()
                    && m.params.len() == method.params.len()
            })
            .collect();
        let [open_method] = candidates.as_slice() else {
            return Ok(None);
        };

        for kind in [PlugKind::ExactGeneric, PlugKind::InheritableGeneric] {
            let Some(plugs) = self.index.bucket(kind).get(&definition) else {
                continue;
            };
            let Some(open_plug) = resolver::resolve_with_params(
                &self.registry,
                &definition,
                plugs,
                open_method,
                method.param_types(),
            )?
            else {
                continue;
            };

            // Only a generic plug type can be closed over the target's arguments
            let Some(plug_type) = open_plug
                .declaring_type()
                .filter(|plug_type| plug_type.is_generic_definition())
            else {
                debug!(
                    "Plug {} for {} is not generic, {} stays unplugged",
                    open_plug.full_name(),
                    definition.full_name(),
                    method.full_name()
                );
                return Ok(None);
            };

            let closed = self
                .registry
                .make_generic_type(&plug_type, &declaring.generic_arguments())?;
            let mut plug = self.registry.corresponding_method(&closed, &open_plug)?;
            if plug.is_generic_method_definition() && method.is_generic_instance() {
                plug = self
                    .registry
                    .make_generic_method(&plug, &method.generic_arguments())?;
            }
            return Ok(Some(plug));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            annotations::{Annotation, PlugAnnotation},
            typesystem::{ProgramBuilder, TypeRegistry},
        },
        plugs::PlugManager,
    };

    #[test]
    fn exact_plugs_take_precedence() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let base = app.class("App", "Base").build().unwrap();
        let derived = app.class("App", "Derived").base(&base).build().unwrap();
        let run = app.method(&derived, "Run").static_method().build().unwrap();
        let other = app.method(&derived, "Other").static_method().build().unwrap();

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let inherited = plugs
            .class("Plugs", "BaseImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&base).inheritable()))
            .build()
            .unwrap();
        let exact = plugs
            .class("Plugs", "DerivedImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&derived)))
            .build()
            .unwrap();
        let inherited_run = plugs.method(&inherited, "Run").static_method().build().unwrap();
        let inherited_other = plugs.method(&inherited, "Other").static_method().build().unwrap();
        let exact_run = plugs.method(&exact, "Run").static_method().build().unwrap();

        let mut manager = PlugManager::new(registry.clone());
        manager
            .find_plug_implementors(&[plugs.module().clone()])
            .unwrap();
        manager.scan_found_plugs().unwrap();

        let found = manager.resolve_plug(&run).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &exact_run));
        assert!(!Arc::ptr_eq(&found, &inherited_run));

        // Falls through to the inheritable bucket at method level
        let found = manager.resolve_plug(&other).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &inherited_other));

        // Inheritable plugs do not apply to the target itself
        let base_run = app.method(&base, "Run").static_method().build().unwrap();
        assert!(manager.resolve_plug(&base_run).unwrap().is_none());
        assert_eq!(manager.resolved_count(), 3);
    }

    #[test]
    fn generic_plugs_are_closed_over_type_arguments() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let int32 = app.primitive("Int32").unwrap();
        let object = app.primitive("Object").unwrap();
        let boxed = app.class("App", "Box").generic(&["T"]).build().unwrap();
        app.method(&boxed, "Clear").build().unwrap();

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let box_impl = plugs
            .class("Plugs", "BoxImpl")
            .generic(&["T"])
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&boxed)))
            .build()
            .unwrap();
        plugs
            .method(&box_impl, "Clear")
            .static_method()
            .param("aThis", &object)
            .build()
            .unwrap();

        let mut manager = PlugManager::new(registry.clone());
        manager
            .find_plug_implementors(&[plugs.module().clone()])
            .unwrap();

        let closed = registry.make_generic_type(&boxed, &[int32.clone()]).unwrap();
        let clear = closed.find_methods("Clear").pop().unwrap();
        let plug = manager.resolve_plug(&clear).unwrap().unwrap();
        let plug_type = plug.declaring_type().unwrap();
        assert!(plug_type.is_generic_instance());
        assert!(plug_type.generic_arguments()[0].is_same(&int32));
        assert_eq!(plug.name, "Clear");
    }
}
