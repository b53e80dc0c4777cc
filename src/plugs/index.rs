//! Discovery of plug types and the four target buckets they are filed under.

use std::collections::HashMap;

use strum::{Display, EnumIter};
use tracing::{debug, info};

use crate::{
    metadata::{
        annotations::PlugAnnotation,
        typesystem::{CilTypeRc, ModuleRc, TypeRegistry},
    },
    Error, Result,
};

/// The bucket a plug type is filed under.
///
/// Inheritable plugs apply to their target and every type deriving from it; generic
/// buckets hold plugs whose target is an open generic type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PlugKind {
    /// Plugs for exactly one closed type
    Exact,
    /// Plugs for exactly one open generic type
    ExactGeneric,
    /// Plugs for a closed type and its descendants
    Inheritable,
    /// Plugs for an open generic type and its descendants
    InheritableGeneric,
}

impl PlugKind {
    /// The bucket for a target with the given shape
    #[must_use]
    pub fn for_target(is_generic: bool, inheritable: bool) -> Self {
        match (is_generic, inheritable) {
            (false, false) => PlugKind::Exact,
            (false, true) => PlugKind::Inheritable,
            (true, false) => PlugKind::ExactGeneric,
            (true, true) => PlugKind::InheritableGeneric,
        }
    }
}

/// Target types mapped to the plug types implementing them, in discovery order.
#[derive(Debug, Default)]
pub struct PlugBucket {
    targets: Vec<CilTypeRc>,
    implementors: HashMap<String, Vec<CilTypeRc>>,
}

impl PlugBucket {
    /// File `plug` under `target`
    pub fn insert(&mut self, target: &CilTypeRc, plug: &CilTypeRc) {
        let key = target.key();
        match self.implementors.get_mut(&key) {
            Some(plugs) => plugs.push(plug.clone()),
            None => {
                self.targets.push(target.clone());
                self.implementors.insert(key, vec![plug.clone()]);
            }
        }
    }

    /// The plug types registered for `target`
    #[must_use]
    pub fn get(&self, target: &CilTypeRc) -> Option<&[CilTypeRc]> {
        self.implementors.get(&target.key()).map(Vec::as_slice)
    }

    /// Targets with their plug types, in the order the targets were first seen
    pub fn iter(&self) -> impl Iterator<Item = (&CilTypeRc, &[CilTypeRc])> {
        self.targets.iter().filter_map(|target| {
            self.implementors
                .get(&target.key())
                .map(|plugs| (target, plugs.as_slice()))
        })
    }

    /// Number of distinct targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if no plug was filed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// All plug types known to a compilation run.
#[derive(Debug, Default)]
pub struct PlugIndex {
    exact: PlugBucket,
    exact_generic: PlugBucket,
    inheritable: PlugBucket,
    inheritable_generic: PlugBucket,
}

impl PlugIndex {
    /// An empty index
    #[must_use]
    pub fn new() -> Self {
        PlugIndex::default()
    }

    /// The bucket of the given kind
    #[must_use]
    pub fn bucket(&self, kind: PlugKind) -> &PlugBucket {
        match kind {
            PlugKind::Exact => &self.exact,
            PlugKind::ExactGeneric => &self.exact_generic,
            PlugKind::Inheritable => &self.inheritable,
            PlugKind::InheritableGeneric => &self.inheritable_generic,
        }
    }

    fn bucket_mut(&mut self, kind: PlugKind) -> &mut PlugBucket {
        match kind {
            PlugKind::Exact => &mut self.exact,
            PlugKind::ExactGeneric => &mut self.exact_generic,
            PlugKind::Inheritable => &mut self.inheritable,
            PlugKind::InheritableGeneric => &mut self.inheritable_generic,
        }
    }

    /// File `plug` for `target` in the bucket matching `annotation`
    pub fn insert(
        &mut self,
        registry: &TypeRegistry,
        target: &CilTypeRc,
        plug: &CilTypeRc,
        annotation: &PlugAnnotation,
    ) -> PlugKind {
        let kind = PlugKind::for_target(
            registry.contains_generic_parameters(target),
            annotation.inheritable,
        );
        self.bucket_mut(kind).insert(target, plug);
        kind
    }

    /// Number of (target, plug type) registrations over all buckets
    #[must_use]
    pub fn plug_count(&self) -> usize {
        [
            &self.exact,
            &self.exact_generic,
            &self.inheritable,
            &self.inheritable_generic,
        ]
        .iter()
        .map(|bucket| bucket.iter().map(|(_, plugs)| plugs.len()).sum::<usize>())
        .sum()
    }

    /// True if no plug type was registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plug_count() == 0
    }

    /// Register every type of `modules` carrying `Plug` annotations.
    ///
    /// A plug type may carry several annotations and is filed once per target. A
    /// target given by name is resolved through the registry; optional annotations
    /// whose target does not resolve are skipped.
    ///
    /// # Errors
    /// Returns [`Error::PlugTargetNotFound`] if a non-optional target does not resolve.
    pub fn find_implementors(&mut self, registry: &TypeRegistry, modules: &[ModuleRc]) -> Result<()> {
        for module in modules {
            info!("Loading plugs from assembly: {}", module.name);

            for plug_type in module.type_list() {
                for annotation in plug_type.plug_annotations() {
                    let target = match annotation.target.as_ref().and_then(|t| t.upgrade()) {
                        Some(target) => target,
                        None => match resolve_target_name(registry, &annotation) {
                            Ok(target) => target,
                            Err(_) if annotation.is_optional => continue,
                            Err(error) => return Err(error),
                        },
                    };

                    let kind = self.insert(registry, &target, &plug_type, &annotation);
                    debug!(
                        "Plug found: {} in {} ({})",
                        target.full_name(),
                        plug_type.full_name(),
                        kind
                    );
                }
            }
        }

        Ok(())
    }
}

fn resolve_target_name(registry: &TypeRegistry, annotation: &PlugAnnotation) -> Result<CilTypeRc> {
    let Some(name) = annotation.target_name.as_deref() else {
        return Err(Error::PlugTargetNotFound("Missing TargetName".to_string()));
    };

    registry
        .resolve_type_name(name)
        .ok_or_else(|| Error::PlugTargetNotFound(name.to_string()))
}
