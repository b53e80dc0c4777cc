//! Sanity checks over discovered plugs and collection of field plugs.
//!
//! Every public static method of a plug type should correspond to some member of the
//! plugged type. Methods that do not are reported, not rejected: a plug library may
//! carry plugs for members that no longer exist.

use std::collections::HashMap;

use tracing::warn;

use crate::{
    metadata::{
        annotations::PlugFieldAnnotation,
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
        method::MethodRc,
        typesystem::{CilTypeRc, TypeRegistry},
    },
    plugs::{PlugIndex, PlugKind},
    Error, Result,
};

/// Field plugs declared by plug types, grouped by plugged type.
#[derive(Debug, Default)]
pub struct FieldPlugs {
    by_target: HashMap<String, HashMap<String, PlugFieldAnnotation>>,
}

impl FieldPlugs {
    /// Record `plug` for `target`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicatePlugField`] if the field id is already plugged.
    pub fn insert(&mut self, target: &CilTypeRc, plug: PlugFieldAnnotation) -> Result<()> {
        let fields = self.by_target.entry(target.key()).or_default();
        if fields.contains_key(&plug.field_id) {
            return Err(Error::DuplicatePlugField {
                target: target.full_name().to_string(),
                field_id: plug.field_id,
            });
        }
        fields.insert(plug.field_id.clone(), plug);
        Ok(())
    }

    /// All field plugs of `target`, keyed by field id
    #[must_use]
    pub fn for_target(&self, target: &CilTypeRc) -> Option<&HashMap<String, PlugFieldAnnotation>> {
        self.by_target.get(&target.key())
    }

    /// The plug for field `field_id` of `target`
    #[must_use]
    pub fn get(&self, target: &CilTypeRc, field_id: &str) -> Option<&PlugFieldAnnotation> {
        self.for_target(target).and_then(|fields| fields.get(field_id))
    }

    /// Number of plugged fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.values().map(HashMap::len).sum()
    }

    /// True if no field is plugged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check the plug methods of the exact and inheritable buckets and collect field plugs.
///
/// # Errors
/// Returns [`Error::DuplicatePlugField`] if a plug type plugs the same field twice.
pub fn scan_found_plugs(
    registry: &TypeRegistry,
    index: &PlugIndex,
    diagnostics: &Diagnostics,
) -> Result<FieldPlugs> {
    let mut fields = FieldPlugs::default();

    for kind in [PlugKind::Exact, PlugKind::Inheritable] {
        for (target, plugs) in index.bucket(kind).iter() {
            for plug in plugs {
                check_plug_methods(registry, target, plug, diagnostics);

                for field in plug.plug_field_annotations() {
                    fields.insert(target, field)?;
                }
            }
        }
    }

    Ok(fields)
}

fn check_plug_methods(
    registry: &TypeRegistry,
    target: &CilTypeRc,
    plug: &CilTypeRc,
    diagnostics: &Diagnostics,
) {
    for method in plug.method_list() {
        if !method.is_public() || !method.is_static() {
            continue;
        }

        match method.plug_method_annotation() {
            Some(annotation) => {
                if annotation.is_wildcard && annotation.assembler.is_none() {
                    warn!("Wildcard PlugMethods need to use an assembler for now.");
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticSeverity::Warning,
                            DiagnosticCategory::Plug,
                            "Wildcard PlugMethods need to use an assembler for now.",
                        )
                        .with_item(method.full_name()),
                    );
                }
            }
            None => {
                if !matches_target_member(registry, target, &method) {
                    warn!(
                        "Invalid plug method! Target method {} not found",
                        method.full_name()
                    );
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticSeverity::Warning,
                            DiagnosticCategory::Plug,
                            format!(
                                "Invalid plug method! Target method {} not found",
                                method.full_name()
                            ),
                        )
                        .with_item(method.full_name()),
                    );
                }
            }
        }
    }
}

// By-ref parameters compare by their element; pointers match anything
fn comparable_shape(ty: Option<CilTypeRc>) -> Option<CilTypeRc> {
    let ty = ty?;
    if ty.is_by_ref() {
        ty.element()
    } else if ty.is_pointer() {
        None
    } else {
        Some(ty)
    }
}

fn same_shape(left: Option<&CilTypeRc>, right: Option<&CilTypeRc>) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => l.is_same(r),
        _ => false,
    }
}

/// True if `plug_method` plausibly replaces a member of `target`.
///
/// Constructor plugs, and plugs taking raw field or object pointer parameters, are
/// accepted without looking at the target. Otherwise a same-named member of `target`
/// must have the same parameter shapes. For an instance member the leading `this`
/// parameter of the plug may be present or not: the first mismatch restarts the
/// comparison one plug parameter further.
#[must_use]
pub fn matches_target_member(
    registry: &TypeRegistry,
    target: &CilTypeRc,
    plug_method: &MethodRc,
) -> bool {
    if plug_method.name.eq_ignore_ascii_case("ctor") || plug_method.name.eq_ignore_ascii_case("cctor") {
        return true;
    }

    if plug_method
        .params
        .iter()
        .any(|p| p.is_field_access() || p.is_object_pointer_access())
    {
        return true;
    }

    let plug_params: Vec<Option<CilTypeRc>> = plug_method
        .params
        .iter()
        .map(|p| comparable_shape(p.param_type()))
        .collect();

    for candidate in target.find_methods(&plug_method.name) {
        let candidate_params: Vec<Option<CilTypeRc>> = candidate
            .params
            .iter()
            .map(|p| comparable_shape(p.param_type()))
            .collect();

        let matched = if candidate.is_static() {
            candidate_params.len() == plug_params.len()
                && candidate_params
                    .iter()
                    .zip(&plug_params)
                    .all(|(c, p)| match (c, p) {
                        (None, None) => true,
                        (None, Some(_)) => false,
                        (Some(_), _) => same_shape(c.as_ref(), p.as_ref()),
                    })
        } else {
            matches_instance_member(registry, &candidate, &candidate_params, &plug_params)
        };

        if matched {
            return true;
        }
    }

    false
}

fn matches_instance_member(
    registry: &TypeRegistry,
    candidate: &MethodRc,
    candidate_params: &[Option<CilTypeRc>],
    plug_params: &[Option<CilTypeRc>],
) -> bool {
    if candidate_params.len() != plug_params.len()
        && candidate_params.len() + 1 != plug_params.len()
    {
        return false;
    }

    let mut ok = true;
    let mut offset = 0;
    let mut i = 0;
    while i < candidate_params.len() && i + offset < plug_params.len() {
        if let Some(plug_param) = &plug_params[i + offset] {
            if !same_shape(Some(plug_param), candidate_params[i].as_ref()) {
                if offset == 0 {
                    offset = 1;
                    i = 0;
                    continue;
                }
                ok = false;
                break;
            }
        }
        i += 1;
    }

    if candidate_params.is_empty() && !plug_params.is_empty() {
        // The plug may declare `this` as any base of the plugged type
        ok = match (&plug_params[0], candidate.declaring_type()) {
            (None, _) => true,
            (Some(this), Some(declaring)) => registry.is_assignable_from(this, &declaring),
            (Some(_), None) => false,
        };
    }

    ok
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        metadata::{
            annotations::{Annotation, PlugAnnotation, PlugFieldAnnotation, PlugMethodAnnotation},
            diagnostics::Diagnostics,
            typesystem::{ProgramBuilder, TypeRegistry},
        },
        plugs::{scan_found_plugs, validate::matches_target_member, PlugIndex},
        Error,
    };

    #[test]
    fn instance_plugs_shift_past_this() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let int32 = app.primitive("Int32").unwrap();
        let object = app.primitive("Object").unwrap();
        let target = app.class("App", "Target").build().unwrap();
        app.method(&target, "Add").param("value", &int32).build().unwrap();
        app.method(&target, "Clear").build().unwrap();
        app.method(&target, "Parse")
            .static_method()
            .param("value", &int32)
            .build()
            .unwrap();

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let impl_type = plugs.class("Plugs", "TargetImpl").build().unwrap();
        let add = plugs
            .method(&impl_type, "Add")
            .static_method()
            .param("aThis", &target)
            .param("value", &int32)
            .build()
            .unwrap();
        let clear = plugs
            .method(&impl_type, "Clear")
            .static_method()
            .param("aThis", &object)
            .build()
            .unwrap();
        let parse = plugs
            .method(&impl_type, "Parse")
            .static_method()
            .param("value", &int32)
            .build()
            .unwrap();
        let stale = plugs
            .method(&impl_type, "Parse")
            .static_method()
            .param("value", &object)
            .build()
            .unwrap();
        let missing = plugs.method(&impl_type, "Missing").static_method().build().unwrap();

        assert!(matches_target_member(&registry, &target, &add));
        assert!(matches_target_member(&registry, &target, &clear));
        assert!(matches_target_member(&registry, &target, &parse));
        assert!(!matches_target_member(&registry, &target, &stale));
        assert!(!matches_target_member(&registry, &target, &missing));
    }

    #[test]
    fn mismatches_are_warnings() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let target = app.class("App", "Target").build().unwrap();

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let impl_type = plugs
            .class("Plugs", "TargetImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&target)))
            .build()
            .unwrap();
        plugs.method(&impl_type, "Gone").static_method().build().unwrap();
        plugs
            .method(&impl_type, "Any")
            .static_method()
            .annotate(Annotation::PlugMethod(PlugMethodAnnotation {
                is_wildcard: true,
                ..Default::default()
            }))
            .build()
            .unwrap();

        let mut index = PlugIndex::new();
        index
            .find_implementors(&registry, &[plugs.module().clone()])
            .unwrap();
        let diagnostics = Diagnostics::new();
        let fields = scan_found_plugs(&registry, &index, &diagnostics).unwrap();

        assert!(fields.is_empty());
        assert_eq!(diagnostics.warning_count(), 2);
    }

    #[test]
    fn duplicate_field_plugs() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let target = app.class("App", "Target").build().unwrap();
        let field_plug = |id: &str| {
            Annotation::PlugField(PlugFieldAnnotation {
                field_id: id.to_string(),
                is_external_value: false,
                field_type: None,
            })
        };

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        plugs
            .class("Plugs", "TargetImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&target)))
            .annotate(field_plug("count"))
            .annotate(field_plug("size"))
            .build()
            .unwrap();

        let mut index = PlugIndex::new();
        index
            .find_implementors(&registry, &[plugs.module().clone()])
            .unwrap();
        let fields = scan_found_plugs(&registry, &index, &Diagnostics::new()).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.get(&target, "count").is_some());

        plugs
            .class("Plugs", "Duplicate")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&target)))
            .annotate(field_plug("a"))
            .annotate(field_plug("a"))
            .build()
            .unwrap();
        let mut index = PlugIndex::new();
        index
            .find_implementors(&registry, &[plugs.module().clone()])
            .unwrap();
        assert!(matches!(
            scan_found_plugs(&registry, &index, &Diagnostics::new()),
            Err(Error::DuplicatePlugField { field_id, .. }) if field_id == "a"
        ));
    }
}
