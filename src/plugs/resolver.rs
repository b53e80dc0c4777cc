//! Matching a method against the plug types registered for its declaring type.

use crate::{
    metadata::{
        annotations::{self, PlugMethodAnnotation},
        method::{MethodRc, Param},
        typesystem::{names::filter_string_for_incorrect_chars, CilTypeRc, TypeRegistry},
    },
    Error, Result,
};

/// Find the plug for `method` among `plugs`, which are registered for `target`.
///
/// Each plug type is tried in turn: first by name and parameter types (with `Ctor` and
/// `CCtor` standing in for the constructors), then by scanning its public static
/// methods for wildcard plugs, target signatures, and explicit signature strings.
/// A plug marked disabled resolves to `None`; a generic plug method is instantiated
/// with the generic arguments of `method`.
///
/// # Errors
/// Returns an error if a `FieldType` annotation names an unknown type or generic
/// instantiation fails.
pub(crate) fn resolve_in(
    registry: &TypeRegistry,
    target: &CilTypeRc,
    plugs: &[CilTypeRc],
    method: &MethodRc,
) -> Result<Option<MethodRc>> {
    resolve_with_params(registry, target, plugs, method, method.param_types())
}

/// [`resolve_in`] with the by-name lookup done against `params` instead of the
/// parameter types of `method`.
///
/// Methods of closed generic types are matched on the open definition's member but
/// looked up with the closed parameter types.
///
/// # Errors
/// See [`resolve_in`].
pub(crate) fn resolve_with_params(
    registry: &TypeRegistry,
    target: &CilTypeRc,
    plugs: &[CilTypeRc],
    method: &MethodRc,
    params: Vec<CilTypeRc>,
) -> Result<Option<MethodRc>> {
    let mut search = params;
    if !method.is_static() {
        search.insert(0, target.clone());
    }

    let mut result = None;
    for plug in plugs {
        if let Some(found) = by_name(registry, plug, method, &search) {
            if !signature_agrees(&found, method) {
                return Ok(None);
            }
            result = Some(found);
            break;
        }

        if let Some(found) = by_signature(registry, target, plug, method)? {
            result = Some(found);
            break;
        }
    }

    let Some(result) = result else {
        return Ok(None);
    };

    if result
        .plug_method_annotation()
        .is_some_and(|annotation| !annotation.enabled)
    {
        return Ok(None);
    }

    if result.is_generic_method_definition()
        && method.is_generic_instance()
        && result.generic_arity() == method.generic_arity()
    {
        return registry
            .make_generic_method(&result, &method.generic_arguments())
            .map(Some);
    }

    Ok(Some(result))
}

fn plug_names(method_name: &str) -> Vec<&str> {
    match method_name {
        ".ctor" => vec![".ctor", "Ctor"],
        ".cctor" => vec![".cctor", "CCtor"],
        other => vec![other],
    }
}

fn by_name(
    registry: &TypeRegistry,
    plug: &CilTypeRc,
    method: &MethodRc,
    search: &[CilTypeRc],
) -> Option<MethodRc> {
    plug_names(&method.name).into_iter().find_map(|name| {
        plug.method_list().into_iter().find(|candidate| {
            candidate.is_static()
                && candidate.is_public()
                && candidate.name == name
                && candidate.params.len() == search.len()
                && candidate
                    .param_types()
                    .iter()
                    .zip(search)
                    .all(|(param, arg)| registry.is_assignable_from(param, arg))
        })
    })
}

fn explicit_signature_matches(annotation: Option<&PlugMethodAnnotation>, method: &MethodRc, ignore_case: bool) -> bool {
    let Some(signature) = annotation.and_then(|a| a.signature.as_deref()) else {
        return false;
    };

    let expected = filter_string_for_incorrect_chars(method.full_name()).replace('_', "");
    let signature = signature.replace('_', "");
    if ignore_case {
        expected.eq_ignore_ascii_case(&signature)
    } else {
        expected == signature
    }
}

// A plug found by name must take exactly the target's parameter types, or `object`
// where the real type is not accessible to the plug, unless its signature is given
// explicitly.
fn signature_agrees(found: &MethodRc, method: &MethodRc) -> bool {
    let shift = usize::from(!method.is_static());
    if found.params.len() != method.params.len() + shift {
        return false;
    }

    let found_types = found.param_types();
    let method_types = method.param_types();
    for (index, expected) in method_types.iter().enumerate() {
        let Some(actual) = found_types.get(index + shift) else {
            return false;
        };
        if !actual.is_same(expected)
            && actual.name != "Object"
            && !explicit_signature_matches(found.plug_method_annotation(), method, false)
        {
            return false;
        }
    }

    match (found.name.as_str(), method.name.as_str()) {
        ("Ctor", ".ctor") | ("CCtor", ".cctor") => true,
        (found, wanted) => found == wanted,
    }
}

fn single(mut candidates: Vec<MethodRc>) -> Option<MethodRc> {
    if candidates.len() == 1 {
        candidates.pop()
    } else {
        None
    }
}

fn param_type(registry: &TypeRegistry, param: &Param, replace: bool) -> Result<CilTypeRc> {
    if replace {
        if let Some(name) = annotations::field_type_name(&param.annotations) {
            return registry
                .resolve_type_name(name)
                .ok_or_else(|| Error::TypeNotFound(name.to_string()));
        }
    }

    param
        .param_type()
        .ok_or_else(|| malformed_error!("Parameter {} refers to a dropped type", param.name))
}

fn by_signature(
    registry: &TypeRegistry,
    target: &CilTypeRc,
    plug: &CilTypeRc,
    method: &MethodRc,
) -> Result<Option<MethodRc>> {
    for candidate in plug.method_list() {
        if !candidate.is_static() || !candidate.is_public() {
            continue;
        }
        let annotation = candidate.plug_method_annotation();

        if annotation.is_some_and(|a| a.is_wildcard && !a.wildcard_match_parameters) {
            let plugged = if candidate.name.eq_ignore_ascii_case("ctor")
                || candidate.name.eq_ignore_ascii_case("cctor")
            {
                single(
                    target
                        .method_list()
                        .into_iter()
                        .filter(|m| m.is_constructor() || m.is_static_constructor())
                        .collect(),
                )
            } else {
                single(target.find_methods(&candidate.name))
            };

            if plugged.is_some_and(|plugged| plugged.is_same(method)) {
                return Ok(Some(candidate));
            }
            continue;
        }

        let params: Vec<&Param> = candidate
            .params
            .iter()
            .filter(|p| !p.is_field_access())
            .collect();

        // Without parameters the plug can only be static
        let instance_types = match params.len() {
            0 => None,
            1 => Some(Vec::new()),
            _ => Some(
                candidate
                    .params
                    .iter()
                    .skip(1)
                    .filter(|p| !p.is_field_access())
                    .map(|p| param_type(registry, p, true))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        let static_types = match params.as_slice() {
            [only] => vec![param_type(registry, only, true)?],
            many => many
                .iter()
                .map(|p| param_type(registry, p, false))
                .collect::<Result<Vec<_>>>()?,
        };

        let is_ctor = candidate.name.eq_ignore_ascii_case("ctor");
        let is_cctor = candidate.name.eq_ignore_ascii_case("cctor");

        let mut plugged = instance_types.and_then(|types| {
            let name = if is_ctor { ".ctor" } else { candidate.name.as_str() };
            registry.find_method(target, name, false, &types)
        });
        if plugged.is_none() {
            let name = if is_ctor || is_cctor {
                ".cctor"
            } else {
                candidate.name.as_str()
            };
            plugged = registry.find_method(target, name, true, &static_types);
        }

        if plugged.is_some_and(|plugged| plugged.is_same(method)) {
            return Ok(Some(candidate));
        }

        if explicit_signature_matches(annotation, method, true) {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}
