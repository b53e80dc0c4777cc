//! Custom annotations that steer plug discovery, inlining and layout.
//!
//! Annotations are plain records attached to types, methods, parameters and fields
//! by the metadata provider. The plug index reads `Plug`/`PlugMethod`/`PlugField`, the
//! scanner reads `Inline` and `PlugMethod`, plug resolution reads the parameter
//! annotations, and the layout engine reads `FieldOffset`.

use crate::metadata::typesystem::{CilTypeRc, CilTypeRef};

/// Marks a type as the substitute for another type.
#[derive(Debug, Clone, Default)]
pub struct PlugAnnotation {
    /// Target type, when referencable
    pub target: Option<CilTypeRef>,
    /// Target as `"Namespace.Type, Module"`, used when `target` is absent
    pub target_name: Option<String>,
    /// Apply to the target and all its descendants
    pub inheritable: bool,
    /// Drop silently if the target cannot be resolved
    pub is_optional: bool,
}

impl PlugAnnotation {
    /// Plug for a directly referenced type
    #[must_use]
    pub fn for_type(target: &CilTypeRc) -> Self {
        PlugAnnotation {
            target: Some(CilTypeRef::new(target)),
            ..Default::default()
        }
    }

    /// Plug for a type named `"Namespace.Type, Module"`
    #[must_use]
    pub fn for_name(target_name: impl Into<String>) -> Self {
        PlugAnnotation {
            target_name: Some(target_name.into()),
            ..Default::default()
        }
    }

    /// Make the plug apply to descendants of the target
    #[must_use]
    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }

    /// Make an unresolvable target non-fatal
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
}

/// Per-method plug options.
///
/// On a plug method this selects how it is matched and emitted; on a target method
/// `plug_required` makes the absence of a plug fatal.
#[derive(Debug, Clone)]
pub struct PlugMethodAnnotation {
    /// Explicit signature the plug stands for, compared after character filtering
    pub signature: Option<String>,
    /// A disabled plug is treated as no plug
    pub enabled: bool,
    /// Name of the assembler that emits the body instead of instruction translation
    pub assembler: Option<String>,
    /// The annotated target method cannot be compiled without a plug
    pub plug_required: bool,
    /// The plug matches by name only and is emitted by its assembler
    pub is_wildcard: bool,
    /// A wildcard plug that still matches parameters
    pub wildcard_match_parameters: bool,
    /// Missing targets are not reported
    pub is_optional: bool,
}

impl Default for PlugMethodAnnotation {
    fn default() -> Self {
        PlugMethodAnnotation {
            signature: None,
            enabled: true,
            assembler: None,
            plug_required: false,
            is_wildcard: false,
            wildcard_match_parameters: false,
            is_optional: true,
        }
    }
}

/// Substitute for a field of the plugged type.
#[derive(Debug, Clone)]
pub struct PlugFieldAnnotation {
    /// Id of the field, `"<type> <declaring type>.<name>"`
    pub field_id: String,
    /// The field lives outside of the plugged type
    pub is_external_value: bool,
    /// Replacement type of the field
    pub field_type: Option<CilTypeRef>,
}

/// A custom annotation.
#[derive(Debug, Clone)]
pub enum Annotation {
    /// On a type: substitutes another type
    Plug(PlugAnnotation),
    /// On a method: plug options
    PlugMethod(PlugMethodAnnotation),
    /// On a plug type: field substitute
    PlugField(PlugFieldAnnotation),
    /// On a method: emitted inline by the code generator, body never scanned
    Inline,
    /// On a parameter: raw access to a field of the plugged instance
    FieldAccess {
        /// Name of the accessed field
        name: String,
    },
    /// On a parameter: raw pointer to the plugged instance
    ObjectPointerAccess,
    /// On a parameter: type of the parameter in the target signature, `"Type, Module"`
    FieldType {
        /// Type name to resolve
        name: String,
    },
    /// On a field: explicit byte offset
    FieldOffset(u32),
}

/// The first `PlugMethod` annotation in `annotations`
#[must_use]
pub fn plug_method(annotations: &[Annotation]) -> Option<&PlugMethodAnnotation> {
    annotations.iter().find_map(|a| match a {
        Annotation::PlugMethod(plug) => Some(plug),
        _ => None,
    })
}

/// True if `annotations` contains `Inline`
#[must_use]
pub fn has_inline(annotations: &[Annotation]) -> bool {
    annotations.iter().any(|a| matches!(a, Annotation::Inline))
}

/// True if `annotations` contains `FieldAccess`
#[must_use]
pub fn has_field_access(annotations: &[Annotation]) -> bool {
    annotations
        .iter()
        .any(|a| matches!(a, Annotation::FieldAccess { .. }))
}

/// True if `annotations` contains `ObjectPointerAccess`
#[must_use]
pub fn has_object_pointer_access(annotations: &[Annotation]) -> bool {
    annotations
        .iter()
        .any(|a| matches!(a, Annotation::ObjectPointerAccess))
}

/// The type name of a `FieldType` annotation, if present
#[must_use]
pub fn field_type_name(annotations: &[Annotation]) -> Option<&str> {
    annotations.iter().find_map(|a| match a {
        Annotation::FieldType { name } => Some(name.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plug_method_defaults() {
        let plug = PlugMethodAnnotation::default();
        assert!(plug.enabled);
        assert!(plug.is_optional);
        assert!(!plug.is_wildcard);
        assert!(!plug.plug_required);
    }

    #[test]
    fn lookups() {
        let annotations = vec![
            Annotation::Inline,
            Annotation::FieldAccess {
                name: "_value".to_string(),
            },
            Annotation::FieldType {
                name: "System.Int32, System.Private.CoreLib".to_string(),
            },
            Annotation::PlugMethod(PlugMethodAnnotation {
                plug_required: true,
                ..Default::default()
            }),
        ];

        assert!(has_inline(&annotations));
        assert!(has_field_access(&annotations));
        assert!(!has_object_pointer_access(&annotations));
        assert_eq!(
            field_type_name(&annotations),
            Some("System.Int32, System.Private.CoreLib")
        );
        assert!(plug_method(&annotations).unwrap().plug_required);
        assert!(plug_method(&[]).is_none());
    }

    #[test]
    fn plug_annotation_builders() {
        let plug = PlugAnnotation::for_name("System.Foo, Mod").inheritable().optional();
        assert!(plug.inheritable);
        assert!(plug.is_optional);
        assert!(plug.target.is_none());
        assert_eq!(plug.target_name.as_deref(), Some("System.Foo, Mod"));
    }
}
