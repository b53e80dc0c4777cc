//! Records describing how each reachable method is to be compiled.

use strum::Display;

use crate::metadata::{method::MethodRc, typesystem::names::LabelCache};

/// Prefix of the label of a plug body emitted on behalf of the method it replaces.
pub const PLUG_LABEL_PREFIX: &str = "PLUG_FOR___";

/// How a method reaches the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MethodKind {
    /// Compiled from its own body
    Normal,
    /// A plug body
    Plug,
    /// Replaced by a plug; only a forward to the plug is emitted
    NeedsPlug,
}

/// A method together with everything the code generator needs to emit it.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    /// The method
    pub method: MethodRc,
    /// Position of the method in the reachable item list
    pub item_id: usize,
    /// Method UID
    pub uid: u32,
    /// How the method is emitted
    pub kind: MethodKind,
    /// The plug of a [`MethodKind::NeedsPlug`] method
    pub plug: Option<Box<CompiledMethod>>,
    /// The method a plug body is emitted for
    pub plugged: Option<MethodRc>,
    /// Custom assembler replacing the body
    pub assembler: Option<String>,
    /// The plug stands for every overload of its target
    pub is_wildcard: bool,
    /// The plug body is inlined at the forward
    pub is_inline_assembler: bool,
    /// Assembly label
    pub label: String,
}

impl CompiledMethod {
    /// A record for `method`, labelled through `labels`
    pub fn new(method: MethodRc, item_id: usize, uid: u32, kind: MethodKind, labels: &LabelCache) -> Self {
        let label = labels.method_label(&method);
        CompiledMethod {
            method,
            item_id,
            uid,
            kind,
            plug: None,
            plugged: None,
            assembler: None,
            is_wildcard: false,
            is_inline_assembler: false,
            label,
        }
    }

    /// Emit through `assembler` instead of the body
    #[must_use]
    pub fn with_assembler(mut self, assembler: Option<String>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Forward to `plug`
    #[must_use]
    pub fn with_plug(mut self, plug: CompiledMethod) -> Self {
        self.plug = Some(Box::new(plug));
        self
    }

    /// Emit this plug body on behalf of `plugged`; the label follows the plugged method.
    pub fn set_plugged(&mut self, plugged: &MethodRc, labels: &LabelCache) {
        self.label = format!("{}{}", PLUG_LABEL_PREFIX, labels.method_label(plugged));
        self.plugged = Some(plugged.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::typesystem::{ProgramBuilder, TypeRegistry};

    #[test]
    fn plugged_bodies_take_the_target_label() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let foo = app.class("App", "Foo").build().unwrap();
        let bar = app.method(&foo, "Bar").static_method().build().unwrap();
        let plug = app.method(&foo, "BarImpl").static_method().build().unwrap();

        let labels = LabelCache::new();
        let mut record = CompiledMethod::new(plug, 3, 1, MethodKind::Plug, &labels);
        assert_eq!(record.label, "SystemVoidAppFooBarImpl");
        record.set_plugged(&bar, &labels);
        assert_eq!(record.label, "PLUG_FOR___SystemVoidAppFooBar");
        assert!(record.plugged.is_some());
        assert_eq!(MethodKind::NeedsPlug.to_string(), "NeedsPlug");
    }
}
