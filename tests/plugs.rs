//! Integration tests for plug discovery, validation and resolution.

use std::sync::Arc;

use cilfront::prelude::*;

struct Setup {
    registry: Arc<TypeRegistry>,
    app: ProgramBuilder,
    plugs: ProgramBuilder,
}

fn setup() -> Setup {
    let registry = Arc::new(TypeRegistry::new());
    let app = ProgramBuilder::new(&registry, "App");
    let plugs = ProgramBuilder::new(&registry, "Plugs");
    Setup {
        registry,
        app,
        plugs,
    }
}

fn plug_type(plugs: &ProgramBuilder, name: &str, annotation: PlugAnnotation) -> Result<CilTypeRc> {
    plugs
        .class("Plugs", name)
        .annotate(Annotation::Plug(annotation))
        .build()
}

/// A method present in both an exact plug and an inheritable plug of an ancestor
/// resolves to the exact plug.
#[test]
fn test_exact_plugs_beat_inheritable_ones() -> Result<()> {
    let s = setup();
    let int32 = s.app.primitive("Int32")?;
    let root = s.app.class("App", "Stream").build()?;
    let file = s.app.class("App", "FileStream").base(&root).build()?;
    let read = s
        .app
        .method(&file, "Read")
        .returns(&int32)
        .param("count", &int32)
        .build()?;

    let inherited = plug_type(&s.plugs, "StreamImpl", PlugAnnotation::for_type(&root).inheritable())?;
    let exact = plug_type(&s.plugs, "FileStreamImpl", PlugAnnotation::for_type(&file))?;
    for owner in [&inherited, &exact] {
        s.plugs
            .method(owner, "Read")
            .static_method()
            .returns(&int32)
            .param("aThis", &file)
            .param("count", &int32)
            .build()?;
    }

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    manager.scan_found_plugs()?;

    let found = manager.resolve_plug(&read)?.expect("plug");
    assert!(found.declaring_type().unwrap().is_same(&exact));
    assert_eq!(manager.index().bucket(PlugKind::Exact).len(), 1);
    assert_eq!(manager.index().bucket(PlugKind::Inheritable).len(), 1);

    // Cached, including the absence of a plug
    let again = manager.resolve_plug(&read)?.expect("plug");
    assert!(Arc::ptr_eq(&found, &again));
    let unplugged = s.app.method(&file, "Flush").build()?;
    assert!(manager.resolve_plug(&unplugged)?.is_none());
    assert_eq!(manager.resolved_count(), 2);
    Ok(())
}

/// Inheritable plugs reach every descendant of their target.
#[test]
fn test_inheritable_plugs_reach_descendants() -> Result<()> {
    let s = setup();
    let root = s.app.class("App", "Root").build()?;
    let mid = s.app.class("App", "Mid").base(&root).build()?;
    let leaf = s.app.class("App", "Leaf").base(&mid).build()?;
    let reset = s.app.method(&leaf, "Reset").static_method().build()?;

    let root_impl = plug_type(&s.plugs, "RootImpl", PlugAnnotation::for_type(&root).inheritable())?;
    let plug = s.plugs.method(&root_impl, "Reset").static_method().build()?;

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    let found = manager.resolve_plug(&reset)?.expect("plug");
    assert!(Arc::ptr_eq(&found, &plug));
    Ok(())
}

/// Plug methods without a counterpart on the target are reported and left unused.
#[test]
fn test_unmatched_plug_methods_are_warnings() -> Result<()> {
    let s = setup();
    let int32 = s.app.primitive("Int32")?;
    let target = s.app.class("App", "Clock").build()?;
    s.app.method(&target, "Tick").static_method().build()?;

    let clock_impl = plug_type(&s.plugs, "ClockImpl", PlugAnnotation::for_type(&target))?;
    s.plugs.method(&clock_impl, "Tick").static_method().build()?;
    s.plugs
        .method(&clock_impl, "Tock")
        .static_method()
        .param("value", &int32)
        .build()?;

    let diagnostics = Arc::new(Diagnostics::new());
    let mut manager = PlugManager::new(s.registry.clone()).with_diagnostics(diagnostics.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    manager.scan_found_plugs()?;

    let warnings = diagnostics.by_category(DiagnosticCategory::Plug);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("Tock"));
    Ok(())
}

/// Field plugs are collected per plugged type; the same field twice is fatal.
#[test]
fn test_field_plugs() -> Result<()> {
    let s = setup();
    let int32 = s.app.primitive("Int32")?;
    let target = s.app.class("App", "Buffer").build()?;
    let length = s.app.add_field(&target, "length", &int32, false);

    let field_plug = |external| {
        Annotation::PlugField(PlugFieldAnnotation {
            field_id: length.full_name().to_string(),
            is_external_value: external,
            field_type: None,
        })
    };
    s.plugs
        .class("Plugs", "BufferImpl")
        .annotate(Annotation::Plug(PlugAnnotation::for_type(&target)))
        .annotate(field_plug(true))
        .build()?;

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    manager.scan_found_plugs()?;
    let plugged = manager
        .field_plug(&target, length.full_name())
        .expect("field plug");
    assert!(plugged.is_external_value);

    let more = ProgramBuilder::new(&s.registry, "MorePlugs");
    more.class("Plugs", "BufferImpl2")
        .annotate(Annotation::Plug(PlugAnnotation::for_type(&target)))
        .annotate(field_plug(false))
        .annotate(field_plug(false))
        .build()?;
    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[more.module().clone()])?;
    assert!(matches!(
        manager.scan_found_plugs(),
        Err(Error::DuplicatePlugField { .. })
    ));
    Ok(())
}

/// Plug targets given by name must resolve unless the plug is optional.
#[test]
fn test_named_targets() -> Result<()> {
    let s = setup();
    let target = s.app.class("App", "Named").build()?;
    let run = s.app.method(&target, "Run").static_method().build()?;

    let by_name = plug_type(&s.plugs, "NamedImpl", PlugAnnotation::for_name("App.Named, App"))?;
    let plug = s.plugs.method(&by_name, "Run").static_method().build()?;
    plug_type(&s.plugs, "Gone", PlugAnnotation::for_name("App.Gone, App").optional())?;

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    assert!(Arc::ptr_eq(&manager.resolve_plug(&run)?.expect("plug"), &plug));

    let strict = ProgramBuilder::new(&s.registry, "Strict");
    plug_type(&strict, "Missing", PlugAnnotation::for_name("App.Missing, App"))?;
    let mut manager = PlugManager::new(s.registry.clone());
    assert!(matches!(
        manager.find_plug_implementors(&[strict.module().clone()]),
        Err(Error::PlugTargetNotFound(_))
    ));
    Ok(())
}

/// Builds `Root <- Mid <- Leaf` with inheritable plugs on `Root` and `Mid`, registering
/// the `Mid` plug first when `mid_first` is set. Returns the plug chosen for `Leaf.Reset`
/// together with the `Root` and `Mid` plug methods.
fn resolve_with_two_ancestors(mid_first: bool) -> Result<(MethodRc, MethodRc, MethodRc)> {
    let s = setup();
    let root = s.app.class("App", "Root").build()?;
    let mid = s.app.class("App", "Mid").base(&root).build()?;
    let leaf = s.app.class("App", "Leaf").base(&mid).build()?;
    let reset = s.app.method(&leaf, "Reset").static_method().build()?;

    let mut targets = vec![("RootImpl", &root), ("MidImpl", &mid)];
    if mid_first {
        targets.reverse();
    }
    let mut found = Vec::new();
    for (name, target) in targets {
        let plug_type = plug_type(&s.plugs, name, PlugAnnotation::for_type(target).inheritable())?;
        found.push((name, s.plugs.method(&plug_type, "Reset").static_method().build()?));
    }
    let plug_for = |wanted: &str| {
        found
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, plug)| plug.clone())
            .expect("plug method")
    };

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    manager.scan_found_plugs()?;
    let chosen = manager.resolve_plug(&reset)?.expect("plug");
    Ok((chosen, plug_for("RootImpl"), plug_for("MidImpl")))
}

/// With several inheritable plugs on ancestors, the one registered first wins, whichever
/// ancestor is nearer.
#[test]
fn test_inheritable_first_registration_wins() -> Result<()> {
    let (chosen, root_plug, mid_plug) = resolve_with_two_ancestors(false)?;
    assert!(Arc::ptr_eq(&chosen, &root_plug));
    assert!(!Arc::ptr_eq(&chosen, &mid_plug));

    let (chosen, root_plug, mid_plug) = resolve_with_two_ancestors(true)?;
    assert!(Arc::ptr_eq(&chosen, &mid_plug));
    assert!(!Arc::ptr_eq(&chosen, &root_plug));
    Ok(())
}

/// A plug type registered for an open generic type must itself be generic; a
/// non-generic one leaves the methods of closed instantiations unplugged.
#[test]
fn test_generic_target_needs_generic_plug_type() -> Result<()> {
    let s = setup();
    let int32 = s.app.primitive("Int32")?;
    let object = s.app.primitive("Object")?;
    let list = s.app.class("App", "List").generic(&["T"]).build()?;
    s.app.method(&list, "Clear").build()?;

    let list_impl = plug_type(&s.plugs, "ListImpl", PlugAnnotation::for_type(&list))?;
    s.plugs
        .method(&list_impl, "Clear")
        .static_method()
        .param("aThis", &object)
        .build()?;

    let mut manager = PlugManager::new(s.registry.clone());
    manager.find_plug_implementors(&[s.plugs.module().clone()])?;
    assert_eq!(manager.index().bucket(PlugKind::ExactGeneric).len(), 1);

    let closed = s.registry.make_generic_type(&list, &[int32])?;
    let clear = closed.find_methods("Clear").pop().expect("Clear");
    assert!(manager.resolve_plug(&clear)?.is_none());
    Ok(())
}
