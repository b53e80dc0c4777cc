//! Integration tests for reachability scanning and emission.

use std::{
    collections::HashSet,
    sync::{Arc, Once},
};

use cilfront::prelude::*;

static TRACE_INIT: Once = Once::new();

/// Route scanner logs to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

fn with_token(opcode: u8, token: u32) -> Vec<u8> {
    let mut code = vec![opcode];
    code.extend_from_slice(&token.to_le_bytes());
    code
}

/// A small program exercising every kind of reference the scanner follows.
struct Shapes {
    registry: Arc<TypeRegistry>,
    main: MethodRc,
    root_area: MethodRc,
    mid_area: MethodRc,
    leaf_area: MethodRc,
    iface_area: MethodRc,
    unused: MethodRc,
}

fn shapes() -> Result<Shapes> {
    init_tracing();
    let registry = Arc::new(TypeRegistry::new());
    let app = ProgramBuilder::new(&registry, "App");
    let int32 = app.primitive("Int32")?;
    let double = app.primitive("Double")?;

    let iface = app.interface("Geometry", "IShape").build()?;
    let iface_area = app
        .method(&iface, "Area")
        .virtual_method()
        .abstract_method()
        .new_slot()
        .returns(&double)
        .build()?;

    let point = app.value_type("Geometry", "Point").build()?;
    app.add_field(&point, "X", &int32, false);
    app.add_field(&point, "Y", &int32, false);

    let root = app.class("Geometry", "Shape").implements(&iface).build()?;
    app.add_field(&root, "origin", &point, false);
    let count = app.add_field(&root, "count", &int32, true);
    app.method(&root, ".cctor").static_method().private().il(vec![0x2A]).build()?;
    let root_ctor = app.method(&root, ".ctor").il(vec![0x2A]).build()?;
    let root_area = app
        .method(&root, "Area")
        .virtual_method()
        .new_slot()
        .returns(&double)
        .il(vec![0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0x2A])
        .build()?;

    let mid = app.class("Geometry", "Polygon").base(&root).build()?;
    let mid_area = app
        .method(&mid, "Area")
        .virtual_method()
        .returns(&double)
        .il(vec![0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0x2A])
        .build()?;

    let leaf = app.class("Geometry", "Square").base(&mid).build()?;
    let mut ctor = vec![0x02];
    ctor.extend(with_token(0x28, app.method_token(&root_ctor)));
    ctor.push(0x2A);
    let leaf_ctor = app.method(&leaf, ".ctor").il(ctor).build()?;
    let leaf_area = app
        .method(&leaf, "Area")
        .virtual_method()
        .returns(&double)
        .il(vec![0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0x2A])
        .build()?;
    let unused = app.method(&leaf, "Unused").static_method().il(vec![0x2A]).build()?;

    let program = app.class("App", "Program").build()?;
    // newobj Square::.ctor; callvirt Shape::Area; pop; ldsfld Shape::count; pop; ret
    let mut code = with_token(0x73, app.method_token(&leaf_ctor));
    code.extend(with_token(0x6F, app.method_token(&root_area)));
    code.push(0x26);
    code.extend(with_token(0x7E, app.field_token(&count)));
    code.extend([0x26, 0x2A]);
    let main = app.method(&program, "Main").static_method().il(code).build()?;

    Ok(Shapes {
        registry,
        main,
        root_area,
        mid_area,
        leaf_area,
        iface_area,
        unused,
    })
}

/// Every item directly referenced by a reachable item is reachable too.
#[test]
fn test_reachable_set_is_closed() -> Result<()> {
    let shapes = shapes()?;
    let mut scanner = Scanner::new(shapes.registry.clone(), ScannerConfig::default());
    scanner.execute(&shapes.main, &mut RecordingGenerator::new())?;

    let contains_type = |ty: &CilTypeRc| scanner.contains(&ProgramItem::Type(ty.clone()));
    for item in scanner.items() {
        match item {
            ProgramItem::Method(method) => {
                for param in method.param_types() {
                    assert!(contains_type(&param), "parameter of {method:?}");
                }
                if let Some(declaring) = method.declaring_type() {
                    assert!(contains_type(&declaring), "declaring type of {method:?}");
                }
                for instruction in decode_method(&shapes.registry, method)? {
                    match &instruction.operand {
                        Operand::Method { method: target, .. } => {
                            assert!(scanner.contains(&ProgramItem::Method(target.clone())));
                        }
                        Operand::Type(ty) => assert!(contains_type(ty)),
                        Operand::Field(field) => {
                            assert!(contains_type(&field.declaring_type().unwrap()));
                            if field.is_static() {
                                assert!(scanner.contains(&ProgramItem::Field(field.clone())));
                            }
                        }
                        _ => {}
                    }
                }
            }
            ProgramItem::Type(ty) => {
                if let Some(base) = ty.base() {
                    assert!(contains_type(&base), "base of {ty:?}");
                }
                for iface in ty.interface_list() {
                    assert!(contains_type(&iface));
                }
                for field in ty.field_list().iter().filter(|f| !f.is_static()) {
                    assert!(contains_type(&field.field_type().unwrap()));
                }
                for cctor in ty.method_list().into_iter().filter(|m| m.is_static_constructor()) {
                    assert!(scanner.contains(&ProgramItem::Method(cctor)));
                }
            }
            ProgramItem::Field(_) => {}
        }
    }

    assert!(!scanner.contains(&ProgramItem::Method(shapes.unused.clone())));
    Ok(())
}

/// No item is queued twice and discovery order is deterministic.
#[test]
fn test_items_are_unique_and_ordered() -> Result<()> {
    let shapes = shapes()?;
    let mut first = Scanner::new(shapes.registry.clone(), ScannerConfig::default());
    first.execute(&shapes.main, &mut RecordingGenerator::new())?;
    let mut second = Scanner::new(shapes.registry.clone(), ScannerConfig::default());
    second.execute(&shapes.main, &mut RecordingGenerator::new())?;

    let counters = first.counters();
    assert_eq!(counters.pushes, first.items().len());
    assert!(counters.already_present > 0);

    let keys: HashSet<String> = first.items().iter().map(ProgramItem::key).collect();
    assert_eq!(keys.len(), first.items().len());

    let names = |scanner: &Scanner| -> Vec<String> {
        scanner.items().iter().map(|i| i.full_name().to_string()).collect()
    };
    assert_eq!(names(&first), names(&second));
    Ok(())
}

/// Overrides share the UID of their root definition; interface methods do not.
#[test]
fn test_override_chains_share_uids() -> Result<()> {
    let shapes = shapes()?;
    let mut scanner = Scanner::new(shapes.registry.clone(), ScannerConfig::default());
    let mut generator = RecordingGenerator::new();
    scanner.execute(&shapes.main, &mut generator)?;

    let uid = scanner.method_uid(&shapes.leaf_area);
    assert_eq!(scanner.method_uid(&shapes.mid_area), uid);
    assert_eq!(scanner.method_uid(&shapes.root_area), uid);
    assert_ne!(scanner.method_uid(&shapes.iface_area), uid);

    let Some(Emission::VmtCode { types, methods }) = generator.vmt() else {
        panic!("method tables were not emitted");
    };
    assert_eq!(types.len(), scanner.types().len());
    assert_eq!(methods.len(), scanner.methods().len());
    let type_uids: HashSet<u32> = types.iter().map(|(_, uid)| *uid).collect();
    assert_eq!(type_uids.len(), types.len());
    Ok(())
}

/// The plugged method is emitted as a forward and its own body is never scanned.
#[test]
fn test_plug_replaces_required_method() -> Result<()> {
    init_tracing();
    let registry = Arc::new(TypeRegistry::new());
    let app = ProgramBuilder::new(&registry, "App");
    let foo = app.class("App", "Foo").build()?;
    let secret = app.method(&foo, "Secret").static_method().il(vec![0x2A]).build()?;
    let mut body = with_token(0x28, app.method_token(&secret));
    body.push(0x2A);
    let bar = app
        .method(&foo, "Bar")
        .static_method()
        .annotate(Annotation::PlugMethod(PlugMethodAnnotation {
            plug_required: true,
            ..Default::default()
        }))
        .il(body)
        .build()?;
    let program = app.class("App", "Program").build()?;
    let mut code = with_token(0x28, app.method_token(&bar));
    code.push(0x2A);
    let main = app.method(&program, "Main").static_method().il(code).build()?;

    let plugs = ProgramBuilder::new(&registry, "Plugs");
    let substitute = plugs
        .class("Plugs", "FooSubstitute")
        .annotate(Annotation::Plug(PlugAnnotation::for_type(&foo)))
        .build()?;
    let substitute_bar = plugs
        .method(&substitute, "Bar")
        .static_method()
        .il(vec![0x2A])
        .build()?;

    let config = ScannerConfig::default().with_plug_modules(vec![plugs.module().clone()]);
    let mut scanner = Scanner::new(registry.clone(), config);
    let mut generator = RecordingGenerator::new();
    scanner.execute(&main, &mut generator)?;

    assert!(scanner.contains(&ProgramItem::Method(main.clone())));
    assert!(scanner.contains(&ProgramItem::Type(foo.clone())));
    assert!(scanner.contains(&ProgramItem::Method(substitute_bar.clone())));
    assert!(!scanner.contains(&ProgramItem::Method(secret.clone())));

    assert!(!generator.compiled_methods().contains(&bar.full_name()));
    assert!(generator.compiled_methods().contains(&substitute_bar.full_name()));
    let forwards = generator.forwards();
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].0, bar.full_name());

    // Without the plug module the required plug is missing and nothing is emitted,
    // although Main is queued before Foo.Bar
    let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
    let mut generator = RecordingGenerator::new();
    match scanner.execute(&main, &mut generator) {
        Err(Error::PlugRequired(name)) => assert_eq!(name, bar.full_name()),
        other => panic!("Expected PlugRequired, got {other:?}"),
    }
    assert!(generator.compiled_methods().is_empty());
    assert!(generator.emissions.is_empty());
    Ok(())
}

/// Native methods without plug stop the scan.
#[test]
fn test_native_method_without_plug() -> Result<()> {
    init_tracing();
    let registry = Arc::new(TypeRegistry::new());
    let app = ProgramBuilder::new(&registry, "App");
    let console = app.class("App", "Console").build()?;
    let write = app.method(&console, "Write").static_method().pinvoke().build()?;
    let program = app.class("App", "Program").build()?;
    let mut code = with_token(0x28, app.method_token(&write));
    code.push(0x2A);
    let main = app.method(&program, "Main").static_method().il(code).build()?;

    let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
    let result = scanner.execute(&main, &mut RecordingGenerator::new());
    assert!(matches!(result, Err(Error::NativeCodeNeedsPlug(name)) if name == write.full_name()));
    assert_ne!(scanner.state(), ScanState::Done);
    Ok(())
}
