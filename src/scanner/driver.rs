//! The scan driver: entry points in, reachable program out.

use std::sync::Arc;

use strum::Display;
use tracing::{debug, info};

use crate::{
    disassembler::{Instruction, MethodDecoder, Operand, TokenOperand},
    metadata::{
        diagnostics::Diagnostics,
        method::MethodRc,
        typesystem::{names::LabelCache, CilTypeRc, FieldRc, ModuleRc, ProgramItem, TypeRegistry},
    },
    plugs::PlugManager,
    scanner::{
        config::ScannerConfig,
        emit::CodeGenerator,
        methodinfo::{CompiledMethod, MethodKind},
        queue::{QueueCounters, QueueReason, WorkQueue},
        uid::{UidResolver, UidTable},
    },
    Error, Result,
};

/// Phase of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ScanState {
    /// Nothing ran yet
    Idle,
    /// Indexing and checking plugs
    Discovering,
    /// Working through the queue
    Draining,
    /// Handing the reachable items to the code generator
    Finalizing,
    /// Finished
    Done,
}

/// Computes the closed set of items reachable from the entry points of a program and
/// feeds it to a [`CodeGenerator`].
///
/// Methods replaced by a plug are never decoded; the plug body is scanned instead. A
/// method implemented natively by the host without a plug fails the scan.
pub struct Scanner {
    registry: Arc<TypeRegistry>,
    config: ScannerConfig,
    plugs: PlugManager,
    plugs_indexed: bool,
    decoder: MethodDecoder,
    queue: WorkQueue,
    uids: UidTable,
    used_modules: Vec<ModuleRc>,
    labels: LabelCache,
    diagnostics: Arc<Diagnostics>,
    state: ScanState,
}

impl Scanner {
    /// A scanner over the program in `registry`
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, config: ScannerConfig) -> Self {
        let diagnostics = Arc::new(Diagnostics::new());
        Scanner {
            plugs: PlugManager::new(registry.clone()).with_diagnostics(diagnostics.clone()),
            plugs_indexed: false,
            decoder: MethodDecoder::new(registry.clone()),
            queue: WorkQueue::new(),
            uids: UidTable::new(),
            used_modules: Vec::new(),
            labels: LabelCache::new(),
            diagnostics,
            state: ScanState::Idle,
            registry,
            config,
        }
    }

    /// Collect warnings in `diagnostics`
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.plugs = PlugManager::new(self.registry.clone()).with_diagnostics(diagnostics.clone());
        self.plugs_indexed = false;
        self.diagnostics = diagnostics;
        self
    }

    /// Scan everything reachable from `entry` and emit it through `generator`.
    ///
    /// # Errors
    /// Fails on plug indexing errors, decode errors, native methods without plug,
    /// methods requiring a plug that has none, and errors of the generator.
    pub fn execute(&mut self, entry: &MethodRc, generator: &mut dyn CodeGenerator) -> Result<()> {
        self.index_plugs()?;
        self.enqueue(entry.clone(), QueueReason::EntryPoint, None);

        self.scan_queue()?;
        self.assemble(generator)?;
        generator.emit_entrypoint(Some(entry), &[])?;
        self.finish();
        Ok(())
    }

    /// Scan everything reachable from a boot list and emit it through `generator`.
    ///
    /// The declaring types of the boot entries and `force_includes` are queued along
    /// with the entries; the configured explicit entries are queued once plugs are
    /// indexed, and the configured pre-emitted fields go to the generator before the
    /// queue is drained.
    ///
    /// # Errors
    /// See [`Scanner::execute`].
    pub fn execute_boot(
        &mut self,
        boot_entries: &[MethodRc],
        force_includes: &[ProgramItem],
        generator: &mut dyn CodeGenerator,
    ) -> Result<()> {
        for entry in boot_entries {
            if let Some(declaring) = entry.declaring_type() {
                self.enqueue(declaring, QueueReason::BootEntryDeclaringType, None);
            }
            self.enqueue(entry.clone(), QueueReason::BootEntry, None);
        }
        for item in force_includes {
            self.enqueue(item.clone(), QueueReason::ForceInclude, None);
        }

        self.index_plugs()?;

        for entry in self.config.explicit_entries.clone() {
            self.enqueue(entry, QueueReason::ExplicitEntry, None);
        }
        for field in &self.config.pre_emitted_fields {
            generator.process_field(field)?;
        }

        self.scan_queue()?;
        self.assemble(generator)?;
        generator.emit_entrypoint(None, boot_entries)?;
        self.finish();
        Ok(())
    }

    /// The current phase
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// The registry being scanned
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// The plug manager, indexed once a scan has started
    #[must_use]
    pub fn plugs(&self) -> &PlugManager {
        &self.plugs
    }

    /// Warnings collected so far
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Labels handed out so far
    #[must_use]
    pub fn labels(&self) -> &LabelCache {
        &self.labels
    }

    /// True if `item` is reachable
    #[must_use]
    pub fn contains(&self, item: &ProgramItem) -> bool {
        self.queue.contains(item)
    }

    /// Reachable items in discovery order
    #[must_use]
    pub fn items(&self) -> &[ProgramItem] {
        self.queue.items()
    }

    /// Reachable methods in discovery order
    #[must_use]
    pub fn methods(&self) -> Vec<MethodRc> {
        self.queue.methods()
    }

    /// Reachable types in discovery order
    #[must_use]
    pub fn types(&self) -> Vec<CilTypeRc> {
        self.queue.types()
    }

    /// Reachable fields in discovery order
    #[must_use]
    pub fn fields(&self) -> Vec<FieldRc> {
        self.queue.fields()
    }

    /// Queue instrumentation
    #[must_use]
    pub fn counters(&self) -> QueueCounters {
        self.queue.counters()
    }

    /// Modules owning at least one reachable type, in first use order
    #[must_use]
    pub fn used_modules(&self) -> &[ModuleRc] {
        &self.used_modules
    }

    /// The UID of `method`
    pub fn method_uid(&mut self, method: &MethodRc) -> u32 {
        self.uids.method_uid(&self.registry, method)
    }

    /// The UID of the reachable type `ty`.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotQueued`] if `ty` was not reached.
    pub fn type_uid(&mut self, ty: &CilTypeRc) -> Result<u32> {
        self.uids.type_uid(&self.queue, ty)
    }

    fn enqueue(&mut self, item: impl Into<ProgramItem>, reason: QueueReason, source: Option<&str>) {
        self.queue
            .push(item.into(), reason, source.map(str::to_string));
    }

    fn index_plugs(&mut self) -> Result<()> {
        if self.plugs_indexed {
            return Ok(());
        }

        self.state = ScanState::Discovering;
        let modules = self.config.plug_modules.clone();
        self.plugs.find_plug_implementors(&modules)?;
        self.plugs.scan_found_plugs()?;
        self.plugs_indexed = true;
        Ok(())
    }

    fn finish(&mut self) {
        self.state = ScanState::Done;
        info!(
            "Scan complete: {} items ({} pushes, {} duplicates)",
            self.queue.len(),
            self.queue.counters().pushes,
            self.queue.counters().already_present
        );
    }

    fn scan_queue(&mut self) -> Result<()> {
        self.state = ScanState::Draining;
        while let Some(next) = self.queue.pop() {
            match &next.item {
                ProgramItem::Method(method) => self.scan_method(method, false)?,
                ProgramItem::Type(ty) => {
                    self.scan_type(ty)?;
                    self.mark_used(&ty.module);
                }
                ProgramItem::Field(_) => {}
            }
        }
        Ok(())
    }

    fn mark_used(&mut self, module: &ModuleRc) {
        if !self.used_modules.iter().any(|m| Arc::ptr_eq(m, module)) {
            self.used_modules.push(module.clone());
        }
    }

    fn scan_method(&mut self, method: &MethodRc, is_plug: bool) -> Result<()> {
        debug!("Scanning method {}", method.full_name());
        let source = Some(method.full_name());

        for param in method.param_types() {
            self.enqueue(param, QueueReason::Parameter, source);
        }

        let dynamic = method.is_dynamic();
        if !is_plug && !dynamic {
            if let Some(declaring) = method.declaring_type() {
                self.enqueue(declaring, QueueReason::DeclaringType, source);
            }
        }

        if !method.is_constructor() && !method.is_static_constructor() {
            if let Some(return_type) = method.return_type() {
                self.enqueue(return_type, QueueReason::ReturnType, source);
            }
        }

        let mut plug = None;
        if !is_plug && !dynamic {
            plug = self.plugs.resolve_plug(method)?;
            if let Some(found) = &plug {
                self.scan_method(found, true)?;
                // Inline methods are expanded at their call sites, their plug is never called
                if !method.is_inline() {
                    self.enqueue(found.clone(), QueueReason::PlugMethod, source);
                }
            }
        }

        if plug.is_some() {
            return Ok(());
        }
        if method.requires_native_code() {
            return Err(Error::NativeCodeNeedsPlug(method.full_name().to_string()));
        }
        if method.is_inline() {
            return Ok(());
        }

        let mut code = self.decoder.decode(method)?;
        self.process_instructions(&mut code);
        self.queue_references(&code, source);
        Ok(())
    }

    // Point every call at the handle already in the item set and stamp its UID
    fn process_instructions(&mut self, code: &mut [Instruction]) {
        for instruction in code.iter_mut() {
            if let Operand::Method { method, uid } = &mut instruction.operand {
                if let Some(canonical) = self.queue.canonical_method(method) {
                    *method = canonical;
                }
                *uid = Some(self.uids.method_uid(&self.registry, method));
            }
        }
    }

    fn queue_references(&mut self, code: &[Instruction], source: Option<&str>) {
        for instruction in code {
            match &instruction.operand {
                Operand::Method { method, .. } => {
                    self.enqueue(method.clone(), QueueReason::Call, source);
                }
                Operand::Type(ty) | Operand::Token(TokenOperand::Type(ty)) => {
                    self.enqueue(ty.clone(), QueueReason::OpCodeValue, source);
                }
                Operand::Field(field) | Operand::Token(TokenOperand::Field(field)) => {
                    self.queue_field(field, source);
                }
                // A method handle loaded by ldtoken can be invoked later
                Operand::Token(TokenOperand::Method(method)) => {
                    self.enqueue(method.clone(), QueueReason::OpCodeValue, source);
                }
                _ => {}
            }
        }
    }

    fn queue_field(&mut self, field: &FieldRc, source: Option<&str>) {
        if let Some(declaring) = field.declaring_type() {
            self.enqueue(declaring, QueueReason::OpCodeValue, source);
        }
        if field.is_static() {
            self.enqueue(field.clone(), QueueReason::OpCodeValue, source);
        }
    }

    fn scan_type(&mut self, ty: &CilTypeRc) -> Result<()> {
        debug!("Scanning type {}", ty.full_name());
        let source = Some(ty.full_name());

        let base = ty.base();
        if let Some(base) = &base {
            self.enqueue(base.clone(), QueueReason::BaseType, source);
        }

        for method in ty.method_list() {
            if method.is_static_constructor() {
                self.enqueue(method, QueueReason::StaticConstructor, source);
            }
        }

        if base.is_some_and(|b| b.full_name() == "System.Array") {
            if let Some(element) = ty.element().filter(|e| !e.is_pointer()) {
                self.queue_array_helpers(&element, source)?;
            }
        }

        for field in ty.field_list() {
            if field.is_static() {
                continue;
            }
            if let Some(field_type) = field.field_type() {
                self.enqueue(field_type, QueueReason::FieldType, source);
            }
        }

        for iface in ty.interface_list() {
            self.enqueue(iface, QueueReason::ImplementedInterface, source);
        }
        Ok(())
    }

    // The array helper implements the generic collection interfaces of every T[]
    fn queue_array_helpers(&mut self, element: &CilTypeRc, source: Option<&str>) -> Result<()> {
        let Some(helper) = self.registry.find(&self.config.array_helper) else {
            debug!("Array helper {} not found", self.config.array_helper);
            return Ok(());
        };

        for method in helper.method_list() {
            if method.is_static()
                || method.is_public()
                || !method.is_generic_method_definition()
                || method.generic_arity() != 1
            {
                continue;
            }
            let instance = self
                .registry
                .make_generic_method(&method, std::slice::from_ref(element))?;
            self.enqueue(instance, QueueReason::VirtualSzArrayHelper, source);
        }
        Ok(())
    }

    fn assemble(&mut self, generator: &mut dyn CodeGenerator) -> Result<()> {
        self.state = ScanState::Finalizing;

        let items = self.queue.items().to_vec();
        let plugs = self.check_plugs(&items)?;
        for ((index, item), plug) in items.iter().enumerate().zip(plugs) {
            match item {
                ProgramItem::Method(method) => {
                    self.assemble_method(index, method, plug, generator)?;
                }
                ProgramItem::Field(field) => generator.process_field(field)?,
                ProgramItem::Type(_) => {}
            }
        }

        let types = self.queue.types();
        let methods = self.queue.methods();
        let mut uids = UidResolver::new(&mut self.uids, &self.queue, &self.registry);
        generator.generate_vmt_code(&types, &methods, &mut uids)
    }

    /// Resolve the plug of every queued method. Missing required plugs and plugs that
    /// were never queued fail here, before the generator sees any item.
    fn check_plugs(&self, items: &[ProgramItem]) -> Result<Vec<Option<MethodRc>>> {
        let mut plugs = Vec::with_capacity(items.len());
        for item in items {
            let ProgramItem::Method(method) = item else {
                plugs.push(None);
                continue;
            };

            let plug = self.plugs.resolve_plug(method)?;
            if !method.is_inline() {
                match &plug {
                    Some(plug) => {
                        let queued = self.queue.index_of(&ProgramItem::Method(plug.clone()));
                        if queued.is_none() && !plug.is_inline() {
                            return Err(Error::PlugNotQueued {
                                method: method.full_name().to_string(),
                                plug: plug.full_name().to_string(),
                            });
                        }
                    }
                    None => {
                        let required = method
                            .plug_method_annotation()
                            .is_some_and(|a| a.plug_required && !a.is_wildcard);
                        if required {
                            return Err(Error::PlugRequired(method.full_name().to_string()));
                        }
                    }
                }
            }
            plugs.push(plug);
        }
        Ok(plugs)
    }

    fn assemble_method(
        &mut self,
        index: usize,
        method: &MethodRc,
        plug: Option<MethodRc>,
        generator: &mut dyn CodeGenerator,
    ) -> Result<()> {
        if method.is_inline() {
            return Ok(());
        }

        let uid = self.uids.method_uid(&self.registry, method);
        match plug {
            Some(plug) => self.assemble_plugged(index, uid, method, &plug, generator),
            None => self.assemble_normal(index, uid, method, generator),
        }
    }

    fn assemble_plugged(
        &mut self,
        index: usize,
        uid: u32,
        method: &MethodRc,
        plug: &MethodRc,
        generator: &mut dyn CodeGenerator,
    ) -> Result<()> {
        let plug_inline = plug.is_inline();
        let plug_index = self.queue.index_of(&ProgramItem::Method(plug.clone()));
        let plug_uid = self.uids.method_uid(&self.registry, plug);
        let record = CompiledMethod::new(method.clone(), index, uid, MethodKind::NeedsPlug, &self.labels);
        let annotation = plug
            .plug_method_annotation()
            .filter(|_| !plug_inline)
            .cloned();

        if let Some(annotation) = annotation {
            let mut plug_record = CompiledMethod::new(
                plug.clone(),
                plug_index.unwrap_or(index),
                plug_uid,
                MethodKind::Plug,
                &self.labels,
            )
            .with_assembler(annotation.assembler.clone());

            let mut body = Vec::new();
            if annotation.is_wildcard {
                plug_record.is_wildcard = true;
                plug_record.set_plugged(method, &self.labels);
                body = self.decoder.decode(plug)?;
                self.process_instructions(&mut body);
            }

            let record = record.with_plug(plug_record.clone());
            if !body.is_empty() {
                generator.process_method(&plug_record, &body)?;
            }
            return generator.generate_method_forward(&record, &plug_record);
        }

        if plug_inline {
            let mut plug_record =
                CompiledMethod::new(plug.clone(), index, plug_uid, MethodKind::Plug, &self.labels);
            plug_record.is_inline_assembler = true;
            plug_record.set_plugged(method, &self.labels);

            let mut body = self.decoder.decode(plug)?;
            self.process_instructions(&mut body);
            let record = record.with_plug(plug_record.clone());
            generator.process_method(&plug_record, &body)?;
            return generator.generate_method_forward(&record, &plug_record);
        }

        let plug_record = CompiledMethod::new(
            plug.clone(),
            plug_index.unwrap_or(index),
            plug_uid,
            MethodKind::Plug,
            &self.labels,
        );
        let record = record.with_plug(plug_record.clone());
        generator.generate_method_forward(&record, &plug_record)
    }

    fn assemble_normal(
        &mut self,
        index: usize,
        uid: u32,
        method: &MethodRc,
        generator: &mut dyn CodeGenerator,
    ) -> Result<()> {
        let annotation = method.plug_method_annotation().cloned();
        // Wildcards are emitted on behalf of their target
        if annotation.as_ref().is_some_and(|a| a.is_wildcard) {
            return Ok(());
        }

        let record = CompiledMethod::new(method.clone(), index, uid, MethodKind::Normal, &self.labels)
            .with_assembler(annotation.and_then(|a| a.assembler));
        let mut code = self.decoder.decode(method)?;
        self.process_instructions(&mut code);
        generator.process_method(&record, &code)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        metadata::{
            annotations::{Annotation, PlugAnnotation, PlugMethodAnnotation},
            typesystem::ProgramBuilder,
        },
        scanner::emit::{Emission, RecordingGenerator},
        test::{call, with_token, Fixture, RET},
    };

    #[test]
    fn closure_over_calls_fields_and_types() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let int32 = app.primitive("Int32").unwrap();
        let base = app.class("App", "Base").build().unwrap();
        let iface = app.interface("App", "IThing").build().unwrap();
        let program = app.class("App", "Program").base(&base).implements(&iface).build().unwrap();
        let counter = app.add_field(&program, "counter", &int32, true);
        let cctor = app.method(&program, ".cctor").static_method().private().il(vec![0x2A]).build().unwrap();
        let helper = app
            .method(&program, "Helper")
            .static_method()
            .returns(&int32)
            .il(vec![0x16, 0x2A])
            .build()
            .unwrap();

        // call Helper; stsfld counter; ret
        let mut code = call(app.method_token(&helper));
        code.push(0x80);
        code.extend_from_slice(&app.field_token(&counter).to_le_bytes());
        code.push(0x2A);
        let main = app.method(&program, "Main").static_method().il(code).build().unwrap();

        let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
        let mut generator = RecordingGenerator::new();
        scanner.execute(&main, &mut generator).unwrap();

        assert_eq!(scanner.state(), ScanState::Done);
        for item in [
            ProgramItem::Method(main.clone()),
            ProgramItem::Method(helper.clone()),
            ProgramItem::Method(cctor.clone()),
            ProgramItem::Type(program.clone()),
            ProgramItem::Type(base.clone()),
            ProgramItem::Type(iface.clone()),
            ProgramItem::Type(int32.clone()),
            ProgramItem::Field(counter.clone()),
        ] {
            assert!(scanner.contains(&item), "{} missing", item);
        }

        let counters = scanner.counters();
        assert_eq!(counters.pushes, scanner.items().len());
        assert!(counters.already_present > 0);
        assert!(scanner.used_modules().iter().any(|m| m.name == "App"));

        assert_eq!(generator.fields(), vec![counter.full_name()]);
        assert!(generator.compiled_methods().contains(&helper.full_name()));
        assert!(matches!(
            generator.emissions.last(),
            Some(Emission::Entrypoint { entry: Some(name), .. }) if name == main.full_name()
        ));
    }

    #[test]
    fn calls_are_stamped_with_canonical_uids() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let program = app.class("App", "Program").build().unwrap();
        let callee = app.method(&program, "Callee").static_method().il(vec![0x2A]).build().unwrap();
        let mut code = call(app.method_token(&callee));
        code.push(0x2A);
        let main = app.method(&program, "Main").static_method().il(code).build().unwrap();

        let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
        scanner.enqueue(callee.clone(), QueueReason::ForceInclude, None);

        let mut code = scanner.decoder.decode(&main).unwrap();
        scanner.process_instructions(&mut code);
        let Operand::Method { method, uid } = &code[0].operand else {
            panic!("expected a call operand");
        };
        assert!(Arc::ptr_eq(method, &callee));
        assert_eq!(*uid, Some(scanner.method_uid(&callee)));
    }

    #[test]
    fn native_methods_need_plugs() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let program = app.class("App", "Program").build().unwrap();
        let native = app.method(&program, "Native").static_method().internal_call().build().unwrap();
        let mut code = call(app.method_token(&native));
        code.push(0x2A);
        let main = app.method(&program, "Main").static_method().il(code).build().unwrap();

        let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
        let result = scanner.execute(&main, &mut RecordingGenerator::new());
        assert!(matches!(
            result,
            Err(Error::NativeCodeNeedsPlug(name)) if name == native.full_name()
        ));

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let program_impl = plugs
            .class("Plugs", "ProgramImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&program)))
            .build()
            .unwrap();
        let plug = plugs
            .method(&program_impl, "Native")
            .static_method()
            .il(vec![0x2A])
            .build()
            .unwrap();

        let config = ScannerConfig::default().with_plug_modules(vec![plugs.module().clone()]);
        let mut scanner = Scanner::new(registry.clone(), config);
        let mut generator = RecordingGenerator::new();
        scanner.execute(&main, &mut generator).unwrap();
        assert!(scanner.contains(&ProgramItem::Method(plug.clone())));
        assert!(generator
            .forwards()
            .iter()
            .any(|(from, _)| *from == native.full_name()));
        assert!(!generator.compiled_methods().contains(&native.full_name()));
    }

    #[test]
    fn missing_required_plug_emits_nothing() {
        let fixture = Fixture::new();
        let program = fixture.class("Program");
        let counter = fixture
            .app
            .add_field(&program, "counter", &fixture.primitive("Int32"), true);
        let helper = fixture.static_method(&program, "Helper", vec![RET]);
        let required = fixture
            .app
            .method(&program, "Required")
            .static_method()
            .annotate(Annotation::PlugMethod(PlugMethodAnnotation {
                plug_required: true,
                ..Default::default()
            }))
            .il(vec![RET])
            .build()
            .unwrap();

        // call Helper; ldsfld counter; pop; call Required; ret
        let mut code = call(fixture.app.method_token(&helper));
        code.extend(with_token(0x7E, fixture.app.field_token(&counter)));
        code.push(0x26);
        code.extend(call(fixture.app.method_token(&required)));
        code.push(RET);
        let main = fixture.static_method(&program, "Main", code);

        let mut scanner = Scanner::new(fixture.registry.clone(), ScannerConfig::default());
        let mut generator = RecordingGenerator::new();
        let result = scanner.execute(&main, &mut generator);
        assert!(matches!(
            result,
            Err(Error::PlugRequired(name)) if name == required.full_name()
        ));
        assert!(scanner.contains(&ProgramItem::Method(helper.clone())));
        assert!(generator.emissions.is_empty());
        assert_ne!(scanner.state(), ScanState::Done);
    }

    #[test]
    fn ldtoken_makes_methods_reachable() {
        let fixture = Fixture::new();
        let program = fixture.class("Program");
        let callback = fixture.static_method(&program, "Callback", vec![RET]);
        let unused = fixture.static_method(&program, "Unused", vec![RET]);

        // ldtoken Callback; pop; ret
        let mut code = with_token(0xD0, fixture.app.method_token(&callback));
        code.extend([0x26, RET]);
        let main = fixture.static_method(&program, "Main", code);

        let mut scanner = Scanner::new(fixture.registry.clone(), ScannerConfig::default());
        let mut generator = RecordingGenerator::new();
        scanner.execute(&main, &mut generator).unwrap();

        assert!(scanner.contains(&ProgramItem::Method(callback.clone())));
        assert!(!scanner.contains(&ProgramItem::Method(unused.clone())));
        assert!(generator.compiled_methods().contains(&callback.full_name()));
    }

    #[test]
    fn wildcard_plugs_are_emitted_for_their_target() {
        let registry = Arc::new(TypeRegistry::new());
        let app = ProgramBuilder::new(&registry, "App");
        let int32 = app.primitive("Int32").unwrap();
        let program = app.class("App", "Program").build().unwrap();
        let run = app
            .method(&program, "Run")
            .static_method()
            .param("value", &int32)
            .internal_call()
            .build()
            .unwrap();
        let mut code = vec![0x16];
        code.extend(call(app.method_token(&run)));
        code.push(0x2A);
        let main = app.method(&program, "Main").static_method().il(code).build().unwrap();

        let plugs = ProgramBuilder::new(&registry, "Plugs");
        let program_impl = plugs
            .class("Plugs", "ProgramImpl")
            .annotate(Annotation::Plug(PlugAnnotation::for_type(&program)))
            .build()
            .unwrap();
        plugs
            .method(&program_impl, "Run")
            .static_method()
            .annotate(Annotation::PlugMethod(PlugMethodAnnotation {
                is_wildcard: true,
                assembler: Some("RunAsm".to_string()),
                ..Default::default()
            }))
            .il(vec![0x2A])
            .build()
            .unwrap();

        let config = ScannerConfig::default().with_plug_modules(vec![plugs.module().clone()]);
        let mut scanner = Scanner::new(registry.clone(), config);
        let mut generator = RecordingGenerator::new();
        scanner.execute(&main, &mut generator).unwrap();

        let labels = generator.labels();
        let plug_label = labels
            .iter()
            .find(|l| l.starts_with("PLUG_FOR___"))
            .expect("wildcard body");
        assert!(generator.forwards().contains(&(run.full_name(), *plug_label)));
        // Only the forwarded body is emitted for the wildcard plug
        assert_eq!(
            generator
                .emissions
                .iter()
                .filter(|e| matches!(e, Emission::Method { assembler: Some(a), .. } if a == "RunAsm"))
                .count(),
            1
        );
    }

    #[test]
    fn arrays_pull_in_helper_instances() {
        let fixture = Fixture::new();
        let (_, get_enumerator) = fixture.array_helper();
        let program = fixture.class("Program");
        let int32 = fixture.primitive("Int32");
        let ints = fixture.registry.make_sz_array(&int32);
        let pointers = fixture.registry.make_sz_array(&fixture.registry.make_pointer(&int32));

        // ldnull; castclass int32[]; pop; ldnull; castclass int32*[]; pop; ret
        let mut code = Vec::new();
        for array in [&ints, &pointers] {
            code.push(0x14);
            code.extend(crate::test::with_token(0x74, fixture.app.type_token(array)));
            code.push(0x26);
        }
        code.push(RET);
        let main = fixture.static_method(&program, "Main", code);

        let mut scanner = Scanner::new(fixture.registry.clone(), ScannerConfig::default());
        scanner.execute(&main, &mut RecordingGenerator::new()).unwrap();

        assert!(scanner.contains(&ProgramItem::Type(ints.clone())));
        let instance = fixture
            .registry
            .make_generic_method(&get_enumerator, &[int32.clone()])
            .unwrap();
        assert!(scanner.contains(&ProgramItem::Method(instance)));

        // Only private instance methods, and never for pointer elements
        let helpers: Vec<_> = scanner
            .methods()
            .into_iter()
            .filter(|m| m.generic_definition().is_some())
            .collect();
        assert_eq!(helpers.len(), 1);
    }

    #[test]
    fn boot_lists_queue_declaring_types_and_runtime_entries() {
        let fixture = Fixture::new();
        let int32 = fixture.primitive("Int32");
        let kernel = fixture.class("Kernel");
        let runtime = fixture.class("Runtime");
        let empty = fixture.app.add_field(&runtime, "Empty", &int32, true);
        let boot = fixture.static_method(&kernel, "Boot", vec![RET]);
        let gc = fixture.static_method(&runtime, "Collect", vec![RET]);
        let forced = fixture.class("Forced");

        let config = ScannerConfig::default()
            .with_explicit_entries(vec![gc.clone()])
            .with_pre_emitted_fields(vec![empty.clone()]);
        let mut scanner = Scanner::new(fixture.registry.clone(), config);
        let mut generator = RecordingGenerator::new();
        scanner
            .execute_boot(
                &[boot.clone()],
                &[ProgramItem::Type(forced.clone())],
                &mut generator,
            )
            .unwrap();

        assert_eq!(
            scanner.items()[..3].iter().map(ProgramItem::full_name).collect::<Vec<_>>(),
            vec![kernel.full_name(), boot.full_name(), forced.full_name()]
        );
        assert!(scanner.contains(&ProgramItem::Method(gc.clone())));
        // Handed over before the scan, never queued
        assert!(!scanner.contains(&ProgramItem::Field(empty.clone())));
        assert_eq!(generator.emissions.first(), Some(&Emission::Field(empty.full_name().to_string())));
        assert!(matches!(
            generator.emissions.last(),
            Some(Emission::Entrypoint { entry: None, boot: names })
                if names == &vec![boot.full_name().to_string()]
        ));
    }
}
