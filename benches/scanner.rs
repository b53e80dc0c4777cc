#![allow(unused)]
extern crate cilfront;

use cilfront::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::{hint::black_box, sync::Arc};

/// Number of classes in the synthetic program
const CLASSES: usize = 200;

fn with_token(opcode: u8, token: u32) -> Vec<u8> {
    let mut code = vec![opcode];
    code.extend_from_slice(&token.to_le_bytes());
    code
}

/// A chain of classes where each `Run` touches a field and calls the next class.
fn synthetic_program() -> (Arc<TypeRegistry>, MethodRc, usize) {
    let registry = Arc::new(TypeRegistry::new());
    let app = ProgramBuilder::new(&registry, "Bench");
    let int32 = app.primitive("Int32").unwrap();

    let mut next: Option<MethodRc> = None;
    let mut code_size = 0;
    for index in (0..CLASSES).rev() {
        let ty = app.class("Bench", &format!("Step{index}")).build().unwrap();
        let counter = app.add_field(&ty, "counter", &int32, true);

        // ldsfld counter; ldc.i4.1; add; stsfld counter; [call next;] ret
        let mut code = with_token(0x7E, app.field_token(&counter));
        code.extend([0x17, 0x58]);
        code.extend(with_token(0x80, app.field_token(&counter)));
        if let Some(callee) = &next {
            code.extend(with_token(0x28, app.method_token(callee)));
        }
        code.push(0x2A);
        code_size += code.len();

        let run = app
            .method(&ty, "Run")
            .static_method()
            .il(code)
            .build()
            .unwrap();
        next = Some(run);
    }

    (registry, next.unwrap(), code_size)
}

fn bench_decode(c: &mut Criterion) {
    let (registry, entry, code_size) = synthetic_program();
    let methods: Vec<MethodRc> = {
        let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
        scanner
            .execute(&entry, &mut RecordingGenerator::new())
            .unwrap();
        scanner.methods()
    };
    let decoder = MethodDecoder::new(registry.clone());

    let mut group = c.benchmark_group("decoder");
    group.throughput(Throughput::Bytes(code_size as u64));
    group.bench_function("decode_all_bodies", |b| {
        b.iter(|| {
            for method in &methods {
                black_box(decoder.decode(black_box(method)).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let (registry, entry, _) = synthetic_program();

    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Elements(CLASSES as u64));
    group.bench_function("execute", |b| {
        b.iter(|| {
            let mut scanner = Scanner::new(registry.clone(), ScannerConfig::default());
            let mut generator = RecordingGenerator::new();
            scanner.execute(black_box(&entry), &mut generator).unwrap();
            black_box(generator.emissions.len())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_scan);
criterion_main!(benches);
