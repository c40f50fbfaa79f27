//! Bridge hot-path benchmarks
//!
//! Measures call-frame packing, outbound ptrcalls, identity map lookups and
//! variant marshalling against the headless engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use extbridge::classes::RawObject;
use extbridge::engine::headless::HeadlessEngine;
use extbridge::engine::{EngineInterface, ObjectPtr};
use extbridge::frame::CallFrame;
use extbridge::handle::HandleRegistry;
use extbridge::{
    Bridge, ClassBuilder, Dictionary, EngineClass, ExtensionClass, Node, Variant, Vec3,
};
use std::sync::Arc;

struct Probe {
    hits: i64,
}

impl ExtensionClass for Probe {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Probe { hits: 0 }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("Hit", |p: &mut Probe, by: i64| {
            p.hits += by;
            p.hits
        });
    }
}

fn bench_call_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_frame");

    group.bench_function("pack_mixed", |b| {
        b.iter(|| {
            let mut frame = CallFrame::new();
            frame
                .push(black_box(7i64))
                .push(black_box(true))
                .push(black_box(2.5f64))
                .push(black_box(Vec3::new(1.0, 2.0, 3.0)));
            black_box(frame.arg_bytes())
        })
    });

    for args in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("pack_ints", args), &args, |b, &args| {
            b.iter(|| {
                let mut frame = CallFrame::new();
                for i in 0..args {
                    frame.push(i as i64);
                }
                black_box(frame.arg_count())
            })
        });
    }

    let (bridge, engine) = Bridge::headless();
    let root = Node::from_raw(RawObject::new(engine.create("Node"), Arc::clone(&bridge)));
    for _ in 0..8 {
        let child = Node::from_raw(RawObject::new(engine.create("Node"), Arc::clone(&bridge)));
        root.add_child(&child, false);
    }
    group.bench_function("ptrcall_get_child_count", |b| {
        b.iter(|| black_box(root.get_child_count(false)))
    });

    group.finish();
}

fn bench_identity_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity_map");

    let (bridge, engine) = Bridge::headless();
    bridge.register::<Probe>(vec![]);
    let objects: Vec<ObjectPtr> = (0..1024).map(|_| engine.create("Probe")).collect();

    group.bench_function("load", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % objects.len();
            black_box(bridge.identity().load(objects[i]))
        })
    });

    group.bench_function("instance_typed", |b| {
        b.iter(|| black_box(bridge.instance::<Probe>(objects[512])))
    });

    group.bench_function("call_method", |b| {
        let arg = [extbridge::variant::RawVariant::from_int(1)];
        b.iter(|| black_box(engine.call_method(objects[0], "hit", &arg)))
    });

    group.finish();
}

fn bench_marshalling(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal");

    let engine = Arc::new(HeadlessEngine::new());
    let registry = HandleRegistry::new(Arc::clone(&engine) as Arc<dyn EngineInterface>, false);

    let text = Variant::String("a moderately long player name".to_string());
    group.bench_function("string_round_trip", |b| {
        b.iter(|| {
            let raw = text.to_raw(&registry);
            black_box(Variant::from_raw(raw.get(), &registry))
        })
    });

    let mut dict = Dictionary::new();
    for i in 0..16 {
        dict.insert(format!("key{i}"), Variant::Int(i));
    }
    let dict = Variant::Dictionary(dict);
    group.bench_function("dictionary_round_trip", |b| {
        b.iter(|| {
            let raw = dict.to_raw(&registry);
            black_box(Variant::from_raw(raw.get(), &registry))
        })
    });

    let points = Variant::PackedVector3Array(vec![Vec3::ONE; 256]);
    group.bench_function("packed_vec3_round_trip", |b| {
        b.iter(|| {
            let raw = points.to_raw(&registry);
            black_box(Variant::from_raw(raw.get(), &registry))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_call_frames, bench_identity_map, bench_marshalling);
criterion_main!(benches);
