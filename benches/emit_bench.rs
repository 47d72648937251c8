//! Emission benchmarks using criterion.
//!
//! Run with: cargo bench --bench emit_bench

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use sablec_backend::nir::{Attrs, Bin, Defn, Global, Inst, Local, Next, Op, Type, Val};
use sablec_backend::Emitter;

fn fnty(args: Vec<Type>, ret: Type) -> Type {
    Type::Function(args, Box::new(ret))
}

/// A synthetic defn set: `n` small functions in a call chain plus a few
/// globals and interned constants.
fn synthetic_program(n: usize) -> Vec<Defn> {
    let mut defns = Vec::with_capacity(n + 2);
    defns.push(Defn::Var {
        attrs: Attrs::default(),
        name: Global::member(Global::top("bench"), "state"),
        ty: Type::I64,
        rhs: Some(Val::Long(0)),
    });
    defns.push(Defn::Const {
        attrs: Attrs::default(),
        name: Global::member(Global::top("bench"), "banner"),
        ty: Type::Array(Box::new(Type::I8), 8),
        rhs: Some(Val::Chars("bench!!".into())),
    });
    let sig = fnty(vec![Type::I32], Type::I32);
    for i in 0..n {
        let body = if i + 1 < n {
            vec![
                Inst::Label(Local::new(0), vec![Val::Local(Local::new(1), Type::I32)]),
                Inst::Let(
                    Local::new(2),
                    Op::Call {
                        ty: sig.clone(),
                        ptr: Val::Global(
                            Global::member(Global::top("bench"), format!("fn_{}", i + 1)),
                            Type::Ptr,
                        ),
                        args: vec![Val::Local(Local::new(1), Type::I32)],
                    },
                    Next::None,
                ),
                Inst::Let(
                    Local::new(3),
                    Op::Bin {
                        op: Bin::Iadd,
                        ty: Type::I32,
                        l: Val::Local(Local::new(2), Type::I32),
                        r: Val::Int(1),
                    },
                    Next::None,
                ),
                Inst::Ret(Some(Val::Local(Local::new(3), Type::I32))),
            ]
        } else {
            vec![
                Inst::Label(Local::new(0), vec![Val::Local(Local::new(1), Type::I32)]),
                Inst::Ret(Some(Val::Local(Local::new(1), Type::I32))),
            ]
        };
        defns.push(Defn::Define {
            attrs: Attrs::default(),
            name: Global::member(Global::top("bench"), format!("fn_{i}")),
            sig: sig.clone(),
            insts: body,
        });
    }
    defns
}

fn emit(defns: &[Defn]) -> String {
    let env: HashMap<String, Defn> = defns
        .iter()
        .map(|defn| (defn.name().show(), defn.clone()))
        .collect();
    let mut emitter = Emitter::new("x86_64-unknown-linux-gnu", &env);
    emitter.gen(defns).expect("emission should succeed")
}

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    for n in [16, 256] {
        let defns = synthetic_program(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("chain_{n}"), |b| {
            b.iter(|| emit(black_box(&defns)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_emit);
criterion_main!(benches);
