use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kiln_codegen::{lower_tree, Target};
use kiln_ir::{DataType, Opcode, Payload, Tree};

/// A unit with the shapes lowering spends its time on: loads, shared
/// subexpressions, arithmetic chains, compares, and branches.
fn arithmetic_unit(blocks: usize) -> Tree {
    let mut t = Tree::new();
    let x = t.symbols.data("x", 0, DataType::Int32);
    let y = t.symbols.data("y", 4, DataType::Int32);
    let out = t.symbols.data("out", 8, DataType::Int32);

    for i in 0..blocks {
        let skip = t.def_label();
        let xv = t.node_with(Opcode::ILoad, &[], Payload::Sym(x));
        let yv = t.node_with(Opcode::ILoad, &[], Payload::Sym(y));
        let sum = t.node(Opcode::IAdd, &[xv, yv]);
        let scaled = t.node(Opcode::IMul, &[sum, sum]);
        let c = t.iconst(i as i32);
        let biased = t.node(Opcode::ISub, &[scaled, c]);
        let zero = t.iconst(0);
        let br = t.node_with(Opcode::IfICmpLt, &[biased, zero], Payload::Label(skip));
        t.root(br);
        let st = t.node_with(Opcode::IStore, &[biased], Payload::Sym(out));
        t.root(st);
        t.place_label(skip);
    }
    let ret = t.node(Opcode::Return, &[]);
    t.root(ret);
    t
}

fn bench_lower(c: &mut Criterion) {
    let small = arithmetic_unit(8);
    let large = arithmetic_unit(256);

    c.bench_function("lower_amd64_small", |b| {
        b.iter(|| lower_tree(black_box(&small), Target::Amd64).unwrap())
    });
    c.bench_function("lower_amd64_large", |b| {
        b.iter(|| lower_tree(black_box(&large), Target::Amd64).unwrap())
    });
    c.bench_function("lower_i686_large", |b| {
        b.iter(|| lower_tree(black_box(&large), Target::I686).unwrap())
    });
}

criterion_group!(benches, bench_lower);
criterion_main!(benches);
