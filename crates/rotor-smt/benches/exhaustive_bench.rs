use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rotor_smt::backends::exhaustive::ExhaustiveSolver;
use rotor_smt::query::SmtQuery;
use rotor_smt::solver::SmtSolver;
use rotor_smt::sorts::SmtSort;
use rotor_smt::terms::{BvBinOp, SmtTerm};

/// `x * 3 != (x << 1) + x` over `width` bits: UNSAT, so the whole space is walked.
fn strength_reduction_query(width: u32) -> SmtQuery {
    let mut query = SmtQuery::new();
    let x = || SmtTerm::var("in_x");
    query.declare_input("in_x", SmtSort::BitVec(width));
    query.define(
        "o_r",
        SmtSort::BitVec(width),
        SmtTerm::binary(BvBinOp::Mul, x(), SmtTerm::bv(3, width)),
    );
    query.define(
        "t_r",
        SmtSort::BitVec(width),
        x().shl(SmtTerm::bv(1, width)).add(x()),
    );
    query.assert(SmtTerm::var("o_r").distinct(SmtTerm::var("t_r")));
    query
}

fn bench_exhaustive_12_bits(c: &mut Criterion) {
    let query = strength_reduction_query(12);
    c.bench_function("exhaustive_unsat_12_bits", |b| {
        b.iter(|| {
            let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(60));
            solver.solve_query(black_box(&query)).unwrap()
        })
    });
}

fn bench_exhaustive_16_bits(c: &mut Criterion) {
    let query = strength_reduction_query(16);
    c.bench_function("exhaustive_unsat_16_bits", |b| {
        b.iter(|| {
            let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(60));
            solver.solve_query(black_box(&query)).unwrap()
        })
    });
}

criterion_group!(benches, bench_exhaustive_12_bits, bench_exhaustive_16_bits);
criterion_main!(benches);
