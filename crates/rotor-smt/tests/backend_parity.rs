//! Backend parity tests: every backend must agree with concrete evaluation
//! on a set of small queries.
//!
//! Bitwuzla and btormc tests are gated behind `#[ignore]` so they can be
//! skipped when the tools are not installed. Run with
//! `cargo test -- --ignored` to include them.

use std::time::Duration;

use rotor_smt::backends::btormc::Btor2ModelChecker;
use rotor_smt::backends::exhaustive::ExhaustiveSolver;
use rotor_smt::backends::smtlib_process::SmtLibProcessSolver;
use rotor_smt::query::SmtQuery;
use rotor_smt::solver::{SatResult, SmtSolver};
use rotor_smt::sorts::SmtSort;
use rotor_smt::terms::{BvBinOp, BvCmpOp, SmtTerm};

/// Miter of two 8-bit definitions over one input.
fn miter(original: SmtTerm, translated: SmtTerm) -> SmtQuery {
    let mut query = SmtQuery::new();
    query.declare_input("in_x", SmtSort::BitVec(8));
    query.define("o_r", SmtSort::BitVec(8), original);
    query.define("t_r", SmtSort::BitVec(8), translated);
    query.assert(SmtTerm::var("o_r").distinct(SmtTerm::var("t_r")));
    query
}

fn x() -> SmtTerm {
    SmtTerm::var("in_x")
}

fn equivalent_pair() -> SmtQuery {
    miter(x().add(x()), x().shl(SmtTerm::bv(1, 8)))
}

fn inequivalent_pair() -> SmtQuery {
    // Differs only when bit 7 of x is set.
    miter(
        SmtTerm::binary(BvBinOp::Lshr, x(), SmtTerm::bv(1, 8)),
        SmtTerm::binary(BvBinOp::Ashr, x(), SmtTerm::bv(1, 8)),
    )
}

fn signed_pair() -> SmtQuery {
    // x <s 0 is the same as bit 7 being set.
    let mut query = SmtQuery::new();
    query.declare_input("in_x", SmtSort::BitVec(8));
    query.define(
        "o_r",
        SmtSort::Bool,
        SmtTerm::compare(BvCmpOp::Slt, x(), SmtTerm::bv(0, 8)),
    );
    query.define(
        "t_r",
        SmtSort::Bool,
        SmtTerm::extract(7, 7, x()).eq(SmtTerm::bv(1, 1)),
    );
    query.assert(SmtTerm::var("o_r").distinct(SmtTerm::var("t_r")));
    query
}

fn check_counterexample(query: &SmtQuery, solver: &mut impl SmtSolver<Error = rotor_smt::SolverError>) {
    let (result, model) = solver.solve_query(query).unwrap();
    assert_eq!(result, SatResult::Sat);
    let env = model.expect("sat comes with a model").to_env();
    assert!(
        query.is_satisfied_by(&env).unwrap(),
        "model must witness the discrepancy"
    );
}

#[test]
fn exhaustive_equivalent_pair_is_unsat() {
    let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
    assert_eq!(solver.solve_query(&equivalent_pair()).unwrap().0, SatResult::Unsat);
    let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
    assert_eq!(solver.solve_query(&signed_pair()).unwrap().0, SatResult::Unsat);
}

#[test]
fn exhaustive_inequivalent_pair_has_real_counterexample() {
    let mut solver = ExhaustiveSolver::new(20, Duration::from_secs(10));
    check_counterexample(&inequivalent_pair(), &mut solver);
}

#[test]
#[ignore]
fn bitwuzla_agrees_with_exhaustive() {
    let mut solver = SmtLibProcessSolver::bitwuzla(Duration::from_secs(30));
    assert_eq!(solver.solve_query(&equivalent_pair()).unwrap().0, SatResult::Unsat);
    let mut solver = SmtLibProcessSolver::bitwuzla(Duration::from_secs(30));
    assert_eq!(solver.solve_query(&signed_pair()).unwrap().0, SatResult::Unsat);
    let mut solver = SmtLibProcessSolver::bitwuzla(Duration::from_secs(30));
    check_counterexample(&inequivalent_pair(), &mut solver);
}

#[test]
#[ignore]
fn btormc_agrees_with_exhaustive() {
    let mut checker = Btor2ModelChecker::btormc(0, Duration::from_secs(30));
    assert_eq!(checker.solve_query(&equivalent_pair()).unwrap().0, SatResult::Unsat);
    let mut checker = Btor2ModelChecker::btormc(0, Duration::from_secs(30));
    check_counterexample(&inequivalent_pair(), &mut checker);
}
