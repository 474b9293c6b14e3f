#![doc = include_str!("../README.md")]

//! Bit-vector terms, concrete evaluation, and decision backends for
//! equivalence queries.
//!
//! Queries are closed `QF_BV` problems ([`query::SmtQuery`]). They can be
//! decided by an SMT-LIB2 solver process, by a BTOR2 model checker, or by
//! exhaustive in-process enumeration; all three implement
//! [`solver::SmtSolver`].

pub mod backends;
pub mod error;
pub mod eval;
pub mod query;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use error::SolverError;
