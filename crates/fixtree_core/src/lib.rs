//! Provide the shared, pure vocabulary of the fixtree test framework.
//!
//! This crate is intentionally small and dependency-light. It contains the types that the engine, the assertion
//! helpers and the service provider all agree on:
//! - the failure taxonomy ([`ErrorKind`], [`Failure`], [`TestOutcome`]), and
//! - the layered per-test context ([`Scope`]).
//!
//! ## Notes
//!
//! - This is a "semantic core" crate: **no IO**, no global state, and no async runtime.
//! - Everything here is single-threaded by construction (`Rc`, `RefCell`); a suite never shares a scope across
//!   threads.

pub mod errors;
pub mod scope;

pub use errors::{ErrorKind, Failure, ResultExt, TestOutcome};
pub use scope::{Scope, Value};
