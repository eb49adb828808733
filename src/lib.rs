#![forbid(unsafe_code)]
//! fixtree: a fixture-tree unit-test framework
//!
//! Tests are declared against fixtures that form an extension tree. Each test runs against its own scope layered on
//! top of its fixture's scope; the fixture chain's setUp hooks run root to leaf, tearDowns run leaf to root on every
//! exit path, and the first failing test stops the run. Abstract fixtures contribute test bodies to every concrete
//! fixture that extends them. This crate also ships the module bundler (`combine`) used to assemble test scripts.
//!
//! ## Crates
//!
//! - `fixtree_core`: failure taxonomy and layered scopes (no IO, no runtime)
//! - `fixtree_assert`: assertion helpers, re-exported as [`assert`]
//! - `fixtree_di`: the service provider used by test code
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **User code**: Panics raised by test bodies and hooks are caught by the engine and reported as
//!   `UncaughtException` failures; they never abort a run.

pub mod ambient;
pub mod body;
pub mod cli;
pub mod combine;
pub mod config;
pub mod engine;
pub mod fixture;
pub mod hooks;
pub mod registry;
pub mod reporter;
pub mod suite;

pub use fixtree_assert as assert;
pub use fixtree_core::{ErrorKind, Failure, ResultExt, Scope, TestOutcome, Value};

pub use body::{DONE_DROPPED, Done, HookFn, TestBody};
pub use config::RunConfig;
pub use engine::{Engine, RunSummary, SUITE_KEY, TEST_NAME_KEY, TestState};
pub use fixture::{FixtureId, FixtureNode, FixtureTree};
pub use hooks::SuperFixture;
pub use registry::{TestCase, TestRegistry};
pub use reporter::{ConsoleReporter, EventLog, JsonReporter, TestEvent, TestReporter, Verdict};
pub use suite::{ANONYMOUS_TEST, DeclarationError, Definition, Fixture, RunError, Suite};
