//! The suite: declaration API and run entry points.
//!
//! A [`Suite`] owns the fixture tree, the test registry and the super-fixture list. It is a cheap clonable handle;
//! clones share state, so a handle can be captured by test bodies and hooks. [`Suite::global`] returns the
//! thread's default suite.
//!
//! Declaring happens in definition bodies:
//!
//! ```ignore
//! let suite = Suite::new();
//! let base = suite.abstract_fixture("Store", |f| {
//!     f.test("starts empty", |scope| {
//!         let store = scope.require::<Store>("store")?;
//!         assert::equal(&store.len(), &0)
//!     })
//! })?;
//! base.extend("MemoryStore", |f| {
//!     f.set_up(|scope| {
//!         scope.set("store", Store::in_memory());
//!         Ok(())
//!     });
//!     Ok(())
//! })?;
//! assert!(suite.run_all(&mut ConsoleReporter::new(false)));
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::io;
use std::rc::Rc;

use fixtree_core::{ErrorKind, Failure, Scope, TestOutcome};
use miette::Diagnostic;
use thiserror::Error;

use crate::body::{Done, TestBody};
use crate::config::RunConfig;
use crate::engine::{Engine, RunSummary};
use crate::fixture::{AbstractTest, FixtureId, FixtureTree, qualify};
use crate::hooks::{SuperFixture, SuperFixtures};
use crate::registry::{TestCase, TestRegistry, propagate_abstract_tests};
use crate::reporter::{ConsoleReporter, TestReporter};

/// Name given to a continuation test declared without one.
pub const ANONYMOUS_TEST: &str = "<anonymous>";

/// Errors raised by malformed declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DeclarationError {
    #[error("Cannot define a fixture within another fixture")]
    #[diagnostic(
        code(fixtree::nested_fixture),
        help("declare the fixture at top level, or extend the outer fixture once its definition has finished")
    )]
    NestedFixture,

    #[error("{form} requires {expected} arguments")]
    #[diagnostic(code(fixtree::arity))]
    Arity {
        form: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("Cannot declare tests or fixtures while the suite is running")]
    #[diagnostic(code(fixtree::suite_running))]
    SuiteRunning,
}

impl DeclarationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeclarationError::NestedFixture | DeclarationError::SuiteRunning => ErrorKind::DefinitionError,
            DeclarationError::Arity { .. } => ErrorKind::TypeError,
        }
    }
}

impl From<DeclarationError> for Failure {
    fn from(err: DeclarationError) -> Self {
        Failure::new(err.kind(), err.to_string())
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("failed to start the test runtime: {0}")]
    #[diagnostic(code(fixtree::runtime))]
    Runtime(#[source] io::Error),

    #[error("the suite is already running")]
    #[diagnostic(code(fixtree::already_running))]
    AlreadyRunning,
}

#[derive(Default)]
struct SuiteState {
    tree: FixtureTree,
    registry: TestRegistry,
    super_fixtures: SuperFixtures,
    /// Fixture whose definition body is executing.
    active: Option<FixtureId>,
    running: bool,
}

impl SuiteState {
    fn ensure_idle(&self) -> Result<(), DeclarationError> {
        if self.running {
            return Err(DeclarationError::SuiteRunning);
        }
        Ok(())
    }

    /// Record a test against the active fixture (or at top level).
    fn add_test(&mut self, name: String, body: TestBody) {
        match self.active {
            Some(id) if self.tree.node(id).is_abstract => {
                tracing::trace!(fixture = %self.tree.node(id).name, test = %name, "recorded abstract test");
                self.tree.node_mut(id).abstract_tests.push(AbstractTest { name, body });
            }
            Some(id) => {
                let name = qualify(&self.tree.node(id).name, &name);
                self.registry.push(TestCase::new(name, body, Some(id)));
            }
            None => self.registry.push(TestCase::new(name, body, None)),
        }
    }
}

thread_local! {
    static GLOBAL: Suite = Suite::new();
}

/// Handle to a test suite. Clones share the same suite.
#[derive(Clone, Default)]
pub struct Suite {
    state: Rc<RefCell<SuiteState>>,
}

/// Clears the active-definition marker on every exit path, including unwinding.
struct ActiveReset<'a> {
    state: &'a RefCell<SuiteState>,
}

impl Drop for ActiveReset<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().active = None;
    }
}

/// Clears the running flag when a run ends, however it ends.
struct RunningReset<'a> {
    state: &'a RefCell<SuiteState>,
}

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().running = false;
    }
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default suite of the current thread.
    pub fn global() -> Suite {
        GLOBAL.with(Suite::clone)
    }

    // ------------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------------

    /// Declare a top-level fixture and run its definition body.
    pub fn fixture(
        &self,
        name: impl Into<String>,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.define(None, name.into(), false, body)
    }

    /// Declare a top-level abstract fixture. Its tests run only through concrete descendants.
    pub fn abstract_fixture(
        &self,
        name: impl Into<String>,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.define(None, name.into(), true, body)
    }

    /// Declare an anonymous fixture. Its tests keep their unqualified names.
    pub fn inline_fixture(
        &self,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.define(None, String::new(), false, body)
    }

    #[tracing::instrument(skip_all, fields(fixture = %name, is_abstract = is_abstract))]
    fn define(
        &self,
        parent: Option<FixtureId>,
        name: String,
        is_abstract: bool,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        let id = {
            let mut state = self.state.borrow_mut();
            state.ensure_idle()?;
            if state.active.is_some() {
                return Err(DeclarationError::NestedFixture);
            }
            let id = state.tree.insert(parent, name.clone(), is_abstract);
            state.active = Some(id);
            id
        };

        {
            let _reset = ActiveReset { state: &self.state };
            let definition = Definition {
                suite: self.clone(),
                id,
            };
            body(&definition)?;
        }

        if !is_abstract {
            let mut state = self.state.borrow_mut();
            let SuiteState { tree, registry, .. } = &mut *state;
            propagate_abstract_tests(tree, id, registry);
        }
        tracing::debug!("fixture defined");

        Ok(Fixture {
            suite: self.clone(),
            id,
            name,
            is_abstract,
        })
    }

    /// Declare a synchronous test on the active fixture, or at top level.
    ///
    /// Use [`declare_test!`](crate::declare_test) to have the call shape checked.
    pub fn test(
        &self,
        name: impl Into<String>,
        body: impl Fn(&Scope) -> TestOutcome + 'static,
    ) -> Result<(), DeclarationError> {
        self.declare(name.into(), TestBody::sync(body))
    }

    /// Declare a continuation-style test. The test completes when `done` is called.
    pub fn async_test(
        &self,
        name: impl Into<String>,
        body: impl Fn(Scope, Done) + 'static,
    ) -> Result<(), DeclarationError> {
        self.declare(name.into(), TestBody::continuation(body))
    }

    /// Declare a test whose body is a future.
    pub fn future_test<F, Fut>(&self, name: impl Into<String>, body: F) -> Result<(), DeclarationError>
    where
        F: Fn(Scope) -> Fut + 'static,
        Fut: Future<Output = TestOutcome> + 'static,
    {
        self.declare(name.into(), TestBody::future(body))
    }

    /// Declare a test with an already built body.
    pub fn declare(&self, name: String, body: TestBody) -> Result<(), DeclarationError> {
        let mut state = self.state.borrow_mut();
        state.ensure_idle()?;
        state.add_test(name, body);
        Ok(())
    }

    /// Wrap every test of this suite, including ones declared later.
    pub fn register_super_fixture(&self, hook: SuperFixture) {
        self.state.borrow_mut().super_fixtures.register(hook);
    }

    /// Qualified names of the registered tests, in run order.
    pub fn test_names(&self) -> Vec<String> {
        self.state.borrow().registry.names()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Snapshot of the fixture tree.
    pub fn fixtures(&self) -> FixtureTree {
        self.state.borrow().tree.clone()
    }

    /// Forget every fixture and test. Super-fixtures stay registered.
    pub fn reset(&self) -> Result<(), DeclarationError> {
        let mut state = self.state.borrow_mut();
        state.ensure_idle()?;
        if state.active.is_some() {
            return Err(DeclarationError::NestedFixture);
        }
        state.tree = FixtureTree::new();
        state.registry.clear();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------------

    /// Run every registered test with the default configuration.
    ///
    /// ## Returns
    ///
    /// - `true` if every test passed. A run that cannot start counts as failed.
    pub fn run_all(&self, reporter: &mut dyn TestReporter) -> bool {
        match self.run_with(reporter, &RunConfig::default()) {
            Ok(summary) => summary.success(),
            Err(err) => {
                tracing::error!(error = %err, "run did not start");
                false
            }
        }
    }

    /// Run every registered test, then call `continuation(failed)` exactly once.
    pub fn run_all_then(&self, reporter: &mut dyn TestReporter, continuation: impl FnOnce(bool)) {
        let passed = self.run_all(reporter);
        continuation(!passed);
    }

    /// Run with a [`ConsoleReporter`] on stderr, verbose when `config.verbose` is set.
    pub fn run_console(&self, config: &RunConfig) -> Result<RunSummary, RunError> {
        let mut reporter = ConsoleReporter::from_config(config);
        self.run_with(&mut reporter, config)
    }

    /// Run on a fresh single-threaded runtime.
    ///
    /// ## Notes
    ///
    /// - Must not be called from inside a tokio runtime; use [`Suite::run_async`] there.
    pub fn run_with(&self, reporter: &mut dyn TestReporter, config: &RunConfig) -> Result<RunSummary, RunError> {
        if self.is_running() {
            return Err(RunError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RunError::Runtime)?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, self.run_async(reporter, config))
    }

    /// Run inside the caller's runtime. Continuation bodies may `spawn_local` only when polled within a `LocalSet`.
    ///
    /// On success the tests that ran are removed from the registry; after a failure the registry is left as is.
    pub async fn run_async(&self, reporter: &mut dyn TestReporter, config: &RunConfig) -> Result<RunSummary, RunError> {
        let (tree, tests, super_fixtures) = {
            let mut state = self.state.borrow_mut();
            if state.running {
                return Err(RunError::AlreadyRunning);
            }
            state.running = true;
            (
                state.tree.clone(),
                state.registry.tests().to_vec(),
                state.super_fixtures.clone(),
            )
        };
        let _running = RunningReset { state: &self.state };

        let engine = Engine::new(&tree, &super_fixtures, config).with_suite(self);
        let summary = engine.run(&tests, reporter).await;

        if summary.success() {
            self.state.borrow_mut().registry.retain(|test| !config.selects(&test.name));
        }
        Ok(summary)
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Suite")
            .field("fixtures", &state.tree.len())
            .field("tests", &state.registry.len())
            .field("super_fixtures", &state.super_fixtures.len())
            .field("running", &state.running)
            .finish()
    }
}

/// The fixture being defined, handed to definition bodies.
pub struct Definition {
    suite: Suite,
    id: FixtureId,
}

impl Definition {
    pub fn id(&self) -> FixtureId {
        self.id
    }

    pub fn name(&self) -> String {
        self.suite.state.borrow().tree.node(self.id).name.clone()
    }

    pub fn is_abstract(&self) -> bool {
        self.suite.state.borrow().tree.node(self.id).is_abstract
    }

    /// The suite this fixture belongs to.
    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    /// The fixture's own scope layer. Test scopes are built on top of it.
    pub fn scope(&self) -> Scope {
        self.suite.state.borrow().tree.node(self.id).scope.clone()
    }

    /// Make `name` visible to every test and descendant fixture.
    pub fn set<T: std::any::Any>(&self, name: impl Into<String>, value: T) {
        self.scope().set(name, value);
    }

    /// Replace this fixture's setUp.
    pub fn set_up(&self, f: impl Fn(&Scope) -> TestOutcome + 'static) {
        self.suite.state.borrow_mut().tree.node_mut(self.id).set_up = Some(Rc::new(f));
    }

    /// Replace this fixture's tearDown.
    pub fn tear_down(&self, f: impl Fn(&Scope) -> TestOutcome + 'static) {
        self.suite.state.borrow_mut().tree.node_mut(self.id).tear_down = Some(Rc::new(f));
    }

    pub fn test(
        &self,
        name: impl Into<String>,
        body: impl Fn(&Scope) -> TestOutcome + 'static,
    ) -> Result<(), DeclarationError> {
        self.suite.test(name, body)
    }

    pub fn async_test(
        &self,
        name: impl Into<String>,
        body: impl Fn(Scope, Done) + 'static,
    ) -> Result<(), DeclarationError> {
        self.suite.async_test(name, body)
    }

    pub fn future_test<F, Fut>(&self, name: impl Into<String>, body: F) -> Result<(), DeclarationError>
    where
        F: Fn(Scope) -> Fut + 'static,
        Fut: Future<Output = TestOutcome> + 'static,
    {
        self.suite.future_test(name, body)
    }
}

/// A defined fixture, usable as the parent of further fixtures.
#[derive(Clone)]
pub struct Fixture {
    suite: Suite,
    id: FixtureId,
    name: String,
    is_abstract: bool,
}

impl Fixture {
    pub fn id(&self) -> FixtureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Declare a concrete child fixture. Abstract ancestors' tests are copied into it.
    pub fn extend(
        &self,
        name: impl Into<String>,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.suite.define(Some(self.id), name.into(), false, body)
    }

    /// Declare an abstract child fixture.
    pub fn extend_abstract(
        &self,
        name: impl Into<String>,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.suite.define(Some(self.id), name.into(), true, body)
    }

    /// Declare an anonymous concrete child fixture.
    pub fn extend_inline(
        &self,
        body: impl FnOnce(&Definition) -> Result<(), DeclarationError>,
    ) -> Result<Fixture, DeclarationError> {
        self.suite.define(Some(self.id), String::new(), false, body)
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

/// Declare a synchronous test, checking the call shape.
///
/// `declare_test!(suite, name, body)` is `suite.test(name, body)`; any other number of arguments evaluates to
/// `Err(DeclarationError::Arity { .. })` ("test requires 2 arguments"). Works on a [`Suite`] or a [`Definition`].
#[macro_export]
macro_rules! declare_test {
    ($suite:expr, $name:expr, $body:expr $(,)?) => {
        $suite.test($name, $body)
    };
    ($($arg:expr),* $(,)?) => {
        ::core::result::Result::<(), $crate::DeclarationError>::Err($crate::DeclarationError::Arity {
            form: "test",
            expected: "2",
            found: $crate::__count_args!($($arg),*).saturating_sub(1),
        })
    };
}

/// Declare a continuation-style test, checking the call shape. See [`declare_test!`].
///
/// Accepts `(suite, name, body)` or `(suite, body)`; the latter registers the test as [`ANONYMOUS_TEST`]. Any other
/// shape is "async_test requires 1 or 2 arguments".
#[macro_export]
macro_rules! declare_async_test {
    ($suite:expr, $name:expr, $body:expr $(,)?) => {
        $suite.async_test($name, $body)
    };
    ($suite:expr, $body:expr $(,)?) => {
        $suite.async_test($crate::suite::ANONYMOUS_TEST, $body)
    };
    ($($arg:expr),* $(,)?) => {
        ::core::result::Result::<(), $crate::DeclarationError>::Err($crate::DeclarationError::Arity {
            form: "async_test",
            expected: "1 or 2",
            found: $crate::__count_args!($($arg),*).saturating_sub(1),
        })
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __count_args {
    () => { 0usize };
    ($head:expr $(, $tail:expr)*) => { 1usize + $crate::__count_args!($($tail),*) };
}
