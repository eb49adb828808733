//! Execution engine.
//!
//! Runs tests one at a time in registry order. For each test the engine:
//!
//! 1. runs every super-fixture's `before_test` against its own fresh scope,
//! 2. builds the test scope on top of the leaf fixture's scope, exposing the test name and the owning suite,
//! 3. runs each fixture's `set_up` root to leaf,
//! 4. runs the body and waits for it to resolve,
//! 5. drains the exit stack, running every acquired `after_test` / `tear_down` in reverse.
//!
//! An entry is pushed onto the exit stack only once the matching acquisition step succeeded, so a failing `set_up`
//! still gets every tearDown of the fixtures above it, and never its own. The first failing test stops the run.
//!
//! ## Notes
//!
//! - Synchronous bodies are resolved futures; there is one engine, not one per body shape.
//! - Panics inside hooks and bodies are caught and reported as `UncaughtException` failures.

use std::time::{Duration, Instant};

use fixtree_core::{Failure, Scope, TestOutcome};
use tracing::Instrument;

use crate::ambient;
use crate::body::{HookFn, call_guarded};
use crate::config::RunConfig;
use crate::fixture::FixtureTree;
use crate::hooks::SuperFixtures;
use crate::registry::TestCase;
use crate::reporter::{TestEvent, TestReporter};
use crate::suite::Suite;

/// Scope key under which the running test's qualified name is exposed.
pub const TEST_NAME_KEY: &str = "testName";

/// Scope key under which the [`Suite`] running the test is exposed, when the run was started from one.
pub const SUITE_KEY: &str = "suite";

/// Lifecycle of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Pending,
    SetUp,
    Running,
    TearDown,
    Passed,
    Failed,
}

fn transition(state: TestState) {
    tracing::debug!(?state, "test state");
}

/// Hooks to run when a test exits, most recent last.
#[derive(Default)]
pub(crate) struct ExitStack {
    entries: Vec<(HookFn, Scope)>,
}

impl ExitStack {
    pub(crate) fn push(&mut self, hook: HookFn, scope: Scope) {
        self.entries.push((hook, scope));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run every entry in reverse push order exactly once.
    ///
    /// A failing entry does not stop the drain; the first failure is returned.
    pub(crate) fn drain(&mut self) -> TestOutcome {
        let mut first: Option<Failure> = None;
        while let Some((hook, scope)) = self.entries.pop() {
            if let Err(failure) = call_guarded(&hook, &scope) {
                tracing::warn!(error = %failure, "teardown failed");
                first.get_or_insert(failure);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tests in the registry when the run started
    pub total: usize,
    pub passed: usize,
    /// Tests excluded by the filter
    pub skipped: usize,
    /// Name of the test that stopped the run
    pub failed: Option<String>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed.is_none()
    }

    /// Tests that were never started because an earlier test failed.
    pub fn not_run(&self) -> usize {
        let ran = self.passed + self.skipped + usize::from(self.failed.is_some());
        self.total.saturating_sub(ran)
    }
}

/// Runs tests against a fixture tree and a set of super-fixtures.
pub struct Engine<'a> {
    tree: &'a FixtureTree,
    super_fixtures: &'a SuperFixtures,
    config: &'a RunConfig,
    suite: Option<&'a Suite>,
}

impl<'a> Engine<'a> {
    pub fn new(tree: &'a FixtureTree, super_fixtures: &'a SuperFixtures, config: &'a RunConfig) -> Self {
        Self {
            tree,
            super_fixtures,
            config,
            suite: None,
        }
    }

    /// Expose `suite` to every test scope under [`SUITE_KEY`].
    pub fn with_suite(mut self, suite: &'a Suite) -> Self {
        self.suite = Some(suite);
        self
    }

    /// Run `tests` in order, stopping at the first failure.
    ///
    /// ## Returns
    ///
    /// - A summary naming the failed test, if any. `all-tests-complete` is emitted only when nothing failed.
    #[tracing::instrument(skip_all, fields(tests = tests.len()))]
    pub async fn run(&self, tests: &[TestCase], reporter: &mut dyn TestReporter) -> RunSummary {
        let started = Instant::now();
        let _guard = self.config.guard_ambient.then(ambient::guard);
        let mut summary = RunSummary {
            total: tests.len(),
            ..RunSummary::default()
        };

        for test in tests {
            if !self.config.selects(&test.name) {
                tracing::trace!(name = %test.name, "filtered out");
                summary.skipped += 1;
                continue;
            }
            reporter.on_event(&TestEvent::TestStart {
                name: test.name.clone(),
            });
            match self.run_test(test).await {
                Ok(()) => {
                    summary.passed += 1;
                    reporter.on_event(&TestEvent::passed(&test.name));
                }
                Err(failure) => {
                    tracing::info!(name = %test.name, error = %failure, "test failed; stopping run");
                    reporter.on_event(&TestEvent::failed(&test.name, failure));
                    summary.failed = Some(test.name.clone());
                    break;
                }
            }
        }

        if summary.success() {
            reporter.on_event(&TestEvent::AllTestsComplete);
        }
        summary.duration = started.elapsed();
        tracing::debug!(passed = summary.passed, skipped = summary.skipped, "run finished");
        summary
    }

    /// Run a single test through its full lifecycle.
    pub async fn run_test(&self, test: &TestCase) -> TestOutcome {
        let span = tracing::debug_span!("test", name = %test.name);
        async {
            transition(TestState::Pending);
            let mut exits = ExitStack::default();
            let outcome = self.acquire_and_run(test, &mut exits).await;
            transition(TestState::TearDown);
            let teardown = exits.drain();
            let outcome = outcome.and(teardown);
            transition(if outcome.is_ok() { TestState::Passed } else { TestState::Failed });
            outcome
        }
        .instrument(span)
        .await
    }

    async fn acquire_and_run(&self, test: &TestCase, exits: &mut ExitStack) -> TestOutcome {
        transition(TestState::SetUp);
        for hook in self.super_fixtures.iter() {
            let scope = Scope::new();
            call_guarded(&hook.before_test, &scope)?;
            exits.push(hook.after_test.clone(), scope);
        }

        let scope = match test.fixture {
            Some(leaf) => self.tree.node(leaf).scope.child(),
            None => Scope::new(),
        };
        scope.set(TEST_NAME_KEY, test.name.clone());
        if let Some(suite) = self.suite {
            scope.set(SUITE_KEY, suite.clone());
        }

        if let Some(leaf) = test.fixture {
            for id in self.tree.chain(leaf) {
                let node = self.tree.node(id);
                if let Some(set_up) = &node.set_up {
                    call_guarded(set_up, &scope)?;
                }
                if let Some(tear_down) = &node.tear_down {
                    exits.push(tear_down.clone(), scope.clone());
                }
            }
        }

        transition(TestState::Running);
        let pending = test.body.start(scope);
        match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Failure::uncaught(format!("test timed out after {} ms", limit.as_millis()))),
            },
            None => pending.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use fixtree_core::ErrorKind;
    use futures::executor::block_on;

    use super::*;
    use crate::body::TestBody;
    use crate::hooks::SuperFixture;
    use crate::reporter::EventLog;

    type Trace = Rc<RefCell<Vec<String>>>;

    fn record(trace: &Trace, entry: &'static str) -> HookFn {
        let trace = Rc::clone(trace);
        Rc::new(move |_| {
            trace.borrow_mut().push(entry.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_exit_stack_drains_in_reverse_and_keeps_first_failure() {
        let trace: Trace = Rc::default();
        let mut exits = ExitStack::default();
        exits.push(record(&trace, "first"), Scope::new());
        exits.push(Rc::new(|_| Err(Failure::uncaught("second broke"))), Scope::new());
        exits.push(Rc::new(|_| Err(Failure::uncaught("third broke"))), Scope::new());
        assert_eq!(exits.len(), 3);

        let failure = exits.drain().unwrap_err();
        assert_eq!(failure.message, "third broke");
        assert_eq!(*trace.borrow(), vec!["first"]);
        assert_eq!(exits.len(), 0);
        assert!(exits.drain().is_ok());
    }

    #[test]
    fn test_chain_order_and_test_name_in_scope() {
        let trace: Trace = Rc::default();
        let mut tree = FixtureTree::new();
        let root = tree.insert(None, "Root", false);
        tree.node_mut(root).set_up = Some(record(&trace, "root up"));
        tree.node_mut(root).tear_down = Some(record(&trace, "root down"));
        let leaf = tree.insert(Some(root), "Leaf", false);
        tree.node_mut(leaf).set_up = Some(record(&trace, "leaf up"));
        tree.node_mut(leaf).tear_down = Some(record(&trace, "leaf down"));

        let body_trace = Rc::clone(&trace);
        let test = TestCase::new(
            "Leaf: t",
            TestBody::sync(move |scope| {
                let name = scope.require::<String>(TEST_NAME_KEY)?;
                body_trace.borrow_mut().push(format!("body {name}"));
                Ok(())
            }),
            Some(leaf),
        );

        let hooks = SuperFixtures::default();
        let config = RunConfig::new().with_ambient_guard(false);
        let engine = Engine::new(&tree, &hooks, &config);
        assert!(block_on(engine.run_test(&test)).is_ok());
        assert_eq!(
            *trace.borrow(),
            vec!["root up", "leaf up", "body Leaf: t", "leaf down", "root down"]
        );
    }

    #[test]
    fn test_failed_set_up_skips_own_tear_down_but_runs_outer() {
        let trace: Trace = Rc::default();
        let mut tree = FixtureTree::new();
        let root = tree.insert(None, "Root", false);
        tree.node_mut(root).tear_down = Some(record(&trace, "root down"));
        let leaf = tree.insert(Some(root), "Leaf", false);
        tree.node_mut(leaf).set_up = Some(Rc::new(|_| Err(Failure::assertion("no setup"))));
        tree.node_mut(leaf).tear_down = Some(record(&trace, "leaf down"));

        let body_trace = Rc::clone(&trace);
        let test = TestCase::new(
            "Leaf: t",
            TestBody::sync(move |_| {
                body_trace.borrow_mut().push("body".to_string());
                Ok(())
            }),
            Some(leaf),
        );
        let hooks = SuperFixtures::default();
        let config = RunConfig::new();
        let engine = Engine::new(&tree, &hooks, &config);

        let failure = block_on(engine.run_test(&test)).unwrap_err();
        assert_eq!(failure.message, "no setup");
        assert_eq!(*trace.borrow(), vec!["root down"]);
    }

    #[test]
    fn test_body_failure_wins_over_teardown_failure() {
        let mut tree = FixtureTree::new();
        let f = tree.insert(None, "F", false);
        tree.node_mut(f).tear_down = Some(Rc::new(|_| Err(Failure::uncaught("teardown"))));
        let test = TestCase::new("F: t", TestBody::sync(|_| Err(Failure::assertion("body"))), Some(f));
        let hooks = SuperFixtures::default();
        let config = RunConfig::new();
        let engine = Engine::new(&tree, &hooks, &config);

        let failure = block_on(engine.run_test(&test)).unwrap_err();
        assert_eq!(failure.message, "body");

        let passing = TestCase::new("F: ok", TestBody::sync(|_| Ok(())), Some(f));
        let failure = block_on(engine.run_test(&passing)).unwrap_err();
        assert_eq!(failure.message, "teardown");
    }

    #[test]
    fn test_super_fixture_scopes_are_fresh_and_shared_with_after_test() {
        let seen: Rc<RefCell<Vec<bool>>> = Rc::default();
        let mut hooks = SuperFixtures::default();
        let after_seen = Rc::clone(&seen);
        hooks.register(SuperFixture::new(
            |scope| {
                let fresh = !scope.contains(TEST_NAME_KEY) && scope.own_names().is_empty();
                scope.set("fresh", fresh);
                Ok(())
            },
            move |scope| {
                after_seen.borrow_mut().push(*scope.require::<bool>("fresh")?);
                Ok(())
            },
        ));
        let tree = FixtureTree::new();
        let config = RunConfig::new();
        let engine = Engine::new(&tree, &hooks, &config);
        let test = TestCase::new("top", TestBody::sync(|_| Ok(())), None);
        assert!(block_on(engine.run_test(&test)).is_ok());
        assert!(block_on(engine.run_test(&test)).is_ok());
        assert_eq!(*seen.borrow(), vec![true, true]);
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let tree = FixtureTree::new();
        let hooks = SuperFixtures::default();
        let config = RunConfig::new();
        let engine = Engine::new(&tree, &hooks, &config);
        let tests = vec![
            TestCase::new("one", TestBody::sync(|_| Ok(())), None),
            TestCase::new("two", TestBody::sync(|_| panic!("boom")), None),
            TestCase::new("three", TestBody::sync(|_| Ok(())), None),
        ];

        let log = EventLog::new();
        let mut sink = log.clone();
        let summary = block_on(engine.run(&tests, &mut sink));
        assert_eq!(summary.failed.as_deref(), Some("two"));
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.not_run(), 1);
        assert_eq!(log.started(), vec!["one", "two"]);
        let failure = log.first_failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::UncaughtException);
        assert!(failure.stack.contains("boom"));
        assert!(!log.events().contains(&TestEvent::AllTestsComplete));
    }

    #[test]
    fn test_filter_skips_without_events() {
        let tree = FixtureTree::new();
        let hooks = SuperFixtures::default();
        let config = RunConfig::new().with_filter("keep");
        let engine = Engine::new(&tree, &hooks, &config);
        let tests = vec![
            TestCase::new("keep me", TestBody::sync(|_| Ok(())), None),
            TestCase::new("drop me", TestBody::sync(|_| Ok(())), None),
        ];
        let log = EventLog::new();
        let mut sink = log.clone();
        let summary = block_on(engine.run(&tests, &mut sink));
        assert!(summary.success());
        assert_eq!(summary.skipped, 1);
        assert_eq!(log.started(), vec!["keep me"]);
        assert_eq!(log.events().last(), Some(&TestEvent::AllTestsComplete));
    }

    #[test]
    fn test_ambient_guard_held_during_body_only_when_enabled() {
        let tree = FixtureTree::new();
        let hooks = SuperFixtures::default();
        let test = TestCase::new(
            "guarded",
            TestBody::sync(|_| {
                if ambient::is_guarded() {
                    Ok(())
                } else {
                    Err(Failure::assertion("guard not held"))
                }
            }),
            None,
        );

        let config = RunConfig::new();
        let summary = block_on(Engine::new(&tree, &hooks, &config).run(std::slice::from_ref(&test), &mut |_: &TestEvent| {}));
        assert!(summary.success());

        let config = RunConfig::new().with_ambient_guard(false);
        let summary = block_on(Engine::new(&tree, &hooks, &config).run(std::slice::from_ref(&test), &mut |_: &TestEvent| {}));
        assert!(!summary.success());
        assert!(!ambient::is_guarded());
    }
}
