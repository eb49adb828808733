//! Super-fixtures: suite-wide before/after hooks wrapping every test.

use std::fmt;
use std::rc::Rc;

use fixtree_core::{Scope, TestOutcome};

use crate::body::HookFn;

/// A `before_test` / `after_test` pair applied to every test of the suite.
///
/// Each test gets a fresh scope per super-fixture; `after_test` receives the same scope `before_test` saw.
#[derive(Clone)]
pub struct SuperFixture {
    pub(crate) before_test: HookFn,
    pub(crate) after_test: HookFn,
}

impl SuperFixture {
    pub fn new(
        before_test: impl Fn(&Scope) -> TestOutcome + 'static,
        after_test: impl Fn(&Scope) -> TestOutcome + 'static,
    ) -> Self {
        Self {
            before_test: Rc::new(before_test),
            after_test: Rc::new(after_test),
        }
    }
}

impl fmt::Debug for SuperFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuperFixture").finish_non_exhaustive()
    }
}

/// Registration-ordered list of super-fixtures. There is no removal.
#[derive(Debug, Clone, Default)]
pub struct SuperFixtures {
    hooks: Vec<SuperFixture>,
}

impl SuperFixtures {
    pub fn register(&mut self, hook: SuperFixture) {
        self.hooks.push(hook);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuperFixture> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
