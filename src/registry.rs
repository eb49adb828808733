//! Test registry and abstract-fixture propagation.
//!
//! The registry is a flat, insertion-ordered list of runnable tests. Tests declared on an abstract fixture never
//! enter it directly; instead, once a concrete descendant finishes its definition, [`propagate_abstract_tests`]
//! copies every abstract ancestor's tests into the registry bound to that descendant.

use crate::body::TestBody;
use crate::fixture::{FixtureId, FixtureTree, qualify};

/// A runnable test.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub(crate) name: String,
    pub(crate) body: TestBody,
    pub(crate) fixture: Option<FixtureId>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, body: TestBody, fixture: Option<FixtureId>) -> Self {
        Self {
            name: name.into(),
            body,
            fixture,
        }
    }

    /// Qualified name (`"Fixture: test"` for tests on named fixtures).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &TestBody {
        &self.body
    }

    /// Leaf fixture the test runs against, if any.
    pub fn fixture(&self) -> Option<FixtureId> {
        self.fixture
    }
}

/// Insertion-ordered list of declared tests.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    tests: Vec<TestCase>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, test: TestCase) {
        tracing::trace!(name = %test.name, "registered test");
        self.tests.push(test);
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    pub fn names(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn clear(&mut self) {
        self.tests.clear();
    }

    /// Keep only the tests matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&TestCase) -> bool) {
        self.tests.retain(keep);
    }
}

/// Copy the tests of every abstract ancestor of `concrete` into `registry`, bound to `concrete`.
///
/// Ancestors are visited nearest first; within one ancestor, tests keep their declaration order. Returns the
/// number of tests added.
pub fn propagate_abstract_tests(tree: &FixtureTree, concrete: FixtureId, registry: &mut TestRegistry) -> usize {
    let concrete_name = tree.node(concrete).name.clone();
    let mut added = 0;
    for ancestor in tree.ancestors(concrete) {
        let node = tree.node(ancestor);
        if !node.is_abstract {
            continue;
        }
        for test in &node.abstract_tests {
            registry.push(TestCase {
                name: qualify(&concrete_name, &test.name),
                body: test.body.clone(),
                fixture: Some(concrete),
            });
            added += 1;
        }
    }
    if added > 0 {
        tracing::debug!(fixture = %concrete_name, added, "propagated abstract tests");
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::AbstractTest;

    fn abstract_test(name: &str) -> AbstractTest {
        AbstractTest {
            name: name.to_string(),
            body: TestBody::sync(|_| Ok(())),
        }
    }

    #[test]
    fn test_propagation_binds_to_concrete_fixture() {
        let mut tree = FixtureTree::new();
        let a = tree.insert(None, "A", true);
        tree.node_mut(a).abstract_tests.push(abstract_test("t"));
        let b = tree.insert(Some(a), "B", false);

        let mut registry = TestRegistry::new();
        assert_eq!(propagate_abstract_tests(&tree, b, &mut registry), 1);
        assert_eq!(registry.names(), vec!["B: t"]);
        assert_eq!(registry.tests()[0].fixture(), Some(b));
    }

    #[test]
    fn test_propagation_walks_every_abstract_ancestor() {
        let mut tree = FixtureTree::new();
        let base = tree.insert(None, "Base", true);
        tree.node_mut(base).abstract_tests.push(abstract_test("base"));
        let middle = tree.insert(Some(base), "Middle", true);
        tree.node_mut(middle).abstract_tests.push(abstract_test("middle"));
        let concrete = tree.insert(Some(middle), "Concrete", false);

        let mut registry = TestRegistry::new();
        propagate_abstract_tests(&tree, concrete, &mut registry);
        assert_eq!(registry.names(), vec!["Concrete: middle", "Concrete: base"]);
    }

    #[test]
    fn test_propagation_skips_concrete_ancestors() {
        let mut tree = FixtureTree::new();
        let a = tree.insert(None, "A", true);
        tree.node_mut(a).abstract_tests.push(abstract_test("t"));
        let b = tree.insert(Some(a), "B", false);
        let c = tree.insert(Some(b), "C", false);

        let mut registry = TestRegistry::new();
        propagate_abstract_tests(&tree, c, &mut registry);
        assert_eq!(registry.names(), vec!["C: t"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = TestRegistry::new();
        registry.push(TestCase::new("x", TestBody::sync(|_| Ok(())), None));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }
}
