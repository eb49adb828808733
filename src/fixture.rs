//! Fixture tree: declared fixtures, their extension links and their scopes.
//!
//! The tree is an arena. Every declared fixture gets a [`FixtureId`] that stays valid for the life of the suite;
//! nodes are never removed, so tests can refer to fixtures by id without keeping them alive themselves.

use fixtree_core::Scope;

use crate::body::{HookFn, TestBody};

/// Index of a fixture in its [`FixtureTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureId(usize);

impl FixtureId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A test recorded on an abstract fixture, copied into each concrete descendant.
#[derive(Clone)]
pub struct AbstractTest {
    pub name: String,
    pub body: TestBody,
}

/// A declared fixture.
#[derive(Clone)]
pub struct FixtureNode {
    pub(crate) name: String,
    pub(crate) parent: Option<FixtureId>,
    pub(crate) scope: Scope,
    pub(crate) set_up: Option<HookFn>,
    pub(crate) tear_down: Option<HookFn>,
    pub(crate) is_abstract: bool,
    pub(crate) abstract_tests: Vec<AbstractTest>,
}

impl FixtureNode {
    /// Declared name; empty for inline fixtures.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<FixtureId> {
        self.parent
    }

    /// The fixture's own layer. Ambient names set during the definition body live here.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn has_set_up(&self) -> bool {
        self.set_up.is_some()
    }

    pub fn has_tear_down(&self) -> bool {
        self.tear_down.is_some()
    }

    pub fn abstract_tests(&self) -> &[AbstractTest] {
        &self.abstract_tests
    }
}

/// Arena of declared fixtures.
#[derive(Clone, Default)]
pub struct FixtureTree {
    nodes: Vec<FixtureNode>,
}

impl FixtureTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixture. Its scope is a fresh layer on top of the parent's scope (or a new root layer).
    pub fn insert(&mut self, parent: Option<FixtureId>, name: impl Into<String>, is_abstract: bool) -> FixtureId {
        let scope = match parent {
            Some(parent) => self.node(parent).scope.child(),
            None => Scope::new(),
        };
        let id = FixtureId(self.nodes.len());
        self.nodes.push(FixtureNode {
            name: name.into(),
            parent,
            scope,
            set_up: None,
            tear_down: None,
            is_abstract,
            abstract_tests: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: FixtureId) -> Option<&FixtureNode> {
        self.nodes.get(id.0)
    }

    /// Ids are only minted by `insert` and nodes are never removed, so indexing cannot fail for ids from this tree.
    pub(crate) fn node(&self, id: FixtureId) -> &FixtureNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: FixtureId) -> &mut FixtureNode {
        &mut self.nodes[id.0]
    }

    /// Ancestors of `id`, nearest first (excluding `id` itself).
    pub fn ancestors(&self, id: FixtureId) -> impl Iterator<Item = FixtureId> + '_ {
        std::iter::successors(self.node(id).parent, |current| self.node(*current).parent)
    }

    /// The chain from the root ancestor down to `id`, inclusive.
    pub fn chain(&self, id: FixtureId) -> Vec<FixtureId> {
        let mut chain: Vec<FixtureId> = self.ancestors(id).collect();
        chain.reverse();
        chain.push(id);
        chain
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FixtureId, &FixtureNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (FixtureId(i), node))
    }
}

/// Qualify a test name with its fixture's name (`"Fixture: test"`); anonymous fixtures leave it alone.
pub fn qualify(fixture_name: &str, test_name: &str) -> String {
    if fixture_name.is_empty() {
        test_name.to_string()
    } else {
        format!("{fixture_name}: {test_name}")
    }
}
