//! Reporter sink and built-in reporters.
//!
//! ## TestReporter Trait
//!
//! The engine emits a flat stream of [`TestEvent`]s and never formats anything itself. Any `FnMut(&TestEvent)`
//! closure is a reporter; [`ConsoleReporter`], [`JsonReporter`] and [`EventLog`] cover the common cases.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use fixtree_core::Failure;
use serde::Serialize;

use crate::config::RunConfig;

/// Verdict of a completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

/// One event of a run.
///
/// Serialises to `{"type":"test-start","name":..}`, `{"type":"test-complete","name":..,"verdict":"PASS"}`,
/// `{"type":"test-complete","name":..,"verdict":"FAIL","stack":..,"failure":{..}}` and
/// `{"type":"all-tests-complete"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TestEvent {
    TestStart {
        name: String,
    },
    TestComplete {
        name: String,
        verdict: Verdict,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<Failure>,
    },
    AllTestsComplete,
}

impl TestEvent {
    pub(crate) fn passed(name: &str) -> Self {
        TestEvent::TestComplete {
            name: name.to_string(),
            verdict: Verdict::Pass,
            stack: None,
            failure: None,
        }
    }

    pub(crate) fn failed(name: &str, failure: Failure) -> Self {
        TestEvent::TestComplete {
            name: name.to_string(),
            verdict: Verdict::Fail,
            stack: Some(failure.stack.clone()),
            failure: Some(failure),
        }
    }

    /// Test name, if the event concerns a single test.
    pub fn name(&self) -> Option<&str> {
        match self {
            TestEvent::TestStart { name } | TestEvent::TestComplete { name, .. } => Some(name),
            TestEvent::AllTestsComplete => None,
        }
    }
}

/// Trait for receiving run events.
///
/// Implement this trait to customize output (JSON, TAP, ...).
pub trait TestReporter {
    fn on_event(&mut self, event: &TestEvent);
}

impl<F: FnMut(&TestEvent)> TestReporter for F {
    fn on_event(&mut self, event: &TestEvent) {
        self(event)
    }
}

/// Console reporter (pytest-style)
pub struct ConsoleReporter<W: Write = io::Stderr> {
    out: W,
    pub verbose: bool,
    pub color: bool,
    passed: usize,
    failed: usize,
    started: Option<Instant>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(io::stderr(), verbose)
    }

    /// A stderr reporter listing every test when `config.verbose` is set.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.verbose)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            color: true,
            passed: 0,
            failed: 0,
            started: None,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    // Console output is best effort; a closed stderr must not abort a run.
    fn write_event(&mut self, event: &TestEvent) -> io::Result<()> {
        match event {
            TestEvent::TestStart { name } => {
                self.started.get_or_insert_with(Instant::now);
                if self.verbose {
                    write!(self.out, "{name} ... ")?;
                }
            }
            TestEvent::TestComplete {
                name, verdict, stack, ..
            } => match verdict {
                Verdict::Pass => {
                    self.passed += 1;
                    if self.verbose {
                        writeln!(self.out, "{}", self.paint("32", "PASS"))?;
                    } else {
                        write!(self.out, "{}", self.paint("32", "."))?;
                    }
                }
                Verdict::Fail => {
                    self.failed += 1;
                    if self.verbose {
                        writeln!(self.out, "{}", self.paint("31", "FAIL"))?;
                    } else {
                        write!(self.out, "{}", self.paint("31", "F"))?;
                    }
                    writeln!(self.out, "\n{}", self.paint("31", name))?;
                    if let Some(stack) = stack {
                        writeln!(self.out, "{stack}")?;
                    }
                }
            },
            TestEvent::AllTestsComplete => {}
        }
        if matches!(event, TestEvent::AllTestsComplete)
            || matches!(event, TestEvent::TestComplete { verdict: Verdict::Fail, .. })
        {
            self.write_summary()?;
        }
        self.out.flush()
    }

    fn write_summary(&mut self) -> io::Result<()> {
        if !self.verbose {
            writeln!(self.out)?;
        }
        let mut parts = Vec::new();
        if self.passed > 0 {
            parts.push(self.paint("32", &format!("{} passed", self.passed)));
        }
        if self.failed > 0 {
            parts.push(self.paint("31", &format!("{} failed", self.failed)));
        }
        if parts.is_empty() {
            parts.push("no tests ran".to_string());
        }
        let elapsed = self.started.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0);
        writeln!(self.out, "====== {} in {:.2}s ======", parts.join(", "), elapsed)
    }
}

impl<W: Write> TestReporter for ConsoleReporter<W> {
    fn on_event(&mut self, event: &TestEvent) {
        if let Err(err) = self.write_event(event) {
            tracing::warn!(error = %err, "console reporter failed to write");
        }
    }
}

/// Writes one JSON object per event, newline separated.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TestReporter for JsonReporter<W> {
    fn on_event(&mut self, event: &TestEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(err) = written {
            tracing::warn!(error = %err, "json reporter failed to write");
        }
    }
}

/// Records every event. Clones share the same log, so one clone can be handed to a run and another inspected.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<TestEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TestEvent> {
        self.events.borrow().clone()
    }

    /// Names of tests that were started, in order.
    pub fn started(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TestEvent::TestStart { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(name, verdict)` of every completed test, in order.
    pub fn verdicts(&self) -> Vec<(String, Verdict)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TestEvent::TestComplete { name, verdict, .. } => Some((name.clone(), *verdict)),
                _ => None,
            })
            .collect()
    }

    /// The failure of the first failed test, if any.
    pub fn first_failure(&self) -> Option<Failure> {
        self.events.borrow().iter().find_map(|event| match event {
            TestEvent::TestComplete {
                failure: Some(failure), ..
            } => Some(failure.clone()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl TestReporter for EventLog {
    fn on_event(&mut self, event: &TestEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
