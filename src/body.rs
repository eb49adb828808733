//! Test bodies, hooks and the single-shot `Done` continuation.
//!
//! The engine only knows one shape of body: something that, given a scope, yields a future resolving to a
//! [`TestOutcome`]. Synchronous bodies resolve immediately; continuation bodies resolve when their [`Done`] fires;
//! future bodies resolve when their future does. Panics anywhere inside a body or hook become `UncaughtException`
//! failures.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use fixtree_core::{Failure, Scope, TestOutcome};
use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use tokio::sync::oneshot;

/// setUp / tearDown / super-fixture hook.
pub type HookFn = Rc<dyn Fn(&Scope) -> TestOutcome>;

type SyncFn = Rc<dyn Fn(&Scope) -> TestOutcome>;
type ContinuationFn = Rc<dyn Fn(Scope, Done)>;
type FutureFn = Rc<dyn Fn(Scope) -> LocalBoxFuture<'static, TestOutcome>>;

/// Message of the failure reported when a continuation body drops its `Done` without calling it.
pub const DONE_DROPPED: &str = "done continuation dropped without being called";

/// The body of a declared test. Cloning shares the underlying closure.
#[derive(Clone)]
pub enum TestBody {
    Sync(SyncFn),
    Continuation(ContinuationFn),
    Future(FutureFn),
}

impl TestBody {
    pub fn sync(f: impl Fn(&Scope) -> TestOutcome + 'static) -> Self {
        TestBody::Sync(Rc::new(f))
    }

    pub fn continuation(f: impl Fn(Scope, Done) + 'static) -> Self {
        TestBody::Continuation(Rc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Scope) -> Fut + 'static,
        Fut: Future<Output = TestOutcome> + 'static,
    {
        TestBody::Future(Rc::new(move |scope| f(scope).boxed_local()))
    }

    pub fn is_async(&self) -> bool {
        !matches!(self, TestBody::Sync(_))
    }

    /// Invoke the body against `scope`.
    ///
    /// Synchronous bodies have already run to completion when this returns; the future is ready.
    pub(crate) fn start(&self, scope: Scope) -> LocalBoxFuture<'static, TestOutcome> {
        match self {
            TestBody::Sync(f) => future::ready(call_guarded(f, &scope)).boxed_local(),
            TestBody::Continuation(f) => {
                let (tx, rx) = oneshot::channel();
                let done = Done { tx };
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(scope, done))) {
                    return future::ready(Err(Failure::from_panic(payload))).boxed_local();
                }
                async move {
                    match rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Failure::uncaught(DONE_DROPPED)),
                    }
                }
                .boxed_local()
            }
            TestBody::Future(f) => match panic::catch_unwind(AssertUnwindSafe(|| f(scope))) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .map(|result| result.unwrap_or_else(|payload| Err(Failure::from_panic(payload))))
                    .boxed_local(),
                Err(payload) => future::ready(Err(Failure::from_panic(payload))).boxed_local(),
            },
        }
    }
}

impl fmt::Debug for TestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TestBody::Sync(_) => "Sync",
            TestBody::Continuation(_) => "Continuation",
            TestBody::Future(_) => "Future",
        };
        write!(f, "TestBody::{kind}")
    }
}

/// Single-shot continuation handed to continuation-style test bodies.
///
/// Consuming `self` makes a second call impossible. Dropping it without a call fails the test.
pub struct Done {
    tx: oneshot::Sender<TestOutcome>,
}

impl Done {
    pub fn pass(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, failure: Failure) {
        self.complete(Err(failure));
    }

    pub fn complete(self, outcome: TestOutcome) {
        // The receiver is gone only if the run itself was abandoned.
        let _ = self.tx.send(outcome);
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

/// Run a hook, converting a panic into an `UncaughtException` failure.
pub(crate) fn call_guarded(f: &Rc<dyn Fn(&Scope) -> TestOutcome>, scope: &Scope) -> TestOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| f(scope))).unwrap_or_else(|payload| Err(Failure::from_panic(payload)))
}

#[cfg(test)]
mod tests {
    use fixtree_core::ErrorKind;

    use super::*;

    fn block_on(body: &TestBody) -> TestOutcome {
        futures::executor::block_on(body.start(Scope::new()))
    }

    #[test]
    fn test_sync_body_outcomes() {
        assert!(block_on(&TestBody::sync(|_| Ok(()))).is_ok());
        let failure = block_on(&TestBody::sync(|_| Err(Failure::assertion("nope")))).unwrap_err();
        assert_eq!(failure.message, "nope");
    }

    #[test]
    fn test_sync_panic_becomes_uncaught() {
        let failure = block_on(&TestBody::sync(|_| panic!("boom"))).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::UncaughtException);
        assert!(failure.stack.contains("boom"));
    }

    #[test]
    fn test_continuation_resolves_when_done_fires() {
        assert!(block_on(&TestBody::continuation(|_, done| done.pass())).is_ok());
        let failure =
            block_on(&TestBody::continuation(|_, done| done.fail(Failure::assertion("late")))).unwrap_err();
        assert_eq!(failure.message, "late");
    }

    #[test]
    fn test_dropped_done_fails() {
        let failure = block_on(&TestBody::continuation(|_, done| drop(done))).unwrap_err();
        assert_eq!(failure.message, DONE_DROPPED);
    }

    #[test]
    fn test_future_body_and_panic() {
        assert!(block_on(&TestBody::future(|_| async { Ok(()) })).is_ok());
        let failure = block_on(&TestBody::future(|_| async {
            let explode = true;
            if explode {
                panic!("async boom");
            }
            Ok(())
        }))
        .unwrap_err();
        assert_eq!(failure.message, "async boom");
    }

    #[test]
    fn test_body_sees_scope() {
        let body = TestBody::sync(|scope| {
            if scope.contains("x") {
                Ok(())
            } else {
                Err(Failure::assertion("x missing"))
            }
        });
        let scope = Scope::new();
        scope.set("x", 1_i32);
        assert!(futures::executor::block_on(body.start(scope)).is_ok());
        assert!(!body.is_async());
        assert!(TestBody::continuation(|_, d| d.pass()).is_async());
    }
}
