//! Ambient determinism guard.
//!
//! Tests must not depend on wall-clock timers or uncontrolled randomness. While a run holds an [`AmbientGuard`] on
//! the current thread, the functions in this module fail immediately with an `AssertionError` instead of scheduling
//! work or producing values, steering authors toward fakes. Outside a run they behave normally.
//!
//! `set_timeout` with a delay of at most one millisecond is the exception: the callback runs immediately, guarded
//! or not, since nothing observable depends on the clock in that case.
//!
//! Timers are tokio tasks. Inside a runtime they are spawned on it and die with it; outside one they run on a
//! small background runtime shared by the process.

use std::cell::Cell;
use std::future::Future;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use fixtree_core::Failure;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

static BACKGROUND: OnceLock<Runtime> = OnceLock::new();

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Keeps the guard active on this thread until dropped. Guards nest.
#[derive(Debug)]
#[must_use = "the guard is released as soon as it is dropped"]
pub struct AmbientGuard {
    _private: (),
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Activate the guard for the current thread.
pub fn guard() -> AmbientGuard {
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    AmbientGuard { _private: () }
}

/// Whether the guard is active on the current thread.
pub fn is_guarded() -> bool {
    GUARD_DEPTH.with(|depth| depth.get() > 0)
}

#[track_caller]
fn refuse(what: &str) -> Failure {
    Failure::assertion(format!("Don't call {what} in tests.  Use fakes."))
}

#[track_caller]
fn check(what: &str) -> Result<(), Failure> {
    if is_guarded() { Err(refuse(what)) } else { Ok(()) }
}

fn background() -> Result<&'static Runtime, Failure> {
    if let Some(runtime) = BACKGROUND.get() {
        return Ok(runtime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("fixtree-timers")
        .enable_time()
        .build()
        .map_err(|err| Failure::uncaught(format!("cannot start the timer runtime: {err}")))?;
    // Losing the race drops our runtime; the winner's is used.
    let _ = BACKGROUND.set(runtime);
    BACKGROUND
        .get()
        .ok_or_else(|| Failure::uncaught("timer runtime is unavailable"))
}

fn spawn<F>(task: F) -> Result<JoinHandle<()>, Failure>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Ok(handle.spawn(task)),
        Err(_) => Ok(background()?.spawn(task)),
    }
}

/// Run `callback` after `delay`.
///
/// Delays of 0 or 1 ms run the callback before returning. Longer delays fail while guarded; otherwise the callback
/// runs once the delay has elapsed on the timer's runtime.
#[track_caller]
pub fn set_timeout<F>(delay: Duration, callback: F) -> Result<(), Failure>
where
    F: FnOnce() + Send + 'static,
{
    if delay <= Duration::from_millis(1) {
        callback();
        return Ok(());
    }
    check("setTimeout")?;
    spawn(async move {
        tokio::time::sleep(delay).await;
        callback();
    })?;
    Ok(())
}

/// A running interval. Cancelling or dropping the handle stops future ticks.
#[derive(Debug)]
#[must_use = "the interval stops as soon as its handle is dropped"]
pub struct IntervalHandle {
    task: JoinHandle<()>,
    cancelled: AtomicBool,
}

impl IntervalHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `callback` every `period` until the returned handle is cancelled or dropped.
///
/// A zero period is treated as one millisecond.
#[track_caller]
pub fn set_interval<F>(period: Duration, mut callback: F) -> Result<IntervalHandle, Failure>
where
    F: FnMut() + Send + 'static,
{
    check("setInterval")?;
    let period = period.max(Duration::from_millis(1));
    let task = spawn(async move {
        let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            callback();
        }
    })?;
    Ok(IntervalHandle {
        task,
        cancelled: AtomicBool::new(false),
    })
}

/// Defer `callback` until the current task yields.
///
/// Outside a runtime there is nothing to yield to, and the callback runs on the background timer runtime.
#[track_caller]
pub fn next_tick<F>(callback: F) -> Result<(), Failure>
where
    F: FnOnce() + Send + 'static,
{
    check("process.nextTick")?;
    spawn(async move {
        tokio::task::yield_now().await;
        callback();
    })?;
    Ok(())
}

/// A uniformly distributed value in `[0, 1)`.
#[track_caller]
pub fn random() -> Result<f64, Failure> {
    check("Math.random")?;
    Ok(rand::random::<f64>())
}

/// The current wall-clock time.
#[track_caller]
pub fn now() -> Result<SystemTime, Failure> {
    check("Date.now")?;
    Ok(SystemTime::now())
}
