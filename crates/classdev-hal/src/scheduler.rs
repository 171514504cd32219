//! Attribute change notification
//!
//! Device attributes cannot be watched, only re-read. The [`Scheduler`] keeps
//! a list of notification requests, each a predicate plus a callback, and
//! evaluates all of them on a shared periodic tick. A request is removed once
//! it fires (unless it was registered with [`Trigger::Always`]) or once its
//! predicate fails.
//!
//! The timer only runs while at least one request is pending. It starts on
//! the first subscription and stops on the tick, or the unsubscribe, that
//! leaves the list empty.
//!
//! ```no_run
//! use classdev_hal::{Query, Resolver, Scheduler};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let motor = Resolver::default().resolve(&Query::new("tacho-motor"))?;
//! motor.write("command", "run-to-rel-pos")?;
//!
//! let scheduler = Scheduler::new();
//! let motor = scheduler
//!     .await_predicate(motor, |m| Ok(m.read_sequence("state")?.iter().any(|s| s == "holding")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::device::DeviceError;
use classdev_config::HalConfig;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Default tick period
pub const DEFAULT_TICK_INTERVAL: Duration =
    Duration::from_millis(classdev_config::DEFAULT_TICK_INTERVAL_MS);

/// When a request stops being evaluated after its predicate holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    /// Fire once, then remove the request
    #[default]
    FirstOnly,
    /// Fire on every tick the predicate holds
    Always,
}

/// Identifies a pending request for [`Scheduler::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

/// Source of periodic ticks
///
/// `tick` returns `false` once the scheduler it drives is gone; the clock
/// should stop calling it then.
pub trait Clock: Send {
    fn start(&mut self, interval: Duration, tick: Box<dyn Fn() -> bool + Send>);
    fn stop(&mut self);
}

/// Ticks from a background thread
#[derive(Debug, Default)]
pub struct ThreadClock {
    stop: Option<Arc<AtomicBool>>,
}

impl Clock for ThreadClock {
    fn start(&mut self, interval: Duration, tick: Box<dyn Fn() -> bool + Send>) {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Some(Arc::clone(&stop));

        thread::spawn(move || {
            tracing::debug!("Notification timer started ({:?})", interval);
            loop {
                thread::sleep(interval);
                if stop.load(Ordering::Acquire) || !tick() {
                    break;
                }
            }
            tracing::debug!("Notification timer stopped");
        });
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Release);
        }
    }
}

/// A clock that never ticks on its own
///
/// Drive the scheduler by calling [`Scheduler::tick`]. Useful in tests.
#[derive(Debug, Default)]
pub struct ManualClock;

impl Clock for ManualClock {
    fn start(&mut self, _interval: Duration, _tick: Box<dyn Fn() -> bool + Send>) {}

    fn stop(&mut self) {}
}

enum Step {
    Keep,
    Remove,
}

trait Evaluate: Send {
    fn evaluate(&mut self) -> Step;
}

struct Request<T, P, C> {
    data: T,
    predicate: P,
    callback: C,
    trigger: Trigger,
}

impl<T, P, C> Request<T, P, C>
where
    C: FnMut(Result<&mut T, DeviceError>),
{
    /// Deliver `result` to the callback; `false` if the callback panicked
    fn notify(&mut self, result: Result<(), DeviceError>) -> bool {
        let data = &mut self.data;
        let callback = &mut self.callback;
        match panic::catch_unwind(AssertUnwindSafe(|| callback(result.map(|()| data)))) {
            Ok(()) => true,
            Err(payload) => {
                tracing::warn!(
                    "Notification callback panicked: {}",
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }
}

impl<T, P, C> Evaluate for Request<T, P, C>
where
    T: Send,
    P: FnMut(&T) -> anyhow::Result<bool> + Send,
    C: FnMut(Result<&mut T, DeviceError>) + Send,
{
    fn evaluate(&mut self) -> Step {
        let data = &self.data;
        let predicate = &mut self.predicate;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| predicate(data)))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "predicate panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });

        match outcome {
            Ok(true) => {
                if !self.notify(Ok(())) {
                    return Step::Remove;
                }
                match self.trigger {
                    Trigger::FirstOnly => Step::Remove,
                    Trigger::Always => Step::Keep,
                }
            }
            Ok(false) => Step::Keep,
            Err(e) => {
                tracing::debug!("Notification predicate failed: {:#}", e);
                self.notify(Err(DeviceError::Predicate(e)));
                Step::Remove
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

struct Entry {
    id: u64,
    request: Box<dyn Evaluate>,
}

struct State {
    requests: Vec<Entry>,
    // Ids unsubscribed while their entry was out for evaluation
    cancelled: HashSet<u64>,
    // Entries of the running tick not yet removed
    in_flight: usize,
    next_id: u64,
    ticking: bool,
    running: bool,
    clock: Box<dyn Clock>,
}

struct Shared {
    interval: Duration,
    state: Mutex<State>,
    // Serialises ticks; held for a whole evaluation pass
    tick_lock: Mutex<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.clock.stop();
    }
}

/// Evaluates notification requests on a shared timer
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Scheduler")
            .field("interval", &self.shared.interval)
            .field("pending", &(state.requests.len() + state.in_flight))
            .field("running", &state.running)
            .finish()
    }
}

impl Scheduler {
    /// Scheduler ticking every [`DEFAULT_TICK_INTERVAL`] from a background thread
    pub fn new() -> Self {
        Self::with_clock(ThreadClock::default(), DEFAULT_TICK_INTERVAL)
    }

    /// Scheduler ticking at the configured interval
    pub fn from_config(config: &HalConfig) -> Self {
        Self::with_clock(ThreadClock::default(), config.tick_interval())
    }

    /// Scheduler driven by an arbitrary clock
    pub fn with_clock(clock: impl Clock + 'static, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                interval,
                state: Mutex::new(State {
                    requests: Vec::new(),
                    cancelled: HashSet::new(),
                    in_flight: 0,
                    next_id: 0,
                    ticking: false,
                    running: false,
                    clock: Box::new(clock),
                }),
                tick_lock: Mutex::new(()),
            }),
        }
    }

    /// Scheduler that only evaluates when [`Scheduler::tick`] is called
    pub fn manual() -> Self {
        Self::with_clock(ManualClock, DEFAULT_TICK_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Number of requests waiting to fire
    ///
    /// Includes the requests of a tick in progress until that tick removes
    /// them.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.requests.len() + state.in_flight
    }

    /// Whether the timer is currently running
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Register a notification request
    ///
    /// On every tick `predicate` is called with `data`. When it returns
    /// `Ok(true)` the callback receives `Ok(&mut data)`; when it fails the
    /// callback receives the error and the request is removed. Callbacks run
    /// on the ticking thread and delay every other request while they run.
    pub fn subscribe<T, P, C>(
        &self,
        data: T,
        predicate: P,
        callback: C,
        trigger: Trigger,
    ) -> RequestHandle
    where
        T: Send + 'static,
        P: FnMut(&T) -> anyhow::Result<bool> + Send + 'static,
        C: FnMut(Result<&mut T, DeviceError>) + Send + 'static,
    {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.requests.push(Entry {
            id,
            request: Box::new(Request {
                data,
                predicate,
                callback,
                trigger,
            }),
        });
        tracing::debug!("Notification request {} registered ({:?})", id, trigger);
        self.update_clock(&mut state);
        RequestHandle(id)
    }

    /// Wait until `predicate` holds for `data`, then get `data` back
    ///
    /// The returned future fails with [`DeviceError::Predicate`] if the
    /// predicate fails, and with [`DeviceError::Cancelled`] if the request is
    /// unsubscribed. There is no timeout; wrap the future in one if needed.
    pub fn await_predicate<T, P>(&self, data: T, mut predicate: P) -> Notified<T>
    where
        T: Send + 'static,
        P: FnMut(&T) -> anyhow::Result<bool> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);

        let handle = self.subscribe(
            Some(data),
            move |data: &Option<T>| match data {
                Some(data) => predicate(data),
                None => Ok(false),
            },
            move |result: Result<&mut Option<T>, DeviceError>| {
                let result = result.and_then(|data| data.take().ok_or(DeviceError::Cancelled));
                if let Some(tx) = tx.take() {
                    // The receiver may have been dropped; nobody is waiting then.
                    let _ = tx.send(result);
                }
            },
            Trigger::FirstOnly,
        );

        Notified { rx, handle }
    }

    /// Remove a request before it fires
    ///
    /// Unknown or already removed handles are ignored.
    pub fn unsubscribe(&self, handle: RequestHandle) {
        let mut state = self.lock();
        let before = state.requests.len();
        state.requests.retain(|entry| entry.id != handle.0);

        if state.requests.len() == before && state.ticking {
            state.cancelled.insert(handle.0);
        }
        tracing::debug!("Notification request {} removed", handle.0);
        self.update_clock(&mut state);
    }

    /// Evaluate every pending request once, in registration order
    ///
    /// Normally called by the clock. Must not be called from inside a
    /// callback.
    pub fn tick(&self) {
        let _tick = self
            .shared
            .tick_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let batch = {
            let mut state = self.lock();
            state.ticking = true;
            state.in_flight = state.requests.len();
            mem::take(&mut state.requests)
        };

        // Evaluate without holding the state lock so callbacks can subscribe
        // and unsubscribe.
        let mut kept = Vec::with_capacity(batch.len());
        for mut entry in batch {
            let step = if self.lock().cancelled.remove(&entry.id) {
                Step::Remove
            } else {
                entry.request.evaluate()
            };
            match step {
                Step::Keep => kept.push(entry),
                Step::Remove => self.lock().in_flight -= 1,
            }
        }

        let mut state = self.lock();
        let cancelled = mem::take(&mut state.cancelled);
        kept.retain(|entry| !cancelled.contains(&entry.id));
        kept.append(&mut state.requests);
        state.requests = kept;
        state.in_flight = 0;
        state.ticking = false;
        self.update_clock(&mut state);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update_clock(&self, state: &mut State) {
        if state.ticking {
            return;
        }

        if !state.requests.is_empty() && !state.running {
            let weak: Weak<Shared> = Arc::downgrade(&self.shared);
            let tick = move || match weak.upgrade() {
                Some(shared) => {
                    Scheduler { shared }.tick();
                    true
                }
                None => false,
            };
            state.clock.start(self.shared.interval, Box::new(tick));
            state.running = true;
        } else if state.requests.is_empty() && state.running {
            state.clock.stop();
            state.running = false;
        }
    }
}

/// Result of [`Scheduler::await_predicate`]
#[derive(Debug)]
pub struct Notified<T> {
    rx: oneshot::Receiver<Result<T, DeviceError>>,
    handle: RequestHandle,
}

impl<T> Notified<T> {
    /// Handle of the underlying request, for cancellation
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    /// Block the current thread until the request fires or fails
    ///
    /// Panics if called from within an async runtime; `.await` it there.
    pub fn wait(self) -> Result<T, DeviceError> {
        self.rx.blocking_recv().unwrap_or(Err(DeviceError::Cancelled))
    }

    /// The outcome, if the request has already fired or failed
    pub fn try_take(&mut self) -> Option<Result<T, DeviceError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DeviceError::Cancelled)),
        }
    }
}

impl<T> Future for Notified<T> {
    type Output = Result<T, DeviceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DeviceError::Cancelled)))
    }
}
