use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::time::duration_to_millis;

/// Millisecond value reported for an event that is not pending (or a slot
/// that holds no event).
pub const NOT_SCHEDULED_MS: i64 = -1;

/// When a scheduled event should fire, relative to its creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Fire once this much time has elapsed.
    After(Duration),
    /// Never fire on its own; the event stays pending until cancelled.
    Indefinite,
}

impl Delay {
    pub fn from_secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::After(Duration::from_millis(millis))
    }
}

/// Lifecycle of a scheduled event. `Cancelled` and `Fired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventState {
    Pending = 0,
    Cancelled = 1,
    Fired = 2,
}

impl EventState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Cancelled,
            _ => Self::Fired,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
struct EventShared {
    /// `None` for [`Delay::Indefinite`] events.
    fire_at: Option<Instant>,
    state: AtomicU8,
}

/// Shared handle to a one-shot deferred action.
///
/// The handle is cheap to clone and safe to query from any thread: the fire
/// time never changes after creation and the state is an atomic, so a reader
/// on a network thread sees cancellations and firings made by the engine
/// thread without further locking.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    shared: Arc<EventShared>,
}

impl ScheduledEvent {
    /// Create a pending handle firing `delay` from now.
    pub fn new(delay: Delay) -> Self {
        Self::starting_at(Instant::now(), delay)
    }

    /// Create a pending handle firing `delay` after `now`.
    ///
    /// A finite delay too large to represent as an `Instant` is treated as
    /// [`Delay::Indefinite`].
    pub fn starting_at(now: Instant, delay: Delay) -> Self {
        let fire_at = match delay {
            Delay::After(d) => now.checked_add(d),
            Delay::Indefinite => None,
        };
        Self {
            shared: Arc::new(EventShared {
                fire_at,
                state: AtomicU8::new(EventState::Pending as u8),
            }),
        }
    }

    pub fn fire_at(&self) -> Option<Instant> {
        self.shared.fire_at
    }

    pub fn state(&self) -> EventState {
        EventState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// True iff the event is still pending.
    pub fn is_running(&self) -> bool {
        self.state() == EventState::Pending
    }

    /// Cancel the event if it is still pending. Idempotent: calling it on a
    /// terminal event leaves the state untouched. Returns the state after
    /// the call.
    pub fn cancel(&self) -> EventState {
        match self.transition(EventState::Cancelled) {
            Ok(()) => EventState::Cancelled,
            Err(current) => current,
        }
    }

    /// Time until the event fires, or `None` once it is no longer pending.
    /// Indefinite events report `Duration::MAX`.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.time_remaining_at(Instant::now())
    }

    pub fn time_remaining_at(&self, now: Instant) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        Some(match self.shared.fire_at {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::MAX,
        })
    }

    /// Remaining milliseconds, or [`NOT_SCHEDULED_MS`] when not pending.
    pub fn millis_remaining(&self) -> i64 {
        self.millis_remaining_at(Instant::now())
    }

    pub fn millis_remaining_at(&self, now: Instant) -> i64 {
        self.time_remaining_at(now)
            .map_or(NOT_SCHEDULED_MS, duration_to_millis)
    }

    /// Whether two handles refer to the same event.
    pub fn same_event(&self, other: &ScheduledEvent) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn is_due(&self, now: Instant) -> bool {
        self.is_running() && self.shared.fire_at.is_some_and(|at| at <= now)
    }

    fn transition(&self, to: EventState) -> Result<(), EventState> {
        self.shared
            .state
            .compare_exchange(
                EventState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(EventState::from_u8)
    }
}

/// One-shot action run against the engine-owned context `C`.
pub type EventAction<C> = Box<dyn FnOnce(&mut C) + Send>;

/// A scheduled event together with the action it runs when fired.
pub struct DelayedEvent<C> {
    label: &'static str,
    handle: ScheduledEvent,
    action: EventAction<C>,
}

impl<C> std::fmt::Debug for DelayedEvent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedEvent")
            .field("label", &self.label)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<C> DelayedEvent<C> {
    pub fn new(
        label: &'static str,
        delay: Delay,
        action: impl FnOnce(&mut C) + Send + 'static,
    ) -> Self {
        Self::starting_at(label, Instant::now(), delay, action)
    }

    pub fn starting_at(
        label: &'static str,
        now: Instant,
        delay: Delay,
        action: impl FnOnce(&mut C) + Send + 'static,
    ) -> Self {
        Self {
            label,
            handle: ScheduledEvent::starting_at(now, delay),
            action: Box::new(action),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn handle(&self) -> &ScheduledEvent {
        &self.handle
    }

    /// Mark the event fired and run its action. Returns false without
    /// running anything if the event was cancelled first.
    ///
    /// A panicking action is logged and swallowed; the event stays `Fired`.
    pub fn fire(self, ctx: &mut C) -> bool {
        let DelayedEvent {
            label,
            handle,
            action,
        } = self;

        if let Err(state) = handle.transition(EventState::Fired) {
            tracing::debug!(event = label, ?state, "Skipping event that is no longer pending");
            return false;
        }

        tracing::debug!(event = label, "Firing scheduled event");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || action(ctx))) {
            tracing::error!(
                event = label,
                reason = %panic_message(payload.as_ref()),
                "Scheduled event action failed"
            );
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Ordered queue of pending events, advanced once per engine tick.
pub struct EventHandler<C> {
    pending: Vec<DelayedEvent<C>>,
}

impl<C> Default for EventHandler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventHandler<C> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queue an event. Returns a handle sharing its state.
    pub fn add(&mut self, event: DelayedEvent<C>) -> ScheduledEvent {
        let handle = event.handle.clone();
        self.pending.push(event);
        handle
    }

    /// Build and queue an event in one step.
    pub fn schedule(
        &mut self,
        label: &'static str,
        delay: Delay,
        action: impl FnOnce(&mut C) + Send + 'static,
    ) -> ScheduledEvent {
        self.add(DelayedEvent::new(label, delay, action))
    }

    /// Number of queued events, including cancelled ones not yet swept.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop cancelled events and remove every event due at `now`, in
    /// insertion order. The caller fires them with [`DelayedEvent::fire`].
    ///
    /// Splitting removal from firing lets an action reach back into whatever
    /// owns this handler (to chain a new event, or cancel one) while it runs.
    pub fn take_due(&mut self, now: Instant) -> Vec<DelayedEvent<C>> {
        let before = self.pending.len();
        self.pending.retain(|e| !e.handle.state().is_terminal());
        let swept = before - self.pending.len();
        if swept > 0 {
            tracing::debug!(swept, "Removed cancelled events from queue");
        }

        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|e| e.handle.is_due(now));
        self.pending = waiting;
        due
    }

    /// Fire every event due at `now` against `ctx`. Returns how many fired.
    pub fn tick(&mut self, now: Instant, ctx: &mut C) -> usize {
        self.take_due(now)
            .into_iter()
            .map(|event| event.fire(ctx))
            .filter(|fired| *fired)
            .count()
    }
}
