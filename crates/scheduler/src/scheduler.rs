use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use log::trace;

use crate::{Options, Policy};

/// Identifies a timer within one [`Scheduler`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimerId(u64);

/// Outcome of one [`Scheduler::tick`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Tick {
    /// Number of callbacks fired.
    pub fired: usize,
    /// `true` if the tick budget ran out with due deadlines remaining.
    pub yielded: bool,
}

/// Queue entry; the heap is a min-heap over `(deadline, seq)`, so deadlines
/// fire in order with insertion order breaking ties.
#[derive(Eq, Ord, PartialEq, PartialOrd)]
struct Entry {
    deadline: Instant,
    seq: u64,
    id: TimerId,
}

struct TimerState {
    policy: Policy,
    callback: Box<dyn FnMut() -> bool + Send>,
    /// Sequence number of this timer's live queue entry, if scheduled.
    ///
    /// Unscheduling flips this to `None` and leaves the queue entry in
    /// place; the tick drops entries whose sequence number no longer
    /// matches. That is how microtasks cancel without a dequeue, and it
    /// works uniformly for every policy.
    scheduled: Option<u64>,
    /// Where the easing policies measure their ramp from.
    ramp_start: Option<Instant>,
}

/// A deadline queue over a single pacing pulse.
///
/// The scheduler is a plain data structure mutated only from the foreground
/// context; the OS timer (see [`crate::Ticker`]) merely paces calls to
/// [`Scheduler::tick`]. Within one tick, due deadlines fire in
/// `(deadline, insertion order)`; a tick exceeding
/// [`Options::tick_budget`] yields, so a burst of deadlines cannot starve
/// foreground operations.
///
/// This is an explicit value passed through constructors, not a process-wide
/// singleton.
pub struct Scheduler {
    timers: HashMap<TimerId, TimerState>,
    queue: BinaryHeap<Reverse<Entry>>,
    next_timer: u64,
    next_seq: u64,
    opts: Options,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Scheduler {
    pub fn new(opts: Options) -> Self {
        Self {
            timers: HashMap::new(),
            queue: BinaryHeap::new(),
            next_timer: 0,
            next_seq: 0,
            opts,
        }
    }

    pub fn options(&self) -> Options {
        self.opts
    }

    /// Register a timer. It does not fire until [`Scheduler::schedule`]d.
    ///
    /// The callback returns `true` to request rescheduling; the concrete
    /// fire time is recomputed by the timer's policy.
    pub fn add(&mut self, policy: Policy, callback: impl FnMut() -> bool + Send + 'static) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.timers.insert(
            id,
            TimerState {
                policy,
                callback: Box::new(callback),
                scheduled: None,
                ramp_start: None,
            },
        );

        id
    }

    /// Drop a timer entirely, unscheduling it if necessary.
    pub fn remove(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    /// Arm `id` according to its policy. Idempotent if already scheduled.
    pub fn schedule(&mut self, id: TimerId) {
        self.schedule_at(id, Instant::now());
    }

    fn schedule_at(&mut self, id: TimerId, now: Instant) {
        let Some(state) = self.timers.get_mut(&id) else {
            return;
        };
        if state.scheduled.is_some() {
            return;
        }
        let ramp_start = *state.ramp_start.get_or_insert(now);
        let deadline = state.policy.next_deadline(now, ramp_start);
        let seq = self.next_seq;
        self.next_seq += 1;
        state.scheduled = Some(seq);
        self.queue.push(Reverse(Entry { deadline, seq, id }));
        trace!("schedule {id:?} seq={seq}");
    }

    /// Disarm `id` if pending. Idempotent if not scheduled.
    pub fn unschedule(&mut self, id: TimerId) {
        if let Some(state) = self.timers.get_mut(&id) {
            state.scheduled = None;
        }
    }

    /// Restart the ramp of an easing timer, making it snappy again.
    pub fn reset_backoff(&mut self, id: TimerId) {
        if let Some(state) = self.timers.get_mut(&id) {
            state.ramp_start = Some(Instant::now());
        }
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers
            .get(&id)
            .is_some_and(|state| state.scheduled.is_some())
    }

    /// `true` if no timer is scheduled.
    pub fn is_idle(&self) -> bool {
        self.timers.values().all(|state| state.scheduled.is_none())
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        // Stale heap entries can only be earlier than the live one of the
        // same timer, so the minimum over live entries needs the map.
        self.queue
            .iter()
            .filter(|Reverse(entry)| self.live(entry))
            .map(|Reverse(entry)| entry.deadline)
            .min()
    }

    fn live(&self, entry: &Entry) -> bool {
        self.timers
            .get(&entry.id)
            .is_some_and(|state| state.scheduled == Some(entry.seq))
    }

    /// Fire every deadline due at `now`, in `(deadline, insertion)` order.
    ///
    /// Timers scheduled while the tick runs are not considered until the
    /// next tick, whatever their deadline. If the tick budget runs out with
    /// due deadlines remaining, the tick yields and reports so.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let started = Instant::now();
        let seq_snapshot = self.next_seq;
        let mut tick = Tick::default();
        // Entries armed during this tick, pushed back once it completes.
        let mut deferred = Vec::new();

        loop {
            let Some(Reverse(top)) = self.queue.peek() else {
                break;
            };
            if top.deadline > now {
                break;
            }
            if tick.fired > 0 && started.elapsed() > self.opts.tick_budget {
                tick.yielded = true;
                break;
            }

            let Reverse(entry) = self.queue.pop().expect("peeked entry");
            if entry.seq >= seq_snapshot {
                deferred.push(entry);
                continue;
            }
            if !self.live(&entry) {
                // Unscheduled (or removed) after insertion; see
                // `TimerState::scheduled`.
                continue;
            }

            let state = self.timers.get_mut(&entry.id).expect("live entry");
            state.scheduled = None;
            let again = (state.callback)();
            tick.fired += 1;
            trace!("fired {:?} again={again}", entry.id);
            if again {
                let fired_at = Instant::now();
                let ramp_start = *state.ramp_start.get_or_insert(fired_at);
                let deadline = state.policy.next_deadline(fired_at, ramp_start);
                let seq = self.next_seq;
                self.next_seq += 1;
                state.scheduled = Some(seq);
                self.queue.push(Reverse(Entry {
                    deadline,
                    seq,
                    id: entry.id,
                }));
            }
        }

        for entry in deferred {
            self.queue.push(Reverse(entry));
        }

        tick
    }
}
