use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use log::{debug, trace};

use crate::Scheduler;

struct Inner {
    sched: Scheduler,
    /// `true` while a pacing thread is alive. All transitions happen under
    /// the lock, so a drained-and-exiting thread cannot race a concurrent
    /// schedule into leaving timers stranded.
    running: bool,
    stopped: bool,
}

/// Paces a [`Scheduler`] with an OS timer.
///
/// The pulse thread is started lazily when the first timer is scheduled and
/// exits when the queue drains; scheduling again starts a fresh one. The
/// thread does nothing but call [`Scheduler::tick`] once per
/// [`crate::Options::ticker_interval`] — ordering and fairness live entirely
/// in the queue.
pub struct Ticker {
    inner: Arc<Mutex<Inner>>,
}

impl Ticker {
    pub fn new(sched: Scheduler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sched,
                running: false,
                stopped: false,
            })),
        }
    }

    /// Access the scheduler, then make sure a pulse thread is alive if any
    /// timer ended up scheduled.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        let mut inner = self.lock();
        let ret = f(&mut inner.sched);

        if !inner.sched.is_idle() && !inner.running && !inner.stopped {
            inner.running = true;
            let interval = inner.sched.options().ticker_interval;
            drop(inner);

            debug!("starting pulse thread");
            let shared = Arc::clone(&self.inner);
            thread::Builder::new()
                .name("goatdb-ticker".into())
                .spawn(move || loop {
                    thread::sleep(interval);
                    let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                    if inner.stopped {
                        inner.running = false;
                        break;
                    }
                    let tick = inner.sched.tick(Instant::now());
                    if tick.fired > 0 {
                        trace!("tick fired={} yielded={}", tick.fired, tick.yielded);
                    }
                    if inner.sched.is_idle() {
                        debug!("queue drained, pulse thread exiting");
                        inner.running = false;
                        break;
                    }
                })
                .expect("failed to spawn ticker thread");
        }

        ret
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.lock().stopped = true;
    }
}
