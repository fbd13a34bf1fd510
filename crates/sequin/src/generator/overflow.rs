use std::thread;
use std::time::{Duration, SystemTime};

use portable_atomic::Ordering;

use crate::generator::atomic::Inner;
use crate::TimeSource;

/// Tick period of the overflow watcher - one quarter of a time unit.
pub(crate) const OVERFLOW_TICK: Duration = Duration::from_millis(1);

/// The state of a generator while its sequence pool is overflowing, as
/// published to the optional notification sink.
#[derive(Clone, Copy, Debug)]
pub struct SequenceOverflowNotification {
    /// Wall clock time of the watcher tick.
    pub now: SystemTime,
    /// Number of currently stalled generation calls.
    pub count: u32,
    /// Total count of ticks spent dealing with the *current* overflow.
    pub ticks: u32,
}

impl<T: TimeSource> Inner<T> {
    /// Watches a stalled generator, releasing waiters once the pool has
    /// room again.
    ///
    /// At most one watcher is alive per generator while stalled callers
    /// exist; it terminates once the stall queue drains. Under sustained
    /// load the sequence reset is triggered by a time change inside the
    /// issue path itself - the watcher's reset below only covers the edge
    /// where every caller is parked and no new issue arrives to observe
    /// the fresh time unit.
    ///
    /// The overflow mutex is held only while shared counters are touched;
    /// broadcasts happen outside of it.
    pub(crate) fn overflow_loop(&self) {
        let mut retry_notify = false;
        let mut ticks: u32 = 0;

        loop {
            thread::sleep(OVERFLOW_TICK);

            let mut state = self.overflow.lock();

            if let Some(notifier) = &self.notifier {
                // Ticks only get counted with a sink attached. Even at a
                // count of 0 on the first tick - meaning the generator
                // already declogged - the resolution still gets published.
                ticks += 1;
                if retry_notify || state.count == 0 || ticks % 4 == 1 {
                    let note = SequenceOverflowNotification {
                        now: SystemTime::now(),
                        count: state.count,
                        ticks,
                    };

                    // Non-blocking publish: drop the message on a full sink
                    // but try again next tick instead of waiting out the
                    // full notification interval.
                    retry_notify = notifier.try_send(note).is_err();
                }
            }

            if state.count == 0 {
                state.watcher_live = false;
                return;
            }

            // No shared counters are touched past this point, and the
            // broadcasts don't require the lock.
            drop(state);

            // Parked callers re-check the condition themselves; under
            // steady load the reset already happened in the issue path.
            if self.hot.seq.load(Ordering::Acquire) <= self.seq_max {
                self.overflow_cond.notify_all();
                continue;
            }

            // Callers are parked and nobody is left to observe the new
            // time unit - reset on their behalf.
            if self.clock.current_units() > self.hot.wall_hi.load(Ordering::Acquire) {
                self.hot.seq.store(self.seq_min, Ordering::Release);
                self.overflow_cond.notify_all();
            }
        }
    }
}
