use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU32, AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::generator::overflow::SequenceOverflowNotification;
use crate::generator::snapshot::{sanitize, GeneratorSnapshot};
use crate::time::TIME_UNIT_MILLIS;
use crate::{partition, time, Id, Partition, Result, TimeSource, WallClock, MAX_SEQUENCE};

/// The mutable word-sized state of a generator, all accessed atomically.
pub(crate) struct Hot {
    /// The most recent wall time observed while successfully classifying an
    /// issue. Bidirectional - progresses with the clock and regresses when
    /// a drift gets accepted.
    pub(crate) wall_hi: AtomicU64,
    /// The highest wall time ever abandoned by a regression. Increases
    /// monotonically; the regression path must not re-enter `..=wall_safe`
    /// without sleeping.
    pub(crate) wall_safe: AtomicU64,
    /// Current sequence of the time-bound path. Resets to `seq_min` at each
    /// new time unit.
    pub(crate) seq: AtomicU32,
    /// Independent sequence of the caller-supplied-time path. Rolls over to
    /// `seq_min` on overflow and never blocks.
    pub(crate) seq_static: AtomicU32,
    /// Count of accepted regressions. The LSB is the current tick-tock bit.
    pub(crate) drifts: AtomicU32,
}

/// Bookkeeping of callers stalled on sequence overflow, behind the overflow
/// mutex.
pub(crate) struct OverflowState {
    pub(crate) count: u32,
    pub(crate) watcher_live: bool,
}

pub(crate) struct Inner<T> {
    #[cfg(feature = "cache-padded")]
    pub(crate) hot: crossbeam_utils::CachePadded<Hot>,
    #[cfg(not(feature = "cache-padded"))]
    pub(crate) hot: Hot,

    /// Partition in its internal representation - the two high bytes of the
    /// word, so a sequence can be OR'ed in without masking. Immutable.
    pub(crate) partition: u32,
    pub(crate) seq_min: u32,
    pub(crate) seq_max: u32,

    /// Serializes acceptance of a regression and its associated triple
    /// store. The fast path never takes it.
    pub(crate) regression: Mutex<()>,

    pub(crate) overflow: Mutex<OverflowState>,
    pub(crate) overflow_cond: Condvar,
    pub(crate) notifier: Option<Sender<SequenceOverflowNotification>>,

    pub(crate) clock: T,
}

/// Issues identifiers scoped to a fixed [`Partition`] and manages their
/// sequence.
///
/// A generator is safe to share across threads; cloning is cheap and clones
/// issue from the same underlying state. Within one generator and one time
/// unit, issued identifiers are strictly increasing. Wall clock regressions
/// are absorbed by toggling the identifier's tick-tock bit once per accepted
/// regression; a second regression into an already-abandoned time range
/// delays the caller until the clock passes the abandoned range again.
///
/// Generators are constructed either from defaults (a process-unique
/// partition, the full sequence pool) or from a [`GeneratorSnapshot`], which
/// doubles as configuration and as restart state.
///
/// # Example
/// ```
/// use sequin::{Generator, WallClock};
///
/// let generator = Generator::new(WallClock).expect("partition pool exhausted");
///
/// let a = generator.generate(0);
/// let b = generator.generate(0);
/// assert!(a < b);
/// ```
pub struct Generator<T = WallClock> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Generator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TimeSource> Generator<T> {
    /// Creates a generator from defaults: an allocator-assigned partition,
    /// the full `0..=65535` sequence pool and zeroed time fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartitionPoolExhausted`] once more than 65536
    /// default-configured generators exist in the process.
    ///
    /// [`Error::PartitionPoolExhausted`]: crate::Error::PartitionPoolExhausted
    pub fn new(clock: T) -> Result<Self> {
        Self::build(None, None, clock)
    }

    /// Like [`Generator::new`], with a sink that receives
    /// [`SequenceOverflowNotification`]s while callers are stalled on an
    /// exhausted sequence pool. Publishes never block: a notification that
    /// cannot be delivered is dropped and retried on the next watcher tick.
    pub fn with_notifier(clock: T, notifier: Sender<SequenceOverflowNotification>) -> Result<Self> {
        Self::build(None, Some(notifier), clock)
    }

    /// Restores a generator from a snapshot, which may equally be
    /// hand-built configuration.
    ///
    /// Bounds are normalized before use (either order, `sequence_max = 0`
    /// and `sequence = 0` defaults); all other fields are taken verbatim,
    /// which is what prevents a restarted generator from re-issuing
    /// identifiers produced before going offline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequenceBounds`] when the snapshot violates
    /// the sequence bounds contract.
    ///
    /// [`Error::InvalidSequenceBounds`]: crate::Error::InvalidSequenceBounds
    pub fn from_snapshot(snapshot: GeneratorSnapshot, clock: T) -> Result<Self> {
        Self::build(Some(snapshot), None, clock)
    }

    /// Like [`Generator::from_snapshot`], with an overflow notification
    /// sink. See [`Generator::with_notifier`].
    pub fn from_snapshot_with_notifier(
        snapshot: GeneratorSnapshot,
        clock: T,
        notifier: Sender<SequenceOverflowNotification>,
    ) -> Result<Self> {
        Self::build(Some(snapshot), Some(notifier), clock)
    }

    fn build(
        snapshot: Option<GeneratorSnapshot>,
        notifier: Option<Sender<SequenceOverflowNotification>>,
        clock: T,
    ) -> Result<Self> {
        let (partition, seq_min, seq_max, seq, wall_hi, wall_safe, drifts) = match snapshot {
            Some(s) => {
                let s = sanitize(s)?;
                (
                    partition::to_internal(s.partition),
                    u32::from(s.sequence_min),
                    u32::from(s.sequence_max),
                    s.sequence,
                    s.wall_hi,
                    s.wall_safe,
                    s.drifts,
                )
            }
            None => (partition::alloc()?, 0, u32::from(MAX_SEQUENCE), 0, 0, 0, 0),
        };

        let hot = Hot {
            wall_hi: AtomicU64::new(wall_hi),
            wall_safe: AtomicU64::new(wall_safe),
            seq: AtomicU32::new(seq),
            // Offset to one below the lower bound: the caller-supplied-time
            // path increments first and has no time progression branch that
            // would reset the sequence on first use.
            seq_static: AtomicU32::new(seq_min.wrapping_sub(1)),
            drifts: AtomicU32::new(drifts),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                #[cfg(feature = "cache-padded")]
                hot: crossbeam_utils::CachePadded::new(hot),
                #[cfg(not(feature = "cache-padded"))]
                hot,
                partition,
                seq_min,
                seq_max,
                regression: Mutex::new(()),
                overflow: Mutex::new(OverflowState {
                    count: 0,
                    watcher_live: false,
                }),
                overflow_cond: Condvar::new(),
                notifier,
                clock,
            }),
        })
    }

    /// Returns the fixed partition of this generator.
    pub fn partition(&self) -> Partition {
        partition::to_public(self.inner.partition)
    }

    /// Returns the current sequence.
    ///
    /// This does *not* mean a subsequent [`generate`] call will get this
    /// sequence - other callers may come first. If the next issue would
    /// reset the sequence alongside a time change, the lower bound is
    /// returned instead of the internal value.
    ///
    /// While the generator is overflowing, the returned value exceeds
    /// [`sequence_max`] (hence the u32), which makes the current overflow
    /// observable.
    ///
    /// [`generate`]: Generator::generate
    /// [`sequence_max`]: Generator::sequence_max
    pub fn sequence(&self) -> u32 {
        let inner = &*self.inner;
        if inner.clock.current_units() == inner.hot.wall_hi.load(Ordering::Acquire) {
            return inner.hot.seq.load(Ordering::Acquire);
        }

        inner.seq_min
    }

    /// Returns the lower bound of the sequence pool.
    pub fn sequence_min(&self) -> u16 {
        self.inner.seq_min as u16
    }

    /// Returns the upper bound of the sequence pool.
    pub fn sequence_max(&self) -> u16 {
        self.inner.seq_max as u16
    }

    /// Returns the total capacity of the sequence pool.
    pub fn capacity(&self) -> u32 {
        self.inner.seq_max - self.inner.seq_min + 1
    }

    /// Returns the number of identifiers issued in the current time unit,
    /// 0 once the clock has moved past it.
    pub fn len(&self) -> u32 {
        let inner = &*self.inner;
        if inner.clock.current_units() == inner.hot.wall_hi.load(Ordering::Acquire) {
            let seq = inner.hot.seq.load(Ordering::Acquire);
            if seq < inner.seq_max {
                return seq - inner.seq_min + 1;
            }

            return self.capacity();
        }

        0
    }

    /// Whether no identifier has been issued in the current time unit.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes a copy of the generator's current bookkeeping data.
    ///
    /// The sequence recorded follows the same rule as [`sequence`]: if the
    /// next issue would reset it alongside a time change, the lower bound
    /// is recorded.
    ///
    /// [`sequence`]: Generator::sequence
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn snapshot(&self) -> GeneratorSnapshot {
        let inner = &*self.inner;
        let now = inner.clock.current_units();
        let wall_hi = inner.hot.wall_hi.load(Ordering::Acquire);

        let sequence = if now == wall_hi {
            inner.hot.seq.load(Ordering::Acquire)
        } else {
            inner.seq_min
        };

        GeneratorSnapshot {
            partition: self.partition(),
            sequence_min: inner.seq_min as u16,
            sequence_max: inner.seq_max as u16,
            sequence,
            now,
            wall_hi,
            wall_safe: inner.hot.wall_safe.load(Ordering::Acquire),
            drifts: inner.hot.drifts.load(Ordering::Acquire),
        }
    }

    /// Generates a new identifier using the given instant for the
    /// timestamp.
    ///
    /// Identifiers issued with caller-supplied time are exempt from the
    /// tick-tock mechanism (the bit is always zero) and draw from a
    /// sequence separate from [`generate`] - one independent from time,
    /// since the instants given here can be arbitrary. That sequence
    /// increases strictly monotonically up to the pool's upper bound and
    /// then rolls over silently to the lower bound; this method never
    /// blocks, as the generator has no way to know when it could resume
    /// within an arbitrary timeframe. Managing potential collisions is
    /// left to the operator.
    ///
    /// Instants are floored to unit resolution; instants before [`EPOCH`]
    /// are not representable and clamp to zero.
    ///
    /// [`generate`]: Generator::generate
    /// [`EPOCH`]: crate::EPOCH
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, at)))]
    pub fn generate_at(&self, meta: u8, at: SystemTime) -> Id {
        let inner = &*self.inner;
        let mut seq = inner.hot.seq_static.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

        while seq > inner.seq_max {
            match inner.hot.seq_static.compare_exchange(
                seq,
                inner.seq_min,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => seq = inner.seq_min,
                // Lost the rollover race; draw a fresh sequence.
                Err(_) => {
                    seq = inner.hot.seq_static.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
                }
            }
        }

        Id::from_parts(time::units_at(at), 0, meta, inner.partition, seq)
    }
}

impl<T: TimeSource + Send + Sync + 'static> Generator<T> {
    /// Generates a new identifier using the current wall clock time for the
    /// timestamp. Never fails.
    ///
    /// The only conditions under which this call does not return promptly
    /// are an exhausted sequence pool (the caller waits for the next time
    /// unit) and a repeated clock regression into a time range the
    /// generator already abandoned (the caller sleeps until the clock
    /// passes the abandoned range).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate(&self, meta: u8) -> Id {
        let inner = &*self.inner;

        loop {
            // One load of wall_hi per attempt; every branch below reasons
            // about this one observation.
            let wall_hi = inner.hot.wall_hi.load(Ordering::Acquire);
            let wall_now = inner.clock.current_units();

            // Fastest branch if we are still within the same timeframe.
            if wall_now == wall_hi {
                let seq = inner.hot.seq.fetch_add(1, Ordering::AcqRel) + 1;

                if seq <= inner.seq_max {
                    return Id::from_parts(
                        wall_now,
                        inner.hot.drifts.load(Ordering::Acquire),
                        meta,
                        inner.partition,
                        seq,
                    );
                }

                // Pool exhausted within this unit. Wait for a reset, then
                // reclassify from scratch.
                self.stall();
                continue;
            }

            // Time progression branch.
            if wall_now > wall_hi
                && inner
                    .hot
                    .wall_hi
                    .compare_exchange(wall_hi, wall_now, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                inner.hot.seq.store(inner.seq_min, Ordering::Release);

                return Id::from_parts(
                    wall_now,
                    inner.hot.drifts.load(Ordering::Acquire),
                    meta,
                    inner.partition,
                    inner.seq_min,
                );
            }

            // Time regression branch - or a forward CAS lost to a peer that
            // pushed wall_hi past us, which reclassifies the same way.
            if let Some(id) = self.regress(wall_now, meta) {
                return id;
            }
        }
    }

    #[cold]
    #[inline(never)]
    fn regress(&self, wall_now: u64, meta: u8) -> Option<Id> {
        let inner = &*self.inner;
        let _guard = inner.regression.lock();

        // Check again - another caller may have applied the drift while we
        // were acquiring the lock.
        let wall_hi = inner.hot.wall_hi.load(Ordering::Acquire);
        if wall_now >= wall_hi {
            return None;
        }

        let wall_safe = inner.hot.wall_safe.load(Ordering::Acquire);
        if wall_now > wall_safe {
            // The one caller that gets to apply the drift. wall_safe only
            // ever records abandoned times, so it increases monotonically.
            inner.hot.wall_safe.store(wall_hi, Ordering::Release);
            inner.hot.wall_hi.store(wall_now, Ordering::Release);
            inner.hot.seq.store(inner.seq_min, Ordering::Release);
            let drifts = inner.hot.drifts.fetch_add(1, Ordering::AcqRel) + 1;

            return Some(Id::from_parts(
                wall_now,
                drifts,
                meta,
                inner.partition,
                inner.seq_min,
            ));
        }

        // We are in a time range the generator already abandoned once.
        // Another tick-tock here could collide with identifiers from the
        // previous pass, so sleep the regression out instead.
        drop(_guard);
        thread::sleep(Duration::from_millis(
            (wall_safe - wall_now) * TIME_UNIT_MILLIS,
        ));

        None
    }

    /// Parks the caller until the sequence pool has room again, keeping the
    /// background watcher alive while anyone is stalled.
    #[cold]
    #[inline(never)]
    fn stall(&self) {
        let inner = &*self.inner;
        let mut state = inner.overflow.lock();
        state.count += 1;

        if !state.watcher_live {
            state.watcher_live = true;
            let watcher = Arc::clone(&self.inner);
            thread::spawn(move || watcher.overflow_loop());
        }

        // Spin-check under the lock: wakeups may be spurious, and at high
        // contention the pool can be spent again by the time we run.
        while inner.hot.seq.load(Ordering::Acquire) > inner.seq_max {
            inner.overflow_cond.wait(&mut state);
        }

        state.count -= 1;
    }
}
