use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{Generator, GeneratorSnapshot, Partition, TimeSource, WallClock, EPOCH};

struct FixedClock(u64);

impl TimeSource for FixedClock {
    fn current_units(&self) -> u64 {
        self.0
    }
}

/// A clock that holds its reading until a test moves it.
#[derive(Clone, Default)]
struct SettableClock {
    units: Arc<AtomicU64>,
}

impl SettableClock {
    fn at(units: u64) -> Self {
        let clock = Self::default();
        clock.set(units);
        clock
    }

    fn set(&self, units: u64) {
        self.units.store(units, Ordering::Release);
    }
}

impl TimeSource for SettableClock {
    fn current_units(&self) -> u64 {
        self.units.load(Ordering::Acquire)
    }
}

/// A clock that hands out one scripted reading per call, repeating the last
/// one once the script is exhausted.
struct SteppedClock {
    values: Vec<u64>,
    index: AtomicUsize,
}

impl SteppedClock {
    fn of(values: &[u64]) -> Self {
        Self {
            values: values.to_vec(),
            index: AtomicUsize::new(0),
        }
    }
}

impl TimeSource for SteppedClock {
    fn current_units(&self) -> u64 {
        let i = self.index.fetch_add(1, Ordering::AcqRel);
        self.values[i.min(self.values.len() - 1)]
    }
}

fn bounded(min: u16, max: u16) -> GeneratorSnapshot {
    GeneratorSnapshot {
        partition: Partition([0xA0, 0x01]),
        sequence_min: min,
        sequence_max: max,
        ..Default::default()
    }
}

#[test]
fn sequence_increments_within_the_same_unit() {
    let generator = Generator::new(FixedClock(42)).unwrap();

    let ids: Vec<_> = (0..3).map(|_| generator.generate(0)).collect();

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.timestamp_units(), 42);
        assert_eq!(id.sequence(), i as u16);
        assert_eq!(id.tick_tock(), 0);
    }
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);
}

#[test]
fn clock_advance_resets_the_sequence() {
    let clock = SettableClock::at(42);
    let generator = Generator::new(clock.clone()).unwrap();

    generator.generate(0);
    generator.generate(0);
    assert_eq!(generator.len(), 2);

    clock.set(43);
    assert_eq!(generator.len(), 0);
    assert!(generator.is_empty());

    let id = generator.generate(0);
    assert_eq!(id.timestamp_units(), 43);
    assert_eq!(id.sequence(), 0);
    assert_eq!(generator.len(), 1);
}

#[test]
fn metabyte_and_partition_are_embedded_verbatim() {
    let generator =
        Generator::from_snapshot(bounded(0, u16::MAX), FixedClock(10)).unwrap();

    let id = generator.generate(0xDA);
    assert_eq!(id.meta(), 0xDA);
    assert_eq!(id.partition(), Partition([0xA0, 0x01]));
    assert_eq!(id.partition(), generator.partition());
}

#[test]
fn bounded_pool_tracks_len_and_fills_the_next_unit_on_overflow() {
    let clock = SettableClock::at(5000);
    let generator = Generator::from_snapshot(bounded(1024, 2047), clock.clone()).unwrap();

    assert_eq!(generator.capacity(), 1024);
    assert_eq!(generator.sequence_min(), 1024);
    assert_eq!(generator.sequence_max(), 2047);

    let first: Vec<_> = (0..5).map(|_| generator.generate(0)).collect();
    assert_eq!(generator.len(), 5);
    assert_eq!(first[0].sequence(), 1024);
    assert_eq!(first[4].sequence(), 1028);

    for _ in 5..generator.capacity() {
        generator.generate(0);
    }
    assert_eq!(generator.len(), generator.capacity());

    // The pool is spent; the next issue stalls until the clock moves on.
    let advancer = {
        let clock = clock.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            clock.set(5001);
        })
    };

    let extra: Vec<_> = (0..7).map(|_| generator.generate(0)).collect();
    advancer.join().unwrap();

    for id in &extra {
        assert_eq!(id.timestamp_units(), 5001);
        assert!(id.timestamp_units() > first[0].timestamp_units());
    }
    assert_eq!(generator.len(), 7);
}

#[test]
fn single_regression_tick_tocks() {
    let clock = SettableClock::at(1000);
    let generator = Generator::new(clock.clone()).unwrap();

    let batch1: Vec<_> = (0..512).map(|_| generator.generate(0)).collect();
    clock.set(999);
    let batch2: Vec<_> = (0..512).map(|_| generator.generate(0)).collect();

    assert!(batch1.iter().all(|id| id.tick_tock() == 0));
    assert!(batch1.iter().all(|id| id.timestamp_units() == 1000));
    assert!(batch2.iter().all(|id| id.tick_tock() == 1));
    assert!(batch2.iter().all(|id| id.timestamp_units() == 999));
    assert_eq!(generator.snapshot().drifts, 1);

    let distinct: HashSet<_> = batch1.iter().chain(&batch2).map(|id| id.to_bytes()).collect();
    assert_eq!(distinct.len(), 1024);
}

#[test]
fn second_regression_into_abandoned_time_sleeps_it_out() {
    // One scripted reading per issue attempt: progress to 1000, regress to
    // 999 (tick-tock), regress again to 997 (deep - still below the 1000
    // abandoned by the first drift), then resume past it.
    let generator = Generator::new(SteppedClock::of(&[1000, 999, 997, 1001])).unwrap();

    let a = generator.generate(0);
    assert_eq!((a.timestamp_units(), a.tick_tock()), (1000, 0));

    let b = generator.generate(0);
    assert_eq!((b.timestamp_units(), b.tick_tock()), (999, 1));

    let started = Instant::now();
    let c = generator.generate(0);
    // Slept (wall_safe - wall_now) = 3 units.
    assert!(started.elapsed() >= Duration::from_millis(12));
    assert_eq!((c.timestamp_units(), c.tick_tock()), (1001, 1));
    assert_eq!(generator.snapshot().drifts, 1);
}

#[test]
fn snapshot_restore_resumes_the_sequence() {
    let clock = SettableClock::at(4242);
    let generator = Generator::new(clock.clone()).unwrap();

    generator.generate(0);
    generator.generate(0);

    let snapshot = generator.snapshot();
    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.wall_hi, 4242);
    assert_eq!(snapshot.now, 4242);

    let restored = Generator::from_snapshot(snapshot, clock.clone()).unwrap();
    assert_eq!(restored.partition(), generator.partition());
    assert_eq!(restored.sequence_min(), snapshot.sequence_min);
    assert_eq!(restored.sequence_max(), snapshot.sequence_max);
    assert_eq!(restored.snapshot().drifts, snapshot.drifts);
    assert_eq!(restored.snapshot().wall_safe, snapshot.wall_safe);

    // Still in the captured unit: the restored generator continues past
    // the captured sequence instead of re-issuing it.
    let id = restored.generate(0);
    assert_eq!(id.timestamp_units(), 4242);
    assert!(u32::from(id.sequence()) >= snapshot.sequence + 1);

    clock.set(4243);
    let id = restored.generate(0);
    assert_eq!(id.sequence(), restored.sequence_min());
}

#[test]
fn restore_with_a_future_wall_safe_sleeps_like_a_deep_regression() {
    // Snapshot taken mid-drift: 1005 was abandoned, the generator was
    // re-issuing at 990. The restore host's clock reads 985 - inside the
    // abandoned range - so the first issue must sleep the regression out
    // rather than risk colliding with pre-restart identifiers.
    let snapshot = GeneratorSnapshot {
        partition: Partition([7, 7]),
        sequence_min: 0,
        sequence_max: u16::MAX,
        sequence: 50,
        now: 990,
        wall_hi: 990,
        wall_safe: 1005,
        drifts: 1,
    };
    let generator =
        Generator::from_snapshot(snapshot, SteppedClock::of(&[985, 1006])).unwrap();

    let started = Instant::now();
    let id = generator.generate(0);

    // Slept (wall_safe - wall_now) = 20 units.
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(id.timestamp_units(), 1006);
    assert_eq!(id.tick_tock(), 1);
    assert_eq!(id.sequence(), 0);
}

#[test]
fn burst_issues_are_unique_across_units() {
    let generator = Generator::new(WallClock).unwrap();

    let mut seen = HashSet::with_capacity(4 * 65536);
    for _ in 0..4 * 65535 {
        assert!(seen.insert(generator.generate(0).to_bytes()));
    }
    assert_eq!(seen.len(), 4 * 65535);
}

#[test]
fn threaded_issues_are_unique() {
    let generator = Generator::new(WallClock).unwrap();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 8192;

    let batches: Vec<Vec<[u8; 10]>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let generator = generator.clone();
                s.spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| generator.generate(0).to_bytes())
                        .collect()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: HashSet<_> = batches.iter().flatten().collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
}

#[test]
fn generate_at_rolls_over_within_bounds_and_never_ticks() {
    let generator = Generator::from_snapshot(bounded(0, 7), FixedClock(1)).unwrap();

    let at = UNIX_EPOCH + EPOCH + Duration::from_millis(1001 * 4 + 3);
    let ids: Vec<_> = (0..20).map(|i| generator.generate_at(i, at)).collect();

    for (i, id) in ids.iter().enumerate() {
        // Floored to unit resolution; sequence cycles through the pool.
        assert_eq!(id.timestamp_units(), 1001);
        assert_eq!(id.sequence(), (i % 8) as u16);
        assert_eq!(id.tick_tock(), 0);
        assert_eq!(id.meta(), i as u8);
    }
}

#[test]
fn generate_at_clamps_pre_epoch_instants_to_zero() {
    let generator = Generator::new(FixedClock(1)).unwrap();

    let id = generator.generate_at(0, UNIX_EPOCH);
    assert_eq!(id.timestamp_units(), 0);
}

#[test]
fn static_sequence_is_independent_of_the_issue_sequence() {
    let generator = Generator::new(FixedClock(10)).unwrap();

    for _ in 0..3 {
        generator.generate(0);
    }

    let at = UNIX_EPOCH + EPOCH + Duration::from_secs(1);
    assert_eq!(generator.generate_at(0, at).sequence(), 0);
    assert_eq!(generator.generate_at(0, at).sequence(), 1);

    // And the other way around: the time-bound sequence kept its place.
    assert_eq!(generator.generate(0).sequence(), 3);
}

#[test]
fn overflow_publishes_notifications_without_blocking() {
    let clock = SettableClock::at(7777);
    let (tx, rx) = crossbeam_channel::unbounded();
    let generator =
        Generator::from_snapshot_with_notifier(bounded(0, 3), clock.clone(), tx).unwrap();

    for _ in 0..4 {
        generator.generate(0);
    }

    let advancer = {
        let clock = clock.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(25));
            clock.set(7778);
        })
    };

    let id = generator.generate(0);
    advancer.join().unwrap();
    assert_eq!(id.timestamp_units(), 7778);

    let note = rx
        .recv_timeout(Duration::from_millis(100))
        .expect("expected at least one overflow notification");
    assert!(note.ticks >= 1);
}

#[test]
fn sequence_accessor_follows_the_clock() {
    let clock = SettableClock::at(100);
    let generator = Generator::new(clock.clone()).unwrap();

    // Nothing issued at this unit yet: reports the lower bound.
    assert_eq!(generator.sequence(), u32::from(generator.sequence_min()));

    generator.generate(0);
    assert_eq!(generator.sequence(), 0);
    generator.generate(0);
    assert_eq!(generator.sequence(), 1);

    clock.set(101);
    assert_eq!(generator.sequence(), u32::from(generator.sequence_min()));
}

#[test]
fn default_generators_get_distinct_partitions() {
    let a = Generator::new(WallClock).unwrap();
    let b = Generator::new(WallClock).unwrap();

    assert_eq!(a.capacity(), 65536);
    assert_eq!(a.sequence_min(), 0);
    assert_eq!(a.sequence_max(), u16::MAX);
    assert_ne!(a.partition(), b.partition());
}
