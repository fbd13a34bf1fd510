use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch all identifier timestamps are relative to: 2010-01-01T00:00:00Z.
pub const EPOCH: Duration = Duration::from_secs(1_262_304_000);

/// Resolution of identifier timestamps - one time unit spans 4 milliseconds.
pub const TIME_UNIT: Duration = Duration::from_millis(TIME_UNIT_MILLIS);

pub(crate) const TIME_UNIT_MILLIS: u64 = 4;

/// A source of wall-clock readings expressed in whole [`TIME_UNIT`]s since
/// [`EPOCH`].
///
/// The clock is an injected capability rather than a module-level call so
/// tests can substitute stepped or frozen clocks without touching generator
/// internals. Implementations:
///
/// - must be cheap - generators read the clock on every issue;
/// - need not be monotonic - regressions are classified and handled by the
///   generator;
/// - must stay consistent with the system wall clock, since identifiers are
///   ordered across hosts by it.
pub trait TimeSource {
    /// Returns the number of whole 4 ms units elapsed since [`EPOCH`].
    fn current_units(&self) -> u64;
}

/// The default [`TimeSource`], reading the system wall clock.
///
/// Readings before [`EPOCH`] indicate a grossly misconfigured system clock
/// and are refused with a panic. Readings past `2³⁹ − 1` units (the year
/// 2079) exceed the representable timestamp range; the generator truncates
/// such counts to their low 39 bits when composing an identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn current_units(&self) -> u64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH + EPOCH)
            .expect("system clock reads before the sequin epoch (2010-01-01)");

        elapsed.as_millis() as u64 / TIME_UNIT_MILLIS
    }
}

/// Converts an arbitrary instant to time units, flooring to unit resolution.
/// Instants before [`EPOCH`] are not representable and clamp to zero.
pub(crate) fn units_at(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH + EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as u64 / TIME_UNIT_MILLIS,
        Err(_) => 0,
    }
}

pub(crate) fn units_to_system_time(units: u64) -> SystemTime {
    UNIX_EPOCH + EPOCH + Duration::from_millis(units * TIME_UNIT_MILLIS)
}
