use crate::{BoundsViolation, Error, Partition, Result, MAX_SEQUENCE};

/// Minimum capacity of a sequence pool.
const MIN_SEQUENCE_POOL: u32 = 4;

/// The bookkeeping data of a [`Generator`] at some point in time.
///
/// Snapshots serve both as configuration and as a means of restoring
/// generators across restarts, so that a restarted generator never re-issues
/// an identifier it (or a peer sharing its partition) previously produced.
/// All fields are plain values; a snapshot taken from a running generator is
/// an immutable copy.
///
/// [`Generator`]: crate::Generator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct GeneratorSnapshot {
    /// The partition the generator is scoped to. The zero value is valid
    /// and will be used as given.
    pub partition: Partition,

    /// Sequence pool bounds, inclusive. May be given in either order - the
    /// lower value becomes the lower bound. A `sequence_max` of 0 paired
    /// with a `sequence_min` other than 65535 is treated as the default
    /// upper bound of 65535.
    pub sequence_min: u16,
    pub sequence_max: u16,

    /// Current sequence. 0 is treated as `sequence_min`. May overflow
    /// `sequence_max` (a snapshot can be taken mid-stall) but must not
    /// underflow `sequence_min`.
    pub sequence: u32,

    /// Wall time the snapshot was taken at, in time units.
    pub now: u64,

    /// The most recent wall time the generator observed while issuing.
    pub wall_hi: u64,

    /// The highest wall time ever abandoned due to a clock regression.
    pub wall_safe: u64,

    /// Count of wall clock regressions the generator tick-tocked at. The
    /// LSB is the current tick-tock bit.
    pub drifts: u32,
}

/// Normalizes snapshot bounds and validates them against the configuration
/// contract.
///
/// # Errors
///
/// Returns [`Error::InvalidSequenceBounds`] when the bounds are identical,
/// span a pool with a capacity below 4, or the current sequence underflows
/// the lower bound.
pub(crate) fn sanitize(mut s: GeneratorSnapshot) -> Result<GeneratorSnapshot> {
    // A zero upper bound passes as the default max if and only if the lower
    // bound is not already the default max (the range can be given in
    // either order).
    if s.sequence_max == 0 && s.sequence_min != MAX_SEQUENCE {
        s.sequence_max = MAX_SEQUENCE;
    }

    if s.sequence_min == s.sequence_max {
        return Err(bounds_violation(&s, BoundsViolation::Identical));
    }

    if s.sequence_max < s.sequence_min {
        core::mem::swap(&mut s.sequence_min, &mut s.sequence_max);
    }

    if u32::from(s.sequence_max - s.sequence_min) + 1 < MIN_SEQUENCE_POOL {
        return Err(bounds_violation(&s, BoundsViolation::PoolTooSmall));
    }

    // A zero sequence passes as the lower bound.
    if s.sequence == 0 {
        s.sequence = u32::from(s.sequence_min);
    }

    if s.sequence < u32::from(s.sequence_min) {
        return Err(bounds_violation(&s, BoundsViolation::Underflow));
    }

    Ok(s)
}

fn bounds_violation(s: &GeneratorSnapshot, violation: BoundsViolation) -> Error {
    Error::InvalidSequenceBounds {
        sequence: s.sequence,
        min: s.sequence_min,
        max: s.sequence_max,
        violation,
    }
}
