use std::sync::OnceLock;

use portable_atomic::{AtomicU32, Ordering};

use crate::{Error, Result, TimeSource, WallClock, MAX_PARTITION};

/// The fixed 2-byte identifier of a [`Generator`], stored big-endian at
/// bytes 6-7 of every identifier it issues.
///
/// Every value is valid. Generators constructed from defaults get a
/// process-unique partition assigned; generators restored from snapshots
/// keep whatever partition the snapshot carries.
///
/// [`Generator`]: crate::Generator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition(pub [u8; 2]);

impl Partition {
    /// Returns the partition as a u16.
    pub const fn as_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    /// Builds a partition from a u16 in big-endian order.
    pub const fn from_u16(u: u16) -> Self {
        Self(u.to_be_bytes())
    }
}

impl From<u16> for Partition {
    fn from(u: u16) -> Self {
        Self::from_u16(u)
    }
}

impl From<Partition> for u16 {
    fn from(p: Partition) -> Self {
        p.as_u16()
    }
}

/// Allocation counter. Starts at all-ones so the first allocation observes
/// an increment to 0 and hands out the bare seed.
static COUNTER: AtomicU32 = AtomicU32::new(u32::MAX);

/// Time-derived base of the default partition space, frozen for the process
/// lifetime.
static SEED: OnceLock<u16> = OnceLock::new();

fn seed() -> u16 {
    *SEED.get_or_init(|| {
        let t = WallClock.current_units();
        ((t >> 32) ^ t) as u16
    })
}

/// Hands out the next default partition in its internal representation: the
/// partition in the top two bytes of the word, the low two bytes left zero
/// so a sequence can be OR'ed in without masking.
///
/// Predictability is a non-factor here; the sole goal is that default
/// partitions never collide within a process. An atomic increment over a
/// time-seeded base guarantees 65536 distinct partitions with no extra
/// bookkeeping, and makes the creation order of default generators
/// inferable by comparing their partitions to the seed.
///
/// # Errors
///
/// Returns [`Error::PartitionPoolExhausted`] once the space is spent. Past
/// that point the partition space must be managed by the operator, via
/// snapshots.
pub(crate) fn alloc() -> Result<u32> {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

    if n > u32::from(MAX_PARTITION) {
        return Err(Error::PartitionPoolExhausted);
    }

    Ok(u32::from(seed().wrapping_add(n as u16)) << 16)
}

pub(crate) const fn to_internal(p: Partition) -> u32 {
    (p.as_u16() as u32) << 16
}

pub(crate) const fn to_public(p: u32) -> Partition {
    Partition::from_u16((p >> 16) as u16)
}
