use core::fmt;
use core::str::FromStr;
use std::time::SystemTime;

use crate::{base32, time, Error, Partition, Result};

/// Length of an identifier in its binary representation.
pub const SIZE_BINARY: usize = 10;

/// Length of an identifier in its canonical base32-encoded representation.
pub const SIZE_ENCODED: usize = 16;

/// Maximum number of time units an identifier's timestamp can embed.
///
/// Corresponds to 2079-09-07T15:47:35.548Z relative to [`EPOCH`].
///
/// [`EPOCH`]: crate::EPOCH
pub const MAX_TIMESTAMP: u64 = (1 << 39) - 1;

/// Maximum partition number when represented as a u16.
pub const MAX_PARTITION: u16 = u16::MAX;

/// Maximum sequence number supported by generators. Bounds can be set
/// individually per generator - this is the upper cap.
pub const MAX_SEQUENCE: u16 = u16::MAX;

/// The binary representation of a sequin identifier.
///
/// An `Id` is 10 bytes in 2 blocks of 40 bits, stored big-endian so that the
/// derived lexicographic order of the bytes coincides with the
/// `(timestamp, tick-tock, metabyte, partition, sequence)` order of its
/// components.
///
/// The timestamp block:
/// - 39 bits - unsigned time units since [`EPOCH`] at 4 ms resolution
/// -  1 bit  - the tick-tock toggle
///
/// The payload block:
/// -  8 bits - metabyte
/// - 16 bits - partition
/// - 16 bits - sequence
///
/// [`EPOCH`]: crate::EPOCH
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; SIZE_BINARY]);

impl Id {
    /// The all-zero identifier.
    ///
    /// It is the [`Default`] value, compares lower than every other
    /// identifier and is the defined result of decodes that accept empty
    /// input.
    pub const ZERO: Self = Self([0; SIZE_BINARY]);

    /// Wraps raw bytes as an identifier without inspection.
    pub const fn from_bytes(bytes: [u8; SIZE_BINARY]) -> Self {
        Self(bytes)
    }

    /// Composes an identifier from its components. The time unit count is
    /// truncated to its low 39 bits; the LSB of `drifts` becomes the
    /// tick-tock bit. `partition` arrives in the allocator's internal
    /// representation (top two bytes of the word) so the sequence can be
    /// OR'ed in without masking.
    pub(crate) fn from_parts(units: u64, drifts: u32, meta: u8, partition: u32, seq: u32) -> Self {
        let ts = (units & MAX_TIMESTAMP) << 1 | u64::from(drifts & 1);
        let payload = partition | seq;

        let mut b = [0; SIZE_BINARY];
        b[0] = (ts >> 32) as u8;
        b[1] = (ts >> 24) as u8;
        b[2] = (ts >> 16) as u8;
        b[3] = (ts >> 8) as u8;
        b[4] = ts as u8;
        b[5] = meta;
        b[6..10].copy_from_slice(&payload.to_be_bytes());

        Self(b)
    }

    /// Returns the timestamp as an instant on the system clock.
    pub fn time(&self) -> SystemTime {
        time::units_to_system_time(self.timestamp_units())
    }

    /// Returns the timestamp as the embedded 39-bit count of 4 ms units
    /// since [`EPOCH`].
    ///
    /// [`EPOCH`]: crate::EPOCH
    pub fn timestamp_units(&self) -> u64 {
        u64::from(self.0[0]) << 31
            | u64::from(self.0[1]) << 23
            | u64::from(self.0[2]) << 15
            | u64::from(self.0[3]) << 7
            | u64::from(self.0[4]) >> 1
    }

    /// Returns the metabyte.
    pub const fn meta(&self) -> u8 {
        self.0[5]
    }

    /// Returns the partition.
    pub const fn partition(&self) -> Partition {
        Partition([self.0[6], self.0[7]])
    }

    /// Returns the sequence.
    pub const fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.0[8], self.0[9]])
    }

    /// Returns the tick-tock bit - 0 or 1, toggled once per wall clock
    /// regression accepted by the generator that issued this identifier.
    pub const fn tick_tock(&self) -> u8 {
        self.0[4] & 1
    }

    /// Whether this is the all-zero identifier.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the identifier in its canonical base32-encoded form.
    pub fn encode(&self) -> [u8; SIZE_ENCODED] {
        base32::encode(self)
    }

    /// Decodes a canonically base32-encoded representation of an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDataSize`] unless `src` is exactly
    /// [`SIZE_ENCODED`] bytes long, and [`Error::InvalidData`] on bytes
    /// outside the encoding alphabet.
    pub fn from_encoded(src: &[u8]) -> Result<Self> {
        base32::decode(src)
    }

    /// Borrows the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIZE_BINARY] {
        &self.0
    }

    /// Returns the raw bytes.
    pub const fn to_bytes(self) -> [u8; SIZE_BINARY] {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buf = self.encode();
        f.write_str(core::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_encoded(s.as_bytes())
    }
}

impl From<[u8; SIZE_BINARY]> for Id {
    fn from(bytes: [u8; SIZE_BINARY]) -> Self {
        Self(bytes)
    }
}

impl From<Id> for [u8; SIZE_BINARY] {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = Error;

    /// Copies a 10-byte binary representation into an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDataSize`] for any other length.
    fn try_from(src: &[u8]) -> Result<Self> {
        match src.len() {
            SIZE_BINARY => {
                let mut b = [0; SIZE_BINARY];
                b.copy_from_slice(src);
                Ok(Self(b))
            }
            size => Err(Error::InvalidDataSize { size }),
        }
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EPOCH;
    use std::time::UNIX_EPOCH;

    const BASELINE: [u8; SIZE_BINARY] = [78, 111, 33, 96, 160, 255, 154, 10, 16, 51];

    #[test]
    fn accessors_decompose_the_layout() {
        let id = Id::from_bytes(BASELINE);

        // Bytes 0-4 hold 0x4E6F2160A0; the high 39 bits are the unit count,
        // the LSB the tick-tock toggle.
        assert_eq!(id.timestamp_units(), 0x4E_6F_21_60_A0 >> 1);
        assert_eq!(id.tick_tock(), 0);
        assert_eq!(id.meta(), 0xFF);
        assert_eq!(id.partition(), Partition([0x9A, 0x0A]));
        assert_eq!(id.sequence(), 0x1033);
    }

    #[test]
    fn from_parts_is_the_inverse_of_the_accessors() {
        let id = Id::from_parts(12_345_678, 1, 0xAB, 0x1234_0000, 0x0F0F);

        assert_eq!(id.timestamp_units(), 12_345_678);
        assert_eq!(id.tick_tock(), 1);
        assert_eq!(id.meta(), 0xAB);
        assert_eq!(id.partition().as_u16(), 0x1234);
        assert_eq!(id.sequence(), 0x0F0F);
    }

    #[test]
    fn from_parts_truncates_the_unit_count_to_39_bits() {
        let id = Id::from_parts(MAX_TIMESTAMP + 1, 0, 0, 0, 0);
        assert_eq!(id.timestamp_units(), 0);

        let id = Id::from_parts(u64::MAX, 0, 0, 0, 0);
        assert_eq!(id.timestamp_units(), MAX_TIMESTAMP);
    }

    #[test]
    fn time_projects_units_onto_the_epoch() {
        let id = Id::from_parts(250, 0, 0, 0, 0);
        assert_eq!(id.time(), UNIX_EPOCH + EPOCH + core::time::Duration::from_secs(1));
        assert_eq!(Id::ZERO.time(), UNIX_EPOCH + EPOCH);
    }

    #[test]
    fn ordering_follows_the_component_hierarchy() {
        let base = Id::from_parts(100, 0, 5, 0x00FF_0000, 10);

        let later = Id::from_parts(101, 0, 0, 0, 0);
        let ticked = Id::from_parts(100, 1, 0, 0, 0);
        let heavier_meta = Id::from_parts(100, 0, 6, 0, 0);
        let higher_seq = Id::from_parts(100, 0, 5, 0x00FF_0000, 11);

        assert!(base < later);
        assert!(base < ticked && ticked < later);
        assert!(base < heavier_meta && heavier_meta < ticked);
        assert!(base < higher_seq);
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = Id::from_bytes(BASELINE);
        assert_eq!(id.to_string(), "brpk4q72xwf2m63l");
        assert_eq!("brpk4q72xwf2m63l".parse::<Id>().unwrap(), id);

        assert_eq!(
            "not an id".parse::<Id>(),
            Err(Error::InvalidDataSize { size: 9 })
        );
    }

    #[test]
    fn zero_is_default_and_smallest() {
        assert_eq!(Id::default(), Id::ZERO);
        assert!(Id::ZERO.is_zero());
        assert!(!Id::from_bytes(BASELINE).is_zero());
        assert!(Id::ZERO < Id::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn try_from_requires_exactly_ten_bytes() {
        assert_eq!(Id::try_from(&BASELINE[..]).unwrap(), Id::from_bytes(BASELINE));
        assert_eq!(
            Id::try_from(&BASELINE[..9]),
            Err(Error::InvalidDataSize { size: 9 })
        );
        assert_eq!(Id::try_from(&[][..]), Err(Error::InvalidDataSize { size: 0 }));
    }
}
