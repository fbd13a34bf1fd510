use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `sequin` can emit.
///
/// Errors only arise at representation boundaries (decoding, interchange) and
/// at generator construction. The issuance paths ([`Generator::generate`] and
/// [`Generator::generate_at`]) are infallible.
///
/// [`Generator::generate`]: crate::Generator::generate
/// [`Generator::generate_at`]: crate::Generator::generate_at
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Binary or textual input of the wrong length was given to a decode or
    /// unmarshal operation.
    #[error("unrecognized data size: {size}")]
    InvalidDataSize { size: usize },

    /// A byte outside the encoding alphabet was encountered while decoding.
    #[error("byte outside the encoding alphabet: {byte:#04x} at index {index}")]
    InvalidData { byte: u8, index: usize },

    /// An interchange value of a shape other than a byte blob, a string or
    /// null was given to a decode operation.
    #[error("unrecognized data type: {shape}")]
    InvalidType { shape: &'static str },

    /// A generator was configured with sequence bounds that violate the
    /// contract: identical bounds, a pool with a capacity below 4, or a
    /// current sequence underflowing the lower bound.
    #[error("{violation} (sequence: {sequence}, min: {min}, max: {max})")]
    InvalidSequenceBounds {
        sequence: u32,
        min: u16,
        max: u16,
        violation: BoundsViolation,
    },

    /// The process exceeded the maximum number (65536) of default-configured
    /// generators.
    #[error("process exceeded the maximum number of default-configured generators")]
    PartitionPoolExhausted,
}

/// The specific way a set of sequence bounds violates the configuration
/// contract. Carried by [`Error::InvalidSequenceBounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BoundsViolation {
    /// Lower and upper bound are the same value.
    Identical,
    /// The current sequence underflows the lower bound.
    Underflow,
    /// The pool spans fewer than 4 sequences.
    PoolTooSmall,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical => {
                f.write_str("sequence bounds are identical - need a pool with a capacity of at least 4")
            }
            Self::Underflow => f.write_str("current sequence underflows the given lower bound"),
            Self::PoolTooSmall => {
                f.write_str("generators require a sequence pool with a capacity of at least 4")
            }
        }
    }
}
