//! Fast generation of compact, lexicographically sortable, unique
//! identifiers with embedded metadata.
//!
//! An identifier is 10 bytes: a 39-bit timestamp at 4 ms resolution with a
//! tick-tock bit absorbing wall clock regressions, a caller-supplied
//! metabyte, a 2-byte partition fixed per generator and a 16-bit intra-unit
//! sequence. Identifiers sort by creation time as raw bytes and in their
//! canonical 16-character base32 text form alike, and stay unique across
//! correctly configured peer generators without any coordination.
//!
//! ```
//! let id = sequin::generate(0);
//! let text = id.to_string();
//!
//! assert_eq!(text.len(), 16);
//! assert_eq!(text.parse::<sequin::Id>().unwrap(), id);
//! ```

mod base32;
mod error;
mod generator;
mod global;
mod id;
mod partition;
#[cfg(feature = "serde")]
mod serde;
mod time;

pub use crate::base32::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::global::*;
pub use crate::id::*;
pub use crate::partition::*;
pub use crate::time::*;
