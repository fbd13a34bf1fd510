use std::sync::OnceLock;
use std::time::SystemTime;

use crate::{Generator, Id, WallClock};

static GLOBAL: OnceLock<Generator<WallClock>> = OnceLock::new();

/// The process-global generator, constructed from defaults at first use.
///
/// Construction can only fail once the partition pool is already exhausted,
/// which requires 65536 default-configured generators to exist beforehand -
/// a startup-only misconfiguration, so it halts the process.
fn global() -> &'static Generator<WallClock> {
    GLOBAL.get_or_init(|| {
        Generator::new(WallClock)
            .expect("sequin: no partition left for the process-global generator")
    })
}

/// Generates a new identifier with the process-global generator, using the
/// current system time for its timestamp.
///
/// # Example
/// ```
/// let id = sequin::generate(0);
/// assert_eq!(id.meta(), 0);
/// assert!(!id.is_zero());
/// ```
pub fn generate(meta: u8) -> Id {
    global().generate(meta)
}

/// Generates a new identifier with the process-global generator, using the
/// given instant for its timestamp.
///
/// Identifiers issued this way are subject to several caveats; see
/// [`Generator::generate_at`].
pub fn generate_at(meta: u8, at: SystemTime) -> Id {
    global().generate_at(meta, at)
}
