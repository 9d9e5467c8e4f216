//! Environment traits injected into the runtime.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// The monitor stamps every event with `Clock::now`, so tests can pin
/// timestamps with a fixed clock.
///
/// # Examples
///
/// ```
/// use composable_logic_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let earlier = clock.now();
/// assert!(clock.now() >= earlier);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
