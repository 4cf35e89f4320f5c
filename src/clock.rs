//! Clock source injected into the ledgers.

use chrono::{DateTime, Utc};

/// Time source for issuance and expiry decisions.
///
/// Ledgers never call `Utc::now()` directly; substituting a manual clock lets
/// tests drive expiry deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
