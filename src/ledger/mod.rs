//! Concurrency-safe credential ledgers.
//!
//! Each ledger owns the full lifecycle of one credential type behind its own
//! reader/writer lock. Mutating operations run their check-and-update in a
//! single critical section; read paths also check expiry lazily, so the
//! background sweep is an optimization rather than a correctness requirement.

pub mod codes;
pub mod device;
pub mod tokens;

pub use codes::{AuthorizationCodeLedger, IssuedCode, RedeemedCode};
pub use device::{DeviceAuthorizationLedger, DeviceGrant, ReadyGrant};
pub use tokens::TokenLedger;
