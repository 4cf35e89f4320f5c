//! Background expiry sweeper.
//!
//! Periodically purges expired entries from all three ledgers. Every read
//! path also checks expiry lazily, so the sweeper's cadence affects memory,
//! not correctness.

use crate::clock::Clock;
use crate::ledger::{AuthorizationCodeLedger, DeviceAuthorizationLedger, TokenLedger};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn the sweeper task. Cancel the token to stop it.
pub fn spawn_sweeper(
    codes: Arc<AuthorizationCodeLedger>,
    devices: Arc<DeviceAuthorizationLedger>,
    tokens: Arc<TokenLedger>,
    clock: Arc<dyn Clock>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = clock.now();
                    let codes_removed = codes.sweep(now).await;
                    let devices_removed = devices.sweep(now).await;
                    let tokens_removed = tokens.sweep(now).await;
                    if codes_removed + devices_removed + tokens_removed > 0 {
                        tracing::debug!(
                            codes_removed,
                            devices_removed,
                            tokens_removed,
                            "swept expired credentials"
                        );
                    }
                }
            }
        }
    })
}
