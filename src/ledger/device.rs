//! Device-authorization ledger: the RFC 8628 user-approval state machine.

use crate::clock::Clock;
use crate::errors::{DeviceDecisionError, DevicePollError};
use crate::oauth::types::{DeviceAuthorization, DeviceState, generate_token};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Excludes characters users confuse when copying a code off a screen.
const USER_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const USER_CODE_LENGTH: usize = 8;

/// Codes handed to the device at the start of the flow.
#[derive(Debug, Clone)]
pub struct DeviceGrant {
    pub device_code: String,
    pub user_code: String,
    pub expires_in: u64,
}

/// Approval delivered to exactly one successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyGrant {
    pub subject_id: String,
    pub scopes: HashSet<String>,
}

/// Canonical records keyed by device code, with a secondary index from user
/// code to device code. Both maps live behind one lock and every mutation
/// goes through the canonical entry, so the two views cannot diverge.
#[derive(Default)]
struct DeviceTable {
    by_device: HashMap<String, DeviceAuthorization>,
    by_user: HashMap<String, String>,
}

impl DeviceTable {
    fn remove(&mut self, device_code: &str) -> Option<DeviceAuthorization> {
        let record = self.by_device.remove(device_code)?;
        self.by_user.remove(&record.user_code);
        Some(record)
    }
}

/// Runs the device-code / user-code approval state machine.
///
/// Expiry is checked lazily on every access; the sweep only reclaims memory.
pub struct DeviceAuthorizationLedger {
    table: RwLock<DeviceTable>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl DeviceAuthorizationLedger {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            table: RwLock::new(DeviceTable::default()),
            clock,
            ttl,
        }
    }

    /// Start a device authorization: mint a device code and a short user
    /// code, collision-checked against live entries.
    pub async fn request_authorization(
        &self,
        client_id: &str,
        scopes: HashSet<String>,
    ) -> DeviceGrant {
        let now = self.clock.now();
        let device_code = generate_token();

        let mut table = self.table.write().await;
        let mut user_code = generate_user_code();
        while table.by_user.contains_key(&user_code) {
            user_code = generate_user_code();
        }

        let record = DeviceAuthorization {
            device_code: device_code.clone(),
            user_code: user_code.clone(),
            client_id: client_id.to_string(),
            scopes,
            created_at: now,
            expires_at: now + self.ttl,
            state: DeviceState::Pending,
        };
        table.by_user.insert(user_code.clone(), device_code.clone());
        table.by_device.insert(device_code.clone(), record);

        DeviceGrant {
            device_code,
            user_code,
            expires_in: self.ttl.num_seconds().max(0) as u64,
        }
    }

    /// Record the user's approval and bind the subject.
    pub async fn approve(
        &self,
        user_code: &str,
        subject_id: &str,
    ) -> Result<(), DeviceDecisionError> {
        self.decide(
            user_code,
            DeviceState::Authorized {
                subject_id: subject_id.to_string(),
            },
        )
        .await
    }

    /// Record the user's denial.
    pub async fn deny(&self, user_code: &str) -> Result<(), DeviceDecisionError> {
        self.decide(user_code, DeviceState::Denied).await
    }

    /// Only Pending entries accept a decision; a code that was already
    /// decided or never existed reads as NotFound.
    async fn decide(
        &self,
        user_code: &str,
        decision: DeviceState,
    ) -> Result<(), DeviceDecisionError> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let device_code = match table.by_user.get(user_code) {
            Some(code) => code.clone(),
            None => return Err(DeviceDecisionError::NotFound),
        };

        let (expires_at, pending) = match table.by_device.get(&device_code) {
            Some(entry) => (entry.expires_at, entry.state == DeviceState::Pending),
            None => return Err(DeviceDecisionError::NotFound),
        };
        if expires_at < now {
            table.remove(&device_code);
            return Err(DeviceDecisionError::Expired);
        }
        if !pending {
            return Err(DeviceDecisionError::NotFound);
        }

        if let Some(entry) = table.by_device.get_mut(&device_code) {
            entry.state = decision;
        }
        Ok(())
    }

    /// Poll for the user's decision.
    ///
    /// `ReadyGrant` is delivered at most once per device code: the entry is
    /// removed under both keys before returning. A denial is likewise
    /// reported once and then removed. Later polls observe NotFound.
    pub async fn poll(
        &self,
        device_code: &str,
        client_id: &str,
    ) -> Result<ReadyGrant, DevicePollError> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let entry = match table.by_device.get(device_code) {
            Some(entry) => entry,
            None => return Err(DevicePollError::NotFound),
        };

        if entry.expires_at < now {
            table.remove(device_code);
            return Err(DevicePollError::Expired);
        }
        if entry.client_id != client_id {
            tracing::debug!(
                issued_to = %entry.client_id,
                presented_by = %client_id,
                "device code polled by another client"
            );
            return Err(DevicePollError::ClientMismatch);
        }

        match entry.state.clone() {
            DeviceState::Pending => Err(DevicePollError::AuthorizationPending),
            DeviceState::Denied => {
                table.remove(device_code);
                Err(DevicePollError::AccessDenied)
            }
            DeviceState::Authorized { subject_id } => {
                let scopes = entry.scopes.clone();
                table.remove(device_code);
                Ok(ReadyGrant { subject_id, scopes })
            }
        }
    }

    /// Remove expired entries under both keys. Returns the count removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut table = self.table.write().await;
        let expired: Vec<String> = table
            .by_device
            .values()
            .filter(|entry| entry.expires_at < now)
            .map(|entry| entry.device_code.clone())
            .collect();
        for device_code in &expired {
            table.remove(device_code);
        }
        expired.len()
    }
}

fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    (0..USER_CODE_LENGTH)
        .map(|_| USER_CODE_CHARSET[rng.gen_range(0..USER_CODE_CHARSET.len())] as char)
        .collect()
}
