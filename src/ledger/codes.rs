//! Authorization-code ledger: one-time codes exchanged for token pairs.

use crate::clock::Clock;
use crate::errors::CodeRedeemError;
use crate::oauth::types::{AuthorizationCode, PkceChallenge, PkceMethod, generate_token};
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// Code handed back to the authorization endpoint.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Context recovered by a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedCode {
    pub subject_id: String,
    pub scopes: HashSet<String>,
}

/// Issues and redeems one-time authorization codes.
///
/// Redeemed codes are kept, marked used, until the sweep passes their expiry;
/// replays therefore observe `AlreadyUsed` rather than `NotFound`.
pub struct AuthorizationCodeLedger {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl AuthorizationCodeLedger {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            codes: RwLock::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    /// Code lifetime this ledger was configured with.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new single-use code bound to the request context.
    pub async fn issue(
        &self,
        client_id: &str,
        subject_id: &str,
        redirect_uri: &str,
        scopes: HashSet<String>,
        pkce: Option<PkceChallenge>,
    ) -> IssuedCode {
        let now = self.clock.now();
        let code = generate_token();
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client_id.to_string(),
            subject_id: subject_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scopes,
            pkce,
            created_at: now,
            expires_at: now + self.ttl,
            used: false,
        };
        let expires_at = record.expires_at;

        let mut codes = self.codes.write().await;
        codes.insert(code.clone(), record);
        IssuedCode { code, expires_at }
    }

    /// Redeem a code, atomically marking it used.
    ///
    /// Under concurrent redemption of the same code exactly one caller
    /// succeeds; the rest observe `AlreadyUsed`. Redemption must present the
    /// issuing client, the original redirect URI, and a matching PKCE
    /// verifier when a challenge was registered. Failed attempts do not
    /// consume the code.
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        verifier: Option<&str>,
    ) -> Result<RedeemedCode, CodeRedeemError> {
        let now = self.clock.now();
        let mut codes = self.codes.write().await;
        let entry = codes.get_mut(code).ok_or(CodeRedeemError::NotFound)?;

        if entry.expires_at < now {
            // Observed expiry is final; drop the entry so no later attempt
            // can succeed even if the clock moves backwards
            codes.remove(code);
            return Err(CodeRedeemError::Expired);
        }
        if entry.used {
            return Err(CodeRedeemError::AlreadyUsed);
        }
        if entry.client_id != client_id {
            tracing::debug!(
                issued_to = %entry.client_id,
                presented_by = %client_id,
                "authorization code presented by another client"
            );
            return Err(CodeRedeemError::ClientMismatch);
        }
        if entry.redirect_uri != redirect_uri {
            return Err(CodeRedeemError::RedirectMismatch);
        }
        if let Some(challenge) = &entry.pkce {
            let verifier = verifier.ok_or(CodeRedeemError::PkceFailure)?;
            if !verify_pkce(verifier, challenge) {
                return Err(CodeRedeemError::PkceFailure);
            }
        }

        entry.used = true;
        Ok(RedeemedCode {
            subject_id: entry.subject_id.clone(),
            scopes: entry.scopes.clone(),
        })
    }

    /// Remove codes past their expiry, used or not. Returns the count removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, code| code.expires_at >= now);
        before - codes.len()
    }
}

/// Check a PKCE verifier against the challenge registered at issuance.
fn verify_pkce(verifier: &str, challenge: &PkceChallenge) -> bool {
    let computed = match challenge.method {
        PkceMethod::Plain => verifier.to_string(),
        PkceMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
    };
    computed
        .as_bytes()
        .ct_eq(challenge.challenge.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::ManualClock;
    use crate::oauth::scope::parse_scope;

    fn ledger_with_clock() -> (Arc<ManualClock>, AuthorizationCodeLedger) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = AuthorizationCodeLedger::new(clock.clone(), Duration::minutes(10));
        (clock, ledger)
    }

    #[tokio::test]
    async fn issue_then_redeem_returns_subject_and_scopes() {
        let (_, ledger) = ledger_with_clock();
        let issued = ledger
            .issue(
                "c1",
                "u1",
                "https://app/cb",
                parse_scope("openid profile"),
                None,
            )
            .await;

        let redeemed = ledger
            .redeem(&issued.code, "c1", "https://app/cb", None)
            .await
            .unwrap();
        assert_eq!(redeemed.subject_id, "u1");
        assert_eq!(redeemed.scopes, parse_scope("openid profile"));
    }

    #[tokio::test]
    async fn second_redemption_is_already_used() {
        let (_, ledger) = ledger_with_clock();
        let issued = ledger
            .issue("c1", "u1", "https://app/cb", HashSet::new(), None)
            .await;

        ledger
            .redeem(&issued.code, "c1", "https://app/cb", None)
            .await
            .unwrap();
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::AlreadyUsed)
        );
    }

    #[tokio::test]
    async fn expired_code_stays_dead_even_after_clock_rollback() {
        let (clock, ledger) = ledger_with_clock();
        let issued = ledger
            .issue("c1", "u1", "https://app/cb", HashSet::new(), None)
            .await;

        clock.advance(Duration::minutes(11));
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::Expired)
        );

        // The entry was dropped when expiry was observed, so a clock rollback
        // cannot resurrect it
        clock.advance(Duration::minutes(-5));
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::NotFound)
        );
    }

    #[tokio::test]
    async fn used_flag_holds_under_clock_rollback() {
        let (clock, ledger) = ledger_with_clock();
        let issued = ledger
            .issue("c1", "u1", "https://app/cb", HashSet::new(), None)
            .await;

        ledger
            .redeem(&issued.code, "c1", "https://app/cb", None)
            .await
            .unwrap();
        clock.advance(Duration::minutes(-5));
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::AlreadyUsed)
        );
    }

    #[tokio::test]
    async fn mismatches_do_not_consume_the_code() {
        let (_, ledger) = ledger_with_clock();
        let issued = ledger
            .issue("c1", "u1", "https://app/cb", HashSet::new(), None)
            .await;

        assert_eq!(
            ledger
                .redeem(&issued.code, "other", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::ClientMismatch)
        );
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://evil/cb", None)
                .await,
            Err(CodeRedeemError::RedirectMismatch)
        );

        // Still redeemable with the right parameters
        assert!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let (_, ledger) = ledger_with_clock();
        assert_eq!(
            ledger.redeem("nope", "c1", "https://app/cb", None).await,
            Err(CodeRedeemError::NotFound)
        );
    }

    #[tokio::test]
    async fn s256_pkce_verification() {
        let (_, ledger) = ledger_with_clock();
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize());

        let issued = ledger
            .issue(
                "c1",
                "u1",
                "https://app/cb",
                HashSet::new(),
                Some(PkceChallenge {
                    challenge,
                    method: PkceMethod::S256,
                }),
            )
            .await;

        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", Some("wrong"))
                .await,
            Err(CodeRedeemError::PkceFailure)
        );
        assert_eq!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", None)
                .await,
            Err(CodeRedeemError::PkceFailure)
        );
        assert!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", Some(verifier))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn plain_pkce_compares_verifier_directly() {
        let (_, ledger) = ledger_with_clock();
        let issued = ledger
            .issue(
                "c1",
                "u1",
                "https://app/cb",
                HashSet::new(),
                Some(PkceChallenge {
                    challenge: "plain-verifier".to_string(),
                    method: PkceMethod::Plain,
                }),
            )
            .await;

        assert!(
            ledger
                .redeem(&issued.code, "c1", "https://app/cb", Some("plain-verifier"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn sweep_removes_expired_codes_used_or_not() {
        let (clock, ledger) = ledger_with_clock();
        let kept = ledger
            .issue("c1", "u1", "https://app/cb", HashSet::new(), None)
            .await;
        let redeemed = ledger
            .issue("c1", "u2", "https://app/cb", HashSet::new(), None)
            .await;
        ledger
            .redeem(&redeemed.code, "c1", "https://app/cb", None)
            .await
            .unwrap();

        assert_eq!(ledger.sweep(clock.now()).await, 0);

        clock.advance(Duration::minutes(11));
        assert_eq!(ledger.sweep(clock.now()).await, 2);
        assert_eq!(
            ledger.redeem(&kept.code, "c1", "https://app/cb", None).await,
            Err(CodeRedeemError::NotFound)
        );
    }
}
