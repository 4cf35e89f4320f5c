//! Token ledger: issuance, validation, revocation, introspection, and
//! refresh-token rotation.

use crate::clock::Clock;
use crate::errors::TokenError;
use crate::oauth::scope::join_scopes;
use crate::oauth::types::{IntrospectionResponse, Token, TokenInfo, TokenKind, generate_token};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns every live access and refresh token, keyed by opaque value.
///
/// The `kind` field on each record distinguishes access from refresh tokens;
/// nothing is ever inferred from the token string itself.
pub struct TokenLedger {
    tokens: RwLock<HashMap<String, Token>>,
    clock: Arc<dyn Clock>,
}

impl TokenLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Mint an access token.
    pub async fn issue_access(
        &self,
        client_id: &str,
        subject_id: Option<&str>,
        scopes: HashSet<String>,
        audience: Option<String>,
        ttl: Duration,
    ) -> Token {
        self.issue(TokenKind::Access, client_id, subject_id, scopes, audience, ttl)
            .await
    }

    /// Mint a refresh token.
    pub async fn issue_refresh(
        &self,
        client_id: &str,
        subject_id: Option<&str>,
        scopes: HashSet<String>,
        ttl: Duration,
    ) -> Token {
        self.issue(TokenKind::Refresh, client_id, subject_id, scopes, None, ttl)
            .await
    }

    async fn issue(
        &self,
        kind: TokenKind,
        client_id: &str,
        subject_id: Option<&str>,
        scopes: HashSet<String>,
        audience: Option<String>,
        ttl: Duration,
    ) -> Token {
        let now = self.clock.now();
        let token = Token {
            value: generate_token(),
            kind,
            client_id: client_id.to_string(),
            subject_id: subject_id.map(|s| s.to_string()),
            scopes,
            audience,
            created_at: now,
            expires_at: now + ttl,
            revoked: false,
        };

        let mut tokens = self.tokens.write().await;
        tokens.insert(token.value.clone(), token.clone());
        token
    }

    /// Look up a token and check it is live.
    pub async fn validate(&self, value: &str) -> Result<TokenInfo, TokenError> {
        let now = self.clock.now();
        let tokens = self.tokens.read().await;
        let token = tokens.get(value).ok_or(TokenError::NotFound)?;
        if token.revoked {
            return Err(TokenError::Revoked);
        }
        if token.expires_at < now {
            return Err(TokenError::Expired);
        }
        Ok(TokenInfo::from(token))
    }

    /// Mark a token revoked.
    ///
    /// Idempotent and always succeeds, including for unknown values: whether
    /// a token ever existed must not be observable here (RFC 7009).
    pub async fn revoke(&self, value: &str) {
        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.get_mut(value) {
            token.revoked = true;
        }
    }

    /// RFC 7662 introspection: any invalid or unknown token yields
    /// `active: false` with no further claims.
    pub async fn introspect(&self, value: &str) -> IntrospectionResponse {
        match self.validate(value).await {
            Ok(info) => IntrospectionResponse {
                active: true,
                scope: Some(join_scopes(&info.scopes)),
                client_id: Some(info.client_id),
                username: info.subject_id,
                token_type: Some(
                    match info.kind {
                        TokenKind::Access => "access_token",
                        TokenKind::Refresh => "refresh_token",
                    }
                    .to_string(),
                ),
                exp: Some(info.expires_at.timestamp()),
                iat: Some(info.issued_at.timestamp()),
                aud: info.audience,
            },
            Err(_) => IntrospectionResponse::inactive(),
        }
    }

    /// Rotate a refresh token.
    ///
    /// The presented token is revoked and the replacement access/refresh pair
    /// is minted inside the same critical section, so the old and new refresh
    /// tokens are never simultaneously valid. A value naming an access token
    /// reads as NotFound. `scope` replaces the inherited scope when given;
    /// callers must have checked it narrows the original grant.
    pub async fn rotate_refresh(
        &self,
        value: &str,
        scope: Option<HashSet<String>>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<(Token, Token), TokenError> {
        let now = self.clock.now();
        let mut tokens = self.tokens.write().await;

        let (client_id, subject_id, inherited, audience) = match tokens.get_mut(value) {
            None => return Err(TokenError::NotFound),
            Some(token) if token.kind != TokenKind::Refresh => return Err(TokenError::NotFound),
            Some(token) if token.revoked => return Err(TokenError::Revoked),
            Some(token) if token.expires_at < now => return Err(TokenError::Expired),
            Some(token) => {
                token.revoked = true;
                (
                    token.client_id.clone(),
                    token.subject_id.clone(),
                    token.scopes.clone(),
                    token.audience.clone(),
                )
            }
        };
        let scopes = scope.unwrap_or(inherited);

        let access = Token {
            value: generate_token(),
            kind: TokenKind::Access,
            client_id: client_id.clone(),
            subject_id: subject_id.clone(),
            scopes: scopes.clone(),
            audience,
            created_at: now,
            expires_at: now + access_ttl,
            revoked: false,
        };
        let refresh = Token {
            value: generate_token(),
            kind: TokenKind::Refresh,
            client_id,
            subject_id,
            scopes,
            audience: None,
            created_at: now,
            expires_at: now + refresh_ttl,
            revoked: false,
        };
        tokens.insert(access.value.clone(), access.clone());
        tokens.insert(refresh.value.clone(), refresh.clone());
        Ok((access, refresh))
    }

    /// Remove tokens past their expiry, revoked or not. Returns the count
    /// removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, token| token.expires_at >= now);
        before - tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::ManualClock;
    use crate::oauth::scope::parse_scope;

    fn ledger_with_clock() -> (Arc<ManualClock>, TokenLedger) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = TokenLedger::new(clock.clone());
        (clock, ledger)
    }

    #[tokio::test]
    async fn issued_access_token_validates() {
        let (_, ledger) = ledger_with_clock();
        let token = ledger
            .issue_access(
                "c1",
                Some("u1"),
                parse_scope("read"),
                Some("https://api".to_string()),
                Duration::hours(1),
            )
            .await;

        let info = ledger.validate(&token.value).await.unwrap();
        assert_eq!(info.kind, TokenKind::Access);
        assert_eq!(info.client_id, "c1");
        assert_eq!(info.subject_id.as_deref(), Some("u1"));
        assert_eq!(info.audience.as_deref(), Some("https://api"));
    }

    #[tokio::test]
    async fn expired_tokens_never_validate_again() {
        let (clock, ledger) = ledger_with_clock();
        let token = ledger
            .issue_access("c1", None, HashSet::new(), None, Duration::minutes(1))
            .await;

        assert!(ledger.validate(&token.value).await.is_ok());
        clock.advance(Duration::minutes(2));
        assert_eq!(
            ledger.validate(&token.value).await,
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_silent_for_unknown_values() {
        let (_, ledger) = ledger_with_clock();
        let token = ledger
            .issue_access("c1", None, HashSet::new(), None, Duration::hours(1))
            .await;

        ledger.revoke("never-issued").await;
        ledger.revoke(&token.value).await;
        ledger.revoke(&token.value).await;
        assert_eq!(
            ledger.validate(&token.value).await,
            Err(TokenError::Revoked)
        );
    }

    #[tokio::test]
    async fn introspection_never_leaks_token_existence() {
        let (clock, ledger) = ledger_with_clock();

        let unknown = ledger.introspect("never-issued").await;
        assert!(!unknown.active);
        assert!(unknown.client_id.is_none());

        let token = ledger
            .issue_access("c1", Some("u1"), parse_scope("read"), None, Duration::hours(1))
            .await;
        let active = ledger.introspect(&token.value).await;
        assert!(active.active);
        assert_eq!(active.client_id.as_deref(), Some("c1"));
        assert_eq!(active.username.as_deref(), Some("u1"));
        assert_eq!(active.token_type.as_deref(), Some("access_token"));

        clock.advance(Duration::hours(2));
        let expired = ledger.introspect(&token.value).await;
        assert!(!expired.active);
        assert!(expired.scope.is_none());
    }

    #[tokio::test]
    async fn rotation_invalidates_the_predecessor() {
        let (_, ledger) = ledger_with_clock();
        let old = ledger
            .issue_refresh("c1", Some("u1"), parse_scope("read write"), Duration::days(14))
            .await;

        let (access, refresh) = ledger
            .rotate_refresh(&old.value, None, Duration::hours(1), Duration::days(14))
            .await
            .unwrap();

        assert_eq!(ledger.validate(&old.value).await, Err(TokenError::Revoked));
        assert!(ledger.validate(&access.value).await.is_ok());
        assert!(ledger.validate(&refresh.value).await.is_ok());
        assert_eq!(access.subject_id.as_deref(), Some("u1"));
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(access.scopes, parse_scope("read write"));

        // A second rotation of the revoked token fails
        assert_eq!(
            ledger
                .rotate_refresh(&old.value, None, Duration::hours(1), Duration::days(14))
                .await,
            Err(TokenError::Revoked)
        );
    }

    #[tokio::test]
    async fn rotation_applies_the_narrowed_scope() {
        let (_, ledger) = ledger_with_clock();
        let old = ledger
            .issue_refresh("c1", Some("u1"), parse_scope("read write"), Duration::days(14))
            .await;

        let (access, refresh) = ledger
            .rotate_refresh(
                &old.value,
                Some(parse_scope("read")),
                Duration::hours(1),
                Duration::days(14),
            )
            .await
            .unwrap();
        assert_eq!(access.scopes, parse_scope("read"));
        assert_eq!(refresh.scopes, parse_scope("read"));
    }

    #[tokio::test]
    async fn access_tokens_cannot_be_rotated() {
        let (_, ledger) = ledger_with_clock();
        let access = ledger
            .issue_access("c1", Some("u1"), HashSet::new(), None, Duration::hours(1))
            .await;

        assert_eq!(
            ledger
                .rotate_refresh(&access.value, None, Duration::hours(1), Duration::days(14))
                .await,
            Err(TokenError::NotFound)
        );
        // The presented access token is untouched
        assert!(ledger.validate(&access.value).await.is_ok());
    }

    #[tokio::test]
    async fn expired_refresh_tokens_cannot_be_rotated() {
        let (clock, ledger) = ledger_with_clock();
        let old = ledger
            .issue_refresh("c1", Some("u1"), HashSet::new(), Duration::minutes(1))
            .await;

        clock.advance(Duration::minutes(2));
        assert_eq!(
            ledger
                .rotate_refresh(&old.value, None, Duration::hours(1), Duration::days(14))
                .await,
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn sweep_purges_expired_tokens_only() {
        let (clock, ledger) = ledger_with_clock();
        ledger
            .issue_access("c1", None, HashSet::new(), None, Duration::minutes(1))
            .await;
        let live = ledger
            .issue_access("c1", None, HashSet::new(), None, Duration::hours(1))
            .await;

        clock.advance(Duration::minutes(2));
        assert_eq!(ledger.sweep(clock.now()).await, 1);
        assert!(ledger.validate(&live.value).await.is_ok());
    }
}
