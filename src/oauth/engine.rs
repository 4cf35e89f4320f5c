//! Grant engine: the token-endpoint orchestrator.
//!
//! For each grant type the engine validates the request, authenticates the
//! client against the registry, drives the appropriate ledger, and assembles
//! the wire response. Component errors are mapped to RFC 6749 protocol codes
//! here, at one boundary, via the `From` impls in [`crate::errors`].

use crate::errors::GrantError;
use crate::ledger::{AuthorizationCodeLedger, DeviceAuthorizationLedger, TokenLedger};
use crate::oauth::registry::ClientRegistry;
use crate::oauth::scope::{join_scopes, parse_scope, scope_subset};
use crate::oauth::types::{
    ACCESS_TOKEN_TYPE_URN, AuthorizationGrant, AuthorizationRequest, Client,
    DeviceAuthorizationResponse, GrantType, IntrospectionResponse, OFFLINE_ACCESS_SCOPE,
    PkceChallenge, PkceMethod, Token, TokenKind, TokenRequest, TokenResponse,
};
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;

/// Engine-level settings, typically derived from [`crate::config::Settings`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// External base URL used to build device verification URIs
    pub external_base: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Minimum device polling interval advertised to clients, in seconds
    pub device_poll_interval: u64,
}

/// Orchestrates the client registry and the three credential ledgers.
///
/// Constructed once with explicit collaborator instances and shared by
/// reference; multiple independent engines can coexist in one process.
pub struct GrantEngine {
    registry: Arc<ClientRegistry>,
    codes: Arc<AuthorizationCodeLedger>,
    devices: Arc<DeviceAuthorizationLedger>,
    tokens: Arc<TokenLedger>,
    settings: EngineSettings,
}

impl GrantEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        codes: Arc<AuthorizationCodeLedger>,
        devices: Arc<DeviceAuthorizationLedger>,
        tokens: Arc<TokenLedger>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            codes,
            devices,
            tokens,
            settings,
        }
    }

    /// Handle an authorization request for an already-authenticated user and
    /// issue a one-time code (RFC 6749 §4.1.1).
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
        subject_id: &str,
    ) -> Result<AuthorizationGrant, GrantError> {
        let client = self
            .registry
            .get(&request.client_id)
            .await
            .ok_or_else(|| GrantError::InvalidClient("unknown client".to_string()))?;
        if !client.allows_grant_type(GrantType::AuthorizationCode) {
            return Err(GrantError::UnauthorizedClient(
                "client is not authorized for authorization_code".to_string(),
            ));
        }
        if !client.redirect_uris.contains(&request.redirect_uri) {
            return Err(GrantError::InvalidRequest(
                "redirect_uri is not registered for this client".to_string(),
            ));
        }

        let scopes = self.requested_scopes(request.scope.as_deref(), &client.allowed_scopes)?;

        let pkce = match &request.code_challenge {
            Some(challenge) => {
                // Method defaults to plain when omitted (RFC 7636 §4.3)
                let method = match request.code_challenge_method.as_deref() {
                    None => PkceMethod::Plain,
                    Some(value) => PkceMethod::from_param(value).ok_or_else(|| {
                        GrantError::InvalidRequest(format!(
                            "unsupported code_challenge_method: {value}"
                        ))
                    })?,
                };
                Some(PkceChallenge {
                    challenge: challenge.clone(),
                    method,
                })
            }
            None => None,
        };
        if client.is_public() && pkce.is_none() {
            return Err(GrantError::InvalidRequest(
                "PKCE is required for public clients".to_string(),
            ));
        }

        let issued = self
            .codes
            .issue(&client.id, subject_id, &request.redirect_uri, scopes, pkce)
            .await;
        Ok(AuthorizationGrant {
            code: issued.code,
            state: request.state,
            expires_in: self.codes.ttl().num_seconds().max(0) as u64,
        })
    }

    /// Handle a token request (RFC 6749 §3.2).
    ///
    /// Two behaviors go beyond the minimal RFCs and are deliberate:
    /// client_credentials issues a refresh token when (and only when)
    /// `offline_access` is requested, and a token-exchange scope request that
    /// is not a subset of the subject token's scope falls back to the subject
    /// token's scope rather than failing; the response `scope` field always
    /// reports what was actually granted.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, GrantError> {
        let grant_type = GrantType::from_param(&request.grant_type)
            .ok_or_else(|| GrantError::UnsupportedGrantType(request.grant_type.clone()))?;

        let response = match grant_type {
            GrantType::AuthorizationCode => self.authorization_code_grant(&request).await,
            GrantType::ClientCredentials => self.client_credentials_grant(&request).await,
            GrantType::RefreshToken => self.refresh_token_grant(&request).await,
            GrantType::DeviceCode => self.device_code_grant(&request).await,
            GrantType::TokenExchange => self.token_exchange_grant(&request).await,
        };
        match &response {
            // Pending polls are expected traffic, not failures
            Err(GrantError::AuthorizationPending) => tracing::debug!(
                client_id = request.client_id.as_deref().unwrap_or(""),
                "device authorization still pending"
            ),
            Err(err) => tracing::warn!(
                grant_type = %request.grant_type,
                client_id = request.client_id.as_deref().unwrap_or(""),
                error = %err,
                "token request failed"
            ),
            Ok(_) => {}
        }
        response
    }

    async fn authorization_code_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, GrantError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("code is required".to_string()))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("redirect_uri is required".to_string()))?;

        let client = self
            .authenticate_for_grant(request, GrantType::AuthorizationCode)
            .await?;

        // Scopes were validated against the client when the code was issued
        let redeemed = self
            .codes
            .redeem(code, &client.id, redirect_uri, request.code_verifier.as_deref())
            .await?;

        let access = self
            .tokens
            .issue_access(
                &client.id,
                Some(&redeemed.subject_id),
                redeemed.scopes.clone(),
                None,
                self.settings.access_token_ttl,
            )
            .await;
        let refresh = self
            .tokens
            .issue_refresh(
                &client.id,
                Some(&redeemed.subject_id),
                redeemed.scopes,
                self.settings.refresh_token_ttl,
            )
            .await;

        Ok(self.token_response(&access, Some(refresh)))
    }

    async fn client_credentials_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, GrantError> {
        let client = self
            .authenticate_for_grant(request, GrantType::ClientCredentials)
            .await?;

        // An omitted scope defaults to the client's full allowed set
        let scopes = match request.scope.as_deref() {
            Some(scope) => self.requested_scopes(Some(scope), &client.allowed_scopes)?,
            None => client.allowed_scopes.clone(),
        };

        let access = self
            .tokens
            .issue_access(
                &client.id,
                None,
                scopes.clone(),
                None,
                self.settings.access_token_ttl,
            )
            .await;
        // Refresh tokens are opt-in for service clients via offline_access
        let refresh = if scopes.contains(OFFLINE_ACCESS_SCOPE) {
            Some(
                self.tokens
                    .issue_refresh(&client.id, None, scopes, self.settings.refresh_token_ttl)
                    .await,
            )
        } else {
            None
        };

        Ok(self.token_response(&access, refresh))
    }

    async fn refresh_token_grant(&self, request: &TokenRequest) -> Result<TokenResponse, GrantError> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("refresh_token is required".to_string()))?;

        let client = self
            .authenticate_for_grant(request, GrantType::RefreshToken)
            .await?;

        let info = self.tokens.validate(refresh_token).await?;
        if info.kind != TokenKind::Refresh {
            return Err(GrantError::InvalidGrant(
                "presented token is not a refresh token".to_string(),
            ));
        }
        if info.client_id != client.id {
            return Err(GrantError::InvalidGrant(
                "refresh token was issued to another client".to_string(),
            ));
        }

        // A requested scope must narrow the original grant
        let scope_override = match request.scope.as_deref() {
            Some(scope) => {
                let requested = parse_scope(scope);
                if !scope_subset(&requested, &info.scopes) {
                    return Err(GrantError::InvalidScope(
                        "requested scope exceeds the original grant".to_string(),
                    ));
                }
                Some(requested)
            }
            None => None,
        };

        let (access, refresh) = self
            .tokens
            .rotate_refresh(
                refresh_token,
                scope_override,
                self.settings.access_token_ttl,
                self.settings.refresh_token_ttl,
            )
            .await?;

        Ok(self.token_response(&access, Some(refresh)))
    }

    async fn device_code_grant(&self, request: &TokenRequest) -> Result<TokenResponse, GrantError> {
        let device_code = request
            .device_code
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("device_code is required".to_string()))?;

        let client = self
            .authenticate_for_grant(request, GrantType::DeviceCode)
            .await?;

        let ready = self.devices.poll(device_code, &client.id).await?;

        let access = self
            .tokens
            .issue_access(
                &client.id,
                Some(&ready.subject_id),
                ready.scopes.clone(),
                None,
                self.settings.access_token_ttl,
            )
            .await;
        let refresh = self
            .tokens
            .issue_refresh(
                &client.id,
                Some(&ready.subject_id),
                ready.scopes,
                self.settings.refresh_token_ttl,
            )
            .await;

        Ok(self.token_response(&access, Some(refresh)))
    }

    async fn token_exchange_grant(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, GrantError> {
        let subject_token = request
            .subject_token
            .as_deref()
            .ok_or_else(|| GrantError::InvalidRequest("subject_token is required".to_string()))?;
        let subject_token_type = request.subject_token_type.as_deref().ok_or_else(|| {
            GrantError::InvalidRequest("subject_token_type is required".to_string())
        })?;
        if subject_token_type != ACCESS_TOKEN_TYPE_URN {
            return Err(GrantError::InvalidRequest(format!(
                "unrecognized subject_token_type: {subject_token_type}"
            )));
        }
        if let Some(requested_type) = request.requested_token_type.as_deref() {
            if requested_type != ACCESS_TOKEN_TYPE_URN {
                return Err(GrantError::InvalidRequest(format!(
                    "unsupported requested_token_type: {requested_type}"
                )));
            }
        }

        let client = self
            .authenticate_for_grant(request, GrantType::TokenExchange)
            .await?;

        let audience = match request.audience.as_deref() {
            Some(audience) => {
                if !client.allows_audience(audience) {
                    return Err(GrantError::InvalidRequest(format!(
                        "audience is not permitted for this client: {audience}"
                    )));
                }
                Some(audience.to_string())
            }
            None => None,
        };

        let subject = self.tokens.validate(subject_token).await?;
        if subject.kind != TokenKind::Access {
            return Err(GrantError::InvalidGrant(
                "subject_token must be an access token".to_string(),
            ));
        }

        // A requested scope that exceeds the subject token's falls back to
        // the subject token's scope; the response reports what was granted.
        let scopes = match request.scope.as_deref() {
            Some(scope) => {
                let requested = parse_scope(scope);
                if scope_subset(&requested, &subject.scopes) {
                    requested
                } else {
                    subject.scopes.clone()
                }
            }
            None => subject.scopes.clone(),
        };

        let access = self
            .tokens
            .issue_access(
                &client.id,
                subject.subject_id.as_deref(),
                scopes.clone(),
                audience,
                self.settings.access_token_ttl,
            )
            .await;
        let refresh = if scopes.contains(OFFLINE_ACCESS_SCOPE) {
            Some(
                self.tokens
                    .issue_refresh(
                        &client.id,
                        subject.subject_id.as_deref(),
                        scopes,
                        self.settings.refresh_token_ttl,
                    )
                    .await,
            )
        } else {
            None
        };

        let mut response = self.token_response(&access, refresh);
        response.issued_token_type = Some(ACCESS_TOKEN_TYPE_URN.to_string());
        Ok(response)
    }

    /// Start a device authorization (RFC 8628 §3.1).
    pub async fn device_authorization(
        &self,
        client_id: &str,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorizationResponse, GrantError> {
        let client = self
            .registry
            .get(client_id)
            .await
            .ok_or_else(|| GrantError::InvalidClient("unknown client".to_string()))?;
        if !client.allows_grant_type(GrantType::DeviceCode) {
            return Err(GrantError::UnauthorizedClient(
                "client is not authorized for the device grant".to_string(),
            ));
        }

        let scopes = self.requested_scopes(scope, &client.allowed_scopes)?;
        let grant = self.devices.request_authorization(&client.id, scopes).await;

        let verification_uri = format!(
            "{}/device",
            self.settings.external_base.trim_end_matches('/')
        );
        let verification_uri_complete =
            Some(format!("{}?user_code={}", verification_uri, grant.user_code));
        Ok(DeviceAuthorizationResponse {
            device_code: grant.device_code,
            user_code: grant.user_code,
            verification_uri,
            verification_uri_complete,
            expires_in: grant.expires_in,
            interval: self.settings.device_poll_interval,
        })
    }

    /// Record the user's approval on the verification surface.
    pub async fn approve_device(&self, user_code: &str, subject_id: &str) -> Result<(), GrantError> {
        self.devices
            .approve(user_code, subject_id)
            .await
            .map_err(GrantError::from)
    }

    /// Record the user's denial on the verification surface.
    pub async fn deny_device(&self, user_code: &str) -> Result<(), GrantError> {
        self.devices.deny(user_code).await.map_err(GrantError::from)
    }

    /// RFC 7662 introspection; never errors for unknown tokens.
    pub async fn introspect(&self, token: &str) -> IntrospectionResponse {
        self.tokens.introspect(token).await
    }

    /// RFC 7009 revocation; succeeds regardless of whether the token existed.
    pub async fn revoke(&self, token: &str) {
        self.tokens.revoke(token).await;
    }

    /// Steps 2 and 3 of the common pipeline: client authentication, then
    /// grant-type authorization.
    async fn authenticate_for_grant(
        &self,
        request: &TokenRequest,
        grant_type: GrantType,
    ) -> Result<Client, GrantError> {
        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| GrantError::InvalidClient("missing client_id".to_string()))?;
        let client = self
            .registry
            .authenticate(client_id, request.client_secret.as_deref())
            .await?;
        if !client.allows_grant_type(grant_type) {
            return Err(GrantError::UnauthorizedClient(format!(
                "client is not authorized for {}",
                request.grant_type
            )));
        }
        Ok(client)
    }

    /// Parse and subset-check a requested scope; `None` yields the empty set.
    fn requested_scopes(
        &self,
        scope: Option<&str>,
        allowed: &HashSet<String>,
    ) -> Result<HashSet<String>, GrantError> {
        match scope {
            Some(scope) => {
                let requested = parse_scope(scope);
                if !scope_subset(&requested, allowed) {
                    return Err(GrantError::InvalidScope(
                        "requested scope exceeds the client grant".to_string(),
                    ));
                }
                Ok(requested)
            }
            None => Ok(HashSet::new()),
        }
    }

    fn token_response(&self, access: &Token, refresh: Option<Token>) -> TokenResponse {
        TokenResponse::new(
            access.value.clone(),
            self.settings.access_token_ttl.num_seconds().max(0) as u64,
            refresh.map(|token| token.value),
            Some(join_scopes(&access.scopes)),
        )
    }
}
