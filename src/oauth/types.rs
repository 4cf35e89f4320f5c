//! Core types for clients, stored credentials, and the token-endpoint wire format.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// RFC 8628 device grant type identifier
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// RFC 8693 token exchange grant type identifier
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// RFC 8693 access token type identifier
pub const ACCESS_TOKEN_TYPE_URN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// RFC 8693 refresh token type identifier
pub const REFRESH_TOKEN_TYPE_URN: &str = "urn:ietf:params:oauth:token-type:refresh_token";

/// Scope opting a grant into refresh-token issuance where refresh tokens are
/// not issued by default (client_credentials, token exchange).
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Grant types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:token-exchange")]
    TokenExchange,
}

impl GrantType {
    /// Parse the `grant_type` form parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            DEVICE_CODE_GRANT_TYPE => Some(Self::DeviceCode),
            TOKEN_EXCHANGE_GRANT_TYPE => Some(Self::TokenExchange),
            _ => None,
        }
    }
}

/// Token types issued by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "Bearer")]
    Bearer,
}

/// A registered OAuth client.
///
/// Immutable once registered; the registry hands out clones, never shared
/// mutable references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub id: String,
    /// SHA-256 digest (base64url) of the client secret; `None` for public clients
    pub secret_hash: Option<String>,
    /// Grant types this client may use
    pub allowed_grant_types: HashSet<GrantType>,
    /// Scopes this client may request
    pub allowed_scopes: HashSet<String>,
    /// Audiences this client may mint tokens for (token exchange)
    pub allowed_audiences: HashSet<String>,
    /// Registered redirect URIs; required for authorization_code clients
    pub redirect_uris: HashSet<String>,
}

impl Client {
    pub fn is_public(&self) -> bool {
        self.secret_hash.is_none()
    }

    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant_type)
    }

    pub fn allows_audience(&self, audience: &str) -> bool {
        self.allowed_audiences.contains(audience)
    }
}

/// PKCE challenge methods (RFC 7636)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl PkceMethod {
    /// Parse the `code_challenge_method` parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }
}

/// PKCE challenge bound to an authorization code at issuance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: PkceMethod,
}

/// A one-time authorization code awaiting redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// End user who authorized the request
    pub subject_id: String,
    /// Redirect URI bound at issuance; redemption must reproduce it
    pub redirect_uri: String,
    pub scopes: HashSet<String>,
    pub pkce: Option<PkceChallenge>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic: set on successful redemption, never cleared
    pub used: bool,
}

/// Device authorization decision state.
///
/// Expiry is not a stored state; it is evaluated lazily from `expires_at` on
/// every access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Pending,
    /// Approved by the user named here
    Authorized { subject_id: String },
    Denied,
}

/// A device authorization in flight (RFC 8628)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    /// Short human-typeable code shown on the verification page
    pub user_code: String,
    pub client_id: String,
    pub scopes: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: DeviceState,
}

/// Token kind; stored explicitly, never inferred from the token string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// A stored access or refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque token value; validity is determined solely by ledger lookup
    pub value: String,
    pub kind: TokenKind,
    pub client_id: String,
    /// `None` for tokens issued without a user (client_credentials)
    pub subject_id: Option<String>,
    pub scopes: HashSet<String>,
    pub audience: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic: set by revocation, never cleared
    pub revoked: bool,
}

/// Read-model returned by token validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub kind: TokenKind,
    pub client_id: String,
    pub subject_id: Option<String>,
    pub scopes: HashSet<String>,
    pub audience: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Token> for TokenInfo {
    fn from(token: &Token) -> Self {
        Self {
            kind: token.kind,
            client_id: token.client_id.clone(),
            subject_id: token.subject_id.clone(),
            scopes: token.scopes.clone(),
            audience: token.audience.clone(),
            issued_at: token.created_at,
            expires_at: token.expires_at,
        }
    }
}

/// Parsed token-endpoint request.
///
/// The HTTP layer form-decodes the body; the engine consumes only these named
/// fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (authorization_code grant)
    pub redirect_uri: Option<String>,
    /// PKCE verifier (authorization_code grant)
    pub code_verifier: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Device code (device_code grant)
    pub device_code: Option<String>,
    /// Subject token (token exchange)
    pub subject_token: Option<String>,
    /// Subject token type URN (token exchange)
    pub subject_token_type: Option<String>,
    /// Requested token type URN (token exchange)
    pub requested_token_type: Option<String>,
    /// Requested audience (token exchange)
    pub audience: Option<String>,
    pub scope: Option<String>,
}

/// Authorization-endpoint request, already authenticated and form-decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Result of a successful authorization request
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationGrant {
    pub code: String,
    /// Echoed opaque client state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub expires_in: u64,
}

/// Token endpoint success payload
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: TokenType,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space-separated granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// RFC 8693 issued token type; set for token exchange responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

impl TokenResponse {
    pub fn new(
        access_token: String,
        expires_in: u64,
        refresh_token: Option<String>,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token,
            token_type: TokenType::Bearer,
            expires_in,
            refresh_token,
            scope,
            issued_token_type: None,
        }
    }
}

/// Device authorization endpoint payload (RFC 8628 §3.2)
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    /// End-user verification URI
    pub verification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    /// Minimum polling interval in seconds
    pub interval: u64,
}

/// Introspection payload (RFC 7662)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject identifier of the resource owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl IntrospectionResponse {
    /// The non-leaking response for unknown, expired, or revoked tokens.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            username: None,
            token_type: None,
            exp: None,
            iat: None,
            aud: None,
        }
    }
}

/// Error payload for token and device-authorization endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Generate an opaque credential from a secure random source.
///
/// 32 random bytes, base64url without padding: 256 bits of entropy.
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_param_round_trip() {
        assert_eq!(
            GrantType::from_param("authorization_code"),
            Some(GrantType::AuthorizationCode)
        );
        assert_eq!(
            GrantType::from_param("client_credentials"),
            Some(GrantType::ClientCredentials)
        );
        assert_eq!(
            GrantType::from_param("refresh_token"),
            Some(GrantType::RefreshToken)
        );
        assert_eq!(
            GrantType::from_param(DEVICE_CODE_GRANT_TYPE),
            Some(GrantType::DeviceCode)
        );
        assert_eq!(
            GrantType::from_param(TOKEN_EXCHANGE_GRANT_TYPE),
            Some(GrantType::TokenExchange)
        );
        assert_eq!(GrantType::from_param("password"), None);
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_token();
        let second = generate_token();
        assert_ne!(first, second);
        // 32 bytes base64url without padding
        assert_eq!(first.len(), 43);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn token_response_serializes_bearer_type() {
        let response = TokenResponse::new("tok".to_string(), 3600, None, Some("read".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("issued_token_type").is_none());
    }

    #[test]
    fn inactive_introspection_has_no_claims() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({"active": false}));
    }
}
