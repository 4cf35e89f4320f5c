//! Standardized error types following the `error-ledger-<domain>-<number>` format.
//!
//! Each component owns a closed error set; the grant engine maps them to
//! RFC 6749 protocol codes in one place, via the `From` impls at the bottom
//! of this module.

use thiserror::Error;

/// Configuration errors that occur during startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a duration string cannot be parsed
    #[error("error-ledger-config-1 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when the external base URL is not a valid absolute URL
    #[error("error-ledger-config-2 Invalid external base URL '{0}': {1}")]
    ExternalBaseInvalid(String, String),
}

/// Client registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No client registered under the given identifier
    #[error("error-ledger-registry-1 Unknown client: {0}")]
    UnknownClient(String),

    /// Supplied credentials did not match the registered secret
    #[error("error-ledger-registry-2 Client authentication failed")]
    AuthenticationFailed,

    /// authorization_code clients must register at least one redirect URI
    #[error("error-ledger-registry-3 Missing redirect URIs for authorization_code client")]
    MissingRedirectUris,

    /// Redirect URIs must be absolute URLs
    #[error("error-ledger-registry-4 Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
}

/// Authorization-code redemption errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeRedeemError {
    #[error("error-ledger-code-1 Authorization code not found")]
    NotFound,

    #[error("error-ledger-code-2 Authorization code expired")]
    Expired,

    #[error("error-ledger-code-3 Authorization code already used")]
    AlreadyUsed,

    /// The code was issued to a different client
    #[error("error-ledger-code-4 Authorization code client mismatch")]
    ClientMismatch,

    /// The redirect URI does not match the one bound at issuance
    #[error("error-ledger-code-5 Redirect URI mismatch")]
    RedirectMismatch,

    /// Missing or non-matching PKCE verifier
    #[error("error-ledger-code-6 PKCE verification failed")]
    PkceFailure,
}

/// Device approval/denial errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceDecisionError {
    /// Unknown user code, or the authorization is no longer awaiting a decision
    #[error("error-ledger-device-1 User code not found")]
    NotFound,

    #[error("error-ledger-device-2 Device authorization expired")]
    Expired,
}

/// Device token-poll outcomes that do not produce a token
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DevicePollError {
    #[error("error-ledger-device-3 Device code not found")]
    NotFound,

    #[error("error-ledger-device-4 Device authorization expired")]
    Expired,

    /// The device code was issued to a different client
    #[error("error-ledger-device-5 Device code client mismatch")]
    ClientMismatch,

    /// The user has not decided yet
    #[error("error-ledger-device-6 Authorization decision pending")]
    AuthorizationPending,

    #[error("error-ledger-device-7 The user denied the authorization request")]
    AccessDenied,
}

/// Token ledger errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("error-ledger-token-1 Token not found")]
    NotFound,

    #[error("error-ledger-token-2 Token expired")]
    Expired,

    #[error("error-ledger-token-3 Token has been revoked")]
    Revoked,
}

/// Protocol-level grant errors carrying RFC 6749 / RFC 8628 error codes
#[derive(Debug, Error)]
pub enum GrantError {
    /// Missing or malformed request parameter
    #[error("error-ledger-grant-1 Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown client or failed client authentication
    #[error("error-ledger-grant-2 Invalid client: {0}")]
    InvalidClient(String),

    /// The client is not authorized for the requested grant type
    #[error("error-ledger-grant-3 Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Invalid, expired, consumed, or mismatched grant credential
    #[error("error-ledger-grant-4 Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("error-ledger-grant-5 Invalid scope: {0}")]
    InvalidScope(String),

    #[error("error-ledger-grant-6 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Device flow: the user has not completed verification yet
    #[error("error-ledger-grant-7 Authorization decision pending")]
    AuthorizationPending,

    #[error("error-ledger-grant-8 Access denied: {0}")]
    AccessDenied(String),

    /// Device flow: the device code expired before the user decided
    #[error("error-ledger-grant-9 Device code expired")]
    ExpiredToken,

    #[error("error-ledger-grant-10 Server error: {0}")]
    ServerError(String),
}

impl GrantError {
    /// Wire error code for the `error` field of an error response.
    pub fn error_code(&self) -> &'static str {
        match self {
            GrantError::InvalidRequest(_) => "invalid_request",
            GrantError::InvalidClient(_) => "invalid_client",
            GrantError::UnauthorizedClient(_) => "unauthorized_client",
            GrantError::InvalidGrant(_) => "invalid_grant",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GrantError::AuthorizationPending => "authorization_pending",
            GrantError::AccessDenied(_) => "access_denied",
            GrantError::ExpiredToken => "expired_token",
            GrantError::ServerError(_) => "server_error",
        }
    }

    /// HTTP status the embedding layer should respond with.
    pub fn status(&self) -> u16 {
        match self {
            GrantError::InvalidClient(_) => 401,
            GrantError::ServerError(_) => 500,
            _ => 400,
        }
    }

    /// Wire-format error body.
    pub fn to_response(&self) -> crate::oauth::types::OAuthErrorResponse {
        crate::oauth::types::OAuthErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        }
    }
}

impl From<RegistryError> for GrantError {
    fn from(err: RegistryError) -> Self {
        GrantError::InvalidClient(err.to_string())
    }
}

impl From<CodeRedeemError> for GrantError {
    fn from(err: CodeRedeemError) -> Self {
        GrantError::InvalidGrant(err.to_string())
    }
}

impl From<TokenError> for GrantError {
    fn from(err: TokenError) -> Self {
        GrantError::InvalidGrant(err.to_string())
    }
}

impl From<DeviceDecisionError> for GrantError {
    fn from(err: DeviceDecisionError) -> Self {
        match err {
            DeviceDecisionError::NotFound => GrantError::InvalidGrant(err.to_string()),
            DeviceDecisionError::Expired => GrantError::ExpiredToken,
        }
    }
}

impl From<DevicePollError> for GrantError {
    fn from(err: DevicePollError) -> Self {
        match err {
            DevicePollError::AuthorizationPending => GrantError::AuthorizationPending,
            DevicePollError::AccessDenied => GrantError::AccessDenied(err.to_string()),
            DevicePollError::Expired => GrantError::ExpiredToken,
            DevicePollError::NotFound | DevicePollError::ClientMismatch => {
                GrantError::InvalidGrant(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_error_codes_and_statuses() {
        assert_eq!(
            GrantError::InvalidClient("x".into()).error_code(),
            "invalid_client"
        );
        assert_eq!(GrantError::InvalidClient("x".into()).status(), 401);
        assert_eq!(GrantError::ServerError("x".into()).status(), 500);
        assert_eq!(GrantError::InvalidGrant("x".into()).status(), 400);
        assert_eq!(
            GrantError::AuthorizationPending.error_code(),
            "authorization_pending"
        );
        assert_eq!(GrantError::ExpiredToken.error_code(), "expired_token");
    }

    #[test]
    fn device_poll_errors_map_to_protocol_codes() {
        assert_eq!(
            GrantError::from(DevicePollError::AuthorizationPending).error_code(),
            "authorization_pending"
        );
        assert_eq!(
            GrantError::from(DevicePollError::AccessDenied).error_code(),
            "access_denied"
        );
        assert_eq!(
            GrantError::from(DevicePollError::Expired).error_code(),
            "expired_token"
        );
        assert_eq!(
            GrantError::from(DevicePollError::NotFound).error_code(),
            "invalid_grant"
        );
        assert_eq!(
            GrantError::from(DevicePollError::ClientMismatch).error_code(),
            "invalid_grant"
        );
    }
}
