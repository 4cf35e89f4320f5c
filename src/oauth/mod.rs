//! OAuth client registry, grant engine, and shared protocol types.

pub mod engine;
pub mod registry;
pub mod scope;
pub mod types;

// Re-export frequently used items from each module
pub use engine::{EngineSettings, GrantEngine};
pub use registry::{ClientRegistry, hash_secret};
pub use scope::{join_scopes, parse_scope, scope_subset, validate_scope};
pub use types::{
    AuthorizationCode, AuthorizationGrant, AuthorizationRequest, Client, DeviceAuthorization,
    DeviceAuthorizationResponse, DeviceState, GrantType, IntrospectionResponse, OAuthErrorResponse,
    PkceChallenge, PkceMethod, Token, TokenInfo, TokenKind, TokenRequest, TokenResponse, TokenType,
    generate_client_id, generate_token,
};
