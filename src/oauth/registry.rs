//! Client registry: registration, lookup, and credential authentication.

use crate::errors::RegistryError;
use crate::oauth::types::{Client, GrantType};
use base64::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use url::Url;

/// Holds registered clients keyed by id.
///
/// Entries are written at startup or registration time and are read-only to
/// the rest of the core; lookups return clones.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

/// Digest a client secret for storage (base64url-encoded SHA-256).
pub fn hash_secret(secret: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(secret.as_bytes()))
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a client definition.
    ///
    /// Clients allowing the authorization_code grant must register at least
    /// one redirect URI, and every redirect URI must be an absolute URL.
    pub async fn register(&self, client: Client) -> Result<(), RegistryError> {
        if client.allows_grant_type(GrantType::AuthorizationCode) && client.redirect_uris.is_empty()
        {
            return Err(RegistryError::MissingRedirectUris);
        }
        for uri in &client.redirect_uris {
            Url::parse(uri)
                .map_err(|err| RegistryError::InvalidRedirectUri(format!("{uri}: {err}")))?;
        }

        let mut clients = self.clients.write().await;
        clients.insert(client.id.clone(), client);
        Ok(())
    }

    /// Authenticate a client by id and optional secret.
    ///
    /// Public clients (no stored secret digest) authenticate with any or no
    /// secret. Confidential clients require a matching secret; the digest
    /// comparison is constant-time so attempts cannot be distinguished by
    /// timing.
    pub async fn authenticate(
        &self,
        client_id: &str,
        secret: Option<&str>,
    ) -> Result<Client, RegistryError> {
        let clients = self.clients.read().await;
        let client = clients
            .get(client_id)
            .ok_or_else(|| RegistryError::UnknownClient(client_id.to_string()))?;

        match &client.secret_hash {
            None => Ok(client.clone()),
            Some(stored) => {
                let supplied = secret.ok_or(RegistryError::AuthenticationFailed)?;
                let computed = hash_secret(supplied);
                let matches: bool = computed.as_bytes().ct_eq(stored.as_bytes()).into();
                if matches {
                    Ok(client.clone())
                } else {
                    tracing::warn!(client_id, "client secret mismatch");
                    Err(RegistryError::AuthenticationFailed)
                }
            }
        }
    }

    /// Look up a client without authenticating it.
    pub async fn get(&self, client_id: &str) -> Option<Client> {
        self.clients.read().await.get(client_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
