//! Personal access tokens, stored where the request's context says.
//!
//! A request bound to a tenant reads and writes tokens in that tenant's
//! database; a central request uses the catalog database. The choice is made
//! on every call from the context at hand, never cached.
//!
//! Tokens are handed out as `<id>|<secret>`. Only the SHA-256 of the secret
//! is stored, and presented secrets are compared in constant time.

use std::sync::Arc;

use chrono::Utc;
use ems_core::{AccessToken, AccessTokenStore, DataStore, NewAccessToken, TenantContext};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of the random part of a token.
const SECRET_LEN: usize = 40;

/// Which database served a token operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreScope {
    Tenant,
    Central,
}

/// Picks the token store for a request: the tenant's when bound, else the catalog's.
#[must_use]
pub fn select_token_store(
    ctx: &TenantContext,
    catalog_store: &Arc<dyn DataStore>,
) -> (StoreScope, Arc<dyn AccessTokenStore>) {
    match ctx.store() {
        Some(store) => (StoreScope::Tenant, store.access_tokens()),
        None => (StoreScope::Central, catalog_store.access_tokens()),
    }
}

/// A freshly issued token. `plaintext` is shown once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: AccessToken,
    pub plaintext: String,
}

/// Token operations bound to one store.
pub struct TokenService {
    scope: StoreScope,
    store: Arc<dyn AccessTokenStore>,
}

impl TokenService {
    /// Service for the store selected by `ctx`.
    #[must_use]
    pub fn for_context(ctx: &TenantContext, catalog_store: &Arc<dyn DataStore>) -> Self {
        let (scope, store) = select_token_store(ctx, catalog_store);
        Self { scope, store }
    }

    #[must_use]
    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    /// Issues a new token for `owner`.
    ///
    /// No route here calls this: issuance belongs to the login flow that
    /// verifies credentials, which links this crate and issues through the
    /// store the request context selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the insert.
    pub async fn issue(&self, owner: &str, name: &str) -> anyhow::Result<IssuedToken> {
        let secret: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        let token = self
            .store
            .insert(NewAccessToken {
                owner: owner.to_string(),
                name: name.to_string(),
                token_hash: hash_secret(&secret),
            })
            .await?;
        let plaintext = format!("{}|{secret}", token.id);
        Ok(IssuedToken { token, plaintext })
    }

    /// Resolves a presented token and records its use.
    ///
    /// Returns `None` for unknown, malformed, or mismatching tokens.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    pub async fn authenticate(&self, presented: &str) -> anyhow::Result<Option<AccessToken>> {
        let Some(token) = self.find(presented).await? else {
            return Ok(None);
        };
        self.store.touch(token.id, Utc::now()).await?;
        Ok(Some(token))
    }

    /// Deletes the presented token. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    pub async fn revoke(&self, presented: &str) -> anyhow::Result<bool> {
        match self.find(presented).await? {
            Some(token) => self.store.delete(token.id).await,
            None => Ok(false),
        }
    }

    async fn find(&self, presented: &str) -> anyhow::Result<Option<AccessToken>> {
        let presented = presented.trim();
        match presented.split_once('|') {
            Some((id, secret)) => {
                let Ok(id) = id.parse::<i64>() else {
                    return Ok(None);
                };
                let Some(token) = self.store.find_by_id(id).await? else {
                    return Ok(None);
                };
                let expected = hash_secret(secret);
                let matches: bool = token
                    .token_hash
                    .as_bytes()
                    .ct_eq(expected.as_bytes())
                    .into();
                Ok(matches.then_some(token))
            }
            None if presented.is_empty() => Ok(None),
            None => self.store.find_by_hash(&hash_secret(presented)).await,
        }
    }
}

fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
