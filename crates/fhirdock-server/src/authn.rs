//! The bearer-token verification contract: a narrow [`TokenVerifier`] trait
//! plus a JWT-based default implementation, standing in for OAuth/Keycloak
//! integration. The core only ever consumes the trait; issuing and
//! revoking tokens is an admin-endpoint concern outside this module.
//!
//! A verified token's JTI is cached with a short TTL so a hot path of
//! repeated requests from the same client does not pay for signature
//! verification on every call; eviction is lazy — a lookup that finds an
//! expired entry removes it on the way out rather than running a sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims this server recognizes on a bearer token. `sub` identifies the
/// actor recorded in audit entries; `jti` is the cache/revocation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token: {0}")]
    InvalidToken(String),
    #[error("token revoked")]
    Revoked,
}

/// The contract `fhirdock-server` consumes for bearer-token verification.
/// Swapping in a real OAuth/Keycloak-backed implementation means
/// implementing this trait; the router and handlers never know the
/// difference.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// JWT-based default [`TokenVerifier`]: validates the signature with a
/// single shared HMAC secret and consults the JTI cache before paying for
/// cryptographic verification again.
pub struct JwtVerifier {
    secret: String,
    algorithm: Algorithm,
    cache: JtiCache,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), algorithm: Algorithm::HS256, cache: JtiCache::new(Duration::from_secs(60)) }
    }

    /// Explicitly marks a JTI as revoked, evicting any cached claims for
    /// it. Called by the admin token-revoke endpoint.
    pub fn revoke(&self, jti: &str) {
        self.cache.revoke(jti);
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if let Some(claims) = self.cache.get(token) {
            return Ok(claims);
        }

        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let validation = Validation::new(self.algorithm);
        let decoded = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if self.cache.is_revoked(&decoded.claims.jti) {
            return Err(AuthError::Revoked);
        }

        self.cache.insert(token, decoded.claims.clone());
        Ok(decoded.claims)
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

struct CachedClaims {
    claims: TokenClaims,
    expires_at: Instant,
}

/// Shared JTI/token cache with TTL eviction (spec.md §5: "a shared
/// JTI/token cache with lazy TTL eviction"). Keyed by the raw token string
/// rather than a hash — tokens never leave process memory once decoded, so
/// there is no exposure beyond what holding the verified claims already
/// implies.
struct JtiCache {
    entries: DashMap<String, CachedClaims>,
    revoked: DashMap<String, ()>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl JtiCache {
    fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), revoked: DashMap::new(), ttl, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    fn get(&self, token: &str) -> Option<TokenClaims> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(token) {
            let token_expired = entry.claims.exp <= unix_now();
            if entry.expires_at > now && !token_expired {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.claims.clone());
            }
        }
        // Expired or absent: drop the stale entry on the way out (lazy
        // eviction) rather than scheduling a sweep.
        self.entries.remove(token);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn insert(&self, token: &str, claims: TokenClaims) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(token.to_string(), CachedClaims { claims, expires_at });
    }

    fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }

    fn revoke(&self, jti: &str) {
        self.revoked.insert(jti.to_string(), ());
        self.entries.retain(|_, cached| cached.claims.jti != jti);
    }

    #[cfg(test)]
    fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

/// Shared handle type every axum state struct stores.
pub type DynTokenVerifier = Arc<dyn TokenVerifier>;
