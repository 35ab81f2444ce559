use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{extract_session_token, AuthError, Identity, IdentityResolver};
use crate::config::{ClerkConfig, Secret};

/// Clock skew tolerated when checking `exp` / `nbf`, in seconds.
const CLOCK_SKEW_SECS: u64 = 5;
/// Minimum gap between JWKS refetches triggered by the same unknown `kid`.
const JWKS_MIN_REFRESH: Duration = Duration::from_secs(30);
/// How long a failed JWKS fetch is reported without contacting Clerk again.
const JWKS_FAILURE_BACKOFF: Duration = Duration::from_secs(5);
const JWKS_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Claims carried by a Clerk session token
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            session_id: claims.sid,
            org_id: claims.org_id,
        }
    }
}

enum KeySource {
    Static {
        key: DecodingKey,
        algorithm: Algorithm,
    },
    Jwks {
        url: String,
        secret_key: Secret,
        cache: RwLock<JwksCache>,
    },
}

#[derive(Default)]
struct JwksCache {
    keys: Option<JwkSet>,
    last_miss: Option<(String, Instant)>,
    last_failure: Option<(AuthError, Instant)>,
}

impl JwksCache {
    fn lookup(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        self.keys
            .as_ref()
            .and_then(|keys| keys.find(kid))
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|e| AuthError::InvalidKey(e.to_string()))
    }
}

/// Verifies Clerk session tokens.
///
/// Invalid, expired or absent tokens resolve to an anonymous request rather than
/// an error; only failure to obtain verification keys is an error.
pub struct ClerkResolver {
    keys: KeySource,
    http: reqwest::Client,
}

impl ClerkResolver {
    /// Use `CLERK_JWT_KEY` when configured, otherwise the instance JWKS endpoint.
    pub fn from_config(config: &ClerkConfig) -> Result<Self, AuthError> {
        let keys = match &config.jwt_key {
            Some(pem) => KeySource::Static {
                key: DecodingKey::from_rsa_pem(pem.expose().as_bytes())
                    .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
                algorithm: Algorithm::RS256,
            },
            None => KeySource::Jwks {
                url: format!("{}/v1/jwks", config.api_url),
                secret_key: config.secret_key.clone(),
                cache: RwLock::new(JwksCache::default()),
            },
        };
        Ok(Self {
            keys,
            http: Self::http_client()?,
        })
    }

    /// Verify every token against one fixed key.
    pub fn with_static_key(key: DecodingKey, algorithm: Algorithm) -> Result<Self, AuthError> {
        Ok(Self {
            keys: KeySource::Static { key, algorithm },
            http: Self::http_client()?,
        })
    }

    fn http_client() -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .timeout(JWKS_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Jwks(e.to_string()))
    }

    async fn verify(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!("Rejected malformed session token: {}", e);
                return Ok(None);
            }
        };

        let (key, algorithm) = match &self.keys {
            KeySource::Static { key, algorithm } => (key.clone(), *algorithm),
            KeySource::Jwks { .. } => match header.kid.as_deref() {
                Some(kid) => match self.jwks_key(kid).await? {
                    Some(key) => (key, Algorithm::RS256),
                    None => {
                        tracing::debug!("No signing key matches kid '{}'", kid);
                        return Ok(None);
                    }
                },
                None => return Ok(None),
            },
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = CLOCK_SKEW_SECS;

        match decode::<SessionClaims>(token, &key, &validation) {
            Ok(data) if !data.claims.sub.is_empty() => Ok(Some(data.claims.into())),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::debug!("Rejected session token: {}", e);
                Ok(None)
            }
        }
    }

    /// Look up `kid` in the cached key set.
    ///
    /// An unknown `kid` refetches the set once; repeated misses for the same `kid`
    /// are answered from cache until `JWKS_MIN_REFRESH` passes. A failed fetch is
    /// replayed for `JWKS_FAILURE_BACKOFF`. The write lock is held across the fetch
    /// so concurrent misses share one request.
    async fn jwks_key(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        let KeySource::Jwks { url, secret_key, cache } = &self.keys else {
            return Ok(None);
        };

        if let Some(key) = cache.read().await.lookup(kid)? {
            return Ok(Some(key));
        }

        let mut state = cache.write().await;
        if let Some(key) = state.lookup(kid)? {
            return Ok(Some(key));
        }
        if let Some((error, at)) = &state.last_failure {
            if at.elapsed() < JWKS_FAILURE_BACKOFF {
                return Err(error.clone());
            }
        }
        if let Some((missed, at)) = &state.last_miss {
            if missed == kid && at.elapsed() < JWKS_MIN_REFRESH {
                return Ok(None);
            }
        }

        let keys = match self.fetch_jwks(url, secret_key).await {
            Ok(keys) => keys,
            Err(e) => {
                state.last_failure = Some((e.clone(), Instant::now()));
                return Err(e);
            }
        };
        state.last_failure = None;
        state.keys = Some(keys);

        let key = state.lookup(kid)?;
        state.last_miss = match key {
            Some(_) => None,
            None => Some((kid.to_string(), Instant::now())),
        };
        Ok(key)
    }

    async fn fetch_jwks(&self, url: &str, secret_key: &Secret) -> Result<JwkSet, AuthError> {
        let keys = self
            .http
            .get(url)
            .bearer_auth(secret_key.expose())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AuthError::Jwks(e.to_string()))?
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::Jwks(e.to_string()))?;

        tracing::info!("Fetched {} signing key(s) from {}", keys.keys.len(), url);
        Ok(keys)
    }
}

#[async_trait]
impl IdentityResolver for ClerkResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        match extract_session_token(headers) {
            Some(token) => self.verify(&token).await,
            None => Ok(None),
        }
    }
}
