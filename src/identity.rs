//! Resolves the display name a user joins rooms under.
//!
//! A fresh credential's username wins; anything else (no credential, a blank
//! name, an expired or undated credential) falls back to a generated guest
//! name. Resolution never fails.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LobbyError, Result};
use crate::freshness::{is_expired, Clock, SystemClock, DEFAULT_TOKEN_TTL_SECS};

/// Default prefix for generated guest names.
pub const DEFAULT_GUEST_PREFIX: &str = "guest";

/// Number of hex characters appended to a guest prefix.
const GUEST_SUFFIX_LEN: usize = 8;

// ── Credential ──────────────────────────────────────────────────────

/// Cached identity claim with the time it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Username claim, if the identity carries one.
    pub username: Option<String>,
    /// Issuance time in Unix epoch milliseconds.
    pub issued_at_epoch_ms: i64,
}

impl Credential {
    /// Create a credential for `username` issued at `issued_at_epoch_ms`.
    pub fn new(username: impl Into<String>, issued_at_epoch_ms: i64) -> Self {
        Self {
            username: Some(username.into()),
            issued_at_epoch_ms,
        }
    }
}

/// Raw credential payload as exposed by a credential store.
///
/// Both fields are optional on the wire; a payload without an issuance time
/// cannot be judged fresh and never yields a [`Credential`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub issued_at_epoch_ms: Option<i64>,
}

impl CredentialPayload {
    /// Convert into a [`Credential`], if the payload is dated.
    pub fn into_credential(self) -> Option<Credential> {
        let issued_at_epoch_ms = self.issued_at_epoch_ms?;
        Some(Credential {
            username: self.username,
            issued_at_epoch_ms,
        })
    }
}

// ── Credential sources ──────────────────────────────────────────────

/// Read-only access to the locally cached credential.
pub trait CredentialSource: Send + Sync {
    /// Returns the cached credential payload, or `None` if nothing is cached.
    fn credential_payload(&self) -> Option<CredentialPayload>;
}

/// A credential source that always yields the same payload.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    payload: Option<CredentialPayload>,
}

impl StaticCredentials {
    /// A source with no cached credential.
    pub fn anonymous() -> Self {
        Self { payload: None }
    }

    /// A source holding `payload`.
    pub fn new(payload: CredentialPayload) -> Self {
        Self {
            payload: Some(payload),
        }
    }

    /// A source holding a dated credential for `username`.
    pub fn with_username(username: impl Into<String>, issued_at_epoch_ms: i64) -> Self {
        Self::new(CredentialPayload {
            username: Some(username.into()),
            issued_at_epoch_ms: Some(issued_at_epoch_ms),
        })
    }
}

impl CredentialSource for StaticCredentials {
    fn credential_payload(&self) -> Option<CredentialPayload> {
        self.payload.clone()
    }
}

/// Claims read from an access token. Only what the client consumes.
#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    #[serde(default)]
    username: Option<String>,
    /// Issued-at, in Unix seconds.
    #[serde(default)]
    iat: Option<i64>,
}

/// A credential source backed by a cached JWT access token.
///
/// The signature is not verified; the room service does that. Only the
/// `username` and `iat` claims are read. Tokens without `iat` are dated by
/// the time they were cached locally.
#[derive(Debug, Clone)]
pub struct AccessTokenCredentials {
    token: String,
    cached_at_epoch_ms: i64,
}

impl AccessTokenCredentials {
    /// Wrap `token`, cached at `cached_at_epoch_ms`.
    pub fn new(token: impl Into<String>, cached_at_epoch_ms: i64) -> Self {
        Self {
            token: token.into(),
            cached_at_epoch_ms,
        }
    }

    /// Decode the token's claims into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::InvalidToken`] if the token is not a three-part
    /// JWT or its claims section is not base64url-encoded JSON.
    pub fn decode(&self) -> Result<CredentialPayload> {
        let mut parts = self.token.split('.');
        let claims_part = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(claims), Some(_), None) => claims,
            _ => return Err(LobbyError::InvalidToken("expected three segments".into())),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(claims_part.trim_end_matches('='))
            .map_err(|e| LobbyError::InvalidToken(e.to_string()))?;
        let claims: AccessTokenClaims = serde_json::from_slice(&bytes)
            .map_err(|e| LobbyError::InvalidToken(e.to_string()))?;

        let issued_at_epoch_ms = claims
            .iat
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(self.cached_at_epoch_ms);
        Ok(CredentialPayload {
            username: claims.username,
            issued_at_epoch_ms: Some(issued_at_epoch_ms),
        })
    }
}

impl CredentialSource for AccessTokenCredentials {
    fn credential_payload(&self) -> Option<CredentialPayload> {
        match self.decode() {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!("ignoring cached access token: {e}");
                None
            }
        }
    }
}

// ── Resolution ──────────────────────────────────────────────────────

/// Generate an ephemeral guest name such as `guest-3f9a0c1d`.
pub fn guest_username(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GUEST_SUFFIX_LEN)
        .collect();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        format!("{DEFAULT_GUEST_PREFIX}-{suffix}")
    } else {
        format!("{prefix}-{suffix}")
    }
}

/// Pick the username to join under.
///
/// Returns the credential's username when it is present, non-blank and not
/// expired at `now_ms`; a generated guest name otherwise.
pub fn resolve_username(credential: Option<&Credential>, now_ms: i64, ttl_secs: u64) -> String {
    resolve_with_prefix(credential, now_ms, ttl_secs, DEFAULT_GUEST_PREFIX)
}

fn resolve_with_prefix(
    credential: Option<&Credential>,
    now_ms: i64,
    ttl_secs: u64,
    guest_prefix: &str,
) -> String {
    if let Some(credential) = credential {
        match credential.username.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                if !is_expired(credential.issued_at_epoch_ms, now_ms, ttl_secs) {
                    return name.to_string();
                }
                debug!("credential for {name} is stale, falling back to guest name");
            }
            _ => debug!("credential carries no username, falling back to guest name"),
        }
    }
    guest_username(guest_prefix)
}

/// Resolves usernames from a credential source against a clock.
#[derive(Clone)]
pub struct IdentityResolver {
    source: Arc<dyn CredentialSource>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
    guest_prefix: String,
}

impl IdentityResolver {
    /// Resolver over `source` using the system clock and default settings.
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            clock: Arc::new(SystemClock),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            guest_prefix: DEFAULT_GUEST_PREFIX.to_string(),
        }
    }

    /// Resolver that never has a credential and always produces guest names.
    pub fn anonymous() -> Self {
        Self::new(StaticCredentials::anonymous())
    }

    /// Measure freshness against `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the credential lifetime in seconds.
    #[must_use]
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Set the prefix for generated guest names.
    #[must_use]
    pub fn with_guest_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.guest_prefix = prefix.into();
        self
    }

    /// Current time according to the resolver's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Resolve the username to join under right now.
    pub fn resolve_username(&self) -> String {
        let credential = self
            .source
            .credential_payload()
            .and_then(CredentialPayload::into_credential);
        resolve_with_prefix(
            credential.as_ref(),
            self.clock.now_millis(),
            self.ttl_secs,
            &self.guest_prefix,
        )
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("ttl_secs", &self.ttl_secs)
            .field("guest_prefix", &self.guest_prefix)
            .finish()
    }
}
