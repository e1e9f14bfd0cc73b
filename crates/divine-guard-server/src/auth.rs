// crates/divine-guard-server/src/auth.rs
// ============================================================================
// Module: Admin Authentication
// Description: Authentication for admin rule-management routes.
// Purpose: Provide strict, fail-closed local-only and bearer-token policies.
// Dependencies: divine-guard-config, divine-guard-core, subtle
// ============================================================================

//! ## Overview
//! Admin routes are authenticated per request from the peer address and the
//! `Authorization` header. Bearer tokens are compared in constant time and
//! identified in logs only by their SHA-256 fingerprint. The snapshot route
//! is public and never consults this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use divine_guard_config::MAX_AUTH_TOKEN_LENGTH;
use divine_guard_config::ServerAuthConfig;
use divine_guard_config::ServerAuthMode;
use divine_guard_core::hashing::HashAlgorithm;
use divine_guard_core::hashing::hash_bytes;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;
/// Maximum accepted actor header size.
pub const MAX_ACTOR_BYTES: usize = 256;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Authentication method used for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Loopback peer under `local_only`.
    Local,
    /// Configured bearer token.
    BearerToken,
}

/// Authenticated admin caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    /// Authentication method.
    pub method: AuthMethod,
    /// Token fingerprint for bearer auth (sha256 hex).
    pub token_fingerprint: Option<String>,
}

impl AdminIdentity {
    /// Returns the actor recorded on upserts.
    ///
    /// An explicit actor header wins; otherwise bearer callers are recorded by
    /// token fingerprint and loopback callers as `loopback`.
    #[must_use]
    pub fn actor(&self, asserted: Option<String>) -> String {
        if let Some(actor) = asserted {
            return actor;
        }
        match (&self.method, &self.token_fingerprint) {
            (AuthMethod::BearerToken, Some(fingerprint)) => format!("token:{fingerprint}"),
            _ => "loopback".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Admin auth policy derived from `[server.auth]`.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Configured mode.
    mode: ServerAuthMode,
    /// Accepted tokens.
    bearer_tokens: Vec<String>,
}

impl AdminAuth {
    /// Builds the policy from server auth configuration.
    #[must_use]
    pub fn from_config(config: &ServerAuthConfig) -> Self {
        Self {
            mode: config.mode,
            bearer_tokens: config.bearer_tokens.clone(),
        }
    }

    /// Authenticates an admin request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the peer or token is not accepted.
    pub fn authorize(
        &self,
        peer_ip: Option<IpAddr>,
        auth_header: Option<&str>,
    ) -> Result<AdminIdentity, AuthError> {
        match self.mode {
            ServerAuthMode::LocalOnly => {
                if peer_ip.is_some_and(|ip| ip.is_loopback()) {
                    Ok(AdminIdentity {
                        method: AuthMethod::Local,
                        token_fingerprint: None,
                    })
                } else {
                    Err(AuthError::Unauthenticated(
                        "local-only mode requires loopback access".to_string(),
                    ))
                }
            }
            ServerAuthMode::BearerToken => self.authorize_bearer(auth_header),
        }
    }

    /// Checks the bearer token against every configured token.
    fn authorize_bearer(&self, auth_header: Option<&str>) -> Result<AdminIdentity, AuthError> {
        let token = parse_bearer_token(auth_header)?;
        let mut matched = false;
        for candidate in &self.bearer_tokens {
            matched |= bool::from(candidate.as_bytes().ct_eq(token.as_bytes()));
        }
        if !matched {
            return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
        }
        let digest = hash_bytes(HashAlgorithm::Sha256, token.as_bytes());
        Ok(AdminIdentity {
            method: AuthMethod::BearerToken,
            token_fingerprint: Some(digest.value),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token from `Bearer <token>`.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    if token.len() > MAX_AUTH_TOKEN_LENGTH {
        return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
    }
    Ok(token)
}

/// Normalizes the `x-divine-guard-actor` header.
///
/// Returns `Ok(None)` for a missing or blank header.
///
/// # Errors
///
/// Returns a message when the header exceeds [`MAX_ACTOR_BYTES`].
pub fn normalize_actor(raw: Option<&str>) -> Result<Option<String>, String> {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if value.len() > MAX_ACTOR_BYTES {
        return Err(format!("actor header exceeds {MAX_ACTOR_BYTES} bytes"));
    }
    Ok(Some(value.to_lowercase()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
