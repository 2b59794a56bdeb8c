//! Caller identity for the HTTP boundary.
//!
//! The pipeline never authenticates: it receives an already verified
//! [`CallerIdentity`]. This module only *verifies* bearer tokens of the form
//! `<subject>.<expires_at>.<hex HMAC-SHA256(secret, "<subject>.<expires_at>")>`,
//! where `expires_at` is a Unix timestamp in seconds. Expired tokens are
//! rejected. Issuing tokens belongs to whatever account system fronts the
//! service.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject: String,
}

impl CallerIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            bail!("token secret must not be empty");
        }
        Ok(Self { secret })
    }

    /// Read the secret from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        let secret = std::env::var(var)
            .map_err(|_| anyhow!("{} environment variable not set", var))?;
        Self::new(secret)
    }

    fn mac(&self, claims: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
        mac.update(claims.as_bytes());
        Ok(mac)
    }

    /// Produce a token for `subject` valid for `ttl`. Used by tests and
    /// local tooling.
    pub fn sign(&self, subject: &str, ttl: Duration) -> Result<String> {
        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| anyhow!("token ttl too large"))?;
        self.sign_until(subject, Utc::now().timestamp().saturating_add(ttl))
    }

    /// Produce a token for `subject` that expires at `expires_at` (Unix seconds).
    pub fn sign_until(&self, subject: &str, expires_at: i64) -> Result<String> {
        if subject.is_empty() || subject.contains('.') {
            bail!("token subject must be non-empty and must not contain '.'");
        }
        let claims = format!("{}.{}", subject, expires_at);
        let tag = self.mac(&claims)?.finalize().into_bytes();
        Ok(format!("{}.{}", claims, hex::encode(tag)))
    }

    /// Verify `token` against the current time, returning the caller on success.
    pub fn verify(&self, token: &str) -> Option<CallerIdentity> {
        self.verify_at(token, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, now: i64) -> Option<CallerIdentity> {
        let (claims, tag_hex) = token.rsplit_once('.')?;
        let (subject, expires_at) = claims.split_once('.')?;
        if subject.is_empty() {
            return None;
        }
        let expires_at: i64 = expires_at.parse().ok()?;
        let tag = hex::decode(tag_hex).ok()?;
        self.mac(claims).ok()?.verify_slice(&tag).ok()?;
        if now >= expires_at {
            return None;
        }
        Some(CallerIdentity::new(subject))
    }

    /// Verify an `Authorization` header value (`Bearer <token>`).
    pub fn verify_bearer(&self, header: &str) -> Option<CallerIdentity> {
        let token = header.strip_prefix("Bearer ")?.trim();
        self.verify(token)
    }
}
