//! Access scopes partition stored events between viewer groups.
//!
//! A scope is an HMAC-SHA256 of the viewer PIN keyed by the server salt,
//! encoded as unpadded URL-safe base64. The same token tags events at
//! ingestion and filters them at view time.

use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of an encoded scope: 32 digest bytes in unpadded base64.
const SCOPE_TOKEN_LEN: usize = 43;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessScope(String);

impl AccessScope {
    /// Accept a token minted elsewhere (e.g. a `pin_hash` link parameter).
    ///
    /// Returns `None` unless the token decodes to a full digest.
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() != SCOPE_TOKEN_LEN {
            return None;
        }
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(token).ok()?;
        (bytes.len() == 32).then(|| Self(token.to_string()))
    }

    /// Wrap a value read back from the events table without re-validating it.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives scopes from PINs with a fixed server salt.
#[derive(Clone)]
pub struct ScopeKey {
    salt: Vec<u8>,
}

impl ScopeKey {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.as_bytes().to_vec(),
        }
    }

    pub fn derive(&self, pin: &str) -> Result<AccessScope> {
        let mut mac = HmacSha256::new_from_slice(&self.salt)
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
        mac.update(pin.as_bytes());
        let digest = mac.finalize().into_bytes();

        Ok(AccessScope(BASE64_URL_SAFE_NO_PAD.encode(digest)))
    }
}

impl fmt::Debug for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeKey").finish_non_exhaustive()
    }
}
