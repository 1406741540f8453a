//! Single-use anti-forgery tokens scoped to a session.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

/// Per-session CSRF token sets.
///
/// A token moves `Issued -> Consumed` or `Issued -> Expired` and is never
/// checked twice: `validate` removes the matching entry whether or not the
/// check succeeds.
pub struct CsrfGuard {
    lifetime: Duration,
    tokens: Mutex<HashMap<Vec<u8>, HashMap<String, Instant>>>,
}

impl CsrfGuard {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for the session identified by `session_key`.
    ///
    /// The raw token is only sent to the client; 32 bytes of OS entropy,
    /// URL-safe base64.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub async fn issue(&self, session_key: &[u8]) -> Result<String> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate csrf token")?;
        let token = Base64UrlUnpadded::encode_string(&bytes);

        let mut tokens = self.tokens.lock().await;
        sweep(&mut tokens, self.lifetime);
        tokens
            .entry(session_key.to_vec())
            .or_default()
            .insert(token.clone(), Instant::now());
        Ok(token)
    }

    /// Check and consume `supplied` for the given session.
    ///
    /// Expired entries are purged first, then membership is decided with a
    /// constant-time scan over the remaining tokens.
    pub async fn validate(&self, session_key: &[u8], supplied: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        sweep(&mut tokens, self.lifetime);
        let Some(set) = tokens.get_mut(session_key) else {
            return false;
        };

        let mut matched: Option<String> = None;
        for token in set.keys() {
            if bool::from(token.as_bytes().ct_eq(supplied.as_bytes())) {
                matched = Some(token.clone());
            }
        }

        let valid = match matched {
            Some(token) => set.remove(&token).is_some(),
            None => false,
        };

        if set.is_empty() {
            tokens.remove(session_key);
        }
        valid
    }

    /// Move the session's token set to a new key when the session identifier
    /// rotates. Outstanding tokens belong to the logical session, not to the
    /// transient identifier, so they stay valid across rotation.
    pub async fn rekey(&self, old_key: &[u8], new_key: &[u8]) {
        let mut tokens = self.tokens.lock().await;
        if let Some(set) = tokens.remove(old_key) {
            tokens.insert(new_key.to_vec(), set);
        }
    }

    /// Drop every token issued to the session; used when a session ends or a
    /// login replaces the pre-login session.
    pub async fn clear(&self, session_key: &[u8]) {
        self.tokens.lock().await.remove(session_key);
    }
}

// Purge expired entries everywhere, not just under the caller's key, so sets
// belonging to sessions that ended without a matching clear cannot pile up.
fn sweep(tokens: &mut HashMap<Vec<u8>, HashMap<String, Instant>>, lifetime: Duration) {
    tokens.retain(|_, set| {
        set.retain(|_, issued| issued.elapsed() <= lifetime);
        !set.is_empty()
    });
}
