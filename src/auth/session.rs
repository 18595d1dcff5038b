//! Signed session cookies and OAuth `state` values.
//!
//! Both are `payload.signature` strings with a hex HMAC-SHA256 signature over
//! the payload. Session payloads are unpadded URL-safe base64 JSON and carry
//! their own expiry; states carry their issue time and a random nonce.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use crate::models::Session;

pub const SESSION_COOKIE: &str = "anistream.session-token";
pub const STATE_COOKIE: &str = "anistream.oauth-state";
pub const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;
pub const STATE_MAX_AGE_SECS: i64 = 10 * 60;

#[derive(Clone)]
pub struct SessionSigner {
    key: Hmac<Sha256>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Result<Self> {
        let key = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("Session secret is not a usable HMAC key"))?;
        Ok(Self { key })
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.key.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn sign(&self, payload: &str) -> String {
        format!("{}.{}", payload, hex::encode(self.mac(payload.as_bytes())))
    }

    /// Returns the payload when the signature matches.
    fn verify<'a>(&self, token: &'a str) -> Option<&'a str> {
        let (payload, sig_hex) = token.rsplit_once('.')?;
        let expected = hex::decode(sig_hex).ok()?;
        let computed = self.mac(payload.as_bytes());
        (expected.len() == computed.len() && constant_time_eq(&computed, &expected))
            .then_some(payload)
    }

    pub fn encode_session(&self, session: &Session) -> Result<String> {
        let json = serde_json::to_vec(session).context("Failed to serialize session")?;
        Ok(self.sign(&URL_SAFE_NO_PAD.encode(json)))
    }

    /// Verify and decode a session cookie. Expired or tampered tokens yield `None`.
    pub fn decode_session(&self, token: &str, now: i64) -> Option<Session> {
        let Some(payload) = self.verify(token) else {
            debug!("Rejecting session with bad signature");
            return None;
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let session: Session = serde_json::from_slice(&bytes).ok()?;
        if session.expires <= now {
            debug!("Rejecting expired session for user {}", session.user.id);
            return None;
        }
        Some(session)
    }

    pub fn issue_state(&self, now: i64) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.sign(&format!("{}-{}", now, hex::encode(nonce)))
    }

    pub fn verify_state(&self, state: &str, now: i64) -> bool {
        let Some(payload) = self.verify(state) else {
            return false;
        };
        let Some(issued) = payload
            .split_once('-')
            .and_then(|(ts, _)| ts.parse::<i64>().ok())
        else {
            return false;
        };
        (now - issued).abs() <= STATE_MAX_AGE_SECS
    }
}

/// `Set-Cookie` value for `name`. A `max_age` of zero clears the cookie.
pub fn cookie_header(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name,
        value,
        max_age,
        if secure { "; Secure" } else { "" }
    )
}
