//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! Google accepts PKCE on installed-app clients alongside the client secret.
//! The verifier stays in the in-flight authorization request and is sent with
//! the code exchange; the challenge travels in the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding: 86 characters,
/// inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
