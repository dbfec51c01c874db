// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
//! Bearer secret generation and hashing.
//!
//! Session ids and reset tokens are handed to clients in plaintext and
//! stored server-side only as their SHA-256 digest.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Token size in bytes (32 bytes = 256 bits of entropy)
const TOKEN_BYTES: usize = 32;

/** Generate a cryptographically secure random token
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_secure_token() -> String {
    let mut buffer = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// One-way digest under which a bearer secret is stored
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}
