// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
//!
//! A password is NFC-normalized, keyed with the server pepper through
//! HMAC-SHA256, then stretched with scrypt under a fresh random salt. The
//! result is encoded as
//!
//! ```text
//! scrypt$v=1$norm=NFC$N=16384,r=8,p=16$<salt hex>$<derived key hex>
//! ```
//!
//! Verification reads the cost parameters and salt back out of the stored
//! string, so changing [`ScryptCost::DEFAULT`] never invalidates old hashes.
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use scrypt::{scrypt, Params};
use sha2::Sha256;
use std::sync::{Arc, OnceLock};
use subtle::ConstantTimeEq;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use crate::error::AppError;

const ALGORITHM: &str = "scrypt";
const VERSION: &str = "v=1";
const NORMALIZATION: &str = "NFC";
const SALT_LEN: usize = 16;
const DK_LEN: usize = 32;

// Upper bounds accepted from a stored hash. scrypt needs 128 * r * N bytes
// per derivation and repeats it p times; the default cost uses 16 MiB.
const MAX_LOG_N: u8 = 20;
const MAX_R: u32 = 32;
const MAX_P: u32 = 16;
const MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;
const MAX_DK_LEN: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// scrypt work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptCost {
    /// log2 of the memory/CPU cost `N`
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl ScryptCost {
    pub const DEFAULT: ScryptCost = ScryptCost {
        log_n: 14,
        r: 8,
        p: 16,
    };
}

impl Default for ScryptCost {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Salted, peppered scrypt hasher
#[derive(Clone)]
pub struct PasswordHasher {
    inner: Arc<Inner>,
}

struct Inner {
    pepper: Zeroizing<Vec<u8>>,
    cost: ScryptCost,
    /// Hash of a random password, verified against when no account exists
    dummy: OnceLock<String>,
}

/// Parsed form of an encoded hash
struct Encoded {
    cost: ScryptCost,
    salt: Vec<u8>,
    dk: Vec<u8>,
}

impl PasswordHasher {
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self::with_cost(pepper, ScryptCost::DEFAULT)
    }

    pub fn with_cost(pepper: impl AsRef<[u8]>, cost: ScryptCost) -> Self {
        Self {
            inner: Arc::new(Inner {
                pepper: Zeroizing::new(pepper.as_ref().to_vec()),
                cost,
                dummy: OnceLock::new(),
            }),
        }
    }

    pub fn cost(&self) -> ScryptCost {
        self.inner.cost
    }

    /// Hash a password under a fresh salt
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let cost = self.inner.cost;
        let dk = self.derive(password, &salt, cost, DK_LEN)?;
        Ok(format!(
            "{ALGORITHM}${VERSION}$norm={NORMALIZATION}$N={},r={},p={}${}${}",
            1u64 << cost.log_n,
            cost.r,
            cost.p,
            hex::encode(salt),
            hex::encode(dk.as_slice()),
        ))
    }

    /// Check a password against an encoded hash.
    ///
    /// Malformed or tampered hashes verify as `false`, never as an error.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some(parsed) = parse(encoded) else {
            return false;
        };
        match self.derive(password, &parsed.salt, parsed.cost, parsed.dk.len()) {
            Ok(dk) => dk.as_slice().ct_eq(&parsed.dk).into(),
            Err(_) => false,
        }
    }

    /// Spend the same work as a real verification and fail.
    ///
    /// Used when the account does not exist so both outcomes take as long.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let dummy = self.inner.dummy.get_or_init(|| {
            let mut random = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut random);
            self.hash(&hex::encode(random)).unwrap_or_default()
        });
        let _ = self.verify(password, dummy);
        false
    }

    /// [`hash`](Self::hash) on the blocking pool
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = self.clone();
        let password = Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// [`verify`](Self::verify) on the blocking pool
    pub async fn verify_blocking(&self, password: String, encoded: String) -> bool {
        let hasher = self.clone();
        let password = Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .unwrap_or(false)
    }

    /// [`verify_dummy`](Self::verify_dummy) on the blocking pool
    pub async fn verify_dummy_blocking(&self, password: String) -> bool {
        let hasher = self.clone();
        let password = Zeroizing::new(password);
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
            .await
            .unwrap_or(false)
    }

    fn derive(
        &self,
        password: &str,
        salt: &[u8],
        cost: ScryptCost,
        dk_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, AppError> {
        let normalized: Zeroizing<String> = Zeroizing::new(password.nfc().collect());

        let mut mac = HmacSha256::new_from_slice(&self.inner.pepper)
            .map_err(|e| AppError::Internal(format!("pepper rejected: {e}")))?;
        mac.update(normalized.as_bytes());
        let keyed = Zeroizing::new(mac.finalize().into_bytes().to_vec());

        let params = Params::new(cost.log_n, cost.r, cost.p, dk_len)
            .map_err(|e| AppError::Internal(format!("invalid scrypt params: {e}")))?;
        let mut dk = Zeroizing::new(vec![0u8; dk_len]);
        scrypt(&keyed, salt, &params, &mut dk)
            .map_err(|e| AppError::Internal(format!("scrypt failed: {e}")))?;
        Ok(dk)
    }
}

fn parse(encoded: &str) -> Option<Encoded> {
    let mut parts = encoded.split('$');
    let (id, version, norm, options, salt, dk) = (
        parts.next()?,
        parts.next()?,
        parts.next()?,
        parts.next()?,
        parts.next()?,
        parts.next()?,
    );
    if parts.next().is_some() || id != ALGORITHM || version != VERSION {
        return None;
    }
    if norm.strip_prefix("norm=")? != NORMALIZATION {
        return None;
    }

    let (mut n, mut r, mut p) = (None, None, None);
    for kv in options.split(',') {
        let (key, value) = kv.split_once('=')?;
        match key {
            "N" => n = Some(value.parse::<u64>().ok()?),
            "r" => r = Some(value.parse::<u32>().ok()?),
            "p" => p = Some(value.parse::<u32>().ok()?),
            _ => return None,
        }
    }
    let (n, r, p) = (n?, r?, p?);
    if n < 2 || !n.is_power_of_two() {
        return None;
    }
    let log_n = u8::try_from(n.trailing_zeros()).ok()?;
    if log_n > MAX_LOG_N || r == 0 || r > MAX_R || p == 0 || p > MAX_P {
        return None;
    }
    if 128 * u64::from(r) * n > MAX_MEMORY_BYTES {
        return None;
    }

    let salt = hex::decode(salt).ok()?;
    let dk = hex::decode(dk).ok()?;
    if salt.is_empty() || dk.is_empty() || dk.len() > MAX_DK_LEN {
        return None;
    }

    Some(Encoded {
        cost: ScryptCost { log_n, r, p },
        salt,
        dk,
    })
}
