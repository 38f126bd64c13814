//! Salt, digest and credential primitives for the handshake.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use sha2::digest::DynDigest;
use std::fmt;
use subtle::ConstantTimeEq;

/// Raw salt length in bytes (hex-encoded on the wire).
pub const SALT_LEN: usize = 8;

/// Length of the salt message on the wire.
pub const SALT_HEX_LEN: usize = SALT_LEN * 2;

/// Acknowledgement sent after a successful handshake.
pub const ACK: &[u8; 2] = b"OK";

/// Hash function used to compute the challenge digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Create a fresh hasher instance.
    pub fn hasher(self) -> Box<dyn DynDigest + Send> {
        match self {
            HashAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            HashAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
        }
    }
}

/// The shared username/password pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Constant-time check of a claimed username.
    pub fn matches_username(&self, claimed: &str) -> bool {
        constant_time_eq(self.username.as_bytes(), claimed.as_bytes())
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::new("user", "P@ssW0rd")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh salt from the OS CSPRNG, hex-encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hex::encode_upper(salt)
}

/// Uppercase hex of `H(salt_hex || password)`.
///
/// The hasher is reset afterwards so the same instance can be reused.
pub fn challenge_digest(hasher: &mut dyn DynDigest, salt_hex: &str, password: &str) -> String {
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode_upper(hasher.finalize_reset())
}

/// Byte equality whose timing does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
