use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 384 bits of CSPRNG output per secret.
const SECRET_BYTES: usize = 48;

/// Mint a fresh refresh secret. Returned to the caller exactly once; only the
/// digest is ever stored or compared afterwards.
pub fn generate() -> String {
    let mut buf = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// One-way digest used as the lookup key for refresh records.
pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
