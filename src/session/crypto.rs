//! Session crypto: at-rest encryption of serialized jars and signed
//! session tokens.
//!
//! Jars use AES-256-GCM with the key derived from the configured secret by
//! SHA-256. Sealed payloads are `nonce (12 bytes) || ciphertext+tag`.
//!
//! Tokens are `random (32 bytes) || HMAC-SHA256(random)[..16]`, base64url
//! without padding, so only tokens this server minted verify.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::digest::generic_array::GenericArray;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::session::SessionError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const TOKEN_RANDOM_LEN: usize = 32;
const TOKEN_TAG_LEN: usize = 16;
/// Encoded length of a signed token.
pub const TOKEN_LEN: usize = 64;

#[derive(Clone)]
pub struct JarCipher {
    cipher: Aes256Gcm,
}

impl JarCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self { cipher: Aes256Gcm::new(key) }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SessionError::Crypto)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SessionError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(SessionError::Crypto);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SessionError::Crypto)
    }
}

impl std::fmt::Debug for JarCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JarCipher(..)")
    }
}

/// Mints and verifies session tokens.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        // HMAC zero-pads short keys to the block size; padding here keeps
        // construction infallible.
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(&Sha256::digest(secret));
        Self {
            mac: <HmacSha256 as Mac>::new(GenericArray::from_slice(&key)),
        }
    }

    /// Signer over a fresh random secret, valid for this process only.
    pub fn ephemeral() -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::new(&secret)
    }

    pub fn mint(&self) -> String {
        let mut raw = [0u8; TOKEN_RANDOM_LEN + TOKEN_TAG_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw[..TOKEN_RANDOM_LEN]);

        let mut mac = self.mac.clone();
        mac.update(&raw[..TOKEN_RANDOM_LEN]);
        let tag = mac.finalize().into_bytes();
        raw[TOKEN_RANDOM_LEN..].copy_from_slice(&tag[..TOKEN_TAG_LEN]);

        URL_SAFE_NO_PAD.encode(raw)
    }

    /// True only for tokens minted under the same secret. Tag comparison is
    /// constant time.
    pub fn verify(&self, token: &str) -> bool {
        if token.len() != TOKEN_LEN {
            return false;
        }
        let Ok(raw) = URL_SAFE_NO_PAD.decode(token) else {
            return false;
        };
        if raw.len() != TOKEN_RANDOM_LEN + TOKEN_TAG_LEN {
            return false;
        }
        let (random, tag) = raw.split_at(TOKEN_RANDOM_LEN);
        let mut mac = self.mac.clone();
        mac.update(random);
        mac.verify_truncated_left(tag).is_ok()
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner(..)")
    }
}
