//! At-rest encryption for payment provider secrets.
//!
//! Stored values use the format
//!
//! ```text
//! {iv_hex}:{auth_tag_hex}:{ciphertext_hex}
//! ```
//!
//! produced by AES-256-GCM with a random 96-bit IV per secret. The key is
//! derived locally from the configured master key with
//! PBKDF2-HMAC-SHA256, so the database never holds the key.
//!
//! Values without a `:` predate encryption. They are returned as
//! [`RevealedSecret::Legacy`] so the caller can warn about them; they are
//! never re-encrypted implicitly.

use std::num::NonZeroU32;

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

/// Length of the derived AES-256 key.
pub const KEY_LEN: usize = 32;

/// Length of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

const PBKDF2_ITERATIONS: u32 = 100_000;

/// Errors produced by credential encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("encrypted credential is not in iv:tag:ciphertext format")]
    Malformed,
    #[error("invalid hex in encrypted credential")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("invalid initialization vector length")]
    InvalidIv,
    #[error("invalid authentication tag length")]
    InvalidTag,
    #[error("credential failed authentication")]
    Decryption,
    #[error("credential encryption failed")]
    Encryption,
    #[error("decrypted credential is not valid UTF-8")]
    Utf8,
    #[error("empty master key")]
    EmptyKey,
}

/// A decrypted secret, tagged with where it came from.
#[derive(Clone, PartialEq, Eq)]
pub enum RevealedSecret {
    /// The value was stored encrypted and its tag verified.
    Decrypted(String),
    /// The value was stored as plaintext.
    Legacy(String),
}

impl RevealedSecret {
    pub fn expose(&self) -> &str {
        match self {
            RevealedSecret::Decrypted(s) | RevealedSecret::Legacy(s) => s,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, RevealedSecret::Legacy(_))
    }
}

impl std::fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevealedSecret::Decrypted(_) => f.write_str("Decrypted(<redacted>)"),
            RevealedSecret::Legacy(_) => f.write_str("Legacy(<redacted>)"),
        }
    }
}

/// AES-256-GCM cipher for provider secrets.
#[derive(Debug)]
pub struct CredentialCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Derive the cipher key from a master key and salt.
    pub fn derive(master_key: &[u8], salt: &[u8]) -> Result<Self, CredentialError> {
        if master_key.is_empty() {
            return Err(CredentialError::EmptyKey);
        }
        let iterations = NonZeroU32::MIN.saturating_add(PBKDF2_ITERATIONS - 1);
        let mut key = [0u8; KEY_LEN];
        ring::pbkdf2::derive(
            ring::pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            master_key,
            &mut key,
        );
        Self::from_key(key)
    }

    /// Build a cipher from raw key bytes.
    pub fn from_key(key: [u8; KEY_LEN]) -> Result<Self, CredentialError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &key).map_err(|_| CredentialError::Encryption)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` into the `iv:tag:ciphertext` format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut iv = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| CredentialError::Encryption)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| CredentialError::Encryption)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag.as_ref()),
            hex::encode(&in_out)
        ))
    }

    /// Decrypt a stored value.
    ///
    /// Fails closed: a value that looks encrypted but does not
    /// authenticate is an error, never plaintext.
    pub fn decrypt(&self, stored: &str) -> Result<RevealedSecret, CredentialError> {
        if !stored.contains(':') {
            return Ok(RevealedSecret::Legacy(stored.to_owned()));
        }

        let mut parts = stored.split(':');
        let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CredentialError::Malformed);
        };

        let iv: [u8; NONCE_LEN] = hex::decode(iv_hex)?
            .try_into()
            .map_err(|_| CredentialError::InvalidIv)?;
        let tag = hex::decode(tag_hex)?;
        if tag.len() != TAG_LEN {
            return Err(CredentialError::InvalidTag);
        }

        let mut in_out = hex::decode(ct_hex)?;
        in_out.extend_from_slice(&tag);

        let plaintext = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| CredentialError::Decryption)?;

        String::from_utf8(plaintext.to_vec())
            .map(RevealedSecret::Decrypted)
            .map_err(|_| CredentialError::Utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::derive(b"master-key", b"stall-test-salt").unwrap()
    }

    #[test]
    fn test_encrypted_secret_decrypts() {
        let cipher = cipher();
        let stored = cipher.encrypt("sk_live_123").unwrap();
        assert_eq!(stored.split(':').count(), 3);

        let revealed = cipher.decrypt(&stored).unwrap();
        assert!(!revealed.is_legacy());
        assert_eq!(revealed.expose(), "sk_live_123");
    }

    #[test]
    fn test_iv_is_random_per_secret() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let cipher = cipher();
        let stored = cipher.encrypt("sk_live_123").unwrap();
        let mut parts: Vec<String> = stored.split(':').map(str::to_owned).collect();
        let mut ct = hex::decode(&parts[2]).unwrap();
        ct[0] ^= 0x01;
        parts[2] = hex::encode(ct);

        assert!(matches!(
            cipher.decrypt(&parts.join(":")),
            Err(CredentialError::Decryption)
        ));
    }

    #[test]
    fn test_other_key_fails_closed() {
        let stored = cipher().encrypt("sk_live_123").unwrap();
        let other = CredentialCipher::derive(b"another-key", b"stall-test-salt").unwrap();
        assert!(matches!(other.decrypt(&stored), Err(CredentialError::Decryption)));
    }

    #[test]
    fn test_legacy_plaintext_passes_through() {
        let revealed = cipher().decrypt("sk_test_plain").unwrap();
        assert!(revealed.is_legacy());
        assert_eq!(revealed.expose(), "sk_test_plain");
    }

    #[test]
    fn test_malformed_values() {
        let cipher = cipher();
        assert!(matches!(cipher.decrypt("a:b"), Err(CredentialError::Malformed)));
        assert!(matches!(
            cipher.decrypt("zz:00:00"),
            Err(CredentialError::InvalidHex(_))
        ));
        assert!(matches!(
            cipher.decrypt("0011:00000000000000000000000000000000:00"),
            Err(CredentialError::InvalidIv)
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let revealed = RevealedSecret::Decrypted("sk_live_123".into());
        assert!(!format!("{revealed:?}").contains("sk_live"));
    }
}
