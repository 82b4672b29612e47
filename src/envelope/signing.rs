//! Envelope signatures: AES-256-GCM encryption of the hex payload digest.
//!
//! Wire format (before base64):
//! [1 byte: version=1][12 bytes: IV][N bytes: ciphertext + tag]

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, IntegrityError};

pub const SIGNATURE_VERSION: u8 = 1;
pub const KEY_LENGTH: usize = 32;
pub const IV_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;

/// Built-in key shared by every installation. It detects accidental or
/// casual modification of a backup file; anyone holding the binary can
/// forge a signature with it.
const EMBEDDED_KEY: [u8; KEY_LENGTH] = *b"timeclock-snapshot-envelope-key!";

/// Symmetric key used to sign and verify envelopes. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    bytes: [u8; KEY_LENGTH],
}

impl SigningKey {
    pub fn embedded() -> Self {
        Self {
            bytes: EMBEDDED_KEY,
        }
    }

    pub fn from_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LENGTH] =
            key.try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_LENGTH,
                    got: key.len(),
                })?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.bytes)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    /// Sign a hex digest. Returns the base64 signature string.
    pub fn sign(&self, digest_hex: &str) -> Result<String, CryptoError> {
        let iv = generate_iv()?;
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&iv), digest_hex.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(1 + IV_LENGTH + ciphertext.len());
        blob.push(SIGNATURE_VERSION);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Check that `signature` decrypts to exactly `digest_hex`.
    pub fn verify(&self, signature: &str, digest_hex: &str) -> Result<(), IntegrityError> {
        let blob = STANDARD
            .decode(signature.trim())
            .map_err(|e| IntegrityError::BadSignature(e.to_string()))?;
        if blob.len() < 1 + IV_LENGTH + TAG_LENGTH {
            return Err(IntegrityError::BadSignature(format!(
                "signature is {} bytes, too short",
                blob.len()
            )));
        }
        if blob[0] != SIGNATURE_VERSION {
            return Err(IntegrityError::BadSignature(format!(
                "unsupported signature version {}",
                blob[0]
            )));
        }

        let iv = &blob[1..1 + IV_LENGTH];
        let cipher = self
            .cipher()
            .map_err(|e| IntegrityError::BadSignature(e.to_string()))?;
        let mut plaintext = cipher
            .decrypt(Nonce::from_slice(iv), &blob[1 + IV_LENGTH..])
            .map_err(|e| IntegrityError::BadSignature(e.to_string()))?;

        let matches = plaintext == digest_hex.as_bytes();
        plaintext.zeroize();
        if matches {
            Ok(())
        } else {
            Err(IntegrityError::SignatureMismatch)
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

fn generate_iv() -> Result<[u8; IV_LENGTH], CryptoError> {
    let mut iv = [0u8; IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}
