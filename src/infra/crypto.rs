use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::InfraError;
use crate::app_error::{AppError, AppResult};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for billing credentials at rest. Gateway tokens are
/// never stored in the clear and never appear in logs.
#[derive(Clone)]
pub struct SecretCipher {
    key: aes_gcm::Key<Aes256Gcm>,
    hmac_key: Vec<u8>,
}

impl SecretCipher {
    pub fn from_env() -> Result<Self, InfraError> {
        let key_b64 =
            std::env::var("BILLING_SECRET_KEY").map_err(|_| InfraError::ConfigMissing {
                var: "BILLING_SECRET_KEY",
            })?;
        Self::new_from_base64(&key_b64).map_err(InfraError::CipherInit)
    }

    pub fn new_from_base64(key_b64: &str) -> AppResult<Self> {
        let raw = general_purpose::STANDARD
            .decode(key_b64.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid BILLING_SECRET_KEY: {e}")))?;
        if raw.len() != 32 {
            return Err(AppError::Internal(
                "BILLING_SECRET_KEY must decode to 32 bytes".into(),
            ));
        }
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&raw);
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            key: *key,
            hmac_key: raw,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let key_b64 = general_purpose::STANDARD.encode([42u8; 32]);
        Self::new_from_base64(&key_b64).expect("static test key")
    }

    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce_bytes = rand::random::<[u8; NONCE_LEN]>();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut buffer = Vec::with_capacity(NONCE_LEN + plaintext.len() + 16);
        buffer.extend_from_slice(nonce);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Internal(format!("encrypt failed: {e}")))?;
        buffer.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(buffer))
    }

    pub fn decrypt(&self, data_b64: &str) -> AppResult<String> {
        let data = general_purpose::STANDARD
            .decode(data_b64.as_bytes())
            .map_err(|e| AppError::Internal(format!("decrypt decode failed: {e}")))?;
        if data.len() <= NONCE_LEN {
            return Err(AppError::Internal("ciphertext too short".into()));
        }
        let (nonce_bytes, cipher_bytes) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(&self.key);
        let plaintext = cipher
            .decrypt(nonce, cipher_bytes)
            .map_err(|e| AppError::Internal(format!("decrypt failed: {e}")))?;
        String::from_utf8(plaintext).map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Stable keyed fingerprint for log correlation without exposing the
    /// underlying token.
    pub fn fingerprint(&self, value: &str) -> String {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.hmac_key).expect("hmac key");
        mac.update(value.as_bytes());
        let result = mac.finalize().into_bytes();
        hex::encode(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = SecretCipher::for_tests();
        let ct = cipher.encrypt("tok_secret_12345").unwrap();
        assert!(!ct.contains("tok_secret"));
        assert_eq!(cipher.decrypt(&ct).unwrap(), "tok_secret_12345");
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let cipher = SecretCipher::for_tests();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let cipher = SecretCipher::for_tests();
        assert_eq!(cipher.fingerprint("tok_1"), cipher.fingerprint("tok_1"));
        assert_ne!(cipher.fingerprint("tok_1"), cipher.fingerprint("tok_2"));
    }

    #[test]
    fn rejects_short_keys() {
        let short = general_purpose::STANDARD.encode([1u8; 16]);
        assert!(SecretCipher::new_from_base64(&short).is_err());
    }
}
