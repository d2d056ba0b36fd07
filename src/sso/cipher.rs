//! At-rest sealing for SSO bearer tokens kept on [`ExternalIdentity`].
//!
//! Layout: 12-byte nonce followed by the AES-256-GCM ciphertext and tag.
//!
//! [`ExternalIdentity`]: crate::model::ExternalIdentity

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};

use super::SsoError;

const NONCE_LEN: usize = 12;

pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Key drawn from the OS RNG. Tokens sealed with it do not survive a restart.
    pub fn random() -> Self {
        Self {
            cipher: Aes256Gcm::new(&Aes256Gcm::generate_key(&mut OsRng)),
        }
    }

    pub fn from_config(key: Option<[u8; 32]>) -> Self {
        match key {
            Some(key) => Self::new(&key),
            None => {
                tracing::warn!("INJAST_TOKEN_KEY not set, stored SSO tokens use a per-process key");
                Self::random()
            }
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, SsoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SsoError::Cipher(format!("encrypt: {e}")))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<String, SsoError> {
        if sealed.len() < NONCE_LEN {
            return Err(SsoError::Cipher("sealed token too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SsoError::Cipher(format!("decrypt: {e}")))?;
        String::from_utf8(plaintext).map_err(|e| SsoError::Cipher(format!("utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_token_opens_with_same_key() {
        let cipher = TokenCipher::new(&[7u8; 32]);
        let sealed = cipher.seal("eyJhbGciOi.payload.sig").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"eyJhbGciOi.payload.sig");
        assert_eq!(cipher.open(&sealed).unwrap(), "eyJhbGciOi.payload.sig");
    }

    #[test]
    fn nonce_differs_per_seal() {
        let cipher = TokenCipher::random();
        let a = cipher.seal("token").unwrap();
        let b = cipher.seal("token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let sealed = TokenCipher::new(&[1u8; 32]).seal("token").unwrap();
        assert!(TokenCipher::new(&[2u8; 32]).open(&sealed).is_err());

        let cipher = TokenCipher::new(&[1u8; 32]);
        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(cipher.open(&tampered).is_err());
        assert!(cipher.open(&sealed[..4]).is_err());
    }
}
