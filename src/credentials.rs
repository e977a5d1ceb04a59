//! API key storage, encrypted at rest with a locally generated AES-256-GCM key.
//!
//! The key file holds the base64 encoded key. The API key file holds
//! base64(nonce || ciphertext).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encryption key in {0} is invalid")]
    InvalidKey(PathBuf),

    #[error("encryption failed")]
    Encrypt,

    #[error("stored API key could not be decrypted")]
    Decrypt,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CredentialError + '_ {
    move |source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct CredentialStore {
    cipher: Aes256Gcm,
    api_key_path: PathBuf,
}

impl CredentialStore {
    /// Opens the store, generating and writing a fresh key if `key_path` does not exist.
    pub fn open(key_path: &Path, api_key_path: &Path) -> Result<Self, CredentialError> {
        let key = load_or_generate_key(key_path)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CredentialError::InvalidKey(key_path.to_path_buf()))?;
        Ok(Self {
            cipher,
            api_key_path: api_key_path.to_path_buf(),
        })
    }

    /// The stored API key, or an empty string when none is stored or it cannot be decrypted.
    pub fn load_api_key(&self) -> String {
        match self.try_load_api_key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(path = %self.api_key_path.display(), "{err}");
                String::new()
            }
        }
    }

    fn try_load_api_key(&self) -> Result<String, CredentialError> {
        let stored = match fs::read_to_string(&self.api_key_path) {
            Ok(stored) => stored,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
            Err(err) => return Err(io_err(&self.api_key_path)(err)),
        };
        self.decrypt(stored.trim())
    }

    pub fn save_api_key(&self, api_key: &str) -> Result<(), CredentialError> {
        let sealed = self.encrypt(api_key)?;
        fs::write(&self.api_key_path, sealed).map_err(io_err(&self.api_key_path))?;
        tracing::info!(path = %self.api_key_path.display(), "API key saved");
        Ok(())
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce[..]);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CredentialError::Encrypt)?;
        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, encoded: &str) -> Result<String, CredentialError> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|_| CredentialError::Decrypt)?;
        if sealed.len() < NONCE_LEN {
            return Err(CredentialError::Decrypt);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CredentialError::Decrypt)
    }
}

fn load_or_generate_key(path: &Path) -> Result<Vec<u8>, CredentialError> {
    match fs::read_to_string(path) {
        Ok(encoded) => {
            let key = STANDARD
                .decode(encoded.trim())
                .map_err(|_| CredentialError::InvalidKey(path.to_path_buf()))?;
            if key.len() != KEY_LEN {
                return Err(CredentialError::InvalidKey(path.to_path_buf()));
            }
            Ok(key)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut key = vec![0u8; KEY_LEN];
            rand::rng().fill(&mut key[..]);
            fs::write(path, STANDARD.encode(&key)).map_err(io_err(path))?;
            tracing::info!(path = %path.display(), "generated new encryption key");
            Ok(key)
        }
        Err(err) => Err(io_err(path)(err)),
    }
}
