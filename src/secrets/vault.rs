use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::store::fs::write_atomic;

/// File name of the vault inside the configured vault directory.
pub const VAULT_FILE_NAME: &str = ".pipewright_vault";

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("key '{0}' not found in vault")]
    NotFound(String),

    /// Authentication of the vault file failed: wrong certificate or tampered data.
    #[error("possible mistyped password")]
    Crypto,

    #[error("malformed vault file: {0}")]
    Malformed(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Key derivation / Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Derive the 32-byte vault key from certificate bytes.
pub fn derive_key(certificate: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(certificate);
    hasher.finalize().into()
}

/// Encrypt plaintext with AES-256-GCM. Returns `nonce (12) || ciphertext || tag`.
fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, VaultError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data produced by [`encrypt`]. Any authentication failure is [`VaultError::Crypto`].
fn decrypt(encrypted: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, VaultError> {
    if encrypted.len() < NONCE_LEN {
        return Err(VaultError::Malformed(format!(
            "need at least {NONCE_LEN} bytes for the nonce, got {}",
            encrypted.len()
        )));
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::Encryption(e.to_string()))?;
    let (nonce, ciphertext) = encrypted.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::Crypto)
}

fn encode_secrets(secrets: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, VaultError> {
    let encoded: BTreeMap<&str, String> = secrets
        .iter()
        .map(|(name, value)| (name.as_str(), BASE64.encode(value)))
        .collect();
    serde_json::to_vec(&encoded).map_err(|e| VaultError::Encryption(e.to_string()))
}

fn decode_secrets(plaintext: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, VaultError> {
    let encoded: BTreeMap<String, String> =
        serde_json::from_slice(plaintext).map_err(|e| VaultError::Malformed(e.to_string()))?;
    encoded
        .into_iter()
        .map(|(name, value)| {
            BASE64
                .decode(value)
                .map(|bytes| (name, bytes))
                .map_err(|e| VaultError::Malformed(e.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

struct VaultState {
    certificate: Vec<u8>,
    secrets: BTreeMap<String, Vec<u8>>,
    dirty: bool,
}

/// Encrypted key-value secret store backed by a single file.
///
/// All operations take the same lock, so a save always encrypts a consistent
/// snapshot and never interleaves with a load.
pub struct Vault {
    path: PathBuf,
    state: Mutex<VaultState>,
}

impl Vault {
    /// Create a vault keyed by `certificate`. Does not read or write the vault file.
    pub fn new(vault_dir: &Path, certificate: impl Into<Vec<u8>>) -> Self {
        Self {
            path: vault_dir.join(VAULT_FILE_NAME),
            state: Mutex::new(VaultState {
                certificate: certificate.into(),
                secrets: BTreeMap::new(),
                dirty: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap the key material. Subsequent saves and loads derive the key from `certificate`.
    pub async fn set_certificate(&self, certificate: impl Into<Vec<u8>>) {
        self.state.lock().await.certificate = certificate.into();
    }

    pub async fn add(&self, name: &str, value: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().await;
        state.secrets.insert(name.to_owned(), value.into());
        state.dirty = true;
    }

    pub async fn get(&self, name: &str) -> Result<Vec<u8>, VaultError> {
        self.state
            .lock()
            .await
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(name.to_owned()))
    }

    pub async fn remove(&self, name: &str) {
        let mut state = self.state.lock().await;
        if state.secrets.remove(name).is_some() {
            state.dirty = true;
        }
    }

    /// Names of all held secrets, sorted.
    pub async fn get_all(&self) -> Vec<String> {
        self.state.lock().await.secrets.keys().cloned().collect()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Encrypt the in-memory secrets and atomically replace the vault file.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()), err)]
    pub async fn save_secrets(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock().await;
        self.persist(&state.certificate, &state.secrets).await?;
        state.dirty = false;

        tracing::debug!(count = state.secrets.len(), "vault saved");
        Ok(())
    }

    /// Insert `name` and save, as one step. Memory only changes once the file is written.
    #[tracing::instrument(skip(self, value), fields(path = %self.path.display()), err)]
    pub async fn add_and_save(
        &self,
        name: &str,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), VaultError> {
        let mut state = self.state.lock().await;
        let mut secrets = state.secrets.clone();
        secrets.insert(name.to_owned(), value.into());

        self.persist(&state.certificate, &secrets).await?;
        state.secrets = secrets;
        state.dirty = false;
        Ok(())
    }

    /// Remove `name` and save, as one step. Memory only changes once the file is written.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()), err)]
    pub async fn remove_and_save(&self, name: &str) -> Result<(), VaultError> {
        let mut state = self.state.lock().await;
        let mut secrets = state.secrets.clone();
        if secrets.remove(name).is_none() {
            return Err(VaultError::NotFound(name.to_owned()));
        }

        self.persist(&state.certificate, &secrets).await?;
        state.secrets = secrets;
        state.dirty = false;
        Ok(())
    }

    async fn persist(
        &self,
        certificate: &[u8],
        secrets: &BTreeMap<String, Vec<u8>>,
    ) -> Result<(), VaultError> {
        let plaintext = encode_secrets(secrets)?;
        let encrypted = encrypt(&plaintext, &derive_key(certificate))?;
        write_atomic(&self.path, &encrypted).await?;
        Ok(())
    }

    /// Read, authenticate and decrypt the vault file, replacing the in-memory secrets.
    ///
    /// A missing file loads as an empty vault. On any error the in-memory
    /// secrets are left as they were.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()), err)]
    pub async fn load_secrets(&self) -> Result<(), VaultError> {
        let mut state = self.state.lock().await;

        let encrypted = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no vault file yet, starting empty");
                state.secrets.clear();
                state.dirty = false;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = decrypt(&encrypted, &derive_key(&state.certificate))?;
        state.secrets = decode_secrets(&plaintext)?;
        state.dirty = false;

        tracing::debug!(count = state.secrets.len(), "vault loaded");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
