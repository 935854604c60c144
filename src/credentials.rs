//! Credential store.
//!
//! Bearer tokens for private sources are held behind an ordered list of
//! providers sharing one capability interface: an opportunistic platform
//! keychain first, then a mandatory encrypted file. Callers never learn which
//! backend served a request.
//!
//! The file provider keeps every source's secret in a single AEAD blob
//! (AES-256-GCM): a random 256-bit key persisted once next to the blob, a
//! fresh random 96-bit nonce prefixed to the ciphertext on every write, and
//! the authentication tag validated on every read.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;

use crate::error::{PackError, Result};

const KEY_FILE: &str = "credentials.key";
const BLOB_FILE: &str = "credentials.enc";
const KEYCHAIN_SERVICE: &str = "agentpack";

/// One credential backend.
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn store(&self, source_id: &str, token: &str) -> Result<()>;
    fn get(&self, source_id: &str) -> Result<Option<String>>;
    fn delete(&self, source_id: &str) -> Result<()>;
}

/// Platform keychain. Absent or locked keychains surface as errors, which the
/// composite store treats as a miss.
pub struct KeyringProvider;

impl KeyringProvider {
    fn entry(source_id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYCHAIN_SERVICE, source_id)
            .map_err(|err| PackError::Credential(format!("keychain entry: {err}")))
    }
}

impl CredentialProvider for KeyringProvider {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn store(&self, source_id: &str, token: &str) -> Result<()> {
        Self::entry(source_id)?
            .set_password(token)
            .map_err(|err| PackError::Credential(format!("keychain store: {err}")))
    }

    fn get(&self, source_id: &str) -> Result<Option<String>> {
        match Self::entry(source_id)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(PackError::Credential(format!("keychain read: {err}"))),
        }
    }

    fn delete(&self, source_id: &str) -> Result<()> {
        match Self::entry(source_id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(PackError::Credential(format!("keychain delete: {err}"))),
        }
    }
}

/// Encrypted-file backend. Always available.
pub struct EncryptedFileProvider {
    key_path: PathBuf,
    blob_path: PathBuf,
    rng: SystemRandom,
}

impl EncryptedFileProvider {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            key_path: data_dir.join(KEY_FILE),
            blob_path: data_dir.join(BLOB_FILE),
            rng: SystemRandom::new(),
        }
    }

    /// Load the persisted key, generating it on first use.
    fn load_or_create_key(&self) -> Result<[u8; 32]> {
        if self.key_path.exists() {
            let bytes = fs::read(&self.key_path)?;
            let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                PackError::Credential(format!(
                    "corrupt key file {} (expected 32 bytes)",
                    self.key_path.display()
                ))
            })?;
            return Ok(key);
        }

        let mut key = [0u8; 32];
        self.rng
            .fill(&mut key)
            .map_err(|_| PackError::Credential("key generation failed".to_string()))?;
        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.key_path, key)?;
        restrict_permissions(&self.key_path)?;
        Ok(key)
    }

    fn aead_key(&self) -> Result<LessSafeKey> {
        let key = self.load_or_create_key()?;
        let unbound = UnboundKey::new(&AES_256_GCM, &key)
            .map_err(|_| PackError::Credential("invalid AEAD key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.blob_path.exists() {
            return Ok(BTreeMap::new());
        }
        let blob = fs::read(&self.blob_path)?;
        if blob.len() < NONCE_LEN {
            return Err(PackError::Credential(format!(
                "corrupt credential blob {}",
                self.blob_path.display()
            )));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| PackError::Credential("corrupt credential nonce".to_string()))?;

        let mut buffer = ciphertext.to_vec();
        let plaintext = self
            .aead_key()?
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| {
                PackError::Credential(
                    "credential blob failed authentication (tampered or wrong key)".to_string(),
                )
            })?;

        serde_json::from_slice(plaintext)
            .map_err(|err| PackError::Credential(format!("corrupt credential payload: {err}")))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let mut plaintext = serde_json::to_vec(map)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| PackError::Credential("nonce generation failed".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        self.aead_key()?
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut plaintext)
            .map_err(|_| PackError::Credential("credential encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + plaintext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&plaintext);

        if let Some(parent) = self.blob_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.blob_path, &blob)?;
        restrict_permissions(&self.blob_path)
    }
}

impl CredentialProvider for EncryptedFileProvider {
    fn name(&self) -> &'static str {
        "encrypted-file"
    }

    fn store(&self, source_id: &str, token: &str) -> Result<()> {
        let mut map = self.read_map()?;
        map.insert(source_id.to_string(), token.to_string());
        self.write_map(&map)
    }

    fn get(&self, source_id: &str) -> Result<Option<String>> {
        Ok(self.read_map()?.get(source_id).cloned())
    }

    fn delete(&self, source_id: &str) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(source_id).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Ordered composite over the configured providers. First success wins.
pub struct CredentialStore {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl CredentialStore {
    /// Standard provider chain: keychain, then encrypted file.
    #[must_use]
    pub fn open(data_dir: &Path) -> Self {
        Self {
            providers: vec![
                Box::new(KeyringProvider),
                Box::new(EncryptedFileProvider::new(data_dir)),
            ],
        }
    }

    /// File-backed store only (tests, headless CI).
    #[must_use]
    pub fn file_only(data_dir: &Path) -> Self {
        Self {
            providers: vec![Box::new(EncryptedFileProvider::new(data_dir))],
        }
    }

    /// Store a token, trying each provider in order and falling back on any
    /// failure. Errors only when every provider failed.
    pub fn store(&self, source_id: &str, token: &str) -> Result<()> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.store(source_id, token) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(provider = provider.name(), %err, "credential store failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| PackError::Credential("no credential providers".to_string())))
    }

    /// First hit wins; provider failures count as misses.
    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<String> {
        for provider in &self.providers {
            match provider.get(source_id) {
                Ok(Some(token)) => return Some(token),
                Ok(None) => {}
                Err(err) => {
                    debug!(provider = provider.name(), %err, "credential read failed");
                }
            }
        }
        None
    }

    /// Best-effort delete across all providers.
    pub fn delete(&self, source_id: &str) -> Result<()> {
        let mut last_err = None;
        for provider in &self.providers {
            if let Err(err) = provider.delete(source_id) {
                debug!(provider = provider.name(), %err, "credential delete failed");
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) if self.providers.len() == 1 => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
