//! Process-global master secret and the per-file derived AEAD context.
//!
//! Grounded on the source's `SystemContext`/`DerivedContext`: a single master secret is
//! read once at startup and used, via HKDF-SHA256 keyed on a provider file's hash, to
//! derive an AES-256-GCM cipher. Encrypting and then successfully decrypting under the
//! same hash is the system's integrity invariant — change one byte of the provider file
//! and its credentials become unreadable.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zeroize::Zeroizing;

use crate::error::{ConfigError, SecretsError};

/// The process-wide master secret, read once and never rotated in-process.
pub struct MasterSecret {
    bytes: Zeroizing<Vec<u8>>,
}

static MASTER_SECRET: OnceLock<MasterSecret> = OnceLock::new();

impl MasterSecret {
    /// Reads the master secret from `path`, trimming trailing whitespace as the source does.
    /// Missing file or empty content is configuration-fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .map_err(|_| ConfigError::MasterSecretMissing(path.display().to_string()))?;
        let trimmed_len = raw
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);
        if trimmed_len == 0 {
            return Err(ConfigError::MasterSecretEmpty(path.display().to_string()));
        }
        let mut bytes = raw;
        bytes.truncate(trimmed_len);
        Ok(Self {
            bytes: Zeroizing::new(bytes),
        })
    }

    /// Initializes the process-global instance from the `MASTER_SECRET_PATH` environment
    /// variable. Idempotent: later calls are no-ops once the global is set.
    pub fn init_from_env() -> Result<&'static MasterSecret, ConfigError> {
        let path = std::env::var("MASTER_SECRET_PATH")
            .map_err(|_| ConfigError::MasterSecretMissing("MASTER_SECRET_PATH unset".into()))?;
        let secret = Self::load(PathBuf::from(path))?;
        Ok(MASTER_SECRET.get_or_init(|| secret))
    }

    pub fn global() -> &'static MasterSecret {
        MASTER_SECRET
            .get()
            .expect("MasterSecret::init_from_env must run before first use")
    }

    /// Derives the AES-256-GCM cipher bound to `file_hash` via HKDF-SHA256(master, info=hash).
    /// No salt, matching the source's `HKDF(algorithm=SHA256, salt=None, info=hash)`.
    pub fn derive_cipher(&self, file_hash: &[u8; 32]) -> Aes256Gcm {
        let hk = Hkdf::<Sha256>::new(None, &self.bytes);
        let mut okm = [0u8; 32];
        hk.expand(file_hash, &mut okm)
            .expect("32 is a valid HKDF-SHA256 output length");
        Aes256Gcm::new_from_slice(&okm).expect("okm is exactly the AES-256 key length")
    }
}

/// `(nonce, ciphertext)` pair stored as separate DB columns. `ciphertext` carries the
/// 16-byte GCM tag appended by the `aes-gcm` crate.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under the cipher derived from `file_hash` with a fresh random nonce.
pub fn encrypt(master: &MasterSecret, file_hash: &[u8; 32], plaintext: &[u8]) -> Envelope {
    let cipher = master.derive_cipher(file_hash);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("AES-256-GCM encryption of a bounded plaintext cannot fail");
    Envelope {
        nonce: nonce.into(),
        ciphertext,
    }
}

/// Decrypts `envelope` under the cipher derived from `file_hash`. Any tag mismatch —
/// wrong hash, tampered ciphertext, or wrong master secret — surfaces as `SecretsError`.
pub fn decrypt(
    master: &MasterSecret,
    file_hash: &[u8; 32],
    envelope: &Envelope,
) -> Result<Vec<u8>, SecretsError> {
    let cipher = master.derive_cipher(file_hash);
    let nonce = Nonce::from_slice(&envelope.nonce);
    cipher
        .decrypt(nonce, envelope.ciphertext.as_ref())
        .map_err(|_| SecretsError::DecryptFailed)
}

/// A decrypted credential document, keyed by secret name. Decryption is deferred until
/// first access so a provider instance can be cached without ever holding plaintext
/// longer than necessary.
pub struct DerivedContext<'a> {
    master: &'a MasterSecret,
    file_hash: [u8; 32],
    envelope: Envelope,
}

impl<'a> DerivedContext<'a> {
    pub fn new(master: &'a MasterSecret, file_hash: [u8; 32], envelope: Envelope) -> Self {
        Self {
            master,
            file_hash,
            envelope,
        }
    }

    /// Decrypts and parses the envelope as a JSON object, returning the value for `key`.
    pub fn get(&self, key: &str) -> Result<String, SecretsError> {
        let plaintext = decrypt(self.master, &self.file_hash, &self.envelope)?;
        let doc: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(SecretsError::MalformedPayload)?;
        doc.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or(SecretsError::DecryptFailed)
    }

    /// Returns only the top-level key names of the decrypted document, never values —
    /// backs the `secret-keys` endpoint's never-leak-values invariant.
    pub fn key_names(&self) -> Result<Vec<String>, SecretsError> {
        let plaintext = decrypt(self.master, &self.file_hash, &self.envelope)?;
        let doc: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(SecretsError::MalformedPayload)?;
        Ok(doc
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Where provider secrets are sourced from before being folded into the AEAD envelope.
/// Distinct from the envelope itself: this is an operator-facing bootstrap convenience
/// for seeding credentials, selected by the `SECRET_MODE` environment variable.
pub enum SecretMode {
    /// Fixed file path (`QUASAR_SECRET_FILE` or a configured default).
    Local,
    /// Probe an ordered list of well-known paths, first hit wins.
    Auto,
    /// AWS SSM Parameter Store under `/quasar/{provider}`.
    Aws,
}

impl std::str::FromStr for SecretMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "auto" => Ok(Self::Auto),
            "aws" => Ok(Self::Aws),
            other => Err(ConfigError::InvalidSecretMode(other.to_string())),
        }
    }
}

/// Ordered default probe paths for `SecretMode::Auto`, mirroring the source's
/// `_DEFAULT_PATHS`: an explicit env var, then Docker/ECS, then bare-metal dev locations.
pub fn default_secret_probe_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(explicit) = std::env::var("QUASAR_SECRET_FILE") {
        if !explicit.is_empty() {
            paths.push(PathBuf::from(explicit));
        }
    }
    paths.push(PathBuf::from("/run/secrets/quasar.json"));
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".quasar_secrets.json"));
    }
    paths.push(PathBuf::from("./.secrets/.quasar_secrets.json"));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master(bytes: &[u8]) -> MasterSecret {
        MasterSecret {
            bytes: Zeroizing::new(bytes.to_vec()),
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let m = master(b"super-secret-master-key-material");
        let hash = [7u8; 32];
        let env = encrypt(&m, &hash, b"{\"api_key\":\"abc123\"}");
        let plaintext = decrypt(&m, &hash, &env).unwrap();
        assert_eq!(plaintext, b"{\"api_key\":\"abc123\"}");
    }

    #[test]
    fn decrypt_fails_under_different_hash() {
        let m = master(b"super-secret-master-key-material");
        let hash_a = [1u8; 32];
        let hash_b = [2u8; 32];
        let env = encrypt(&m, &hash_a, b"payload");
        assert!(matches!(
            decrypt(&m, &hash_b, &env),
            Err(SecretsError::DecryptFailed)
        ));
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let m = master(b"super-secret-master-key-material");
        let hash = [3u8; 32];
        let mut env = encrypt(&m, &hash, b"payload");
        let last = env.ciphertext.len() - 1;
        env.ciphertext[last] ^= 0xFF;
        assert!(matches!(
            decrypt(&m, &hash, &env),
            Err(SecretsError::DecryptFailed)
        ));
    }

    #[test]
    fn key_names_never_exposes_values() {
        let m = master(b"super-secret-master-key-material");
        let hash = [9u8; 32];
        let env = encrypt(&m, &hash, br#"{"api_key":"abc123","api_secret":"zzz"}"#);
        let ctx = DerivedContext::new(&m, hash, env);
        let mut keys = ctx.key_names().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["api_key".to_string(), "api_secret".to_string()]);
    }

    #[test]
    fn load_trims_trailing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, b"abc123\n\n").unwrap();
        let s = MasterSecret::load(&path).unwrap();
        assert_eq!(&*s.bytes, b"abc123");
    }

    #[test]
    fn load_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, b"   \n").unwrap();
        assert!(matches!(
            MasterSecret::load(&path),
            Err(ConfigError::MasterSecretEmpty(_))
        ));
    }
}
