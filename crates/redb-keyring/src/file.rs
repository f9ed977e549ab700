use crate::backend::Backend;
use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

type SecretMap = HashMap<(String, String), Vec<u8>>;

/// Encrypted local file backend. The whole namespace→key→secret map is
/// re-serialized, re-encrypted and atomically published (temp file + rename)
/// on every `set`/`delete`, so a crash mid-write never produces a truncated
/// store.
pub struct FileBackend {
    path: PathBuf,
    master_key: String,
    secrets: Mutex<SecretMap>,
}

impl FileBackend {
    pub fn open(path: &Path, master_key: &str) -> Result<Self> {
        let secrets = if path.exists() {
            Self::load(path, master_key)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            master_key: master_key.to_string(),
            secrets: Mutex::new(secrets),
        })
    }

    fn derive_key(master_key: &str, salt: &[u8]) -> Result<[u8; 32]> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(master_key.as_bytes(), salt, &mut key)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(key)
    }

    fn load(path: &Path, master_key: &str) -> Result<SecretMap> {
        let raw = std::fs::read(path)?;
        if raw.len() < SALT_LEN + NONCE_LEN {
            return Err(Error::Crypto("keyring file is truncated".to_string()));
        }
        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let key = Self::derive_key(master_key, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Crypto(e.to_string()))?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Crypto("failed to decrypt keyring file (wrong master key?)".to_string()))?;

        let flat: Vec<(String, String, Vec<u8>)> = serde_json::from_slice(&plaintext)?;
        Ok(flat
            .into_iter()
            .map(|(ns, key, secret)| ((ns, key), secret))
            .collect())
    }

    fn persist(&self, secrets: &SecretMap) -> Result<()> {
        let flat: Vec<(&str, &str, &[u8])> = secrets
            .iter()
            .map(|((ns, key), secret)| (ns.as_str(), key.as_str(), secret.as_slice()))
            .collect();
        let plaintext = serde_json::to_vec(&flat)?;

        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        let key = Self::derive_key(&self.master_key, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Crypto(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            tmp.write_all(&out)?;
            tmp.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl Backend for FileBackend {
    fn get(&self, namespace: &str, key: &str) -> Result<Vec<u8>> {
        let secrets = self.secrets.lock().expect("keyring lock poisoned");
        secrets
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(namespace.to_string(), key.to_string()))
    }

    fn set(&self, namespace: &str, key: &str, secret: &[u8]) -> Result<()> {
        let mut secrets = self.secrets.lock().expect("keyring lock poisoned");
        secrets.insert((namespace.to_string(), key.to_string()), secret.to_vec());
        self.persist(&secrets)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().expect("keyring lock poisoned");
        secrets.remove(&(namespace.to_string(), key.to_string()));
        self.persist(&secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.redbkey");
        let backend = FileBackend::open(&path, "correct horse battery staple").unwrap();
        backend.set("redb-default-db", "password", b"s3cret").unwrap();
        assert_eq!(backend.get("redb-default-db", "password").unwrap(), b"s3cret");
    }

    #[test]
    fn survives_reopen_with_the_same_master_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.redbkey");
        {
            let backend = FileBackend::open(&path, "master").unwrap();
            backend.set("ns", "k", b"v").unwrap();
        }
        let reopened = FileBackend::open(&path, "master").unwrap();
        assert_eq!(reopened.get("ns", "k").unwrap(), b"v");
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.redbkey");
        let backend = FileBackend::open(&path, "master").unwrap();
        backend.set("ns", "k", b"v").unwrap();
        backend.delete("ns", "k").unwrap();
        assert!(matches!(backend.get("ns", "k"), Err(Error::NotFound(_, _))));
    }

    #[test]
    fn wrong_master_key_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.redbkey");
        {
            let backend = FileBackend::open(&path, "right-key").unwrap();
            backend.set("ns", "k", b"v").unwrap();
        }
        let err = FileBackend::open(&path, "wrong-key").unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }
}
