//! Encrypted file-based credential storage
//!
//! Each credential is stored in its own file under ~/.config/tusk/credentials/,
//! encrypted with AES-256-GCM. The encryption key is derived from
//! machine-specific identifiers. File names are the URL-safe base64 of the
//! store key so keys can be listed without decrypting anything.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::CredentialStore;
use crate::error::{Error, Result};
use crate::paths;

const NONCE_SIZE: usize = 12;
const EXTENSION: &str = "enc";

/// Get machine ID for key derivation (cross-platform)
fn get_machine_id() -> String {
    // Linux: /etc/machine-id or /var/lib/dbus/machine-id
    #[cfg(target_os = "linux")]
    {
        if let Ok(id) = fs::read_to_string("/etc/machine-id") {
            return id.trim().to_string();
        }
        if let Ok(id) = fs::read_to_string("/var/lib/dbus/machine-id") {
            return id.trim().to_string();
        }
    }

    // macOS: IOPlatformUUID via ioreg
    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                if line.contains("IOPlatformUUID") {
                    if let Some(uuid) = line.split('"').nth(3) {
                        return uuid.to_string();
                    }
                }
            }
        }
    }

    // Windows: MachineGuid from registry
    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            for line in stdout.lines() {
                if line.contains("MachineGuid") {
                    if let Some(guid) = line.split_whitespace().last() {
                        return guid.to_string();
                    }
                }
            }
        }
    }

    dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "tusk-fallback-key".to_string())
}

/// Derive encryption key from machine-specific data
fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(get_machine_id().as_bytes());

    if let Some(home) = dirs::home_dir() {
        hasher.update(home.to_string_lossy().as_bytes());
    }

    if let Some(data) = dirs::data_dir() {
        hasher.update(data.to_string_lossy().as_bytes());
    }

    hasher.update(b"tusk-credential-store-v1");

    hasher.finalize().into()
}

/// Credential store backed by one AES-256-GCM encrypted file per key
pub struct EncryptedFileStore {
    dir: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileStore {
    /// Open the store at the default location with the machine-derived key
    pub fn open() -> anyhow::Result<Self> {
        let dir = paths::credentials_dir()?;
        Ok(Self::open_dir(dir)?)
    }

    /// Open (and create) a store in `dir` with the machine-derived key
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_key(dir, derive_key())
    }

    /// Open (and create) a store in `dir` with an explicit key
    pub fn with_key(dir: impl Into<PathBuf>, key: [u8; 32]) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, key })
    }

    /// Directory holding the encrypted files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", URL_SAFE_NO_PAD.encode(key)))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| Error::store("Invalid key length"))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;

        let mut rng = rand::rng();
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::store("Failed to encrypt credential"))?;

        let mut output = nonce_bytes.to_vec();
        output.extend(ciphertext);
        Ok(output)
    }

    fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        if encrypted.len() < NONCE_SIZE {
            return Err(Error::decode("Credential file is truncated"));
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher()?
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::decode("Failed to decrypt credential"))
    }
}

impl CredentialStore for EncryptedFileStore {
    fn put(&self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        let output = self.encrypt(blob)?;
        fs::write(&tmp, output).map_err(|e| Error::store(format!("write {key}: {e}")))?;

        // Set restrictive permissions on Unix before the file becomes visible
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::store(format!("chmod {key}: {e}")))?;
        }

        fs::rename(&tmp, &path).map_err(|e| Error::store(format!("rename {key}: {e}")))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let encrypted = fs::read(&path).map_err(|e| Error::store(format!("read {key}: {e}")))?;
        self.decrypt(&encrypted).map(Some)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(format!("remove {key}: {e}"))),
        }
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| Error::store(format!("list credentials: {e}")))?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match URL_SAFE_NO_PAD
                .decode(stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                Some(key) => keys.push(key),
                None => tracing::warn!("Ignoring unrecognized credential file {}", path.display()),
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> EncryptedFileStore {
        EncryptedFileStore::with_key(dir, [7u8; 32]).unwrap()
    }

    #[test]
    fn test_put_get_remove() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.put("tusk:mastodon.social:1", b"secret").unwrap();
        assert_eq!(
            store.get("tusk:mastodon.social:1").unwrap().as_deref(),
            Some(&b"secret"[..])
        );
        assert_eq!(store.list_keys().unwrap(), vec!["tusk:mastodon.social:1"]);

        store.remove("tusk:mastodon.social:1").unwrap();
        assert!(store.get("tusk:mastodon.social:1").unwrap().is_none());
        assert!(store.list_keys().unwrap().is_empty());

        // Removing again is fine
        store.remove("tusk:mastodon.social:1").unwrap();
    }

    #[test]
    fn test_files_are_not_plaintext() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.put("k", b"super-secret-token").unwrap();

        let raw = fs::read(store.path_for("k")).unwrap();
        assert!(!raw.windows(5).any(|w| w == b"super"));
    }

    #[test]
    fn test_wrong_key_is_decode_error() {
        let dir = tempdir().unwrap();
        store(dir.path()).put("k", b"value").unwrap();

        let other = EncryptedFileStore::with_key(dir.path(), [9u8; 32]).unwrap();
        assert!(matches!(other.get("k"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_put_replaces_only_its_key() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.put("a", b"3").unwrap();

        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"3"[..]));
        assert_eq!(store.get("b").unwrap().as_deref(), Some(&b"2"[..]));
        assert_eq!(store.list_keys().unwrap(), vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.put("k", b"value").unwrap();

        let mode = fs::metadata(store.path_for("k")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
