//! Signing keys at rest. Seeds are stored masked under a passphrase and only
//! unmasked for the duration of one signing call.

use crate::error::{Error, Result};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::{fmt, io, path::PathBuf};
use tokio::io::AsyncWriteExt;
use zeroize::{Zeroize, Zeroizing};

const KEY_FILE_VERSION: u32 = 1;
const KEY_EXTENSION: &str = "key";
const MASK_DOMAIN: &[u8] = b"zkcalc-key-mask-v1";
const CHECK_DOMAIN: &[u8] = b"zkcalc-key-check-v1";

/// A decrypted Ed25519 seed. The buffer is wiped on drop.
pub struct KeyMaterial {
    key_id: String,
    seed: [u8; 32],
    public_key: [u8; 32],
}

impl KeyMaterial {
    pub fn new(key_id: impl Into<String>, seed: [u8; 32]) -> Self {
        let public_key = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        Self {
            key_id: key_id.into(),
            seed,
            public_key,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_decrypted_key(&self, key_id: &str, passphrase: &str) -> Result<KeyMaterial>;

    async fn public_key(&self, key_id: &str) -> Result<[u8; 32]>;
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    public_key: String,
    salt: String,
    masked_seed: String,
    check: String,
}

/// One `<key_id>.key` JSON file per key.
#[derive(Clone, Debug)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, key_id: &str) -> Result<PathBuf> {
        let valid = !key_id.is_empty()
            && !key_id.starts_with('.')
            && key_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::InvalidRequest(format!("invalid key id `{key_id}`")));
        }
        Ok(self.dir.join(format!("{key_id}.{KEY_EXTENSION}")))
    }

    async fn read_key_file(&self, key_id: &str) -> Result<KeyFile> {
        let path = self.key_path(key_id)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::Credential(format!("unknown key `{key_id}`")),
            _ => Error::Io(e),
        })?;
        let file: KeyFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Credential(format!("key file for `{key_id}` is malformed: {e}")))?;
        if file.version != KEY_FILE_VERSION {
            return Err(Error::Credential(format!(
                "key file for `{key_id}` has unsupported version {}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Creates a fresh key. Existing keys are never replaced.
    pub async fn generate(&self, key_id: &str, passphrase: &str) -> Result<[u8; 32]> {
        let path = self.key_path(key_id)?;
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut seed[..]);
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);

        let key = KeyMaterial::new(key_id, *seed);
        let mask = mask(&salt, passphrase);
        let mut masked = *seed;
        masked.iter_mut().zip(mask.iter()).for_each(|(s, m)| *s ^= m);
        let file = KeyFile {
            version: KEY_FILE_VERSION,
            public_key: hex::encode(key.public_key()),
            salt: hex::encode(salt),
            masked_seed: hex::encode(masked),
            check: hex::encode(check_tag(&salt, &seed)),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::Credential(format!("failed to encode key file: {e}")))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut out = options.open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                Error::Credential(format!("key `{key_id}` already exists"))
            }
            _ => Error::Io(e),
        })?;
        out.write_all(&json).await?;
        out.sync_all().await?;
        tracing::info!("generated key `{key_id}`");
        Ok(*key.public_key())
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_decrypted_key(&self, key_id: &str, passphrase: &str) -> Result<KeyMaterial> {
        let file = self.read_key_file(key_id).await?;
        let salt = decode_field(key_id, "salt", &file.salt)?;
        let masked: [u8; 32] = decode_field(key_id, "masked_seed", &file.masked_seed)?
            .try_into()
            .map_err(|_| Error::Credential(format!("key `{key_id}` has a bad seed length")))?;

        let mask = mask(&salt, passphrase);
        let mut seed = Zeroizing::new(masked);
        seed.iter_mut().zip(mask.iter()).for_each(|(s, m)| *s ^= m);
        if hex::encode(check_tag(&salt, &seed)) != file.check {
            return Err(Error::Credential(format!(
                "wrong passphrase for key `{key_id}`"
            )));
        }
        let key = KeyMaterial::new(key_id, *seed);
        if hex::encode(key.public_key()) != file.public_key {
            return Err(Error::Credential(format!(
                "key `{key_id}` does not match its public key"
            )));
        }
        Ok(key)
    }

    async fn public_key(&self, key_id: &str) -> Result<[u8; 32]> {
        let file = self.read_key_file(key_id).await?;
        decode_field(key_id, "public_key", &file.public_key)?
            .try_into()
            .map_err(|_| Error::Credential(format!("key `{key_id}` has a bad public key length")))
    }
}

fn decode_field(key_id: &str, field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| Error::Credential(format!("key `{key_id}` has a malformed {field}: {e}")))
}

fn mask(salt: &[u8], passphrase: &str) -> Zeroizing<[u8; 32]> {
    let digest = Sha512::new()
        .chain_update(MASK_DOMAIN)
        .chain_update(salt)
        .chain_update(passphrase.as_bytes())
        .finalize();
    let mut mask = Zeroizing::new([0u8; 32]);
    mask.copy_from_slice(&digest[..32]);
    mask
}

fn check_tag(salt: &[u8], seed: &[u8; 32]) -> [u8; 32] {
    Sha256::new()
        .chain_update(CHECK_DOMAIN)
        .chain_update(salt)
        .chain_update(seed)
        .finalize()
        .into()
}
