//! Ed25519 authentication of proof results.

use crate::{
    error::{Error, Result},
    operation::{Operation, ResultValue, TaskMeta},
    secret_store::SecretStore,
};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;

/// First line of every signed message.
pub const MESSAGE_DOMAIN: &str = "zkcalc-auth-v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRecord {
    pub key_id: String,
    pub public_key: String,
    pub signature: String,
    pub message: String,
    pub task_id: String,
    pub timestamp: u64,
    pub verified: bool,
}

/// Human-readable rendering of a computed result. Private inputs are never
/// shown.
pub fn describe_result(operation: &Operation, result: &ResultValue) -> String {
    let list = |values: &[f64]| values.iter().join(", ");
    match operation {
        Operation::Add { a, b } => format!("{a} + {b} = {result}"),
        Operation::Multiply { a, b } => format!("{a} * {b} = {result}"),
        Operation::Sqrt { n } => format!("sqrt({n}) = {result}"),
        Operation::Modexp {
            base,
            exponent,
            modulus,
        } => format!("{base}^{exponent} mod {modulus} = {result}"),
        Operation::Range { min, max, .. } => format!("{min} <= secret <= {max}: {result}"),
        Operation::AuthenticatedAdd { a, b } => format!("{a} + {b} = {result}"),
        Operation::NeuralNetwork { inputs } => {
            format!("neural_network([{}]) = {result}", list(inputs))
        }
        Operation::LogisticRegression { features, task } => {
            format!("{task}([{}]) = {result}", list(features))
        }
        Operation::Dynamic { source, .. } => {
            let hash = crate::synthesizer::source_hash(source);
            format!("dynamic({}) = {result}", &hash[..12])
        }
        Operation::Precompiled { elf_path, .. } => {
            format!("precompiled({}) = {result}", elf_path.display())
        }
    }
}

/// The canonical message: one `key=value` line per field after the domain
/// line, joined by `\n` with no trailing newline.
pub fn build_message(
    operation: &Operation,
    result: &ResultValue,
    meta: &TaskMeta,
    public_key_hex: &str,
) -> String {
    [
        MESSAGE_DOMAIN.to_string(),
        format!("operation={}", operation.kind()),
        format!("result={}", describe_result(operation, result)),
        format!("task_id={}", meta.task_id),
        format!("timestamp={}", meta.timestamp),
        format!("public_key={public_key_hex}"),
    ]
    .join("\n")
}

pub fn sign(message: &[u8], seed: &[u8; 32]) -> [u8; 64] {
    SigningKey::from_bytes(seed).sign(message).to_bytes()
}

/// Malformed keys or signatures verify as `false`.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(public_key) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify_strict(message, &signature).is_ok()
}

pub struct Signer {
    store: Arc<dyn SecretStore>,
    passphrase: Option<String>,
}

impl Signer {
    pub fn new(store: Arc<dyn SecretStore>, passphrase: Option<String>) -> Self {
        Self { store, passphrase }
    }

    fn passphrase(&self) -> Result<&str> {
        self.passphrase.as_deref().ok_or_else(|| {
            Error::MissingCredential("no passphrase configured to unlock signing keys".to_string())
        })
    }

    /// Fails early when signing with `key_id` cannot succeed, without
    /// decrypting anything.
    pub async fn preflight(&self, key_id: &str) -> Result<()> {
        self.passphrase()?;
        self.store.public_key(key_id).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, name = "authenticate", fields(key_id = %key_id, profiling_2))]
    pub async fn authenticate(
        &self,
        key_id: &str,
        operation: &Operation,
        result: &ResultValue,
        meta: &TaskMeta,
    ) -> Result<AuthenticationRecord> {
        let passphrase = self.passphrase()?;
        let (message, signature, public_key) = {
            let key = self.store.get_decrypted_key(key_id, passphrase).await?;
            let public_key = *key.public_key();
            let message = build_message(operation, result, meta, &hex::encode(public_key));
            let signature = sign(message.as_bytes(), key.seed());
            (message, signature, public_key)
        };
        let verified = verify(message.as_bytes(), &signature, &public_key);
        tracing::info!(verified, "signed result with key `{key_id}`");
        Ok(AuthenticationRecord {
            key_id: key_id.to_string(),
            public_key: hex::encode(public_key),
            signature: hex::encode(signature),
            message,
            task_id: meta.task_id.clone(),
            timestamp: meta.timestamp,
            verified,
        })
    }
}
