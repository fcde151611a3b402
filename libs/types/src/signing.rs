//! Signing module: canonical hashing, Ed25519 signatures, signer recovery
//!
//! Orders, cancels and trade authorizations are signed over a 32-byte
//! SHA-256 content hash. A [`Signature`] carries the signer's public key,
//! so verifying it also "recovers" the signing account: the address is the
//! last 20 bytes of SHA-256(public key).

use crate::errors::SigningError;
use crate::ids::{Address, Hash};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Canonical hashing
// ---------------------------------------------------------------------------

/// Builds a hash preimage from fixed-width big-endian fields.
///
/// Variable-length fields are length-prefixed so adjacent fields can never
/// be re-split into a different preimage.
#[derive(Default)]
pub struct CanonicalHasher {
    inner: Sha256,
}

impl CanonicalHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: &Address) -> Self {
        self.inner.update(address.as_bytes());
        self
    }

    pub fn hash(mut self, hash: &Hash) -> Self {
        self.inner.update(hash.as_bytes());
        self
    }

    pub fn u128(mut self, value: u128) -> Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    pub fn byte(mut self, value: u8) -> Self {
        self.inner.update([value]);
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.inner.update((value.len() as u64).to_be_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub fn finish(self) -> Hash {
        Hash::from_bytes(self.inner.finalize().into())
    }
}

/// Derive the account address owning a public key.
pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let digest: [u8; 32] = Sha256::digest(public_key).into();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::from_bytes(bytes)
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Ed25519 signature over a content hash, with the signer's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Public key of the signer as hex string
    pub public_key: String,
    /// Ed25519 signature as hex string
    pub signature: String,
}

impl Signature {
    /// Verify over `hash` and return the signing account's address.
    pub fn recover(&self, hash: &Hash) -> Result<Address, SigningError> {
        let pub_bytes =
            hex::decode(&self.public_key).map_err(|_| SigningError::InvalidPublicKey)?;
        let sig_bytes =
            hex::decode(&self.signature).map_err(|_| SigningError::InvalidSignature)?;

        let pub_key_bytes: [u8; 32] = pub_bytes
            .try_into()
            .map_err(|_| SigningError::InvalidPublicKey)?;
        let sig_key_bytes: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| SigningError::InvalidSignature)?;

        let verifying_key =
            VerifyingKey::from_bytes(&pub_key_bytes).map_err(|_| SigningError::InvalidPublicKey)?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig_key_bytes);

        verifying_key
            .verify(hash.as_bytes(), &signature)
            .map_err(|_| SigningError::VerificationFailed)?;

        Ok(address_from_public_key(&pub_key_bytes))
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Client-side key holder used to sign orders and trade authorizations.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Fresh random key.
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from a 32-byte secret.
    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn address(&self) -> Address {
        address_from_public_key(self.signing_key.verifying_key().as_bytes())
    }

    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        let signature = self.signing_key.sign(hash.as_bytes());
        Signature {
            public_key: hex::encode(self.signing_key.verifying_key().to_bytes()),
            signature: hex::encode(signature.to_bytes()),
        }
    }
}
