use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Identifies the owner of an output
///
/// Wallet addresses are the base58 encoding of an ed25519 public key. Any other
/// string is still a valid recipient, it just can never sign anything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let bytes = public_key.as_bytes();
        let encoded = bs58::encode(bytes).into_string();
        Address(encoded)
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        VerifyingKey::from_bytes(&bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key bytes".to_string())
        })?)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let public_key = Address(s.to_string()).to_public_key()?;
        Ok(Address::from_public_key(&public_key))
    }
}

/// Represents a digital signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        let bytes = signature.to_bytes();
        let encoded = bs58::encode(bytes).into_string();
        DigitalSignature(encoded)
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// An ed25519 signing key together with the address derived from it
///
/// The private half never leaves this type; the only thing it does with it is sign.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Creates a new random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self::from_signing_key(SigningKey::generate(&mut csprng))
    }

    /// Creates a keypair from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    /// Creates a keypair from a hex-encoded secret key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_secret_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());
        KeyPair {
            signing_key,
            address,
        }
    }

    /// Gets the address derived from the public key
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs the canonical serialization of `data`
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> Result<DigitalSignature, CryptoError> {
        sign_data(&self.signing_key, data)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Serializes `data` into the byte form that gets signed
///
/// JSON with ordered maps, so the same value always yields the same bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, CryptoError> {
    serde_json::to_vec(data).map_err(|e| CryptoError::EncodingError(e.to_string()))
}

/// Signs the canonical serialization of `data` with a private key
pub fn sign_data<T: Serialize + ?Sized>(
    signing_key: &SigningKey,
    data: &T,
) -> Result<DigitalSignature, CryptoError> {
    let message = canonical_bytes(data)?;
    let signature = signing_key.sign(&message);
    Ok(DigitalSignature::from_signature(&signature))
}

/// Verifies a signature over `data` against the public key behind `address`
///
/// Any malformed input (undecodable address or signature, wrong length,
/// unserializable data) is reported as a failed verification.
pub fn verify_signature<T: Serialize + ?Sized>(
    address: &Address,
    data: &T,
    signature: &DigitalSignature,
) -> bool {
    let public_key = match address.to_public_key() {
        Ok(public_key) => public_key,
        Err(_) => return false,
    };

    let signature = match signature.to_signature() {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    let message = match canonical_bytes(data) {
        Ok(message) => message,
        Err(_) => return false,
    };

    public_key.verify(&message, &signature).is_ok()
}
