use lngraph_core::PublicKey;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// secp256k1 key pair for signing gossip.
pub struct KeyPair {
    secret_key: secp256k1::SecretKey,
    public_key: secp256k1::PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair using OS-provided entropy.
    pub fn generate() -> Self {
        let secret_key = secp256k1::SecretKey::new(&mut OsRng);
        Self::from_secret(secret_key)
    }

    /// Create a key pair from a 32-byte seed used directly as the secret scalar.
    /// Fails for zero or out-of-range scalars.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = secp256k1::SecretKey::from_slice(seed)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self::from_secret(secret_key))
    }

    /// Create a key pair from raw bytes (32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        let kp = Self::from_seed(&seed);
        seed.zeroize();
        kp
    }

    fn from_secret(secret_key: secp256k1::SecretKey) -> Self {
        let public_key = secp256k1::PublicKey::from_secret_key_global(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// The compressed public key, which doubles as the node id.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public_key.serialize())
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }

    pub(crate) fn secret_key(&self) -> &secp256k1::SecretKey {
        &self.secret_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Parse a compressed public key, rejecting points not on the curve.
pub fn parse_public_key(key: &PublicKey) -> Result<secp256k1::PublicKey, CryptoError> {
    secp256k1::PublicKey::from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(format!("{}: {}", key, e)))
}
