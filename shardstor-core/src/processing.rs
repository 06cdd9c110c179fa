//! Block processing chain
//!
//! An ordered list of reversible byte transforms applied to every block
//! before it is handed to a storage strategy: compression first, then
//! encryption, so the cipher's diffusion does not defeat the compressor.
//! On read the stages run in opposite order.
//!
//! The chain is not self-describing: the configuration used to write a
//! block must be used to read it back.

use crate::error::{Result, StorError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// AES-256-GCM key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Compression mode for the compression stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMode {
    /// No compression stage
    #[default]
    None,
    /// Default DEFLATE level
    Default,
    /// Fastest compression
    BestSpeed,
    /// Smallest output
    BestCompression,
}

impl CompressionMode {
    fn level(self) -> Compression {
        match self {
            // `None` never reaches the compressor, the chain skips the stage
            CompressionMode::None | CompressionMode::Default => Compression::default(),
            CompressionMode::BestSpeed => Compression::fast(),
            CompressionMode::BestCompression => Compression::best(),
        }
    }
}

/// A single reversible transform stage
pub trait BlockProcessor: Send + Sync {
    /// Transform a plain block into its stored form.
    fn apply(&self, plain: &[u8]) -> Result<Vec<u8>>;

    /// Undo [`BlockProcessor::apply`].
    fn reverse(&self, transformed: &[u8]) -> Result<Vec<u8>>;
}

/// DEFLATE compression stage
pub struct Compressor {
    mode: CompressionMode,
}

impl Compressor {
    pub fn new(mode: CompressionMode) -> Self {
        Self { mode }
    }
}

impl BlockProcessor for Compressor {
    fn apply(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.mode.level());
        encoder.write_all(plain)?;
        Ok(encoder.finish()?)
    }

    fn reverse(&self, transformed: &[u8]) -> Result<Vec<u8>> {
        let mut plain = Vec::new();
        DeflateDecoder::new(transformed)
            .read_to_end(&mut plain)
            .map_err(|e| StorError::CorruptPayload(e.to_string()))?;
        Ok(plain)
    }
}

/// AES-256-GCM encryption key
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(StorError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(slice);
        Ok(Self(key))
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// AES-256-GCM encryption stage
///
/// A fresh random nonce is generated per block and prepended to the
/// ciphertext, so the stored form is `nonce || ciphertext || tag`.
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StorError::Encryption(e.to_string()))?;
        Ok(Self { cipher })
    }
}

impl BlockProcessor for Encryptor {
    fn apply(&self, plain: &[u8]) -> Result<Vec<u8>> {
        use rand::RngCore;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain)
            .map_err(|e| StorError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn reverse(&self, transformed: &[u8]) -> Result<Vec<u8>> {
        if transformed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorError::DecryptionFailed(
                "payload too short for encrypted content".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&transformed[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &transformed[NONCE_SIZE..])
            .map_err(|_| StorError::DecryptionFailed("authentication failed".to_string()))
    }
}

/// Ordered, reversible processing chain
///
/// Stages are applied in configured order on write and reversed in the
/// opposite order on read. An empty chain passes blocks through
/// untouched.
pub struct ProcessingChain {
    stages: Vec<Box<dyn BlockProcessor>>,
}

impl ProcessingChain {
    /// Build a chain from configuration: compression (unless `None`)
    /// followed by encryption (if a key is given).
    pub fn new(compression: CompressionMode, encryption: Option<&EncryptionKey>) -> Result<Self> {
        let mut stages: Vec<Box<dyn BlockProcessor>> = Vec::new();
        if compression != CompressionMode::None {
            stages.push(Box::new(Compressor::new(compression)));
        }
        if let Some(key) = encryption {
            stages.push(Box::new(Encryptor::new(key)?));
        }
        Ok(Self { stages })
    }

    /// A chain with no stages
    pub fn identity() -> Self {
        Self { stages: Vec::new() }
    }

    /// Number of configured stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run all stages forward over a plain block.
    pub fn apply(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut data = plain.to_vec();
        for stage in &self.stages {
            data = stage.apply(&data)?;
        }
        Ok(data)
    }

    /// Run all stages backward over a stored block.
    pub fn reverse(&self, transformed: &[u8]) -> Result<Vec<u8>> {
        let mut data = transformed.to_vec();
        for stage in self.stages.iter().rev() {
            data = stage.reverse(&data)?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compressor_roundtrip() {
        for mode in [
            CompressionMode::Default,
            CompressionMode::BestSpeed,
            CompressionMode::BestCompression,
        ] {
            let compressor = Compressor::new(mode);
            let plain = b"the quick brown fox jumps over the lazy dog".repeat(16);

            let compressed = compressor.apply(&plain).unwrap();
            assert!(compressed.len() < plain.len());

            let recovered = compressor.reverse(&compressed).unwrap();
            assert_eq!(recovered, plain);
        }
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let compressor = Compressor::new(CompressionMode::Default);
        let result = compressor.reverse(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert!(matches!(result, Err(StorError::CorruptPayload(_))));
    }

    #[test]
    fn test_encryptor_roundtrip() {
        let key = EncryptionKey::generate();
        let encryptor = Encryptor::new(&key).unwrap();

        let plain = b"secret block";
        let transformed = encryptor.apply(plain).unwrap();
        assert_eq!(transformed.len(), plain.len() + NONCE_SIZE + TAG_SIZE);

        let recovered = encryptor.reverse(&transformed).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encryptor = Encryptor::new(&EncryptionKey::generate()).unwrap();
        let other = Encryptor::new(&EncryptionKey::generate()).unwrap();

        let transformed = encryptor.apply(b"secret").unwrap();
        let result = other.reverse(&transformed);
        assert!(matches!(result, Err(StorError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EncryptionKey::generate();
        let encryptor = Encryptor::new(&key).unwrap();

        let mut transformed = encryptor.apply(b"secret").unwrap();
        let last = transformed.len() - 1;
        transformed[last] ^= 0xFF;

        let result = encryptor.reverse(&transformed);
        assert!(matches!(result, Err(StorError::DecryptionFailed(_))));
    }

    #[test]
    fn test_short_payload_fails() {
        let encryptor = Encryptor::new(&EncryptionKey::generate()).unwrap();
        let result = encryptor.reverse(&[0u8; NONCE_SIZE]);
        assert!(matches!(result, Err(StorError::DecryptionFailed(_))));
    }

    #[test]
    fn test_key_length_validation() {
        let result = EncryptionKey::from_slice(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(StorError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_identity_chain() {
        let chain = ProcessingChain::identity();
        assert!(chain.is_empty());
        let data = b"untouched";
        assert_eq!(chain.apply(data).unwrap(), data);
        assert_eq!(chain.reverse(data).unwrap(), data);
    }

    #[test]
    fn test_chain_stage_selection() {
        let key = EncryptionKey::generate();

        let chain = ProcessingChain::new(CompressionMode::None, None).unwrap();
        assert_eq!(chain.len(), 0);

        let chain = ProcessingChain::new(CompressionMode::Default, None).unwrap();
        assert_eq!(chain.len(), 1);

        let chain = ProcessingChain::new(CompressionMode::Default, Some(&key)).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_full_chain_roundtrip() {
        let key = EncryptionKey::generate();
        let chain = ProcessingChain::new(CompressionMode::BestCompression, Some(&key)).unwrap();

        let plain = b"compressible compressible compressible".repeat(8);
        let transformed = chain.apply(&plain).unwrap();
        assert_ne!(transformed, plain);

        let recovered = chain.reverse(&transformed).unwrap();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn test_chain_reverse_with_wrong_config_fails() {
        let key = EncryptionKey::generate();
        let write_chain = ProcessingChain::new(CompressionMode::Default, Some(&key)).unwrap();
        let read_chain = ProcessingChain::new(CompressionMode::None, Some(&key)).unwrap();

        let transformed = write_chain.apply(b"block").unwrap();
        // Decryption succeeds but the compressed payload is not reversed,
        // so the recovered bytes differ from the original.
        let recovered = read_chain.reverse(&transformed).unwrap();
        assert_ne!(recovered, b"block");
    }

    proptest! {
        #[test]
        fn prop_chain_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            mode in prop_oneof![
                Just(CompressionMode::None),
                Just(CompressionMode::Default),
                Just(CompressionMode::BestSpeed),
                Just(CompressionMode::BestCompression),
            ],
            encrypt in any::<bool>(),
        ) {
            let key = EncryptionKey::from_bytes([7u8; KEY_SIZE]);
            let chain =
                ProcessingChain::new(mode, encrypt.then_some(&key)).unwrap();
            let transformed = chain.apply(&data).unwrap();
            let recovered = chain.reverse(&transformed).unwrap();
            prop_assert_eq!(recovered, data);
        }
    }
}
