//! Credential codec for tenant database secrets.
//!
//! Secrets are sealed with AES-256-GCM under the application key and stored as
//! `v1:` followed by `base64(nonce || ciphertext || tag)`.
//!
//! Decoding is deliberately lenient: [`CredentialCodec::decrypt`] never fails.
//! A stored value that is not a valid ciphertext under the current key is
//! returned unchanged and tagged [`SecretSource::LegacyPlaintext`]. This keeps
//! rows written before encryption was introduced (or under a retired key)
//! usable during a migration window. Callers that want to refuse such rows
//! check the tag.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Version tag prepended to every ciphertext this codec produces.
pub const CIPHERTEXT_PREFIX: &str = "v1:";

/// Prefix accepted (and ignored) in front of a base64 application key.
const KEY_ENCODING_PREFIX: &str = "base64:";

/// Errors raised while building a codec or sealing a secret.
///
/// Decryption has no error type; see [`Decrypted`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The configured key is not valid base64.
    #[error("application key is not valid base64")]
    KeyEncoding,
    /// The decoded key has the wrong length.
    #[error("application key must be {KEY_SIZE} bytes, got {0}")]
    KeyLength(usize),
    /// The system random source failed.
    #[error("random number generation failed")]
    Random,
    /// The AEAD primitive rejected the operation.
    #[error("encryption failed")]
    Seal,
}

/// How a stored secret was interpreted by [`CredentialCodec::decrypt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// The stored value was a valid ciphertext and was decrypted.
    Ciphertext,
    /// The stored value could not be decrypted and is used verbatim.
    LegacyPlaintext,
}

/// Result of decoding a stored secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Decrypted {
    value: String,
    source: SecretSource,
}

impl Decrypted {
    /// The usable secret.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the value was decrypted or passed through.
    #[must_use]
    pub fn source(&self) -> SecretSource {
        self.source
    }

    /// Consumes the result, returning the secret.
    #[must_use]
    pub fn into_value(self) -> String {
        self.value
    }
}

impl fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decrypted")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Symmetric codec for tenant connection secrets.
///
/// Cheap to share behind an `Arc`; the key schedule is computed once.
pub struct CredentialCodec {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialCodec {
    /// Builds a codec from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Seal`] if the AEAD key cannot be constructed.
    pub fn new(key: [u8; KEY_SIZE]) -> Result<Self, CodecError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &key).map_err(|_| CodecError::Seal)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Builds a codec from a base64 key, optionally prefixed with `base64:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 or not exactly 32 bytes.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CodecError> {
        let encoded = encoded.trim();
        let encoded = encoded.strip_prefix(KEY_ENCODING_PREFIX).unwrap_or(encoded);
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|_| CodecError::KeyEncoding)?;
        let key: [u8; KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CodecError::KeyLength(bytes.len()))?;
        Self::new(key)
    }

    /// Generates a fresh random key, base64-encoded with the `base64:` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Random`] if the system RNG fails.
    pub fn generate_key() -> Result<String, CodecError> {
        let mut key = [0u8; KEY_SIZE];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CodecError::Random)?;
        Ok(format!("{KEY_ENCODING_PREFIX}{}", STANDARD.encode(key)))
    }

    /// Seals a secret for storage.
    ///
    /// Every call uses a fresh random nonce, so encrypting the same secret
    /// twice yields different ciphertexts.
    ///
    /// # Errors
    ///
    /// Returns an error if nonce generation or sealing fails.
    pub fn encrypt(&self, secret: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CodecError::Random)?;

        let mut in_out = secret.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CodecError::Seal)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&in_out);
        Ok(format!("{CIPHERTEXT_PREFIX}{}", STANDARD.encode(combined)))
    }

    /// Decodes a stored secret, falling back to the raw value.
    #[must_use]
    pub fn decrypt(&self, stored: &str) -> Decrypted {
        match self.open(stored) {
            Some(value) => Decrypted {
                value,
                source: SecretSource::Ciphertext,
            },
            None => Decrypted {
                value: stored.to_string(),
                source: SecretSource::LegacyPlaintext,
            },
        }
    }

    /// Whether `stored` looks like output of [`encrypt`](Self::encrypt).
    ///
    /// Only checks the version tag; it does not authenticate the payload.
    #[must_use]
    pub fn is_sealed(stored: &str) -> bool {
        stored.starts_with(CIPHERTEXT_PREFIX)
    }

    fn open(&self, stored: &str) -> Option<String> {
        let payload = stored.strip_prefix(CIPHERTEXT_PREFIX)?;
        let mut combined = STANDARD.decode(payload).ok()?;
        if combined.len() < NONCE_LEN + TAG_SIZE {
            return None;
        }
        let (nonce_bytes, sealed) = combined.split_at_mut(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).ok()?;
        let plain = self.key.open_in_place(nonce, Aad::empty(), sealed).ok()?;
        String::from_utf8(plain.to_vec()).ok()
    }
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}
