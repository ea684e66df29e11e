//! Fingerprints and Ed25519 signatures in the Nix binary-cache format.
//!
//! Nix signs a narinfo by signing its *fingerprint*:
//!
//! ```text
//! 1;{store path};{nar hash};{nar size};{comma-joined full reference paths}
//! ```
//!
//! Keys and signatures travel as `{name}:{base64}`. The name is a label for
//! humans and for picking a trusted key; it is never compared during
//! verification.
//!
//! # Example
//!
//! ```
//! use nixcache_core::signing::{build_fingerprint, public_key_of, sign, verify, SecretKey};
//!
//! let key = SecretKey::from_seed(&[7u8; 32]);
//! let fingerprint = build_fingerprint("/nix/store/abc123-test", "sha256:def456", 12345, &[]);
//!
//! let signature = sign(&key, "my-cache-1", &fingerprint);
//! let public_key = public_key_of(&key, "my-cache-1");
//! assert!(verify(&public_key, &signature, &fingerprint)?);
//! # Ok::<(), nixcache_core::CacheError>(())
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::error::{CacheError, Result};

/// Length of an Ed25519 seed.
pub const SEED_LEN: usize = 32;

/// Length of a PKCS#8 DER document wrapping an Ed25519 seed.
pub const PKCS8_LEN: usize = 48;

/// Length of an expanded secret key (seed followed by public key).
pub const EXPANDED_LEN: usize = 64;

/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Builds the signing fingerprint.
///
/// References must be full store paths and are joined in the order given,
/// without sorting or deduplication. An empty list still leaves the final
/// `;` in place.
///
/// ```
/// use nixcache_core::signing::build_fingerprint;
///
/// assert_eq!(
///     build_fingerprint("/nix/store/abc123-test", "sha256:def456", 12345, &[]),
///     "1;/nix/store/abc123-test;sha256:def456;12345;"
/// );
/// ```
#[must_use]
pub fn build_fingerprint(
    store_path: &str,
    nar_hash: &str,
    nar_size: u64,
    references: &[String],
) -> String {
    format!("1;{store_path};{nar_hash};{nar_size};{}", references.join(","))
}

/// The private key encodings accepted by [`SecretKey::decode`], told apart by
/// decoded length.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyEncoding {
    /// 32-byte seed.
    Seed(Zeroizing<[u8; SEED_LEN]>),
    /// 64-byte expanded secret: seed followed by the public key, as written by
    /// `nix key generate-secret`.
    Expanded(Zeroizing<[u8; EXPANDED_LEN]>),
    /// 48-byte PKCS#8 document; the seed is its last 32 bytes.
    Pkcs8Seed(Zeroizing<[u8; SEED_LEN]>),
}

impl KeyEncoding {
    /// Classifies decoded key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKeyLength`] for any length other than 32,
    /// 48 or 64.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            SEED_LEN => {
                let mut seed = Zeroizing::new([0u8; SEED_LEN]);
                seed.copy_from_slice(bytes);
                Ok(Self::Seed(seed))
            },
            PKCS8_LEN => {
                let mut seed = Zeroizing::new([0u8; SEED_LEN]);
                seed.copy_from_slice(&bytes[PKCS8_LEN - SEED_LEN..]);
                Ok(Self::Pkcs8Seed(seed))
            },
            EXPANDED_LEN => {
                let mut expanded = Zeroizing::new([0u8; EXPANDED_LEN]);
                expanded.copy_from_slice(bytes);
                Ok(Self::Expanded(expanded))
            },
            length => Err(CacheError::invalid_key_length(length)),
        }
    }
}

impl fmt::Debug for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Seed(_) => "Seed",
            Self::Expanded(_) => "Expanded",
            Self::Pkcs8Seed(_) => "Pkcs8Seed",
        };
        write!(f, "KeyEncoding::{variant}(..)")
    }
}

/// An Ed25519 signing key, normalized from any [`KeyEncoding`].
#[derive(Clone)]
pub struct SecretKey {
    signing_key: SigningKey,
}

impl SecretKey {
    /// Decodes `raw`, either bare base64 or `{name}:{base64}`.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidFormat`] if the payload is not base64
    /// - [`CacheError::InvalidKeyLength`] if it decodes to an unsupported length
    /// - [`CacheError::InvalidPublicKey`] if an expanded key's public half does
    ///   not belong to its seed
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let encoded = raw.split_once(':').map_or(raw, |(_, key)| key);
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| CacheError::invalid_format(format!("signing key is not base64: {e}")))?,
        );
        Self::from_encoding(&KeyEncoding::from_bytes(&bytes)?)
    }

    /// Normalizes an already classified key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPublicKey`] if an expanded key's public
    /// half does not belong to its seed.
    pub fn from_encoding(encoding: &KeyEncoding) -> Result<Self> {
        let signing_key = match encoding {
            KeyEncoding::Seed(seed) | KeyEncoding::Pkcs8Seed(seed) => SigningKey::from_bytes(seed),
            KeyEncoding::Expanded(expanded) => SigningKey::from_keypair_bytes(expanded)
                .map_err(|_| {
                    CacheError::invalid_public_key("public half of expanded key does not match seed")
                })?,
        };
        Ok(Self { signing_key })
    }

    /// Builds a key from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        Self { signing_key: SigningKey::from_bytes(seed) }
    }

    /// Generates a fresh key from the operating system's RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Signs `fingerprint`. Ed25519 is deterministic, so equal inputs give
    /// equal output.
    #[must_use]
    pub fn sign(&self, key_name: &str, fingerprint: &str) -> String {
        let signature = self.signing_key.sign(fingerprint.as_bytes());
        format!("{key_name}:{}", STANDARD.encode(signature.to_bytes()))
    }

    /// The public half as `{key_name}:{base64}`.
    #[must_use]
    pub fn public_key(&self, key_name: &str) -> String {
        format!("{key_name}:{}", STANDARD.encode(self.signing_key.verifying_key().as_bytes()))
    }

    /// The public half.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The key as `{key_name}:{base64}` of the 64-byte expanded form, the
    /// format `nix key generate-secret` writes.
    #[must_use]
    pub fn to_encoded(&self, key_name: &str) -> Zeroizing<String> {
        let expanded = Zeroizing::new(self.signing_key.to_keypair_bytes());
        Zeroizing::new(format!("{key_name}:{}", STANDARD.encode(&expanded[..])))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public_key", &STANDARD.encode(self.signing_key.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Signs `fingerprint` with `key`, returning `{key_name}:{base64}`.
#[must_use]
pub fn sign(key: &SecretKey, key_name: &str, fingerprint: &str) -> String {
    key.sign(key_name, fingerprint)
}

/// The public half of `key` as `{key_name}:{base64}`.
#[must_use]
pub fn public_key_of(key: &SecretKey, key_name: &str) -> String {
    key.public_key(key_name)
}

fn split_named<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    value
        .split_once(':')
        .map(|(_, encoded)| encoded)
        .ok_or_else(|| CacheError::invalid_format(format!("{what} must have the form name:base64")))
}

/// Verifies a `{name}:{base64}` signature over `fingerprint`.
///
/// Key names are ignored. A signature that does not verify for any reason,
/// undecodable or truncated ones included, yields `Ok(false)`.
///
/// # Errors
///
/// - [`CacheError::InvalidFormat`] if either operand lacks the `:` separator
/// - [`CacheError::InvalidPublicKey`] if the key is not base64 or not a curve point
/// - [`CacheError::InvalidPublicKeyLength`] if the key is not 32 bytes
pub fn verify(public_key: &str, signature: &str, fingerprint: &str) -> Result<bool> {
    let key_b64 = split_named(public_key, "public key")?;
    let sig_b64 = split_named(signature, "signature")?;

    let key_bytes = STANDARD
        .decode(key_b64)
        .map_err(|e| CacheError::invalid_public_key(format!("not base64: {e}")))?;
    let key_bytes: [u8; PUBLIC_KEY_LEN] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CacheError::invalid_public_key_length(key_bytes.len()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CacheError::invalid_public_key(e.to_string()))?;

    let Ok(sig_bytes) = STANDARD.decode(sig_b64) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return Ok(false);
    };

    Ok(verifying_key.verify(fingerprint.as_bytes(), &signature).is_ok())
}

/// A server signing key paired with its published name.
#[derive(Clone)]
pub struct NarSigner {
    key: SecretKey,
    key_name: String,
}

impl NarSigner {
    /// Pairs `key` with `key_name`.
    #[must_use]
    pub fn new(key: SecretKey, key_name: impl Into<String>) -> Self {
        Self { key, key_name: key_name.into() }
    }

    /// Decodes `raw` with [`SecretKey::decode`] and pairs it with `key_name`.
    ///
    /// # Errors
    ///
    /// See [`SecretKey::decode`].
    pub fn decode(raw: &str, key_name: impl Into<String>) -> Result<Self> {
        Ok(Self::new(SecretKey::decode(raw)?, key_name))
    }

    /// The published key name.
    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// The public key as `{key_name}:{base64}`.
    #[must_use]
    pub fn public_key(&self) -> String {
        self.key.public_key(&self.key_name)
    }

    /// Signs a prepared fingerprint.
    #[must_use]
    pub fn sign(&self, fingerprint: &str) -> String {
        self.key.sign(&self.key_name, fingerprint)
    }

    /// Builds the fingerprint from narinfo fields and signs it.
    #[must_use]
    pub fn sign_narinfo(
        &self,
        store_path: &str,
        nar_hash: &str,
        nar_size: u64,
        references: &[String],
    ) -> String {
        self.sign(&build_fingerprint(store_path, nar_hash, nar_size, references))
    }
}

impl fmt::Debug for NarSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarSigner").field("key_name", &self.key_name).finish_non_exhaustive()
    }
}
