//! Shared fixtures for cache-core tests.
//!
//! Feature-gated behind `testutil`:
//!
//! ```toml
//! [dev-dependencies]
//! nixcache-core = { path = "../core", features = ["testutil"] }
//! ```

use crate::{
    signing::{NarSigner, SecretKey},
    store_path::NIX_BASE32_ALPHABET,
    upload::UploadPathNarInfo,
};

/// Name published with [`TEST_SIGNING_KEY`].
pub const TEST_KEY_NAME: &str = "test-cache-1";

/// PKCS#8-wrapped Ed25519 test key, base64.
pub const TEST_SIGNING_KEY: &str = "MC4CAQAwBQYDK2VwBCIEIHvA+mbf8LQjQbpRHwGdev2LMEqPCfAb6SY9askCfqRu";

/// Public half of [`TEST_SIGNING_KEY`] under [`TEST_KEY_NAME`].
pub const TEST_PUBLIC_KEY: &str = "test-cache-1:7TC3DNI7KF9/nZOR8e+F+1EsuSai+tNceZH6PLCk4UA=";

/// Signer over [`TEST_SIGNING_KEY`].
///
/// # Panics
///
/// Never with the fixed key.
#[must_use]
pub fn test_signer() -> NarSigner {
    NarSigner::new(SecretKey::decode(TEST_SIGNING_KEY).expect("valid test key"), TEST_KEY_NAME)
}

/// A deterministic valid store-path hash for `n`.
#[must_use]
pub fn test_hash(n: usize) -> String {
    let alphabet = NIX_BASE32_ALPHABET.as_bytes();
    let mut value = n;
    let mut hash = vec![b'0'; 32];
    for slot in hash.iter_mut().rev() {
        *slot = alphabet[value % alphabet.len()];
        value /= alphabet.len();
    }
    String::from_utf8(hash).expect("alphabet is ASCII")
}

/// Upload header for `{test_hash(n)}-{name}` with two references and no
/// compression.
#[must_use]
pub fn sample_upload(n: usize, name: &str) -> UploadPathNarInfo {
    let hash = test_hash(n);
    UploadPathNarInfo {
        cache: Some("main".to_owned()),
        store_path: format!("/nix/store/{hash}-{name}"),
        store_path_hash: hash,
        references: vec![
            format!("/nix/store/{}-glibc-2.38", test_hash(1_000_000)),
            format!("/nix/store/{}-{name}", test_hash(n)),
        ],
        nar_hash: format!("sha256:{}", test_hash(n + 7)),
        nar_size: 4,
        sigs: vec![],
        compression: None,
        file_hash: None,
        file_size: None,
        system: Some("x86_64-linux".to_owned()),
        deriver: None,
        ca: None,
    }
}

/// Asserts that a `Result<T, CacheError>` is an `Err` matching the given variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use nixcache_core::{assert_cache_error, CacheError};
///
/// let result: Result<(), CacheError> = Err(CacheError::empty_body());
/// assert_cache_error!(result, EmptyBody);
/// ```
#[macro_export]
macro_rules! assert_cache_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::CacheError::$variant { .. })),
            "expected CacheError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}
