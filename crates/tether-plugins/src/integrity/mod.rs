//! Checksum verification for plugin executables.
//!
//! Verification is opt-in per plugin: a [`SecureConfig`] names the hash
//! algorithm and the digest the executable must produce. Supervisors run the
//! configured [`IntegrityVerifier`] before every launch, including automatic
//! restarts, so a binary swapped on disk is never relaunched.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::error::PluginError;

const INTEGRITY_TARGET: &str = "tether_plugins::integrity";

/// Hash algorithms accepted for executable verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the digest in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected digest of a plugin executable.
///
/// # Example
///
/// ```
/// use tether_plugins::integrity::{HashAlgorithm, SecureConfig};
///
/// let secure = SecureConfig::from_hex(
///     HashAlgorithm::Sha256,
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// )
/// .expect("valid digest");
/// assert_eq!(secure.checksum().len(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureConfig {
    algorithm: HashAlgorithm,
    checksum: Vec<u8>,
}

impl SecureConfig {
    /// Creates a secure-config from raw digest bytes.
    #[must_use]
    pub const fn new(algorithm: HashAlgorithm, checksum: Vec<u8>) -> Self {
        Self {
            algorithm,
            checksum,
        }
    }

    /// Creates a secure-config from a hex-encoded digest.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Validation`] when the string is not hex or has
    /// the wrong length for `algorithm`.
    pub fn from_hex(algorithm: HashAlgorithm, digest: &str) -> Result<Self, PluginError> {
        let checksum = hex::decode(digest.trim()).map_err(|err| {
            PluginError::validation(format!("checksum is not valid hex: {err}"))
        })?;
        if checksum.len() != algorithm.digest_len() {
            return Err(PluginError::validation(format!(
                "{algorithm} checksum must be {} bytes, got {}",
                algorithm.digest_len(),
                checksum.len()
            )));
        }
        Ok(Self::new(algorithm, checksum))
    }

    /// Returns the hash algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Returns the expected digest.
    #[must_use]
    pub fn checksum(&self) -> &[u8] {
        &self.checksum
    }
}

/// Verifies plugin executables before launch.
pub trait IntegrityVerifier: Send + Sync {
    /// Checks `path` against `secure`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::IntegrityMismatch`] when the digest differs and
    /// [`PluginError::Io`] when the file cannot be read.
    fn verify(&self, path: &Path, secure: &SecureConfig) -> Result<(), PluginError>;
}

/// Default verifier backed by the `sha2` hash family.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha2Verifier;

impl IntegrityVerifier for Sha2Verifier {
    fn verify(&self, path: &Path, secure: &SecureConfig) -> Result<(), PluginError> {
        verify(path, secure.algorithm(), secure.checksum())
    }
}

impl<T> IntegrityVerifier for Arc<T>
where
    T: IntegrityVerifier + ?Sized,
{
    fn verify(&self, path: &Path, secure: &SecureConfig) -> Result<(), PluginError> {
        (**self).verify(path, secure)
    }
}

/// Hashes the file at `path` and compares it with `expected`.
///
/// # Errors
///
/// Returns [`PluginError::IntegrityMismatch`] when the digest differs and
/// [`PluginError::Io`] when the file cannot be read.
pub fn verify(path: &Path, algorithm: HashAlgorithm, expected: &[u8]) -> Result<(), PluginError> {
    let actual = digest_file(path, algorithm)?;
    if actual == expected {
        debug!(
            target: INTEGRITY_TARGET,
            path = %path.display(),
            %algorithm,
            "plugin checksum verified"
        );
        return Ok(());
    }
    Err(PluginError::IntegrityMismatch {
        path: path.to_path_buf(),
        algorithm: algorithm.as_str(),
        expected: hex::encode(expected),
        actual: hex::encode(actual),
    })
}

/// Computes the digest of the file at `path`.
///
/// # Errors
///
/// Returns [`PluginError::Io`] when the file cannot be opened or read.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<Vec<u8>, PluginError> {
    let io_error = |source: io::Error| PluginError::Io {
        path: path.to_path_buf(),
        source: Arc::new(source),
    };
    let file = File::open(path).map_err(io_error)?;
    match algorithm {
        HashAlgorithm::Sha224 => digest_reader::<Sha224>(file),
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(file),
        HashAlgorithm::Sha384 => digest_reader::<Sha384>(file),
        HashAlgorithm::Sha512 => digest_reader::<Sha512>(file),
    }
    .map_err(io_error)
}

fn digest_reader<D: Digest + Write>(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}
