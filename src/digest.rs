// src/digest.rs

//! Content digests for file integrity tracking
//!
//! The registry document stores an MD5 digest for every regular file as a
//! 32-character hex string. In memory the digest is kept in its 16-byte
//! binary form so that integrity checks are plain byte comparisons.

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Length of an MD5 digest in bytes
pub const DIGEST_LEN: usize = 16;

/// Length of an MD5 digest as a hex string
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// A 128-bit MD5 content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; DIGEST_LEN]);

impl Md5Digest {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 32-character hex digest (case-insensitive)
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != DIGEST_HEX_LEN {
            return Err(Error::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                DIGEST_HEX_LEN,
                s.len()
            )));
        }

        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::InvalidDigest(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex representation, as stored in the registry document
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&Md5::digest(data));
        Self(bytes)
    }

    /// Digest of everything a reader yields
    pub fn of_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut hasher = Md5::new();
        let mut buffer = [0u8; 8192];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        Ok(Self(bytes))
    }

    /// Digest of a file's content
    ///
    /// Streams the file so large binaries are never held in memory.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {} for hashing: {}", path.display(), e)))?;
        Self::of_reader(&mut file)
            .map_err(|e| Error::IoError(format!("Failed to read {} for hashing: {}", path.display(), e)))
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Md5Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // md5("hello world")
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    #[test]
    fn test_of_bytes_known_value() {
        let digest = Md5Digest::of_bytes(b"hello world");
        assert_eq!(digest.to_hex(), HELLO_MD5);
    }

    #[test]
    fn test_of_file_matches_of_bytes() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"hello world").unwrap();
        temp.flush().unwrap();

        let digest = Md5Digest::of_file(temp.path()).unwrap();
        assert_eq!(digest, Md5Digest::of_bytes(b"hello world"));
    }

    #[test]
    fn test_from_hex_accepts_uppercase() {
        let digest = Md5Digest::from_hex(&HELLO_MD5.to_uppercase()).unwrap();
        assert_eq!(digest.to_hex(), HELLO_MD5);
        assert_eq!(digest.as_bytes()[0], 0x5e);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(matches!(Md5Digest::from_hex("abc"), Err(Error::InvalidDigest(_))));
        assert!(matches!(
            Md5Digest::from_hex("zz63bbbe01eeed093cb22bb8f5acdc3z"),
            Err(Error::InvalidDigest(_))
        ));
    }

    #[test]
    fn test_of_file_missing() {
        let result = Md5Digest::of_file(Path::new("/nonexistent/file"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
