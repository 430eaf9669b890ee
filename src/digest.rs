//! Content digests in `algorithm:hex` form
//!
//! Only SHA-256 is computed locally; other algorithms can be parsed and compared but never
//! produced.

use crate::concurrency::sink::{PositionalSink, PositionalSource};
use crate::error::{LibraryError, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const SHA256: &str = "sha256";

/// Block size used when hashing a sink back from disk
const VERIFY_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn sha256_of(data: &[u8]) -> Self {
        Self::from_sha256(Sha256::digest(data).as_slice())
    }

    fn from_sha256(raw: &[u8]) -> Self {
        Self {
            algorithm: SHA256.to_string(),
            hex: hex::encode(raw),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Library image names use `sha256.<hex>` rather than `sha256:<hex>`
    pub fn library_form(&self) -> String {
        format!("{}.{}", self.algorithm, self.hex)
    }

    /// Fail with [`LibraryError::DigestMismatch`] unless `actual` equals `self`
    pub fn verify(&self, actual: &Digest) -> Result<()> {
        if self != actual {
            return Err(LibraryError::DigestMismatch {
                expected: self.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex_part) = s
            .split_once(':')
            .ok_or_else(|| LibraryError::InvalidDigest(s.to_string()))?;

        let valid_algorithm = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
        let valid_hex = !hex_part.is_empty()
            && hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid_algorithm || !valid_hex {
            return Err(LibraryError::InvalidDigest(s.to_string()));
        }
        if algorithm == SHA256 && hex_part.len() != 64 {
            return Err(LibraryError::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex_part.to_string(),
        })
    }
}

impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 over bytes as they stream past
#[derive(Default, Clone)]
pub struct DigestHasher {
    inner: Sha256,
    bytes: u64,
}

impl DigestHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> Digest {
        Digest::from_sha256(self.inner.finalize().as_slice())
    }
}

/// Hash the first `size` bytes of a sink, reading it back sequentially on the blocking pool
pub async fn digest_sink(sink: &Arc<dyn PositionalSink>, size: u64) -> Result<Digest> {
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || hash_positional(size, |buf, offset| sink.read_at(buf, offset)))
        .await?
}

/// Hash an entire upload source on the blocking pool
pub async fn digest_source(source: &Arc<dyn PositionalSource>) -> Result<Digest> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || {
        hash_positional(source.len()?, |buf, offset| source.read_at(buf, offset))
    })
    .await?
}

fn hash_positional<F>(size: u64, mut read_at: F) -> Result<Digest>
where
    F: FnMut(&mut [u8], u64) -> std::io::Result<usize>,
{
    let mut hasher = DigestHasher::new();
    let mut buf = vec![0u8; VERIFY_BUFFER_SIZE];
    let mut offset = 0u64;
    while offset < size {
        let want = ((size - offset) as usize).min(buf.len());
        let n = read_at(&mut buf[..want], offset)?;
        if n == 0 {
            return Err(LibraryError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("ended at {} of {} bytes", offset, size),
            )));
        }
        hasher.update(&buf[..n]);
        offset += n as u64;
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_compute_sha256() {
        assert_eq!(Digest::sha256_of(b"hello world").to_string(), HELLO);
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(
            Digest::sha256_of(b"").hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parse_digest() {
        let digest: Digest = HELLO.parse().unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest, Digest::sha256_of(b"hello world"));
        assert!("sha256:invalid".parse::<Digest>().is_err());
        assert!("b94d27b9934d3e08".parse::<Digest>().is_err());
        assert!("sha256:B94D".parse::<Digest>().is_err());
        assert!("sha512:abcd".parse::<Digest>().is_ok());
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = DigestHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.bytes(), 11);
        assert_eq!(hasher.finalize().to_string(), HELLO);
    }

    #[test]
    fn test_verify() {
        let expected: Digest = HELLO.parse().unwrap();
        assert!(expected.verify(&Digest::sha256_of(b"hello world")).is_ok());
        let err = expected.verify(&Digest::sha256_of(b"hello worle")).unwrap_err();
        assert!(matches!(err, LibraryError::DigestMismatch { .. }));
    }

    #[test]
    fn test_library_form() {
        let digest = Digest::sha256_of(b"hello world");
        assert_eq!(digest.library_form(), format!("sha256.{}", digest.hex()));
    }

    #[tokio::test]
    async fn test_digest_sink_and_source() {
        use crate::concurrency::sink::MemoryBuffer;
        let buffer = Arc::new(MemoryBuffer::from(b"hello world".to_vec()));
        let sink: Arc<dyn PositionalSink> = buffer.clone();
        let source: Arc<dyn PositionalSource> = buffer;
        assert_eq!(digest_sink(&sink, 11).await.unwrap().to_string(), HELLO);
        assert_eq!(digest_source(&source).await.unwrap().to_string(), HELLO);
        assert!(matches!(digest_sink(&sink, 12).await, Err(LibraryError::Io(_))));
    }
}
