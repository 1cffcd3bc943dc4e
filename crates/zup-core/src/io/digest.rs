//! Streaming SHA-256 over whatever the network hands us.
//!
//! [`DigestReader`] sits between the raw response body and the decoder, so
//! the digest covers the compressed bytes exactly as published in the index.

use std::io::{self, Read};

use sha2::{Digest, Sha256};
use zup_schema::ResourceDescriptor;

use crate::config::ChecksumPolicy;
use crate::error::{Error, Result};

/// Counts, and under [`ChecksumPolicy::Verify`] hashes, every byte read.
#[derive(Debug)]
pub struct DigestReader<R> {
    inner: R,
    hasher: Option<Sha256>,
    bytes: u64,
}

impl<R> DigestReader<R> {
    pub fn new(inner: R, policy: ChecksumPolicy) -> Self {
        let hasher = match policy {
            ChecksumPolicy::Verify => Some(Sha256::new()),
            ChecksumPolicy::Skip => None,
        };
        Self {
            inner,
            hasher,
            bytes: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> DigestSummary {
        DigestSummary {
            bytes: self.bytes,
            sha256: self.hasher.map(|h| hex::encode(h.finalize())),
        }
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf[..n]);
        }
        self.bytes += n as u64;
        Ok(n)
    }
}

/// What a [`DigestReader`] observed once the stream was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSummary {
    pub bytes: u64,
    /// Lowercase hex; `None` when hashing was skipped.
    pub sha256: Option<String>,
}

impl DigestSummary {
    /// Compare against the published size and shasum.
    ///
    /// A no-op when hashing was skipped.
    pub fn verify(&self, resource: &ResourceDescriptor) -> Result<()> {
        let Some(actual) = &self.sha256 else {
            return Ok(());
        };
        if self.bytes != resource.declared_size() {
            return Err(Error::Integrity {
                expected: format!("{} bytes", resource.declared_size()),
                actual: format!("{} bytes", self.bytes),
            });
        }
        if !actual.eq_ignore_ascii_case(resource.checksum_hex()) {
            return Err(Error::Integrity {
                expected: resource.checksum_hex().to_string(),
                actual: actual.clone(),
            });
        }
        Ok(())
    }
}
