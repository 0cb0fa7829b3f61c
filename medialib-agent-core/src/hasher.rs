//! Sample and optional full content fingerprinting under a chosen algorithm.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HashError;
use crate::model::HashAlgo;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOutput {
    pub sample_hash: String,
    pub full_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    pub algo: HashAlgo,
    pub sample_size: u64,
}

enum Digest {
    Blake3(blake3::Hasher),
    Xxhash64(xxhash_rust::xxh64::Xxh64),
    Sha256(sha2::Sha256),
}

impl Digest {
    fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Blake3 => Digest::Blake3(blake3::Hasher::new()),
            HashAlgo::Xxhash64 => Digest::Xxhash64(xxhash_rust::xxh64::Xxh64::new(0)),
            HashAlgo::Sha256 => Digest::Sha256(<sha2::Sha256 as sha2::Digest>::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Digest::Blake3(h) => {
                h.update(chunk);
            }
            Digest::Xxhash64(h) => {
                h.update(chunk);
            }
            Digest::Sha256(h) => {
                sha2::Digest::update(h, chunk);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Digest::Blake3(h) => h.finalize().to_hex().to_string(),
            Digest::Xxhash64(h) => hex::encode(h.digest().to_be_bytes()),
            Digest::Sha256(h) => hex::encode(sha2::Digest::finalize(h)),
        }
    }
}

/// Reads the file once, feeding the first `min(sample_size, size)` bytes to a sample
/// digest and (if `do_full`) every byte to a second, independent digest.
pub fn hash(path: &Path, params: HashParams, do_full: bool) -> Result<HashOutput, HashError> {
    let file = File::open(path).map_err(|source| HashError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let mut sample_digest = Digest::new(params.algo);
    let mut full_digest = do_full.then(|| Digest::new(params.algo));

    let mut buf = [0u8; READ_CHUNK];
    let mut sampled: u64 = 0;
    loop {
        let n = reader.read(&mut buf).map_err(|source| HashError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];

        if sampled < params.sample_size {
            let remaining = (params.sample_size - sampled) as usize;
            let take = remaining.min(chunk.len());
            sample_digest.update(&chunk[..take]);
            sampled += take as u64;
        }

        if let Some(full) = full_digest.as_mut() {
            full.update(chunk);
        } else if sampled >= params.sample_size {
            break;
        }
    }

    Ok(HashOutput {
        sample_hash: sample_digest.finalize_hex(),
        full_hash: full_digest.map(Digest::finalize_hex),
    })
}
