//! Streaming content hashing.
//!
//! Files are hashed in 64 KiB chunks so a multi-gigabyte data file never
//! sits in memory. MD5 is what object stores expose as the entity tag of
//! single-part uploads; SHA-256 is kept for targets that verify with a
//! stronger digest.

use std::io;
use std::path::Path;

use md5::{Digest, Md5};
use sha2::Sha256;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

async fn hash_file<D: Digest>(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 digest of a file, lowercase hex.
pub async fn file_md5(path: &Path) -> io::Result<String> {
    hash_file::<Md5>(path).await
}

/// SHA-256 digest of a file, lowercase hex.
pub async fn file_sha256(path: &Path) -> io::Result<String> {
    hash_file::<Sha256>(path).await
}
