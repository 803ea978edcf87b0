use crate::error::{GalleryError, Result};
use base64::engine::general_purpose;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read size used while streaming a file through the digest.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Compute the content fingerprint of a local file.
///
/// The file is streamed through SHA-1 in fixed-size chunks and the digest is
/// returned as unpadded standard base64. The result depends only on the file
/// bytes, never on its name or metadata.
pub fn compute_fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| GalleryError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(GalleryError::io(path, e)),
        };
        hasher.update(&buf[..read]);
    }

    Ok(general_purpose::STANDARD_NO_PAD.encode(hasher.finalize()))
}

/// Fingerprint an in-memory buffer, matching [`compute_fingerprint`] for the same bytes.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    general_purpose::STANDARD_NO_PAD.encode(Sha1::digest(data))
}

/// Render the `Content-Digest` header value for a fingerprint.
pub fn content_digest_header(fingerprint: &str) -> String {
    format!("sha-1=:{}:", fingerprint)
}
