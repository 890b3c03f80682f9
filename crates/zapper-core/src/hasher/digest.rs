use crate::error::Error;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 4096;

/// BLAKE3 digest of a file's contents, streamed through a fixed buffer and
/// encoded for storage.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(encode_hash(hasher.finalize().as_bytes()))
}

pub fn encode_hash(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex form of a stored hash, safe for use as a file name on
/// case-insensitive filesystems.
pub fn hash_to_hex(hash: &str) -> Result<String, Error> {
    let bytes = URL_SAFE_NO_PAD
        .decode(hash)
        .map_err(|e| Error::HashDecode(format!("{}: {}", hash, e)))?;
    if bytes.len() < 3 {
        return Err(Error::HashDecode(format!("{}: digest too short", hash)));
    }
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs_write(&a, b"same bytes");
        fs_write(&b, b"same bytes");
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn test_empty_file_hashes_to_empty_digest() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        fs_write(&empty, b"");
        assert_eq!(
            hash_file(&empty).unwrap(),
            encode_hash(blake3::hash(b"").as_bytes())
        );
    }

    #[test]
    fn test_hex_round_trip_of_stored_form() {
        let digest = blake3::hash(b"zap");
        let stored = encode_hash(digest.as_bytes());
        assert!(!stored.contains('='));
        assert_eq!(hash_to_hex(&stored).unwrap(), digest.to_hex().to_string());
    }

    #[test]
    fn test_hash_to_hex_rejects_garbage() {
        assert!(matches!(hash_to_hex("not base64!"), Err(Error::HashDecode(_))));
        assert!(matches!(hash_to_hex("AA"), Err(Error::HashDecode(_))));
    }

    fn fs_write(path: &Path, bytes: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(bytes).unwrap();
    }
}
