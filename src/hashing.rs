use crate::error::AppError;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// SHA-1 of the file's bytes, as lowercase hex.
pub fn hash_file(path: &Path) -> Result<String, AppError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let hash = format!("{:x}", hasher.finalize());
    log::debug!("Calculated hash for {:?}: {}", path, hash);
    Ok(hash)
}

/// Stable record id: the last six hex digits of the filename's SHA-1.
pub fn photo_id(filename: &str) -> String {
    let digest = format!("{:x}", Sha1::digest(filename.as_bytes()));
    digest[digest.len() - 6..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_depends_on_name_only() {
        assert_eq!(photo_id("a.jpg"), photo_id("a.jpg"));
        assert_ne!(photo_id("a.jpg"), photo_id("b.jpg"));
        assert_eq!(photo_id("a.jpg").len(), 6);
        assert!(photo_id("a.jpg").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn known_digests() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(photo_id("abc"), "d0d89d");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(hash_file(&path).unwrap(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(hash_file(Path::new("/definitely/not/here.jpg")).is_err());
    }
}
