use anyhow::{Context, Result};
use std::path::Path;

/// Hash file contents using BLAKE3. Used as the embedding cache key, so a
/// renamed or moved image still hits the cache.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("nested_b.jpg");
        std::fs::write(&a, b"not really a png").unwrap();
        std::fs::write(&b, b"not really a png").unwrap();

        let ha = hash_file(&a).unwrap();
        assert_eq!(ha, hash_file(&b).unwrap());
        assert_eq!(ha, blake3::hash(b"not really a png").to_hex().to_string());
    }

    #[test]
    fn missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(hash_file(&tmp.path().join("gone.png")).is_err());
    }
}
