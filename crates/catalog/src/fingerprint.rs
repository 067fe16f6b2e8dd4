use std::fs::File;
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Content identity: a blake3 digest over the full file bytes, read in
/// bounded chunks so large files never land in memory whole. This is an
/// exact-bytes identity, not a perceptual match.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size_bytes = 0u64;

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size_bytes += read as u64;
    }

    Ok(Fingerprint {
        content_hash: hasher.finalize().to_hex().to_string(),
        size_bytes,
    })
}
