//! Payload compression for large frames (LZ4, size-prepended).

use crate::error::CipherError;

/// Minimum entropy threshold for compression (0.0-8.0 bits per byte)
/// Data below this threshold is unlikely to compress well
const MIN_ENTROPY_THRESHOLD: f64 = 4.0;

/// Calculate Shannon entropy of data (bits per byte)
/// Returns a value between 0.0 (all identical) and 8.0 (perfectly random)
fn calculate_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &freq {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}

/// Whether a payload of this shape is worth compressing.
///
/// A `threshold_bytes` of 0 disables compression entirely.
pub fn should_compress(data: &[u8], threshold_bytes: usize) -> bool {
    if threshold_bytes == 0 || data.len() < threshold_bytes {
        return false;
    }

    // For small samples (< 1KB), use simple size threshold
    if data.len() < 1024 {
        return true;
    }

    // Sample the first 512 bytes; high entropy data won't shrink
    let sample_size = data.len().min(512);
    calculate_entropy(&data[..sample_size]) < MIN_ENTROPY_THRESHOLD
}

pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress, refusing any output larger than `max_output` bytes.
///
/// The claimed size is checked before lz4_flex allocates, so a hostile size prefix
/// cannot force a huge allocation.
pub fn decompress(data: &[u8], max_output: usize) -> Result<Vec<u8>, CipherError> {
    if data.len() < 4 {
        return Err(CipherError::Compression);
    }

    // lz4_flex prepends the uncompressed size as 4-byte little-endian
    let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if claimed_size > max_output {
        return Err(CipherError::Compression);
    }

    let decompressed =
        lz4_flex::decompress_size_prepended(data).map_err(|_| CipherError::Compression)?;
    if decompressed.len() > max_output {
        return Err(CipherError::Compression);
    }
    Ok(decompressed)
}
