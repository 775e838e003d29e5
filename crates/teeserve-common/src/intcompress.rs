// intcompress.rs — variable-int stream codec (module B): compresses a run
// of i32 words (the snapshot/delta representation) into the same
// 7-bit-per-byte varint encoding packer.rs uses for individual fields.
// Converted from: myq2-common's compression.rs (Result<Vec<u8>, String>
// error-return shape for a whole-buffer codec), re-targeted from zlib
// deflate to this protocol's own varint scheme since nothing downstream
// still needs raw-deflate framing.

use crate::packer::{Packer, Unpacker};

/// Compress a run of i32 words into the varint wire form.
pub fn compress(src: &[i32]) -> Vec<u8> {
    let mut p = Packer::new(src.len() * 5 + 16);
    for &word in src {
        p.add_int(word);
    }
    p.into_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressError {
    Truncated,
    CapacityExceeded,
}

/// Decompress a varint-encoded byte run back into i32 words. Fails if the
/// input is truncated mid-varint, or if more than `cap` words would be
/// produced.
pub fn decompress(enc: &[u8], cap: usize) -> Result<Vec<i32>, DecompressError> {
    let mut u = Unpacker::new(enc);
    let mut out = Vec::new();

    while u.remaining() > 0 {
        let word = u.get_int();
        if u.error() {
            return Err(DecompressError::Truncated);
        }
        if out.len() >= cap {
            return Err(DecompressError::CapacityExceeded);
        }
        out.push(word);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_words() {
        let src = [0, 1, -1, 12345, -12345, i32::MAX, i32::MIN + 1, 63, 64, -64];
        let enc = compress(&src);
        let dec = decompress(&enc, src.len() + 1).unwrap();
        assert_eq!(dec, src);
    }

    #[test]
    fn empty_input_round_trips_to_empty() {
        let enc = compress(&[]);
        assert!(enc.is_empty());
        assert_eq!(decompress(&enc, 10).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let enc = [0x80u8]; // continuation bit with nothing following
        assert_eq!(decompress(&enc, 10), Err(DecompressError::Truncated));
    }

    #[test]
    fn exceeding_cap_is_rejected() {
        let src = [1, 2, 3, 4];
        let enc = compress(&src);
        assert_eq!(decompress(&enc, 2), Err(DecompressError::CapacityExceeded));
    }
}
