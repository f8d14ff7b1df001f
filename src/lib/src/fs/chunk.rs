//! File chunking strategies for `index_blocks` (spec.md §4.3).
//!
//! Two strategies: content-defined chunking (CDC, legacy default) and
//! fixed-size chunking (default for v1 repos, parallelizable over a worker
//! pool). Both emit `(offset, len)` spans over the file; the caller hashes
//! and persists each span as a block.

use crate::constants::{CDC_AVERAGE_BLOCK_SIZE, CDC_MAX_BLOCK_SIZE, CDC_MIN_BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub offset: u64,
    pub len: u64,
}

/// Gear-hash rolling-hash content-defined chunking, normalized to target
/// `CDC_AVERAGE_BLOCK_SIZE` with hard `CDC_MIN_BLOCK_SIZE`/`CDC_MAX_BLOCK_SIZE`
/// bounds. Deterministic: the same bytes always produce the same cut
/// points, which is what makes CDC useful for cross-version dedup.
pub fn content_defined_chunks(data: &[u8]) -> Vec<ChunkSpan> {
    if data.is_empty() {
        return Vec::new();
    }

    // A fixed, file-agnostic gear table so cut points are reproducible
    // across runs and hosts.
    static GEAR: once_gear::Gear = once_gear::Gear::new();

    let min = CDC_MIN_BLOCK_SIZE as usize;
    let max = CDC_MAX_BLOCK_SIZE as usize;
    let avg = CDC_AVERAGE_BLOCK_SIZE as usize;
    // Mask tuned so that, on uniformly-random data, `hash & mask == 0`
    // happens on average once every `avg` bytes.
    let mask_bits = (avg as f64).log2().round() as u32;
    let mask: u64 = (1u64 << mask_bits) - 1;

    let mut spans = Vec::new();
    let mut start = 0usize;
    let len = data.len();

    while start < len {
        let window_end = (start + max).min(len);
        let mut hash: u64 = 0;
        let mut cut = window_end;
        let scan_start = (start + min).min(window_end);
        for i in scan_start..window_end {
            hash = (hash << 1).wrapping_add(GEAR.value(data[i]));
            if hash & mask == 0 {
                cut = i + 1;
                break;
            }
        }
        spans.push(ChunkSpan {
            offset: start as u64,
            len: (cut - start) as u64,
        });
        start = cut;
    }

    spans
}

/// Split `total_len` bytes into equal `chunk_size`-byte spans (last span
/// shorter). Pure arithmetic, so callers can hash spans of a file in
/// parallel with rayon without needing to touch file content here.
pub fn fixed_size_chunks(total_len: u64, chunk_size: u64) -> Vec<ChunkSpan> {
    if total_len == 0 {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut offset = 0;
    while offset < total_len {
        let len = chunk_size.min(total_len - offset);
        spans.push(ChunkSpan { offset, len });
        offset += len;
    }
    spans
}

/// A small fixed substitution table used only to decorrelate consecutive
/// bytes in the CDC rolling hash; not a cryptographic primitive.
mod once_gear {
    pub struct Gear([u64; 256]);

    impl Gear {
        pub const fn new() -> Self {
            // Deterministic pseudo-random table generated with a simple
            // splitmix64-style mix, computed at compile time.
            let mut table = [0u64; 256];
            let mut i = 0usize;
            let mut seed: u64 = 0x9E3779B97F4A7C15;
            while i < 256 {
                seed = seed.wrapping_add(0x9E3779B97F4A7C15);
                let mut z = seed;
                z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
                z ^= z >> 31;
                table[i] = z;
                i += 1;
            }
            Gear(table)
        }

        pub fn value(&self, byte: u8) -> u64 {
            self.0[byte as usize]
        }
    }
}
