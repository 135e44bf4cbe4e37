use bytes::Bytes;
use shuttle_core::Block;

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// `count` distinct raw blocks of `len` bytes each.
#[allow(dead_code)]
pub fn seeded_blocks(count: u64, len: usize) -> Vec<Block> {
    (0..count).map(|i| Block::raw(seeded_bytes(i + 1, len))).collect()
}
