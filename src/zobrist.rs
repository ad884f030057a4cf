use crate::grid::Position;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Zobrist tables for the canonical state key. A state hashes to the XOR of
/// one table entry per interior square and one per box square, so the key
/// depends only on the (interior, boxes) pair and not on the exact pusher
/// square within its reachable zone.
#[derive(Debug)]
pub struct Zobrist {
    width: usize,
    interior_hashes: Vec<u64>,
    box_hashes: Vec<u64>,
}

impl Zobrist {
    pub fn new(width: usize, height: usize) -> Self {
        // Use a seeded PRNG so hashes are reproducible across runs
        let mut rng = ChaCha8Rng::seed_from_u64(0x9e3779b97f4a7c15);

        let cells = width * height;
        let interior_hashes = (0..cells).map(|_| rng.next_u64()).collect();
        let box_hashes = (0..cells).map(|_| rng.next_u64()).collect();

        Zobrist {
            width,
            interior_hashes,
            box_hashes,
        }
    }

    fn interior_hash(&self, pos: Position) -> u64 {
        self.interior_hashes[pos.y() * self.width + pos.x()]
    }

    fn box_hash(&self, pos: Position) -> u64 {
        self.box_hashes[pos.y() * self.width + pos.x()]
    }

    pub fn hash_state(&self, interior: &[Position], boxes: &[Position]) -> u64 {
        let mut hash = 0u64;
        for &pos in interior {
            hash ^= self.interior_hash(pos);
        }
        for &pos in boxes {
            hash ^= self.box_hash(pos);
        }
        hash
    }
}
