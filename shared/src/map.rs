//! Deterministic map layouts.
//!
//! The server generates a layout when a lobby is created or a new round starts
//! and announces only the size and seed. Clients rebuild the identical grid
//! from those two values, so the layout has to come from a portable rng.

use crate::{BlockKind, MapSize};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct MapLayout {
    pub size: MapSize,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    cells: Vec<BlockKind>,
}

impl MapLayout {
    /// Builds the layout for `size` from `seed`.
    ///
    /// Row 0 is grass and the last row is obsidian bedrock. The rows in between
    /// get more stone, gold and obsidian the deeper they are.
    pub fn generate(size: MapSize, seed: u64) -> Self {
        let (width, height) = size.dimensions();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut cells = Vec::with_capacity(width * height);

        for y in 0..height {
            let depth = y as f32 / height as f32;
            for _ in 0..width {
                let kind = if y == 0 {
                    BlockKind::Grass
                } else if y == height - 1 {
                    BlockKind::Obsidian
                } else {
                    Self::roll_interior(&mut rng, depth)
                };
                cells.push(kind);
            }
        }

        Self {
            size,
            seed,
            width,
            height,
            cells,
        }
    }

    fn roll_interior(rng: &mut ChaCha8Rng, depth: f32) -> BlockKind {
        let roll: f32 = rng.gen_range(0.0..100.0);

        let qmark = 2.0;
        let gold = qmark + 3.0 + 7.0 * depth;
        let obsidian = gold + 4.0 * depth;
        let stone = obsidian + 15.0 + 45.0 * depth;

        if roll < qmark {
            BlockKind::Qmark
        } else if roll < gold {
            BlockKind::Gold
        } else if roll < obsidian {
            BlockKind::Obsidian
        } else if roll < stone {
            BlockKind::Stone
        } else {
            BlockKind::Dirt
        }
    }

    pub fn kind_at(&self, x: usize, y: usize) -> Option<BlockKind> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    /// Iterates cells row by row as (x, y, kind).
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, BlockKind)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, kind)| (index % width, index / width, *kind))
    }

    /// First cell of `kind`, scanning row by row.
    pub fn find(&self, kind: BlockKind) -> Option<(usize, usize)> {
        self.cells()
            .find(|(_, _, cell)| *cell == kind)
            .map(|(x, y, _)| (x, y))
    }
}
