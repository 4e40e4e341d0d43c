//! Block grid of one lobby and the authority that applies damage to it.
//!
//! Each block sits behind its own mutex, so digs on different blocks never
//! contend. The transition to air happens inside that lock, which is what
//! makes destruction, the reward credit and the loot roll happen exactly once
//! however many damage reports race for the same block.

use crate::error::{DispatchResult, StateConflictError};
use crate::lobby::{LobbyId, LobbyManager};
use crate::players::PlayerAuthority;
use log::{debug, info};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    grid_to_world, BlockKind, ItemKind, MapLayout, MapSize, PlayerId, WorldBounds, BLOCK_SIZE,
    INDESTRUCTIBLE_HARDNESS,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub hardness: f32,
    /// Gold paid to whoever destroys the block.
    pub reward: u32,
}

impl Block {
    pub fn new(kind: BlockKind, depth: usize) -> Self {
        Self {
            kind,
            hardness: kind.base_hardness(),
            reward: kind.reward_at(depth),
        }
    }
}

/// Result of damaging a single block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockHit {
    /// Air or indestructible, nothing changed.
    Ignored,
    Standing { hardness: f32 },
    /// This call destroyed the block. Returned to exactly one caller.
    Destroyed { kind: BlockKind, reward: u32 },
}

pub struct World {
    pub size: MapSize,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    blocks: Vec<Mutex<Block>>,
}

impl World {
    pub fn generate(size: MapSize, seed: u64) -> Self {
        Self::from_layout(&MapLayout::generate(size, seed))
    }

    pub fn from_layout(layout: &MapLayout) -> Self {
        let blocks = layout
            .cells()
            .map(|(_, y, kind)| Mutex::new(Block::new(kind, y)))
            .collect();

        Self {
            size: layout.size,
            seed: layout.seed,
            width: layout.width,
            height: layout.height,
            blocks,
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.size.bounds()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let (x, y) = (usize::try_from(x).ok()?, usize::try_from(y).ok()?);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Snapshot of the block at (x, y).
    pub fn block(&self, x: i32, y: i32) -> Option<Block> {
        self.index(x, y).map(|i| *self.blocks[i].lock())
    }

    /// Subtracts `amount` from the block's hardness.
    ///
    /// The call that takes hardness from above zero to zero or below turns
    /// the block into air and is the only one to see [`BlockHit::Destroyed`].
    pub fn damage_block(
        &self,
        x: i32,
        y: i32,
        amount: f32,
    ) -> Result<BlockHit, StateConflictError> {
        let index = self
            .index(x, y)
            .ok_or(StateConflictError::BlockOutOfBounds { x, y })?;
        let mut block = self.blocks[index].lock();

        if block.kind == BlockKind::Air || block.hardness >= INDESTRUCTIBLE_HARDNESS {
            return Ok(BlockHit::Ignored);
        }

        block.hardness -= amount;
        if block.hardness > 0.0 {
            return Ok(BlockHit::Standing {
                hardness: block.hardness,
            });
        }

        let kind = block.kind;
        let reward = block.reward;
        block.kind = BlockKind::Air;
        block.reward = 0;
        Ok(BlockHit::Destroyed { kind, reward })
    }

    pub fn solid_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.lock().kind.is_solid())
            .count()
    }
}

/// Fixed loot table for mystery blocks. `roll` is drawn from `0..100`.
pub fn select_loot(roll: u32) -> Option<ItemKind> {
    match roll {
        0..=30 => Some(ItemKind::Dynamite),
        31..=60 => Some(ItemKind::Heart),
        61..=80 => Some(ItemKind::Star),
        81..=100 => Some(ItemKind::Ice),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LootDrop {
    pub item: ItemKind,
    /// World position of the destroyed block's centre.
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    Ignored,
    Standing {
        hardness: f32,
    },
    Destroyed {
        reward_credited: u32,
        /// The destroying player's gold after the credit.
        gold_total: u32,
        loot: Option<LootDrop>,
    },
}

/// Applies player digs to the world of the lobby they are playing in.
pub struct BlockAuthority {
    players: Arc<PlayerAuthority>,
    lobbies: Arc<LobbyManager>,
    loot_rng: Mutex<StdRng>,
}

impl BlockAuthority {
    pub fn new(
        players: Arc<PlayerAuthority>,
        lobbies: Arc<LobbyManager>,
        loot_rng: StdRng,
    ) -> Self {
        Self {
            players,
            lobbies,
            loot_rng: Mutex::new(loot_rng),
        }
    }

    pub fn with_seed(players: Arc<PlayerAuthority>, lobbies: Arc<LobbyManager>, seed: u64) -> Self {
        Self::new(players, lobbies, StdRng::seed_from_u64(seed))
    }

    /// Damages block (x, y) in the running round of `lobby` on behalf of `source`.
    pub fn damage(
        &self,
        lobby: LobbyId,
        x: i32,
        y: i32,
        amount: f32,
        source: PlayerId,
    ) -> DispatchResult<DamageOutcome> {
        let world = self.lobbies.world_for_round(lobby)?;

        if self.players.get(source).map_or(true, |p| p.defeated) {
            debug!("Ignoring dig from defeated player {}", source);
            return Ok(DamageOutcome::Ignored);
        }

        let (kind, reward) = match world.damage_block(x, y, amount)? {
            BlockHit::Ignored => return Ok(DamageOutcome::Ignored),
            BlockHit::Standing { hardness } => return Ok(DamageOutcome::Standing { hardness }),
            BlockHit::Destroyed { kind, reward } => (kind, reward),
        };

        let gold_total = if reward > 0 {
            self.players.credit_gold(source, reward).unwrap_or(0)
        } else {
            self.players.get(source).map_or(0, |p| p.gold)
        };

        let loot = if kind == BlockKind::Qmark {
            let roll = self.loot_rng.lock().gen_range(0..100);
            select_loot(roll).map(|item| {
                let (wx, wy) = grid_to_world(x as usize, y as usize);
                LootDrop {
                    item,
                    x: wx + BLOCK_SIZE / 2.0,
                    y: wy - BLOCK_SIZE / 2.0,
                }
            })
        } else {
            None
        };

        info!(
            "Player {} destroyed {:?} at ({}, {}) in lobby {}",
            source, kind, x, y, lobby
        );
        Ok(DamageOutcome::Destroyed {
            reward_credited: reward,
            gold_total,
            loot,
        })
    }
}
