//! Batches continuous digging into periodic BLOCK_DAMAGE reports.

use shared::{Packet, DIG_DAMAGE_PER_SECOND, DIG_INTERVAL, MAX_DAMAGE_PER_PACKET};

/// Damage dealt to the targeted block since the last report.
///
/// Switching targets throws the pending damage away, as does the target
/// being destroyed by someone else.
#[derive(Debug, Clone)]
pub struct DamageAccumulator {
    target: Option<(i32, i32)>,
    elapsed: f32,
    accumulated: f32,
    damage_per_second: f32,
}

impl Default for DamageAccumulator {
    fn default() -> Self {
        Self::new(DIG_DAMAGE_PER_SECOND)
    }
}

impl DamageAccumulator {
    pub fn new(damage_per_second: f32) -> Self {
        Self {
            target: None,
            elapsed: 0.0,
            accumulated: 0.0,
            damage_per_second,
        }
    }

    pub fn target(&self) -> Option<(i32, i32)> {
        self.target
    }

    pub fn pending(&self) -> f32 {
        self.accumulated
    }

    /// Advances digging by `dt` seconds on `target` (None when not digging).
    /// Returns a report once per [`DIG_INTERVAL`].
    pub fn update(&mut self, target: Option<(i32, i32)>, dt: f32) -> Option<Packet> {
        if target != self.target {
            self.reset();
            self.target = target;
        }
        let (grid_x, grid_y) = self.target?;

        self.accumulated += self.damage_per_second * dt;
        self.elapsed += dt;
        if self.elapsed < DIG_INTERVAL {
            return None;
        }

        let damage = self.accumulated.min(MAX_DAMAGE_PER_PACKET);
        self.elapsed = 0.0;
        self.accumulated = 0.0;
        Some(Packet::BlockDamage {
            grid_x,
            grid_y,
            damage,
        })
    }

    /// Drops pending damage if (x, y) is the current target.
    pub fn block_destroyed(&mut self, x: i32, y: i32) {
        if self.target == Some((x, y)) {
            self.reset();
            self.target = None;
        }
    }

    fn reset(&mut self) {
        self.elapsed = 0.0;
        self.accumulated = 0.0;
    }
}
