//! Decides when the local player's movement has to be reported.
//!
//! Velocity is sent whenever it changes, position once per
//! [`POSITION_SYNC_INTERVAL`] regardless.

use shared::{Packet, POSITION_SYNC_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    pub x: f32,
    pub y: f32,
    pub rotation_y: f32,
    pub current_velocity: (f32, f32),
    pub goal_velocity: (f32, f32),
}

#[derive(Debug, Clone, Default)]
pub struct MovementSync {
    last_velocity: Option<((f32, f32), (f32, f32))>,
    since_position: f32,
    sent_position: bool,
}

impl MovementSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets to send for this frame, velocity first.
    pub fn update(&mut self, movement: &Movement, dt: f32) -> Vec<Packet> {
        let mut out = Vec::new();

        let velocity = (movement.current_velocity, movement.goal_velocity);
        if self.last_velocity != Some(velocity) {
            self.last_velocity = Some(velocity);
            out.push(Packet::Velocity {
                current_x: velocity.0 .0,
                current_y: velocity.0 .1,
                goal_x: velocity.1 .0,
                goal_y: velocity.1 .1,
            });
        }

        self.since_position += dt;
        if !self.sent_position || self.since_position >= POSITION_SYNC_INTERVAL {
            self.sent_position = true;
            self.since_position = 0.0;
            out.push(Packet::PositionSync {
                x: movement.x,
                y: movement.y,
                rotation_y: movement.rotation_y,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(x: f32) -> Movement {
        Movement {
            x,
            y: 0.0,
            rotation_y: 0.0,
            current_velocity: (0.0, 0.0),
            goal_velocity: (0.0, 0.0),
        }
    }

    fn kinds(packets: &[Packet]) -> Vec<&'static str> {
        packets.iter().map(|p| p.packet_type().tag()).collect()
    }

    #[test]
    fn test_first_frame_sends_both() {
        let mut sync = MovementSync::new();
        assert_eq!(kinds(&sync.update(&standing(0.0), 0.016)), vec!["VELOC", "POSIT"]);
    }

    #[test]
    fn test_position_once_per_second() {
        let mut sync = MovementSync::new();
        sync.update(&standing(0.0), 0.0);

        assert!(sync.update(&standing(1.0), 0.5).is_empty());
        assert_eq!(kinds(&sync.update(&standing(2.0), 0.5)), vec!["POSIT"]);
        assert!(sync.update(&standing(3.0), 0.1).is_empty());
    }

    #[test]
    fn test_velocity_on_change_only() {
        let mut sync = MovementSync::new();
        sync.update(&standing(0.0), 0.0);

        let mut walking = standing(0.0);
        walking.goal_velocity = (10.0, 0.0);
        assert_eq!(kinds(&sync.update(&walking, 0.1)), vec!["VELOC"]);
        assert!(sync.update(&walking, 0.1).is_empty());
    }
}
