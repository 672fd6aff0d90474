use crate::vec2::{vec2, Vec2};
use arcade_shared::protocol::EffectKind;

/// Heading that points toward the top of the screen
pub const HEADING_UP: f64 = -std::f64::consts::FRAC_PI_2;

/// Fixed rectangular play area; all wrap and bounds logic is relative to it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayArea {
    pub width: f64,
    pub height: f64,
}

impl PlayArea {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        vec2(self.width / 2.0, self.height / 2.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err("play area width must be finite and > 0".to_string());
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err("play area height must be finite and > 0".to_string());
        }
        Ok(())
    }
}

impl Default for PlayArea {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

/// The player's ship. One per session.
#[derive(Debug, Clone, PartialEq)]
pub struct Ship {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Radians; 0 points along +x
    pub heading: f64,
    pub thrusting: bool,
    /// Frames until the next shot is allowed
    pub shoot_cooldown: u32,
    /// Frames during which ship-asteroid collisions are ignored
    pub invulnerability: u32,
}

impl Ship {
    /// Ship parked at `pos`, at rest, facing up.
    pub fn spawn_at(pos: Vec2) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            heading: HEADING_UP,
            thrusting: false,
            shoot_cooldown: 0,
            invulnerability: 0,
        }
    }

    /// Put the ship back at `center` with zero velocity and a grace window.
    pub fn respawn(&mut self, center: Vec2, invulnerability: u32) {
        *self = Self::spawn_at(center);
        self.invulnerability = invulnerability;
    }

    pub fn is_invulnerable(&self) -> bool {
        self.invulnerability > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asteroid {
    /// Unique per spawn within a session
    pub id: u32,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Collision radius
    pub size: f64,
}

impl Asteroid {
    pub fn radius(&self) -> f64 {
        self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Remaining frames before the bullet expires
    pub ttl: u32,
}

/// Short-lived visual or pickup left behind by destroyed asteroids.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Explosion { pos: Vec2, size: f64, ttl: u32 },
    /// Shield pickup; the ship collects it by touching it
    PowerUp { pos: Vec2, ttl: u32 },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Explosion { .. } => EffectKind::Explosion,
            Effect::PowerUp { .. } => EffectKind::Shield,
        }
    }

    pub fn pos(&self) -> Vec2 {
        match self {
            Effect::Explosion { pos, .. } | Effect::PowerUp { pos, .. } => *pos,
        }
    }

    pub fn ttl(&self) -> u32 {
        match self {
            Effect::Explosion { ttl, .. } | Effect::PowerUp { ttl, .. } => *ttl,
        }
    }

    /// Age by one frame. Returns false once expired.
    pub fn age(&mut self) -> bool {
        let ttl = match self {
            Effect::Explosion { ttl, .. } | Effect::PowerUp { ttl, .. } => ttl,
        };
        *ttl = ttl.saturating_sub(1);
        *ttl > 0
    }
}

/// Logical input signals for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub turn_left: bool,
    pub turn_right: bool,
    pub thrust: bool,
    pub fire: bool,
}
