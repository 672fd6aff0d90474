//! Wire messages (shared with clients) and conversions from engine entities.

pub use arcade_shared::protocol::*;

use crate::entity::{Asteroid, Bullet, Effect, Ship};
use crate::vec2::Vec2;

#[inline]
fn pos2(v: Vec2) -> [f64; 2] {
    [round2(v.x), round2(v.y)]
}

pub fn ship_wire(ship: &Ship) -> ShipWire {
    ShipWire {
        pos: pos2(ship.pos),
        vel: pos2(ship.vel),
        heading: (ship.heading * 10000.0).round() / 10000.0,
        thrusting: ship.thrusting,
        invulnerable: ship.is_invulnerable(),
    }
}

pub fn asteroid_wire(asteroid: &Asteroid) -> AsteroidWire {
    AsteroidWire {
        id: asteroid.id,
        pos: pos2(asteroid.pos),
        size: round2(asteroid.size),
    }
}

pub fn bullet_wire(bullet: &Bullet) -> BulletWire {
    BulletWire {
        pos: pos2(bullet.pos),
    }
}

pub fn effect_wire(effect: &Effect) -> EffectWire {
    let size = match effect {
        Effect::Explosion { size, .. } => *size,
        Effect::PowerUp { .. } => 0.0,
    };
    EffectWire {
        kind: effect.kind(),
        pos: pos2(effect.pos()),
        size: round2(size),
        ttl: effect.ttl(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2::vec2;

    #[test]
    fn ship_wire_rounds_and_flags_invulnerability() {
        let mut ship = Ship::spawn_at(vec2(400.123456, 299.987654));
        ship.invulnerability = 3;
        let wire = ship_wire(&ship);
        assert_eq!(wire.pos, [400.12, 299.99]);
        assert!(wire.invulnerable);
        assert!(!wire.thrusting);
    }

    #[test]
    fn effect_wire_carries_kind_and_ttl() {
        let wire = effect_wire(&Effect::PowerUp {
            pos: vec2(1.0, 2.0),
            ttl: 9,
        });
        assert_eq!(wire.kind, EffectKind::Shield);
        assert_eq!(wire.ttl, 9);
        assert_eq!(wire.size, 0.0);

        let wire = effect_wire(&Effect::Explosion {
            pos: vec2(1.0, 2.0),
            size: 15.0,
            ttl: 4,
        });
        assert_eq!(wire.kind, EffectKind::Explosion);
        assert_eq!(wire.size, 15.0);
    }

    #[test]
    fn asteroid_wire_keeps_id() {
        let wire = asteroid_wire(&Asteroid {
            id: 17,
            pos: vec2(10.0, 20.0),
            vel: vec2(1.0, 1.0),
            size: 30.0,
        });
        assert_eq!(wire.id, 17);
        assert_eq!(wire.pos, [10.0, 20.0]);
    }
}
