//! Per-frame integration: ship control, projectiles and asteroid drift.
//!
//! One call per tick; there is no `dt`. Ships and asteroids live on a torus,
//! bullets are bounded and die at the edge of the play area.

use crate::entity::{Asteroid, Bullet, Effect, FrameInput, PlayArea, Ship};
use crate::vec2::{add, from_angle, in_bounds, scale, wrap, Vec2};
use arcade_shared::config::EngineConfig;

/// Advance the ship by one frame. Returns the bullet fired this frame, if any.
pub fn step_ship(
    ship: &mut Ship,
    input: &FrameInput,
    config: &EngineConfig,
    area: &PlayArea,
) -> Option<Bullet> {
    // Angular update
    if input.turn_left {
        ship.heading -= config.turn_rate;
    }
    if input.turn_right {
        ship.heading += config.turn_rate;
    }
    ship.heading = ship.heading.rem_euclid(std::f64::consts::TAU);
    if !ship.heading.is_finite() {
        ship.heading = 0.0;
    }

    // Linear update; drag applies with or without thrust
    ship.thrusting = input.thrust;
    if input.thrust {
        ship.vel = add(ship.vel, scale(from_angle(ship.heading), config.thrust_accel));
    }
    ship.vel = scale(ship.vel, config.drag);
    if !ship.vel.x.is_finite() || !ship.vel.y.is_finite() {
        ship.vel = Vec2::ZERO;
    }

    ship.pos = wrap(add(ship.pos, ship.vel), area.width, area.height);

    ship.shoot_cooldown = ship.shoot_cooldown.saturating_sub(1);
    ship.invulnerability = ship.invulnerability.saturating_sub(1);

    if input.fire && ship.shoot_cooldown == 0 {
        ship.shoot_cooldown = config.shoot_cooldown_frames;
        return Some(fire_bullet(ship, config, area));
    }
    None
}

/// Bullet leaving the ship's nose along its heading.
pub fn fire_bullet(ship: &Ship, config: &EngineConfig, area: &PlayArea) -> Bullet {
    let dir = from_angle(ship.heading);
    let nose = wrap(
        add(ship.pos, scale(dir, config.ship_radius)),
        area.width,
        area.height,
    );
    Bullet {
        pos: nose,
        vel: add(
            scale(dir, config.bullet_speed),
            scale(ship.vel, config.bullet_inherit),
        ),
        ttl: config.bullet_lifetime_frames,
    }
}

/// Drift every asteroid one frame and wrap it back onto the play area.
pub fn integrate_asteroids(asteroids: &mut [Asteroid], area: &PlayArea) {
    for asteroid in asteroids {
        asteroid.pos = wrap(add(asteroid.pos, asteroid.vel), area.width, area.height);
    }
}

/// Move bullets one frame, dropping any that expired or left the play area.
pub fn integrate_bullets(bullets: &mut Vec<Bullet>, area: &PlayArea) {
    bullets.retain_mut(|bullet| {
        bullet.pos = add(bullet.pos, bullet.vel);
        bullet.ttl = bullet.ttl.saturating_sub(1);
        bullet.ttl > 0 && in_bounds(bullet.pos, area.width, area.height)
    });
}

/// Age effects one frame, dropping expired ones.
pub fn age_effects(effects: &mut Vec<Effect>) {
    effects.retain_mut(Effect::age);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::HEADING_UP;
    use crate::vec2::{length, vec2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn area() -> PlayArea {
        PlayArea::new(800.0, 600.0)
    }

    fn idle() -> FrameInput {
        FrameInput::default()
    }

    #[test]
    fn turn_inputs_change_heading_by_turn_rate() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        ship.heading = 1.0;
        let input = FrameInput {
            turn_right: true,
            ..idle()
        };
        step_ship(&mut ship, &input, &config, &area());
        assert!((ship.heading - (1.0 + config.turn_rate)).abs() < 1e-12);

        let input = FrameInput {
            turn_left: true,
            ..idle()
        };
        step_ship(&mut ship, &input, &config, &area());
        assert!((ship.heading - 1.0).abs() < 1e-12);
    }

    #[test]
    fn thrust_accelerates_along_heading_then_drag_applies() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        ship.heading = 0.0;
        let input = FrameInput {
            thrust: true,
            ..idle()
        };
        step_ship(&mut ship, &input, &config, &area());
        let expected = config.thrust_accel * config.drag;
        assert!((ship.vel.x - expected).abs() < 1e-12);
        assert!(ship.vel.y.abs() < 1e-12);
        assert!(ship.thrusting);
        assert!((ship.pos.x - (400.0 + expected)).abs() < 1e-12);
    }

    #[test]
    fn drag_bounds_speed_under_constant_thrust() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        let input = FrameInput {
            thrust: true,
            ..idle()
        };
        for _ in 0..5000 {
            step_ship(&mut ship, &input, &config, &area());
        }
        // Terminal speed: a*d / (1 - d)
        let terminal = config.thrust_accel * config.drag / (1.0 - config.drag);
        assert!(length(ship.vel) <= terminal + 1e-6);
    }

    #[test]
    fn ship_exiting_right_reenters_left() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(799.0, 300.0));
        ship.vel = vec2(5.0 / config.drag, 0.0);
        step_ship(&mut ship, &idle(), &config, &area());
        assert!((ship.pos.x - 4.0).abs() < 1e-9, "x = {}", ship.pos.x);
        assert!((ship.pos.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn wrap_holds_for_random_ships_and_asteroids() {
        let config = EngineConfig::default();
        let area = area();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..2000 {
            let mut ship = Ship::spawn_at(vec2(
                rng.gen_range(-2000.0..2000.0),
                rng.gen_range(-2000.0..2000.0),
            ));
            ship.vel = vec2(rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0));
            step_ship(&mut ship, &idle(), &config, &area);
            assert!(ship.pos.x >= 0.0 && ship.pos.x < area.width);
            assert!(ship.pos.y >= 0.0 && ship.pos.y < area.height);

            let mut asteroids = vec![Asteroid {
                id: 1,
                pos: vec2(rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)),
                vel: vec2(rng.gen_range(-900.0..900.0), rng.gen_range(-900.0..900.0)),
                size: 30.0,
            }];
            integrate_asteroids(&mut asteroids, &area);
            let p = asteroids[0].pos;
            assert!(p.x >= 0.0 && p.x < area.width);
            assert!(p.y >= 0.0 && p.y < area.height);
        }
    }

    #[test]
    fn counters_decrement_and_floor_at_zero() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        ship.shoot_cooldown = 1;
        ship.invulnerability = 2;
        step_ship(&mut ship, &idle(), &config, &area());
        assert_eq!(ship.shoot_cooldown, 0);
        assert_eq!(ship.invulnerability, 1);
        step_ship(&mut ship, &idle(), &config, &area());
        step_ship(&mut ship, &idle(), &config, &area());
        assert_eq!(ship.shoot_cooldown, 0);
        assert_eq!(ship.invulnerability, 0);
    }

    #[test]
    fn fire_respects_cooldown() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        let fire = FrameInput {
            fire: true,
            ..idle()
        };
        assert!(step_ship(&mut ship, &fire, &config, &area()).is_some());
        assert_eq!(ship.shoot_cooldown, config.shoot_cooldown_frames);

        let mut shots = 1;
        for _ in 0..config.shoot_cooldown_frames {
            if step_ship(&mut ship, &fire, &config, &area()).is_some() {
                shots += 1;
            }
        }
        // Exactly one more shot once the cooldown has run out
        assert_eq!(shots, 2);
    }

    #[test]
    fn bullet_leaves_nose_along_heading() {
        let config = EngineConfig {
            bullet_inherit: 0.0,
            ..EngineConfig::default()
        };
        let ship = Ship::spawn_at(vec2(400.0, 300.0));
        let bullet = fire_bullet(&ship, &config, &area());
        assert_eq!(ship.heading, HEADING_UP);
        assert!((bullet.pos.x - 400.0).abs() < 1e-9);
        assert!((bullet.pos.y - (300.0 - config.ship_radius)).abs() < 1e-9);
        assert!((bullet.vel.y + config.bullet_speed).abs() < 1e-9);
        assert_eq!(bullet.ttl, config.bullet_lifetime_frames);
    }

    #[test]
    fn bullet_inherits_fraction_of_ship_velocity() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        ship.heading = 0.0;
        ship.vel = vec2(2.0, 4.0);
        let bullet = fire_bullet(&ship, &config, &area());
        assert!((bullet.vel.x - (config.bullet_speed + 2.0 * config.bullet_inherit)).abs() < 1e-9);
        assert!((bullet.vel.y - 4.0 * config.bullet_inherit).abs() < 1e-9);
    }

    #[test]
    fn bullets_do_not_wrap() {
        let mut bullets = vec![Bullet {
            pos: vec2(798.0, 300.0),
            vel: vec2(5.0, 0.0),
            ttl: 50,
        }];
        integrate_bullets(&mut bullets, &area());
        assert!(bullets.is_empty());
    }

    #[test]
    fn bullets_expire_after_lifetime() {
        let mut bullets = vec![Bullet {
            pos: vec2(400.0, 300.0),
            vel: Vec2::ZERO,
            ttl: 3,
        }];
        integrate_bullets(&mut bullets, &area());
        integrate_bullets(&mut bullets, &area());
        assert_eq!(bullets.len(), 1);
        integrate_bullets(&mut bullets, &area());
        assert!(bullets.is_empty());
    }

    #[test]
    fn effects_are_dropped_when_expired() {
        let mut effects = vec![
            Effect::Explosion {
                pos: Vec2::ZERO,
                size: 5.0,
                ttl: 1,
            },
            Effect::PowerUp {
                pos: Vec2::ZERO,
                ttl: 10,
            },
        ];
        age_effects(&mut effects);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::PowerUp { ttl: 9, .. }));
    }

    #[test]
    fn nan_velocity_is_neutralized() {
        let config = EngineConfig::default();
        let mut ship = Ship::spawn_at(vec2(400.0, 300.0));
        ship.vel = vec2(f64::NAN, 1.0);
        step_ship(&mut ship, &idle(), &config, &area());
        assert_eq!(ship.vel, Vec2::ZERO);
        assert!(ship.pos.x.is_finite() && ship.pos.y.is_finite());
    }
}
