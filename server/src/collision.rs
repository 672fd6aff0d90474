//! Collision detection and resolution.
//!
//! Detection is a pure pass over the pre-frame entity sets. Resolution then
//! applies every consequence at once: removal sets are de-duplicated, so an
//! asteroid hit by two bullets, or by a bullet and the ship, is removed and
//! split exactly once.

use crate::entity::{Asteroid, Bullet, Effect, Ship};
use crate::session::{IdAllocator, SessionState};
use crate::vec2::{add, distance, from_angle, scale};
use arcade_shared::config::EngineConfig;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulletHit {
    pub bullet: usize,
    pub asteroid: usize,
}

/// Everything that touched this frame, by index into the pre-frame sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contacts {
    pub bullet_hits: Vec<BulletHit>,
    /// First asteroid (in iteration order) touching a vulnerable ship
    pub ship_hit: Option<usize>,
}

/// What resolution did to the session this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionReport {
    pub points: u32,
    pub asteroids_destroyed: u32,
    pub ship_hit: bool,
    /// The ship hit took the last life
    pub game_over: bool,
    pub shield_collected: bool,
}

/// Find bullet-asteroid and ship-asteroid contacts.
///
/// Each bullet claims at most one asteroid and each asteroid is claimed by at
/// most one bullet; first match in stable order wins. The ship test ignores
/// bullet claims so both can flag the same asteroid.
pub fn detect(
    ship: &Ship,
    asteroids: &[Asteroid],
    bullets: &[Bullet],
    config: &EngineConfig,
) -> Contacts {
    let mut claimed = vec![false; asteroids.len()];
    let mut bullet_hits = Vec::new();

    for (bullet_index, bullet) in bullets.iter().enumerate() {
        let hit = asteroids
            .iter()
            .enumerate()
            .find(|(i, a)| !claimed[*i] && distance(bullet.pos, a.pos) < a.radius());
        if let Some((asteroid_index, _)) = hit {
            claimed[asteroid_index] = true;
            bullet_hits.push(BulletHit {
                bullet: bullet_index,
                asteroid: asteroid_index,
            });
        }
    }

    let ship_hit = if ship.is_invulnerable() {
        None
    } else {
        asteroids
            .iter()
            .position(|a| distance(ship.pos, a.pos) < a.radius() + config.ship_radius)
    };

    Contacts {
        bullet_hits,
        ship_hit,
    }
}

/// Two half-size children of `parent`, or none if they would fall at or
/// below the minimum size.
pub fn split_asteroid(
    parent: &Asteroid,
    config: &EngineConfig,
    rng: &mut impl Rng,
    ids: &mut IdAllocator,
) -> Vec<Asteroid> {
    let child_size = parent.size / 2.0;
    if child_size.is_nan() || child_size <= config.min_asteroid_size {
        return Vec::new();
    }

    let base = scale(parent.vel, config.split_speedup);
    (0..2)
        .map(|_| {
            let angle = rng.gen::<f64>() * std::f64::consts::TAU;
            let magnitude = rng.gen::<f64>() * config.split_jitter;
            Asteroid {
                id: ids.next_id(),
                pos: parent.pos,
                vel: add(base, scale(from_angle(angle), magnitude)),
                size: child_size,
            }
        })
        .collect()
}

/// Detect and apply this frame's collisions, mutating score, lives and the
/// entity sets of `state`.
pub fn resolve(state: &mut SessionState, config: &EngineConfig) -> CollisionReport {
    let contacts = detect(&state.ship, &state.asteroids, &state.bullets, config);
    let mut report = CollisionReport::default();

    let mut asteroid_dead = vec![false; state.asteroids.len()];
    let mut bullet_dead = vec![false; state.bullets.len()];

    for hit in &contacts.bullet_hits {
        bullet_dead[hit.bullet] = true;
        asteroid_dead[hit.asteroid] = true;
        report.points = report.points.saturating_add(config.points_per_asteroid);
    }
    if let Some(index) = contacts.ship_hit {
        asteroid_dead[index] = true;
    }

    let mut index = 0;
    state.bullets.retain(|_| {
        let keep = !bullet_dead[index];
        index += 1;
        keep
    });

    let mut destroyed = Vec::new();
    let mut index = 0;
    state.asteroids.retain(|asteroid| {
        let dead = asteroid_dead[index];
        index += 1;
        if dead {
            destroyed.push(asteroid.clone());
        }
        !dead
    });

    for parent in &destroyed {
        state.effects.push(Effect::Explosion {
            pos: parent.pos,
            size: parent.size,
            ttl: config.explosion_frames.max(1),
        });
        if state.rng.gen::<f64>() < config.powerup_drop_chance {
            state.effects.push(Effect::PowerUp {
                pos: parent.pos,
                ttl: config.powerup_frames.max(1),
            });
        }
        let children = split_asteroid(parent, config, &mut state.rng, &mut state.ids);
        state.asteroids.extend(children);
    }
    report.asteroids_destroyed = destroyed.len() as u32;

    state.score = state.score.saturating_add(report.points);

    if contacts.ship_hit.is_some() && state.lives > 0 {
        state.lives -= 1;
        report.ship_hit = true;
        if state.lives == 0 {
            report.game_over = true;
        } else {
            state
                .ship
                .respawn(state.area.center(), config.respawn_invulnerability_frames);
        }
    }

    if !report.game_over {
        report.shield_collected = collect_powerups(state, config);
    }

    report
}

/// Pick up any shield the ship is touching.
fn collect_powerups(state: &mut SessionState, config: &EngineConfig) -> bool {
    let ship_pos = state.ship.pos;
    let reach = config.ship_radius + config.powerup_radius;
    let before = state.effects.len();
    state.effects.retain(|effect| match effect {
        Effect::PowerUp { pos, .. } => distance(*pos, ship_pos) >= reach,
        Effect::Explosion { .. } => true,
    });
    let collected = state.effects.len() < before;
    if collected {
        state.ship.invulnerability = state.ship.invulnerability.max(config.shield_frames);
    }
    collected
}
