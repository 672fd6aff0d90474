//! Asteroid population: initial wave, timed edge spawns and the floor.

use crate::entity::{Asteroid, PlayArea};
use crate::session::IdAllocator;
use crate::vec2::{normalize, scale, sub, vec2};
use arcade_shared::config::EngineConfig;
use rand::Rng;

/// Difficulty multiplier for the given score. Always finite and >= 1.
pub fn difficulty(score: u32, config: &EngineConfig) -> f64 {
    let step = if config.difficulty_score_step.is_finite() {
        config.difficulty_score_step.max(1.0)
    } else {
        1.0
    };
    1.0 + score as f64 / step
}

/// Frames between timed spawns at the given score; shrinks as score grows.
pub fn spawn_interval(score: u32, config: &EngineConfig) -> u32 {
    let scaled = config.base_spawn_interval as f64 / difficulty(score, config);
    (scaled.floor() as u32).max(config.min_spawn_interval).max(1)
}

/// Frame timer driving timed spawns.
#[derive(Debug, Clone, Default)]
pub struct SpawnController {
    timer: u32,
}

impl SpawnController {
    pub fn new() -> Self {
        Self { timer: 0 }
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// Spawn the opening wave.
    pub fn populate(
        &mut self,
        asteroids: &mut Vec<Asteroid>,
        area: &PlayArea,
        score: u32,
        config: &EngineConfig,
        rng: &mut impl Rng,
        ids: &mut IdAllocator,
    ) {
        self.timer = 0;
        for _ in 0..config.initial_asteroids {
            asteroids.push(spawn_at_edge(area, score, config, rng, ids));
        }
    }

    /// Advance one frame. Returns how many asteroids were spawned.
    pub fn update(
        &mut self,
        asteroids: &mut Vec<Asteroid>,
        area: &PlayArea,
        score: u32,
        config: &EngineConfig,
        rng: &mut impl Rng,
        ids: &mut IdAllocator,
    ) -> u32 {
        let mut spawned = 0;

        self.timer = self.timer.saturating_add(1);
        if self.timer >= spawn_interval(score, config) {
            self.timer = 0;
            if (asteroids.len() as u32) < config.max_asteroids {
                asteroids.push(spawn_at_edge(area, score, config, rng, ids));
                spawned += 1;
            }
        }

        // Floor: replace immediately regardless of the timer
        while (asteroids.len() as u32) < config.min_asteroids {
            asteroids.push(spawn_at_edge(area, score, config, rng, ids));
            spawned += 1;
        }

        spawned
    }
}

/// New asteroid on a random edge, heading for the central half of the area.
pub fn spawn_at_edge(
    area: &PlayArea,
    score: u32,
    config: &EngineConfig,
    rng: &mut impl Rng,
    ids: &mut IdAllocator,
) -> Asteroid {
    let pos = match rng.gen_range(0..4) {
        0 => vec2(rng.gen::<f64>() * area.width, 0.0),
        1 => vec2(rng.gen::<f64>() * area.width, next_below(area.height)),
        2 => vec2(0.0, rng.gen::<f64>() * area.height),
        _ => vec2(next_below(area.width), rng.gen::<f64>() * area.height),
    };

    let target = vec2(
        area.width * (0.25 + 0.5 * rng.gen::<f64>()),
        area.height * (0.25 + 0.5 * rng.gen::<f64>()),
    );
    let dir = normalize(sub(target, pos));
    let speed = lerp(
        config.asteroid_speed_min,
        config.asteroid_speed_max,
        rng.gen::<f64>(),
    ) * difficulty(score, config);
    let size = lerp(config.spawn_size_min, config.spawn_size_max, rng.gen::<f64>());

    Asteroid {
        id: ids.next_id(),
        pos,
        vel: scale(dir, speed),
        size,
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Largest coordinate strictly inside `[0, extent)`.
fn next_below(extent: f64) -> f64 {
    (extent - 1e-6).max(0.0)
}
