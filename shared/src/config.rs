/// Engine tuning. All durations are in frames (one frame per tick), all
/// distances in play-area units.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Radians per frame per active turn input
    pub turn_rate: f64,
    pub thrust_accel: f64,
    /// Velocity multiplier applied every frame, in (0, 1)
    pub drag: f64,
    pub ship_radius: f64,
    pub bullet_speed: f64,
    /// Fraction of the ship's velocity added to a fired bullet
    pub bullet_inherit: f64,
    pub bullet_lifetime_frames: u32,
    pub shoot_cooldown_frames: u32,
    pub starting_lives: u32,
    pub respawn_invulnerability_frames: u32,
    pub points_per_asteroid: u32,
    /// Children are only spawned when half the parent's size exceeds this
    pub min_asteroid_size: f64,
    pub split_speedup: f64,
    pub split_jitter: f64,
    pub initial_asteroids: u32,
    pub min_asteroids: u32,
    pub max_asteroids: u32,
    pub spawn_size_min: f64,
    pub spawn_size_max: f64,
    pub asteroid_speed_min: f64,
    pub asteroid_speed_max: f64,
    /// Score needed to add 1.0 to the difficulty factor
    pub difficulty_score_step: f64,
    pub base_spawn_interval: u32,
    pub min_spawn_interval: u32,
    pub explosion_frames: u32,
    /// Probability in [0, 1] that a destroyed asteroid drops a shield
    pub powerup_drop_chance: f64,
    pub powerup_radius: f64,
    pub powerup_frames: u32,
    pub shield_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_rate: 0.05,
            thrust_accel: 0.15,
            drag: 0.98,
            ship_radius: 10.0,
            bullet_speed: 7.0,
            bullet_inherit: 0.25,
            bullet_lifetime_frames: 60,
            shoot_cooldown_frames: 15,
            starting_lives: 3,
            respawn_invulnerability_frames: 120,
            points_per_asteroid: 100,
            min_asteroid_size: 10.0,
            split_speedup: 1.2,
            split_jitter: 0.8,
            initial_asteroids: 3,
            min_asteroids: 3,
            max_asteroids: 24,
            spawn_size_min: 30.0,
            spawn_size_max: 50.0,
            asteroid_speed_min: 0.5,
            asteroid_speed_max: 1.5,
            difficulty_score_step: 2500.0,
            base_spawn_interval: 300,
            min_spawn_interval: 60,
            explosion_frames: 30,
            powerup_drop_chance: 0.05,
            powerup_radius: 12.0,
            powerup_frames: 600,
            shield_frames: 300,
        }
    }
}

fn positive_finite(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("{} must be finite and > 0", name));
    }
    Ok(())
}

fn non_negative_finite(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v < 0.0 {
        return Err(format!("{} must be finite and >= 0", name));
    }
    Ok(())
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        non_negative_finite("turn_rate", self.turn_rate)?;
        non_negative_finite("thrust_accel", self.thrust_accel)?;
        if !self.drag.is_finite() || self.drag <= 0.0 || self.drag >= 1.0 {
            return Err("drag must be in (0, 1)".to_string());
        }
        positive_finite("ship_radius", self.ship_radius)?;
        positive_finite("bullet_speed", self.bullet_speed)?;
        non_negative_finite("bullet_inherit", self.bullet_inherit)?;
        if self.bullet_lifetime_frames == 0 {
            return Err("bullet_lifetime_frames must be > 0".to_string());
        }
        if self.starting_lives == 0 {
            return Err("starting_lives must be > 0".to_string());
        }
        positive_finite("min_asteroid_size", self.min_asteroid_size)?;
        non_negative_finite("split_speedup", self.split_speedup)?;
        non_negative_finite("split_jitter", self.split_jitter)?;
        positive_finite("spawn_size_min", self.spawn_size_min)?;
        if !self.spawn_size_max.is_finite() || self.spawn_size_max < self.spawn_size_min {
            return Err("spawn_size_max must be finite and >= spawn_size_min".to_string());
        }
        non_negative_finite("asteroid_speed_min", self.asteroid_speed_min)?;
        if !self.asteroid_speed_max.is_finite() || self.asteroid_speed_max < self.asteroid_speed_min
        {
            return Err("asteroid_speed_max must be finite and >= asteroid_speed_min".to_string());
        }
        if self.max_asteroids < self.min_asteroids {
            return Err("max_asteroids must be >= min_asteroids".to_string());
        }
        if self.initial_asteroids > self.max_asteroids {
            return Err("initial_asteroids must be <= max_asteroids".to_string());
        }
        non_negative_finite("difficulty_score_step", self.difficulty_score_step)?;
        if self.min_spawn_interval == 0 || self.base_spawn_interval < self.min_spawn_interval {
            return Err("spawn intervals must satisfy 0 < min <= base".to_string());
        }
        if !(0.0..=1.0).contains(&self.powerup_drop_chance) {
            return Err("powerup_drop_chance must be in [0, 1]".to_string());
        }
        positive_finite("powerup_radius", self.powerup_radius)?;
        Ok(())
    }
}
