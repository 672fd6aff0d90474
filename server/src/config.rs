use crate::entity::PlayArea;
use crate::ledger::LedgerConfig;
use arcade_shared::config::EngineConfig;
use std::env;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_rate_hz: u32,
    pub broadcast_rate_hz: u32,
    pub rng_seed: u64,
    /// Maximum concurrently connected clients
    pub max_sessions: usize,
    /// Client messages allowed per one-second window before disconnect
    pub max_inputs_per_sec: u32,
    /// Play area used when a start request does not carry one
    pub default_area: PlayArea,
    /// Largest width or height a client may request
    pub max_area_extent: f64,
    /// Use the local gateway instead of the ledger
    pub offline: bool,
    pub engine: EngineConfig,
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".to_string(),
            tick_rate_hz: 60,
            broadcast_rate_hz: 30,
            rng_seed: 42,
            max_sessions: 256,
            max_inputs_per_sec: 120,
            default_area: PlayArea::default(),
            max_area_extent: 4096.0,
            offline: false,
            engine: EngineConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `ARCADE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("ARCADE_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            tick_rate_hz: read_env_u32("ARCADE_TICK_RATE_HZ", defaults.tick_rate_hz),
            broadcast_rate_hz: read_env_u32(
                "ARCADE_BROADCAST_RATE_HZ",
                defaults.broadcast_rate_hz,
            ),
            rng_seed: read_env_u64("ARCADE_RNG_SEED", defaults.rng_seed),
            max_sessions: read_env_usize("ARCADE_MAX_SESSIONS", defaults.max_sessions),
            offline: read_env_bool("ARCADE_OFFLINE", defaults.offline),
            ..defaults
        }
    }

    /// Validate configuration values. Returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".to_string());
        }
        if self.broadcast_rate_hz == 0 {
            return Err("broadcast_rate_hz must be > 0".to_string());
        }
        if self.broadcast_rate_hz > self.tick_rate_hz {
            return Err(format!(
                "broadcast_rate_hz ({}) must be <= tick_rate_hz ({})",
                self.broadcast_rate_hz, self.tick_rate_hz
            ));
        }
        if self.max_sessions == 0 {
            return Err("max_sessions must be > 0".to_string());
        }
        if self.max_inputs_per_sec == 0 {
            return Err("max_inputs_per_sec must be > 0".to_string());
        }
        if !self.max_area_extent.is_finite() || self.max_area_extent <= 0.0 {
            return Err("max_area_extent must be finite and > 0".to_string());
        }
        self.default_area.validate()?;
        self.check_area(&self.default_area)?;
        self.engine.validate()?;
        self.ledger.validate()?;
        Ok(())
    }

    /// Play area for a start request, falling back to the default extent
    /// for missing dimensions.
    pub fn area_for(&self, width: Option<f64>, height: Option<f64>) -> Result<PlayArea, String> {
        let area = PlayArea::new(
            width.unwrap_or(self.default_area.width),
            height.unwrap_or(self.default_area.height),
        );
        area.validate()?;
        self.check_area(&area)?;
        Ok(area)
    }

    fn check_area(&self, area: &PlayArea) -> Result<(), String> {
        if area.width > self.max_area_extent || area.height > self.max_area_extent {
            return Err(format!(
                "play area {}x{} exceeds max extent {}",
                area.width, area.height, self.max_area_extent
            ));
        }
        Ok(())
    }

    pub fn broadcast_every_n(&self) -> u32 {
        (self.tick_rate_hz / self.broadcast_rate_hz.max(1)).max(1)
    }
}

fn read_env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
