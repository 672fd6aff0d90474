use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::EngineConfig;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Session phase as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Menu,
    Playing,
    Paused,
    GameOver,
}

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "session_state")]
    SessionState(SessionStateMsg),
    #[serde(rename = "start_rejected")]
    StartRejected(StartRejectedMsg),
    #[serde(rename = "score_committed")]
    ScoreCommitted(ScoreCommittedMsg),
    #[serde(rename = "commit_failed")]
    CommitFailed(CommitFailedMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub server_version: String,
    pub self_id: u32,
    pub config: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SessionStateMsg {
    pub phase: Phase,
    pub frame: u32,
    pub score: u32,
    pub lives: u32,
    /// Attempts left on the account, as reported by the gateway
    pub remaining_lives: Option<u32>,
    pub width: f64,
    pub height: f64,
    pub ship: Option<ShipWire>,
    pub asteroids: Vec<AsteroidWire>,
    pub bullets: Vec<BulletWire>,
    pub effects: Vec<EffectWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct ShipWire {
    pub pos: [f64; 2],
    pub vel: [f64; 2],
    pub heading: f64,
    pub thrusting: bool,
    pub invulnerable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct AsteroidWire {
    pub id: u32,
    pub pos: [f64; 2],
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct BulletWire {
    pub pos: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Explosion,
    Shield,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct EffectWire {
    pub kind: EffectKind,
    pub pos: [f64; 2],
    pub size: f64,
    pub ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct StartRejectedMsg {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct ScoreCommittedMsg {
    pub final_score: u32,
    pub coins_awarded: u32,
    pub total_coins: u32,
    pub new_best: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct CommitFailedMsg {
    pub final_score: u32,
    pub reason: String,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Menu -> Playing, or GameOver -> Playing (retry)
    #[serde(rename = "start", rename_all = "camelCase")]
    Start {
        user_id: u32,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
    },
    /// Held input; stays in effect until the next `input` message or an
    /// `exit`. Input sent while a start is pending carries into the session.
    #[serde(rename = "input", rename_all = "camelCase")]
    Input {
        #[serde(default)]
        turn_left: bool,
        #[serde(default)]
        turn_right: bool,
        #[serde(default)]
        thrust: bool,
        #[serde(default)]
        fire: bool,
    },
    #[serde(rename = "pause")]
    Pause,
    #[serde(rename = "resume")]
    Resume,
    /// Back to the menu, discarding the running session
    #[serde(rename = "exit")]
    Exit,
}

// === Minigame REST contract ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    pub vidas_restantes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "PascalCase")]
pub struct SaveScoreRequest {
    pub user_id: u32,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct SaveScoreResponse {
    pub monedas_ganadas: u32,
    pub total_monedas: u32,
    #[serde(default)]
    pub nuevo_record: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub vidas: u32,
    pub monedas: u32,
    pub mejor_score: u32,
}

// === Conversion helpers ===

/// Round to 2 decimal places (sub-pixel precision is enough for drawing)
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
