//! Session state and the session state machine.
//!
//! `SessionState` is everything one play attempt owns; it is rebuilt on every
//! start and never reused. `GameSession` wraps it in the
//! Menu / Playing / Paused / GameOver machine and decides when the simulation
//! runs and when the final score must be committed.

use crate::collision::{self, CollisionReport};
use crate::entity::{Asteroid, Bullet, Effect, FrameInput, PlayArea, Ship};
use crate::gateway::{GatewayError, ScoreGateway, SessionGrant};
use crate::physics;
use crate::protocol::{asteroid_wire, bullet_wire, effect_wire, ship_wire, Phase, SessionStateMsg};
use crate::spawn::SpawnController;
use arcade_shared::config::EngineConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub type UserId = u32;

/// Hands out asteroid ids, unique within one session.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

/// All mutable per-attempt simulation state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub area: PlayArea,
    pub ship: Ship,
    pub asteroids: Vec<Asteroid>,
    pub bullets: Vec<Bullet>,
    pub effects: Vec<Effect>,
    pub score: u32,
    pub lives: u32,
    pub frame: u32,
    pub spawner: SpawnController,
    pub rng: ChaCha8Rng,
    pub ids: IdAllocator,
}

impl SessionState {
    /// Fresh state with the ship centered and no asteroids.
    pub fn empty(area: PlayArea, config: &EngineConfig, seed: u64) -> Self {
        Self {
            area,
            ship: Ship::spawn_at(area.center()),
            asteroids: Vec::new(),
            bullets: Vec::new(),
            effects: Vec::new(),
            score: 0,
            lives: config.starting_lives,
            frame: 0,
            spawner: SpawnController::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            ids: IdAllocator::default(),
        }
    }

    /// Fresh state with the opening wave spawned.
    pub fn new(area: PlayArea, config: &EngineConfig, seed: u64) -> Self {
        let mut state = Self::empty(area, config, seed);
        state.spawner.populate(
            &mut state.asteroids,
            &state.area,
            state.score,
            config,
            &mut state.rng,
            &mut state.ids,
        );
        state
    }

    /// Advance the simulation one frame.
    pub fn step(&mut self, input: &FrameInput, config: &EngineConfig) -> CollisionReport {
        self.frame = self.frame.saturating_add(1);

        if let Some(bullet) = physics::step_ship(&mut self.ship, input, config, &self.area) {
            self.bullets.push(bullet);
        }
        physics::integrate_asteroids(&mut self.asteroids, &self.area);
        physics::integrate_bullets(&mut self.bullets, &self.area);
        physics::age_effects(&mut self.effects);

        let report = collision::resolve(self, config);

        if !report.game_over {
            self.spawner.update(
                &mut self.asteroids,
                &self.area,
                self.score,
                config,
                &mut self.rng,
                &mut self.ids,
            );
        }
        report
    }
}

/// Transition requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Exit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {action:?} while {from:?}")]
    InvalidTransition { from: Phase, action: Action },
    #[error("session start refused: {0}")]
    StartRefused(#[from] GatewayError),
    #[error("a start request is already pending")]
    StartPending,
    #[error("invalid play area: {0}")]
    InvalidArea(String),
}

/// Final score to report through the gateway. Produced at most once per
/// session, and only for positive scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCommit {
    pub user: UserId,
    pub final_score: u32,
}

/// Result of one host tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The simulation actually advanced
    pub stepped: bool,
    pub report: CollisionReport,
    /// This tick moved the session to GameOver
    pub game_over: bool,
    pub commit: Option<ScoreCommit>,
}

pub struct GameSession {
    user: UserId,
    area: PlayArea,
    config: EngineConfig,
    seed: u64,
    phase: Phase,
    state: Option<SessionState>,
    remaining_lives: Option<u32>,
    /// Number of attempts started so far; also salts the per-attempt seed
    runs: u64,
}

impl GameSession {
    pub fn new(
        user: UserId,
        area: PlayArea,
        config: EngineConfig,
        seed: u64,
    ) -> Result<Self, SessionError> {
        area.validate().map_err(SessionError::InvalidArea)?;
        Ok(Self {
            user,
            area,
            config,
            seed,
            phase: Phase::Menu,
            state: None,
            remaining_lives: None,
            runs: 0,
        })
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn area(&self) -> PlayArea {
        self.area
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// Mutable access for hosts that script scenarios.
    pub fn state_mut(&mut self) -> Option<&mut SessionState> {
        self.state.as_mut()
    }

    pub fn remaining_lives(&self) -> Option<u32> {
        self.remaining_lives
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Ok if a start (or retry) may be requested from the current phase.
    pub fn check_start(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Menu | Phase::GameOver => Ok(()),
            from => Err(SessionError::InvalidTransition {
                from,
                action: Action::Start,
            }),
        }
    }

    /// Apply the gateway's answer to `begin_session`.
    ///
    /// On success the previous attempt is discarded and a new one starts in
    /// Playing. On failure nothing changes.
    pub fn apply_grant(
        &mut self,
        grant: Result<SessionGrant, GatewayError>,
    ) -> Result<(), SessionError> {
        self.check_start()?;
        let grant = grant?;

        self.runs += 1;
        let seed = self
            .seed
            .wrapping_add(self.runs.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self.state = Some(SessionState::new(self.area, &self.config, seed));
        self.remaining_lives = Some(grant.remaining_lives);
        self.phase = Phase::Playing;
        Ok(())
    }

    /// Ask the gateway for an attempt and start playing if granted.
    pub async fn start<G: ScoreGateway>(
        &mut self,
        gateway: &G,
    ) -> Result<SessionGrant, SessionError> {
        self.check_start()?;
        let grant = gateway.begin_session(self.user).await?;
        self.apply_grant(Ok(grant))?;
        Ok(grant)
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.flip(Phase::Playing, Phase::Paused, Action::Pause)
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.flip(Phase::Paused, Phase::Playing, Action::Resume)
    }

    fn flip(&mut self, from: Phase, to: Phase, action: Action) -> Result<(), SessionError> {
        if self.phase != from {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                action,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Back to the menu, dropping the current attempt.
    pub fn exit_to_menu(&mut self) -> Result<(), SessionError> {
        if self.phase == Phase::Menu {
            return Err(SessionError::InvalidTransition {
                from: Phase::Menu,
                action: Action::Exit,
            });
        }
        self.state = None;
        self.phase = Phase::Menu;
        Ok(())
    }

    /// Run one frame. Does nothing unless Playing.
    pub fn tick(&mut self, input: &FrameInput) -> TickOutcome {
        if self.phase != Phase::Playing {
            return TickOutcome::default();
        }
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::default();
        };

        let report = state.step(input, &self.config);
        let mut outcome = TickOutcome {
            stepped: true,
            report,
            ..TickOutcome::default()
        };

        if report.game_over {
            self.phase = Phase::GameOver;
            outcome.game_over = true;
            if state.score > 0 {
                outcome.commit = Some(ScoreCommit {
                    user: self.user,
                    final_score: state.score,
                });
            }
        }
        outcome
    }

    /// Wire view of the session.
    pub fn snapshot(&self) -> SessionStateMsg {
        let (frame, score, lives) = match &self.state {
            Some(s) => (s.frame, s.score, s.lives),
            None => (0, 0, self.config.starting_lives),
        };
        SessionStateMsg {
            phase: self.phase,
            frame,
            score,
            lives,
            remaining_lives: self.remaining_lives,
            width: self.area.width,
            height: self.area.height,
            ship: self
                .state
                .as_ref()
                .filter(|_| self.phase != Phase::GameOver)
                .map(|s| ship_wire(&s.ship)),
            asteroids: self
                .state
                .iter()
                .flat_map(|s| s.asteroids.iter().map(asteroid_wire))
                .collect(),
            bullets: self
                .state
                .iter()
                .flat_map(|s| s.bullets.iter().map(bullet_wire))
                .collect(),
            effects: self
                .state
                .iter()
                .flat_map(|s| s.effects.iter().map(effect_wire))
                .collect(),
        }
    }
}
