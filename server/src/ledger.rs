//! Authoritative per-user account store behind the minigame API.
//!
//! Tracks attempts (`vidas`), coins and best score. In-memory only; every
//! process restart starts from an empty ledger.

use crate::session::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Account-side tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// Attempts granted to a user the first time they are seen
    pub starting_attempts: u32,
    /// Score points per coin awarded
    pub points_per_coin: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_attempts: 5,
            points_per_coin: 100,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.points_per_coin == 0 {
            return Err("points_per_coin must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub lives: u32,
    pub coins: u32,
    pub best_score: u32,
}

/// Outcome of a saved score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreReceipt {
    pub coins_awarded: u32,
    pub total_coins: u32,
    pub new_best: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("user {0} has no lives left")]
    NoLivesLeft(UserId),
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("score must be greater than zero")]
    InvalidScore,
}

impl LedgerError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NoLivesLeft(_) => "no_lives_left",
            LedgerError::UnknownUser(_) => "unknown_user",
            LedgerError::InvalidScore => "invalid_score",
        }
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    config: LedgerConfig,
    users: HashMap<UserId, UserRecord>,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            users: HashMap::new(),
        }
    }

    pub fn shared(config: LedgerConfig) -> SharedLedger {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn fresh_record(&self) -> UserRecord {
        UserRecord {
            lives: self.config.starting_attempts,
            ..UserRecord::default()
        }
    }

    /// Consume one attempt. Returns the attempts left afterwards.
    pub fn start_game(&mut self, user: UserId) -> Result<u32, LedgerError> {
        let fresh = self.fresh_record();
        let record = self.users.entry(user).or_insert(fresh);
        if record.lives == 0 {
            return Err(LedgerError::NoLivesLeft(user));
        }
        record.lives -= 1;
        Ok(record.lives)
    }

    /// Convert a final score into coins and track the best score.
    pub fn save_score(&mut self, user: UserId, score: u32) -> Result<ScoreReceipt, LedgerError> {
        if score == 0 {
            return Err(LedgerError::InvalidScore);
        }
        let points_per_coin = self.config.points_per_coin.max(1);
        let record = self
            .users
            .get_mut(&user)
            .ok_or(LedgerError::UnknownUser(user))?;

        let coins_awarded = score / points_per_coin;
        record.coins = record.coins.saturating_add(coins_awarded);
        let new_best = score > record.best_score;
        if new_best {
            record.best_score = score;
        }
        Ok(ScoreReceipt {
            coins_awarded,
            total_coins: record.coins,
            new_best,
        })
    }

    /// Current stats; users never seen before report a fresh account.
    pub fn user_stats(&self, user: UserId) -> UserRecord {
        self.users
            .get(&user)
            .copied()
            .unwrap_or_else(|| self.fresh_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_creates_account_and_consumes_attempt() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        assert_eq!(ledger.start_game(1), Ok(4));
        assert_eq!(ledger.start_game(1), Ok(3));
        assert_eq!(ledger.user_stats(1).lives, 3);
    }

    #[test]
    fn start_fails_when_attempts_run_out() {
        let mut ledger = Ledger::new(LedgerConfig {
            starting_attempts: 1,
            ..LedgerConfig::default()
        });
        assert_eq!(ledger.start_game(2), Ok(0));
        assert_eq!(ledger.start_game(2), Err(LedgerError::NoLivesLeft(2)));
        assert_eq!(ledger.user_stats(2).lives, 0);
    }

    #[test]
    fn save_score_awards_coins_and_tracks_best() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        ledger.start_game(3).unwrap();

        let receipt = ledger.save_score(3, 750).unwrap();
        assert_eq!(receipt.coins_awarded, 7);
        assert_eq!(receipt.total_coins, 7);
        assert!(receipt.new_best);

        let receipt = ledger.save_score(3, 300).unwrap();
        assert_eq!(receipt.coins_awarded, 3);
        assert_eq!(receipt.total_coins, 10);
        assert!(!receipt.new_best);

        let stats = ledger.user_stats(3);
        assert_eq!(stats.best_score, 750);
        assert_eq!(stats.coins, 10);
    }

    #[test]
    fn zero_score_is_rejected() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        ledger.start_game(4).unwrap();
        assert_eq!(ledger.save_score(4, 0), Err(LedgerError::InvalidScore));
        assert_eq!(ledger.user_stats(4).coins, 0);
    }

    #[test]
    fn unknown_user_cannot_save() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        assert_eq!(ledger.save_score(9, 100), Err(LedgerError::UnknownUser(9)));
    }

    #[test]
    fn stats_for_unseen_user_do_not_create_account() {
        let mut ledger = Ledger::new(LedgerConfig::default());
        let stats = ledger.user_stats(11);
        assert_eq!(stats.lives, 5);
        assert_eq!(stats.coins, 0);
        assert_eq!(ledger.save_score(11, 100), Err(LedgerError::UnknownUser(11)));
    }

    #[test]
    fn zero_points_per_coin_fails_validation() {
        let config = LedgerConfig {
            points_per_coin: 0,
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(LedgerConfig::default().validate().is_ok());
    }
}
