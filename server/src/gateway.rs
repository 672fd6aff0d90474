//! Boundary to the account backend: session grants and score commits.
//!
//! Hosts never await a gateway call on the tick path. `dispatch_begin` and
//! `dispatch_commit` hand the futures to a `JoinSet` the host drains between
//! ticks.

use crate::ledger::{LedgerError, SharedLedger};
use crate::session::{ScoreCommit, UserId};
use crate::state::ClientId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Attempt granted by `begin_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGrant {
    pub remaining_lives: u32,
}

/// Answer to a successful `end_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub coins_awarded: u32,
    pub total_coins: u32,
    pub new_best: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("no lives left")]
    NoLivesLeft,
    #[error("unknown user")]
    UnknownUser,
    #[error("score must be greater than zero")]
    InvalidScore,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NoLivesLeft(_) => GatewayError::NoLivesLeft,
            LedgerError::UnknownUser(_) => GatewayError::UnknownUser,
            LedgerError::InvalidScore => GatewayError::InvalidScore,
        }
    }
}

pub trait ScoreGateway: Send + Sync {
    /// Reserve one attempt for `user`.
    fn begin_session(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<SessionGrant, GatewayError>> + Send;

    /// Report a finished session. Called at most once per session, and only
    /// with a positive score.
    fn end_session(
        &self,
        user: UserId,
        final_score: u32,
    ) -> impl Future<Output = Result<CommitReceipt, GatewayError>> + Send;
}

/// Online gateway backed by the server's own ledger.
#[derive(Clone)]
pub struct LedgerGateway {
    ledger: SharedLedger,
}

impl LedgerGateway {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }
}

impl ScoreGateway for LedgerGateway {
    async fn begin_session(&self, user: UserId) -> Result<SessionGrant, GatewayError> {
        let remaining_lives = self.ledger.lock().await.start_game(user)?;
        Ok(SessionGrant { remaining_lives })
    }

    async fn end_session(
        &self,
        user: UserId,
        final_score: u32,
    ) -> Result<CommitReceipt, GatewayError> {
        let receipt = self.ledger.lock().await.save_score(user, final_score)?;
        Ok(CommitReceipt {
            coins_awarded: receipt.coins_awarded,
            total_coins: receipt.total_coins,
            new_best: receipt.new_best,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LocalRecord {
    coins: u32,
    best_score: u32,
}

/// Local-only gateway: attempts are never consumed, coins and best score
/// live in memory.
#[derive(Clone)]
pub struct OfflineGateway {
    starting_attempts: u32,
    points_per_coin: u32,
    records: Arc<Mutex<HashMap<UserId, LocalRecord>>>,
}

impl OfflineGateway {
    pub fn new(starting_attempts: u32, points_per_coin: u32) -> Self {
        Self {
            starting_attempts,
            points_per_coin: points_per_coin.max(1),
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl ScoreGateway for OfflineGateway {
    async fn begin_session(&self, _user: UserId) -> Result<SessionGrant, GatewayError> {
        if self.starting_attempts == 0 {
            return Err(GatewayError::NoLivesLeft);
        }
        Ok(SessionGrant {
            remaining_lives: self.starting_attempts,
        })
    }

    async fn end_session(
        &self,
        user: UserId,
        final_score: u32,
    ) -> Result<CommitReceipt, GatewayError> {
        if final_score == 0 {
            return Err(GatewayError::InvalidScore);
        }
        let mut records = self.records.lock().await;
        let record = records.entry(user).or_default();
        let coins_awarded = final_score / self.points_per_coin;
        record.coins = record.coins.saturating_add(coins_awarded);
        let new_best = final_score > record.best_score;
        if new_best {
            record.best_score = final_score;
        }
        Ok(CommitReceipt {
            coins_awarded,
            total_coins: record.coins,
            new_best,
        })
    }
}

/// Result of a `begin_session` dispatched for a client's start request.
#[derive(Debug)]
pub struct GrantOutcome {
    pub client: ClientId,
    /// Identifies the start request; stale tickets are dropped by the host
    pub ticket: u64,
    pub result: Result<SessionGrant, GatewayError>,
}

/// Result of a dispatched `end_session`.
#[derive(Debug)]
pub struct CommitOutcome {
    pub client: ClientId,
    pub commit: ScoreCommit,
    pub result: Result<CommitReceipt, GatewayError>,
}

pub fn dispatch_begin<G>(
    tasks: &mut JoinSet<GrantOutcome>,
    gateway: &G,
    client: ClientId,
    ticket: u64,
    user: UserId,
) where
    G: ScoreGateway + Clone + 'static,
{
    let gateway = gateway.clone();
    tasks.spawn(async move {
        let result = gateway.begin_session(user).await;
        GrantOutcome {
            client,
            ticket,
            result,
        }
    });
}

pub fn dispatch_commit<G>(
    tasks: &mut JoinSet<CommitOutcome>,
    gateway: &G,
    client: ClientId,
    commit: ScoreCommit,
) where
    G: ScoreGateway + Clone + 'static,
{
    let gateway = gateway.clone();
    tasks.spawn(async move {
        let result = gateway.end_session(commit.user, commit.final_score).await;
        CommitOutcome {
            client,
            commit,
            result,
        }
    });
}
