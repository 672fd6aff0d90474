use crate::config::ServerConfig;
use crate::entity::{FrameInput, PlayArea};
use crate::gateway::{dispatch_begin, dispatch_commit, CommitOutcome, GrantOutcome, ScoreGateway};
use crate::protocol::{
    CommitFailedMsg, ScoreCommittedMsg, ServerMsg, StartRejectedMsg, WelcomeMsg, PROTOCOL_VERSION,
};
use crate::session::{SessionError, UserId};
use crate::state::{ArcadeState, ClientId, Delivery};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};

/// Commands from client connections to the game loop
pub enum GameCommand {
    ClientJoin {
        /// Receives every message addressed to this client
        outbox: mpsc::Sender<ServerMsg>,
        /// None when the server is full
        response: oneshot::Sender<Option<(ClientId, WelcomeMsg)>>,
    },
    ClientLeave {
        id: ClientId,
    },
    Start {
        id: ClientId,
        user_id: UserId,
        area: PlayArea,
    },
    Input {
        id: ClientId,
        input: FrameInput,
    },
    Pause {
        id: ClientId,
    },
    Resume {
        id: ClientId,
    },
    Exit {
        id: ClientId,
    },
}

/// Run the main game loop. Owns all session state.
///
/// Returns once every command sender has been dropped and all dispatched
/// score commits have finished.
pub async fn run_game_loop<G>(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    server_config: ServerConfig,
    gateway: G,
) where
    G: ScoreGateway + Clone + 'static,
{
    let mut state = ArcadeState::new(
        server_config.engine,
        server_config.default_area,
        server_config.rng_seed,
        server_config.max_sessions,
    );
    let mut grants: JoinSet<GrantOutcome> = JoinSet::new();
    let mut commits: JoinSet<CommitOutcome> = JoinSet::new();

    let tick_duration = Duration::from_secs_f64(1.0 / server_config.tick_rate_hz.max(1) as f64);
    let broadcast_every_n = server_config.broadcast_every_n() as u64;
    let mut tick_count: u64 = 0;

    let mut tick_interval = tokio::time::interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                for (client, outcome) in state.tick_all() {
                    if let Some(commit) = outcome.commit {
                        tracing::info!(
                            client,
                            user = commit.user,
                            score = commit.final_score,
                            "Committing final score"
                        );
                        dispatch_commit(&mut commits, &gateway, client, commit);
                    }
                    if outcome.game_over {
                        tracing::info!(client, "Game over");
                        send_snapshot(&mut state, client);
                    }
                }

                // Periodic session_state at lower rate
                tick_count += 1;
                if tick_count % broadcast_every_n == 0 {
                    for client in state.client_ids() {
                        state.offer_snapshot(client);
                    }
                }
            }

            Some(joined) = grants.join_next() => {
                match joined {
                    Ok(outcome) => handle_grant(&mut state, outcome),
                    Err(e) => log_join_error("begin_session", e),
                }
            }

            Some(joined) = commits.join_next() => {
                match joined {
                    Ok(outcome) => handle_commit(&mut state, outcome),
                    Err(e) => log_join_error("end_session", e),
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    GameCommand::ClientJoin { outbox, response } => {
                        let joined = state.add_client(outbox).map(|id| {
                            let welcome = WelcomeMsg {
                                protocol_version: PROTOCOL_VERSION,
                                server_version: env!("CARGO_PKG_VERSION").to_string(),
                                self_id: id,
                                config: *state.engine(),
                            };
                            (id, welcome)
                        });
                        if joined.is_none() {
                            tracing::warn!("Rejecting client: {} sessions active", state.client_count());
                        }
                        let _ = response.send(joined);
                    }
                    GameCommand::ClientLeave { id } => {
                        if state.remove_client(id) {
                            tracing::info!("Client {} left", id);
                        }
                    }
                    GameCommand::Start { id, user_id, area } => {
                        match state.request_start(id, user_id, area) {
                            Ok(Some(ticket)) => {
                                tracing::debug!(client = id, user = user_id, ticket, "Start requested");
                                dispatch_begin(&mut grants, &gateway, id, ticket, user_id);
                            }
                            Ok(None) => {}
                            Err(e) => reject_start(&mut state, id, &e),
                        }
                    }
                    GameCommand::Input { id, input } => {
                        state.set_input(id, input);
                    }
                    GameCommand::Pause { id } => {
                        if state.pause(id).is_ok() {
                            send_snapshot(&mut state, id);
                        }
                    }
                    GameCommand::Resume { id } => {
                        if state.resume(id).is_ok() {
                            send_snapshot(&mut state, id);
                        }
                    }
                    GameCommand::Exit { id } => {
                        match state.exit(id) {
                            Ok(()) => send_snapshot(&mut state, id),
                            Err(e) => tracing::debug!(client = id, "Ignoring exit: {}", e),
                        }
                    }
                }
            }
        }
    }

    // Pending grants have nobody left to apply them; commits must still land
    grants.shutdown().await;
    if !commits.is_empty() {
        tracing::info!("Draining {} score commits", commits.len());
    }
    while let Some(joined) = commits.join_next().await {
        match joined {
            Ok(outcome) => handle_commit(&mut state, outcome),
            Err(e) => log_join_error("end_session", e),
        }
    }

    tracing::info!("Game loop ended");
}

/// Queue a one-shot message, disconnecting clients that stopped reading.
fn deliver(state: &mut ArcadeState, client: ClientId, msg: ServerMsg) {
    log_delivery(client, state.send_to(client, msg));
}

fn send_snapshot(state: &mut ArcadeState, client: ClientId) {
    log_delivery(client, state.send_snapshot(client));
}

fn log_delivery(client: ClientId, delivery: Delivery) {
    if delivery == Delivery::Evicted {
        tracing::warn!("Client {} stopped reading; disconnecting", client);
    }
}

fn reject_start(state: &mut ArcadeState, client: ClientId, err: &SessionError) {
    tracing::warn!(client, "Start rejected: {}", err);
    let msg = ServerMsg::StartRejected(StartRejectedMsg {
        reason: err.to_string(),
    });
    deliver(state, client, msg);
}

fn handle_grant(state: &mut ArcadeState, outcome: GrantOutcome) {
    let client = outcome.client;
    let ticket = outcome.ticket;
    match state.complete_start(outcome) {
        Some(Ok(())) => {
            tracing::info!(client, "Session started");
            send_snapshot(state, client);
        }
        Some(Err(e)) => reject_start(state, client, &e),
        None => tracing::debug!(client, ticket, "Dropping stale session grant"),
    }
}

fn handle_commit(state: &mut ArcadeState, outcome: CommitOutcome) {
    let CommitOutcome {
        client,
        commit,
        result,
    } = outcome;
    let msg = match result {
        Ok(receipt) => {
            tracing::info!(
                client,
                user = commit.user,
                coins = receipt.coins_awarded,
                new_best = receipt.new_best,
                "Score committed"
            );
            ServerMsg::ScoreCommitted(ScoreCommittedMsg {
                final_score: commit.final_score,
                coins_awarded: receipt.coins_awarded,
                total_coins: receipt.total_coins,
                new_best: receipt.new_best,
            })
        }
        Err(e) => {
            tracing::warn!(client, user = commit.user, "Score commit failed: {}", e);
            ServerMsg::CommitFailed(CommitFailedMsg {
                final_score: commit.final_score,
                reason: e.to_string(),
            })
        }
    };
    deliver(state, client, msg);
}

fn log_join_error(call: &str, err: JoinError) {
    if !err.is_cancelled() {
        tracing::error!("{} task failed: {}", call, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CommitReceipt, GatewayError, OfflineGateway, SessionGrant};
    use crate::protocol::Phase;
    use crate::state::OUTBOX_CAPACITY;
    use arcade_shared::config::EngineConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_config() -> ServerConfig {
        ServerConfig {
            tick_rate_hz: 60,
            broadcast_rate_hz: 30,
            max_sessions: 8,
            ..ServerConfig::default()
        }
    }

    /// Fast ticks, no shield drops, so a ship in a tiny area dies quickly.
    fn crowded_config() -> ServerConfig {
        ServerConfig {
            tick_rate_hz: 120,
            broadcast_rate_hz: 30,
            engine: EngineConfig {
                powerup_drop_chance: 0.0,
                ..EngineConfig::default()
            },
            ..test_config()
        }
    }

    fn tiny_area() -> PlayArea {
        PlayArea::new(40.0, 40.0)
    }

    struct Harness {
        game_tx: mpsc::Sender<GameCommand>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_loop_with<G: ScoreGateway + Clone + 'static>(
        config: ServerConfig,
        gateway: G,
    ) -> Harness {
        let (game_tx, game_rx) = mpsc::channel(64);
        let handle = tokio::spawn(run_game_loop(game_rx, config, gateway));
        Harness { game_tx, handle }
    }

    fn spawn_loop<G: ScoreGateway + Clone + 'static>(gateway: G) -> Harness {
        spawn_loop_with(test_config(), gateway)
    }

    async fn join(game_tx: &mpsc::Sender<GameCommand>) -> (ClientId, mpsc::Receiver<ServerMsg>) {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let (response, joined) = oneshot::channel();
        game_tx
            .send(GameCommand::ClientJoin { outbox, response })
            .await
            .unwrap();
        (joined.await.unwrap().unwrap().0, rx)
    }

    async fn start(game_tx: &mpsc::Sender<GameCommand>, id: ClientId, area: PlayArea) {
        game_tx
            .send(GameCommand::Start {
                id,
                user_id: 7,
                area,
            })
            .await
            .unwrap();
    }

    async fn hold_fire(game_tx: &mpsc::Sender<GameCommand>, id: ClientId) {
        let input = FrameInput {
            fire: true,
            ..FrameInput::default()
        };
        game_tx.send(GameCommand::Input { id, input }).await.unwrap();
    }

    async fn next_matching(
        rx: &mut mpsc::Receiver<ServerMsg>,
        timeout: Duration,
        pred: impl Fn(&ServerMsg) -> bool,
    ) -> ServerMsg {
        tokio::time::timeout(timeout, async {
            loop {
                let msg = rx.recv().await.expect("outbox closed");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }

    async fn next_for(
        rx: &mut mpsc::Receiver<ServerMsg>,
        pred: impl Fn(&ServerMsg) -> bool,
    ) -> ServerMsg {
        next_matching(rx, Duration::from_secs(2), pred).await
    }

    fn is_phase(phase: Phase) -> impl Fn(&ServerMsg) -> bool {
        move |msg| matches!(msg, ServerMsg::SessionState(state) if state.phase == phase)
    }

    #[derive(Clone)]
    struct SlowCommitGateway {
        delay: Duration,
        commits: Arc<AtomicU32>,
    }

    impl SlowCommitGateway {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                commits: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl ScoreGateway for SlowCommitGateway {
        async fn begin_session(&self, _user: UserId) -> Result<SessionGrant, GatewayError> {
            Ok(SessionGrant { remaining_lives: 1 })
        }

        async fn end_session(
            &self,
            _user: UserId,
            final_score: u32,
        ) -> Result<CommitReceipt, GatewayError> {
            tokio::time::sleep(self.delay).await;
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(CommitReceipt {
                coins_awarded: final_score / 100,
                total_coins: final_score / 100,
                new_best: true,
            })
        }
    }

    #[tokio::test]
    async fn start_pause_resume_exit_round_trip() {
        let h = spawn_loop(OfflineGateway::new(5, 100));
        let (id, mut rx) = join(&h.game_tx).await;

        start(&h.game_tx, id, PlayArea::default()).await;
        next_for(&mut rx, is_phase(Phase::Playing)).await;

        h.game_tx.send(GameCommand::Pause { id }).await.unwrap();
        next_for(&mut rx, is_phase(Phase::Paused)).await;

        h.game_tx.send(GameCommand::Resume { id }).await.unwrap();
        next_for(&mut rx, is_phase(Phase::Playing)).await;

        h.game_tx.send(GameCommand::Exit { id }).await.unwrap();
        next_for(&mut rx, is_phase(Phase::Menu)).await;
    }

    #[tokio::test]
    async fn refused_start_is_reported_to_client() {
        let ledger = crate::ledger::Ledger::shared(crate::ledger::LedgerConfig {
            starting_attempts: 0,
            ..Default::default()
        });
        let h = spawn_loop(crate::gateway::LedgerGateway::new(ledger));
        let (id, mut rx) = join(&h.game_tx).await;
        start(&h.game_tx, id, PlayArea::default()).await;
        match next_for(&mut rx, |m| matches!(m, ServerMsg::StartRejected(_))).await {
            ServerMsg::StartRejected(r) => assert!(r.reason.contains("no lives")),
            other => panic!("Expected StartRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn messages_only_reach_their_own_client() {
        let h = spawn_loop(OfflineGateway::new(5, 100));
        let (a, mut rx_a) = join(&h.game_tx).await;
        let (_b, mut rx_b) = join(&h.game_tx).await;

        start(&h.game_tx, a, PlayArea::default()).await;
        next_for(&mut rx_a, is_phase(Phase::Playing)).await;

        // b keeps getting its own menu snapshots and never a's session
        for _ in 0..5 {
            match next_for(&mut rx_b, |_| true).await {
                ServerMsg::SessionState(state) => assert_eq!(state.phase, Phase::Menu),
                other => panic!("Unexpected message for idle client: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn join_fails_when_full() {
        let h = spawn_loop(OfflineGateway::new(5, 100));
        let mut outboxes = Vec::new();
        for _ in 0..8 {
            outboxes.push(join(&h.game_tx).await);
        }
        let (outbox, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let (response, joined) = oneshot::channel();
        h.game_tx
            .send(GameCommand::ClientJoin { outbox, response })
            .await
            .unwrap();
        assert!(joined.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn game_over_commits_once_while_loop_keeps_running() {
        let gateway = SlowCommitGateway::new(Duration::from_millis(250));
        let commits = gateway.commits.clone();
        let h = spawn_loop_with(crowded_config(), gateway);
        let (id, mut rx) = join(&h.game_tx).await;

        start(&h.game_tx, id, tiny_area()).await;
        next_for(&mut rx, is_phase(Phase::Playing)).await;
        hold_fire(&h.game_tx, id).await;

        let game_over = is_phase(Phase::GameOver);
        let over = match next_matching(&mut rx, Duration::from_secs(15), game_over).await {
            ServerMsg::SessionState(state) => state,
            other => panic!("Expected GameOver snapshot, got {:?}", other),
        };
        assert_eq!(over.lives, 0);
        assert!(over.score > 0);

        // The commit is still in flight; periodic snapshots keep arriving
        let mut snapshots_during_commit = 0;
        let committed = loop {
            match next_for(&mut rx, |_| true).await {
                ServerMsg::SessionState(state) => {
                    assert_eq!(state.phase, Phase::GameOver);
                    snapshots_during_commit += 1;
                }
                ServerMsg::ScoreCommitted(msg) => break msg,
                other => panic!("Unexpected message: {:?}", other),
            }
        };
        assert!(snapshots_during_commit >= 2, "loop stalled during the commit");
        assert_eq!(committed.final_score, over.score);
        assert_eq!(commits.load(Ordering::SeqCst), 1);

        // No second commit follows
        tokio::time::sleep(Duration::from_millis(400)).await;
        while let Ok(msg) = rx.try_recv() {
            assert!(!matches!(msg, ServerMsg::ScoreCommitted(_)));
        }
        assert_eq!(commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reader_that_falls_behind_still_gets_one_shot_messages() {
        let gateway = SlowCommitGateway::new(Duration::from_millis(10));
        let commits = gateway.commits.clone();
        let config = ServerConfig {
            broadcast_rate_hz: 120,
            ..crowded_config()
        };
        let h = spawn_loop_with(config, gateway);
        let (id, mut rx) = join(&h.game_tx).await;

        // Held input sent right behind the start applies once it is granted
        start(&h.game_tx, id, tiny_area()).await;
        hold_fire(&h.game_tx, id).await;

        // Not reading at all: periodic snapshots saturate the outbox
        tokio::time::timeout(Duration::from_secs(15), async {
            while commits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session never committed");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut received = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            received.push(msg);
        }
        assert!(received.len() <= OUTBOX_CAPACITY);
        assert!(received.iter().any(is_phase(Phase::Playing)));
        assert!(received.iter().any(is_phase(Phase::GameOver)));
        let committed = received
            .iter()
            .filter(|m| matches!(m, ServerMsg::ScoreCommitted(_)))
            .count();
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn pending_commit_lands_after_senders_drop() {
        let gateway = SlowCommitGateway::new(Duration::from_millis(300));
        let commits = gateway.commits.clone();
        let h = spawn_loop_with(crowded_config(), gateway);
        let (id, mut rx) = join(&h.game_tx).await;

        start(&h.game_tx, id, tiny_area()).await;
        next_for(&mut rx, is_phase(Phase::Playing)).await;
        hold_fire(&h.game_tx, id).await;
        next_matching(&mut rx, Duration::from_secs(15), is_phase(Phase::GameOver)).await;
        assert_eq!(commits.load(Ordering::SeqCst), 0);

        drop(h.game_tx);
        tokio::time::timeout(Duration::from_secs(2), h.handle)
            .await
            .expect("loop should stop after draining")
            .unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);

        let mut committed = 0;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, ServerMsg::ScoreCommitted(_)) {
                committed += 1;
            }
        }
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn failed_commit_is_reported_not_retried() {
        let mut state = ArcadeState::new(EngineConfig::default(), PlayArea::default(), 1, 4);
        let (outbox, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
        let client = state.add_client(outbox).unwrap();
        handle_commit(
            &mut state,
            CommitOutcome {
                client,
                commit: crate::session::ScoreCommit {
                    user: 9,
                    final_score: 300,
                },
                result: Err(GatewayError::Unavailable("timeout".to_string())),
            },
        );
        match rx.try_recv().unwrap() {
            ServerMsg::CommitFailed(m) => {
                assert_eq!(m.final_score, 300);
                assert!(m.reason.contains("timeout"));
            }
            other => panic!("Expected CommitFailed, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn loop_stops_when_senders_drop() {
        let h = spawn_loop(OfflineGateway::new(5, 100));
        drop(h.game_tx);
        tokio::time::timeout(Duration::from_secs(2), h.handle)
            .await
            .expect("loop should stop")
            .unwrap();
    }
}
