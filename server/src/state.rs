use crate::entity::{FrameInput, PlayArea};
use crate::gateway::GrantOutcome;
use crate::protocol::{ServerMsg, SessionStateMsg};
use crate::session::{Action, GameSession, SessionError, TickOutcome, UserId};
use arcade_shared::config::EngineConfig;
use arcade_shared::protocol::Phase;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type ClientId = u32;

/// Capacity of each client's outbox.
pub const OUTBOX_CAPACITY: usize = 64;
/// Outbox slots periodic snapshots leave free for messages sent only once.
pub const ONE_SHOT_RESERVE: usize = 8;

/// What happened to a message handed to a client's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Periodic snapshot skipped because the client is behind
    Skipped,
    /// No such client, or its socket is already gone
    Gone,
    /// A one-shot message found the outbox full; the client was removed
    Evicted,
}

/// Start request waiting on the gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingStart {
    pub ticket: u64,
    pub user: UserId,
    pub area: PlayArea,
}

/// One connected client.
pub struct ClientSlot {
    pub session: GameSession,
    /// Held input, applied every tick until replaced
    pub input: FrameInput,
    pub pending: Option<PendingStart>,
    /// Messages for this client's socket only
    outbox: mpsc::Sender<ServerMsg>,
}

/// Registry of connected clients, owned by the game loop task.
pub struct ArcadeState {
    engine: EngineConfig,
    default_area: PlayArea,
    rng_seed: u64,
    max_sessions: usize,
    clients: HashMap<ClientId, ClientSlot>,
    next_client_id: ClientId,
    next_ticket: u64,
}

impl ArcadeState {
    pub fn new(
        engine: EngineConfig,
        default_area: PlayArea,
        rng_seed: u64,
        max_sessions: usize,
    ) -> Self {
        Self {
            engine,
            default_area,
            rng_seed,
            max_sessions,
            clients: HashMap::new(),
            next_client_id: 1,
            next_ticket: 1,
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientSlot> {
        self.clients.get(&id)
    }

    fn seed_for(&self, client: ClientId, ticket: u64) -> u64 {
        self.rng_seed
            ^ (client as u64).wrapping_mul(0xA24B_AED4_963E_E407)
            ^ ticket.wrapping_mul(0x9FB2_1C65_1E98_DF25)
    }

    /// Register a new client in the menu. None when the server is full.
    pub fn add_client(&mut self, outbox: mpsc::Sender<ServerMsg>) -> Option<ClientId> {
        if self.clients.len() >= self.max_sessions {
            return None;
        }
        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);
        let seed = self.seed_for(id, 0);
        let session = GameSession::new(0, self.default_area, self.engine, seed).ok()?;
        self.clients.insert(
            id,
            ClientSlot {
                session,
                input: FrameInput::default(),
                pending: None,
                outbox,
            },
        );
        Some(id)
    }

    pub fn remove_client(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    pub fn set_input(&mut self, id: ClientId, input: FrameInput) -> bool {
        match self.clients.get_mut(&id) {
            Some(slot) => {
                slot.input = input;
                true
            }
            None => false,
        }
    }

    /// Record a start request. Returns the ticket the gateway answer must
    /// carry to be applied.
    pub fn request_start(
        &mut self,
        id: ClientId,
        user: UserId,
        area: PlayArea,
    ) -> Result<Option<u64>, SessionError> {
        area.validate().map_err(SessionError::InvalidArea)?;
        let ticket = self.next_ticket;
        let Some(slot) = self.clients.get_mut(&id) else {
            return Ok(None);
        };
        if slot.pending.is_some() {
            return Err(SessionError::StartPending);
        }
        slot.session.check_start()?;
        slot.pending = Some(PendingStart { ticket, user, area });
        self.next_ticket += 1;
        Ok(Some(ticket))
    }

    /// Apply a gateway answer. None if the request is stale: the client
    /// left, exited or the ticket no longer matches.
    pub fn complete_start(&mut self, outcome: GrantOutcome) -> Option<Result<(), SessionError>> {
        let seed = self.seed_for(outcome.client, outcome.ticket);
        let engine = self.engine;
        let slot = self.clients.get_mut(&outcome.client)?;
        let pending = slot.pending.filter(|p| p.ticket == outcome.ticket)?;
        slot.pending = None;

        let grant = match outcome.result {
            Ok(grant) => grant,
            Err(err) => return Some(Err(err.into())),
        };

        let session = &slot.session;
        if session.user() != pending.user || session.area() != pending.area {
            match GameSession::new(pending.user, pending.area, engine, seed) {
                Ok(session) => slot.session = session,
                Err(err) => return Some(Err(err)),
            }
        }
        Some(slot.session.apply_grant(Ok(grant)))
    }

    pub fn pause(&mut self, id: ClientId) -> Result<(), SessionError> {
        self.slot_mut(id, Action::Pause)?.session.pause()
    }

    pub fn resume(&mut self, id: ClientId) -> Result<(), SessionError> {
        self.slot_mut(id, Action::Resume)?.session.resume()
    }

    /// Back to the menu. Also cancels a pending start.
    pub fn exit(&mut self, id: ClientId) -> Result<(), SessionError> {
        let slot = self.slot_mut(id, Action::Exit)?;
        let had_pending = slot.pending.take().is_some();
        slot.input = FrameInput::default();
        match slot.session.exit_to_menu() {
            Err(_) if had_pending => Ok(()),
            result => result,
        }
    }

    fn slot_mut(&mut self, id: ClientId, action: Action) -> Result<&mut ClientSlot, SessionError> {
        self.clients
            .get_mut(&id)
            .ok_or(SessionError::InvalidTransition {
                from: Phase::Menu,
                action,
            })
    }

    /// Tick every session once with its held input. Returns the outcomes of
    /// sessions that actually stepped.
    pub fn tick_all(&mut self) -> Vec<(ClientId, TickOutcome)> {
        self.clients
            .iter_mut()
            .filter_map(|(id, slot)| {
                let outcome = slot.session.tick(&slot.input);
                outcome.stepped.then_some((*id, outcome))
            })
            .collect()
    }

    pub fn snapshot(&self, id: ClientId) -> Option<SessionStateMsg> {
        self.clients.get(&id).map(|slot| slot.session.snapshot())
    }

    /// Queue a periodic snapshot. Never uses the reserved one-shot slots.
    pub fn offer_snapshot(&self, id: ClientId) -> Delivery {
        let Some(slot) = self.clients.get(&id) else {
            return Delivery::Gone;
        };
        if slot.outbox.capacity() <= ONE_SHOT_RESERVE {
            return Delivery::Skipped;
        }
        match slot
            .outbox
            .try_send(ServerMsg::SessionState(slot.session.snapshot()))
        {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Skipped,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    /// Queue a snapshot the client must see, e.g. a phase change.
    pub fn send_snapshot(&mut self, id: ClientId) -> Delivery {
        match self.snapshot(id) {
            Some(msg) => self.send_to(id, ServerMsg::SessionState(msg)),
            None => Delivery::Gone,
        }
    }

    /// Queue a one-shot message. A client whose outbox is full even with
    /// the reserve is removed; dropping its sender closes the socket.
    pub fn send_to(&mut self, id: ClientId, msg: ServerMsg) -> Delivery {
        let Some(slot) = self.clients.get(&id) else {
            return Delivery::Gone;
        };
        match slot.outbox.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
            Err(TrySendError::Full(_)) => {
                self.clients.remove(&id);
                Delivery::Evicted
            }
        }
    }
}
