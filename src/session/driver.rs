//! Session driver: the control loop's view of client + state machine
//!
//! Request/response operations (`connect`, `start_session`, `reset`, ...) are
//! async and suspend only their caller. Position updates are different: the
//! per-tick `tick` must never block, so updates are spawned onto the Tokio
//! runtime and their results collected on a later tick. At most one update
//! is in flight, which keeps responses applied in issue order.

use glam::Vec3;
use tokio::sync::oneshot;

use super::error::SessionError;
use super::machine::{RequestKind, RequestTicket, SessionMachine, TickInput};
use super::state::{SessionEvent, SessionPhase};
use crate::protocol::{ClientError, SessionClient, SessionSnapshot};
use crate::settings::{CollisionSource, Settings};

type UpdateResult = Result<SessionSnapshot, ClientError>;

/// A position update whose response has not been applied yet
#[derive(Debug)]
struct PendingUpdate {
    ticket: RequestTicket,
    rx: oneshot::Receiver<UpdateResult>,
}

/// Owns the protocol client and the state machine; the single writer of
/// session state
#[derive(Debug)]
pub struct SessionDriver {
    client: SessionClient,
    machine: SessionMachine,
    settings: Settings,
    pending: Option<PendingUpdate>,
    last_error: Option<String>,
}

impl SessionDriver {
    pub fn new(settings: &Settings) -> Result<Self, SessionError> {
        let client = SessionClient::from_settings(settings)?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: SessionClient, settings: &Settings) -> Self {
        Self {
            client,
            machine: SessionMachine::from_settings(settings),
            settings: settings.clone(),
            pending: None,
            last_error: None,
        }
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Status line for the most recent failure, cleared by the next success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_pending_update(&self) -> bool {
        self.pending.is_some()
    }

    fn record<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.status_message()),
        }
        result
    }

    /// One health check
    pub async fn check_health(&mut self) -> bool {
        let reachable = self.client.health_check().await;
        self.machine.apply_health(reachable);
        self.last_error = if reachable {
            None
        } else {
            let err = ClientError::Unreachable(self.client.base_url().to_string());
            Some(err.status_message())
        };
        reachable
    }

    /// Repeat health checks until the server answers
    ///
    /// Waits `health_retry_secs` between attempts; `None` retries forever.
    pub async fn connect(&mut self, max_attempts: Option<u32>) -> bool {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if self.check_health().await {
                return true;
            }
            if max_attempts.is_some_and(|max| attempt >= max) {
                log::warn!(
                    "Session server at {} unreachable after {attempt} attempts",
                    self.client.base_url()
                );
                return false;
            }
            tokio::time::sleep(self.settings.health_retry_interval()).await;
        }
    }

    /// Start a new session and load its track
    pub async fn start_session(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let result = match self.machine.issue_start() {
            Ok(ticket) => {
                let response = self
                    .client
                    .start_session(self.settings.collision_threshold)
                    .await;
                self.machine.apply_start(ticket, response)
            }
            Err(e) => Err(e),
        };
        self.record(result)
    }

    /// Fetch the track and rebuild geometry (not while timing)
    pub async fn fetch_track(&mut self) -> Result<bool, SessionError> {
        let ticket = self.machine.issue(RequestKind::Track);
        let response = self.client.fetch_track().await;
        let result = self.machine.apply_track(ticket, response);
        self.record(result)
    }

    /// Fetch the server's current state
    pub async fn refresh_state(&mut self) -> Result<bool, SessionError> {
        let ticket = self.machine.issue(RequestKind::State);
        let response = self.client.fetch_state().await;
        let result = self.machine.apply_snapshot(ticket, response);
        self.record(result)
    }

    /// Reset locally, then tell the server
    ///
    /// The local reset happens first and stands even if the server call
    /// fails; any update still in flight belongs to the old generation and
    /// is dropped when it lands.
    pub async fn reset(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let event = match self.machine.reset() {
            Ok(event) => event,
            Err(e) => return self.record(Err(e)),
        };

        let ticket = self.machine.issue(RequestKind::Reset);
        let response = self.client.reset().await;
        let result = self
            .machine
            .apply_snapshot(ticket, response)
            .map(|_| vec![event]);
        self.record(result)
    }

    /// Advance one control-loop tick; never blocks
    ///
    /// `probe` holds this tick's samples (the first decides zone entry) and
    /// `external_colliding` is the presentation layer's contact flag.
    pub fn tick(&mut self, probe: &[Vec3], external_colliding: bool, dt: f32) -> Vec<SessionEvent> {
        self.collect_update();

        let colliding = self.collision_flag(probe, external_colliding);
        let input = TickInput {
            probe: probe.to_vec(),
            colliding,
        };
        let events = self.machine.tick(&input, dt);

        if self.machine.phase().is_live() && self.pending.is_none() && !probe.is_empty() {
            self.spawn_update(input.probe);
        }
        events
    }

    fn collision_flag(&self, probe: &[Vec3], external: bool) -> bool {
        let source = self.settings.collision_source;
        let server = matches!(source, CollisionSource::Server | CollisionSource::Any)
            && self.machine.snapshot().is_some_and(|s| s.is_colliding);
        let local = matches!(source, CollisionSource::Local | CollisionSource::Any)
            && self.machine.geometry().is_some_and(|g| g.touches(probe));
        source.resolve(external, server, local)
    }

    /// Apply the in-flight update if its response has arrived
    fn collect_update(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let result = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                log::warn!("Position update task ended without a result");
                self.pending = None;
                return;
            }
        };
        let ticket = pending.ticket;
        self.pending = None;

        let applied = self.machine.apply_snapshot(ticket, result);
        if let Err(e) = self.record(applied) {
            log::warn!("Position update failed: {e}");
        }
    }

    fn spawn_update(&mut self, samples: Vec<Vec3>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime, position update skipped");
            return;
        };

        let ticket = self.machine.issue(RequestKind::Update);
        let client = self.client.clone();
        let (tx, rx) = oneshot::channel();
        runtime.spawn(async move {
            let result = match samples.as_slice() {
                [single] => client.push_position(*single).await,
                many => client.push_positions(many).await,
            };
            let _ = tx.send(result);
        });
        self.pending = Some(PendingUpdate { ticket, rx });
    }
}
