//! Session state machine
//!
//! Synchronous and non-blocking. Network results are applied through the
//! `apply_*` methods, each guarded by the `RequestTicket` issued when the
//! request went out; starting a session or resetting bumps the generation,
//! so responses that belong to an earlier session are dropped.

use glam::Vec3;

use super::error::SessionError;
use super::state::{SessionEvent, SessionPhase, SessionState, TrackZones, Zone};
use crate::consts::*;
use crate::protocol::{ClientError, SessionSnapshot};
use crate::settings::Settings;
use crate::track::{GeometryArtifacts, GeometryBuilder, GeometryConfig};

/// Input sampled once per control-loop tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Probe samples; the first one decides zone membership
    pub probe: Vec<Vec3>,
    /// Whether the probe is touching the wire this tick
    pub colliding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Start,
    Update,
    Track,
    State,
    Reset,
}

/// Proof of which session a request was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub generation: u64,
    pub kind: RequestKind,
}

/// Drives phase, timing and collision counting for one client
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    zones: TrackZones,
    geometry: GeometryBuilder,
    snapshot: Option<SessionSnapshot>,
    generation: u64,
    collision_cooldown: f32,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(COLLISION_COOLDOWN_SECS, GeometryConfig::default())
    }
}

impl SessionMachine {
    pub fn new(collision_cooldown: f32, geometry: GeometryConfig) -> Self {
        Self {
            state: SessionState::default(),
            zones: TrackZones::default(),
            geometry: GeometryBuilder::new(geometry),
            snapshot: None,
            generation: 0,
            collision_cooldown: collision_cooldown.max(0.0),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.collision_cooldown_secs,
            GeometryConfig::from(settings),
        )
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn zones(&self) -> &TrackZones {
        &self.zones
    }

    /// Latest decoded server response
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryArtifacts> {
        self.geometry.active()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ticket for a request issued now
    pub fn issue(&self, kind: RequestKind) -> RequestTicket {
        RequestTicket {
            generation: self.generation,
            kind,
        }
    }

    /// Ticket for a start request; needs a reachable server
    pub fn issue_start(&self) -> Result<RequestTicket, SessionError> {
        if self.state.phase == SessionPhase::Disconnected {
            return Err(SessionError::NotConnected);
        }
        Ok(self.issue(RequestKind::Start))
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        ticket.generation == self.generation
    }

    fn drop_stale(&self, ticket: &RequestTicket) -> bool {
        if self.is_current(ticket) {
            return false;
        }
        log::warn!(
            "Dropping stale {:?} response (generation {} != {})",
            ticket.kind,
            ticket.generation,
            self.generation
        );
        true
    }

    /// Result of a health check
    pub fn apply_health(&mut self, reachable: bool) -> Option<SessionEvent> {
        match (self.state.phase, reachable) {
            (SessionPhase::Disconnected, true) => {
                log::info!("Session server reachable");
                self.state.phase = SessionPhase::Idle;
                Some(SessionEvent::Connected)
            }
            (SessionPhase::Disconnected, false) => {
                log::debug!("Session server still unreachable");
                None
            }
            (_, false) => {
                log::warn!("Health check failed while {}", self.state.phase.as_str());
                None
            }
            (_, true) => None,
        }
    }

    /// Resolve the zones for a track, falling back to the end waypoints
    fn zones_for(snapshot: &SessionSnapshot) -> TrackZones {
        let radius = if snapshot.zone_radius > 0.0 {
            snapshot.zone_radius
        } else {
            log::warn!("No zone radius in track data, using {DEFAULT_ZONE_RADIUS}");
            DEFAULT_ZONE_RADIUS
        };
        let start = snapshot
            .start_zone
            .or_else(|| snapshot.track_points.first().copied());
        let end = snapshot
            .end_zone
            .or_else(|| snapshot.track_points.last().copied());
        TrackZones {
            start: start.map(|c| Zone::new(c, radius)),
            end: end.map(|c| Zone::new(c, radius)),
        }
    }

    /// Cache zones and rebuild geometry from a snapshot that has a track
    fn load_track(&mut self, snapshot: &SessionSnapshot) -> u64 {
        self.zones = Self::zones_for(snapshot);
        let radius = self.zones.start.or(self.zones.end).map_or(0.0, |z| z.radius);
        self.geometry
            .build(
                &snapshot.track_points,
                self.zones.start.map(|z| z.center),
                self.zones.end.map(|z| z.center),
                radius,
            )
            .build_id
    }

    fn require_track(snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        if snapshot.has_track() {
            Ok(())
        } else {
            let found = snapshot.track_points.len();
            log::warn!("Track data invalid: {found} waypoints");
            Err(SessionError::InsufficientWaypoints { found })
        }
    }

    /// Apply a start-session response
    ///
    /// On failure nothing changes: phase, zones and geometry stay as they were.
    pub fn apply_start(
        &mut self,
        ticket: RequestTicket,
        result: Result<SessionSnapshot, ClientError>,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        if self.drop_stale(&ticket) {
            return Ok(Vec::new());
        }
        let snapshot = result.inspect_err(|e| log::warn!("Start failed: {e}"))?;
        Self::require_track(&snapshot)?;

        let build_id = self.load_track(&snapshot);
        let waypoints = snapshot.track_points.len();
        self.generation += 1;
        self.state = SessionState::awaiting_start();
        self.snapshot = Some(snapshot);

        log::info!("Session started: {waypoints} waypoints, waiting for start zone");
        Ok(vec![SessionEvent::SessionStarted {
            build_id,
            waypoints,
        }])
    }

    /// Apply a track fetch: rebuilds geometry without touching the phase
    ///
    /// Ignored while timing so the course cannot change mid-run.
    pub fn apply_track(
        &mut self,
        ticket: RequestTicket,
        result: Result<SessionSnapshot, ClientError>,
    ) -> Result<bool, SessionError> {
        if self.drop_stale(&ticket) {
            return Ok(false);
        }
        let snapshot = result?;
        if self.state.phase == SessionPhase::Timing {
            log::warn!("Ignoring track update while timing");
            return Ok(false);
        }
        Self::require_track(&snapshot)?;
        self.load_track(&snapshot);
        self.snapshot = Some(snapshot);
        Ok(true)
    }

    /// Apply an update/state/reset response; returns whether it was applied
    pub fn apply_snapshot(
        &mut self,
        ticket: RequestTicket,
        result: Result<SessionSnapshot, ClientError>,
    ) -> Result<bool, SessionError> {
        if self.drop_stale(&ticket) {
            return Ok(false);
        }
        let snapshot = result?;
        log::trace!(
            "{:?} response: server {:?}, {} collisions",
            ticket.kind,
            snapshot.phase,
            snapshot.collision_count
        );
        self.snapshot = Some(snapshot);
        Ok(true)
    }

    /// Clear stats and wait for the start zone again, keeping the geometry
    pub fn reset(&mut self) -> Result<SessionEvent, SessionError> {
        if !self.state.phase.has_session() || self.geometry.active().is_none() {
            return Err(SessionError::NoTrack);
        }
        self.generation += 1;
        self.state.clear_stats();
        self.state.phase = SessionPhase::AwaitingStart;
        log::info!("Session reset");
        Ok(SessionEvent::Reset)
    }

    /// Advance the session by one control-loop tick of `dt` seconds
    pub fn tick(&mut self, input: &TickInput, dt: f32) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let lead = input.probe.first().copied();

        match self.state.phase {
            SessionPhase::AwaitingStart => {
                if lead.is_some_and(|p| self.zones.in_start(p)) {
                    self.state.clear_stats();
                    self.state.phase = SessionPhase::Timing;
                    log::info!("Probe entered start zone, timing started");
                    events.push(SessionEvent::TimingStarted);
                }
            }
            SessionPhase::Timing => {
                self.state.elapsed += dt.max(0.0);

                let edge = input.colliding && !self.state.was_colliding;
                self.state.was_colliding = input.colliding;
                if edge {
                    events.push(self.register_collision());
                }

                if lead.is_some_and(|p| self.zones.in_end(p)) {
                    self.state.phase = SessionPhase::Completed;
                    log::info!(
                        "Probe reached end zone: {:.2}s, {} collisions",
                        self.state.elapsed,
                        self.state.collision_count
                    );
                    events.push(SessionEvent::Completed {
                        elapsed: self.state.elapsed,
                        collisions: self.state.collision_count,
                    });
                }
            }
            SessionPhase::Disconnected | SessionPhase::Idle | SessionPhase::Completed => {}
        }

        events
    }

    /// Count a new contact unless it falls inside the cooldown window
    fn register_collision(&mut self) -> SessionEvent {
        let now = self.state.elapsed;
        let cooled_down = self
            .state
            .last_collision_at
            .is_none_or(|last| now - last >= self.collision_cooldown);

        if cooled_down {
            self.state.collision_count += 1;
            self.state.last_collision_at = Some(now);
            log::debug!("Collision #{} at {now:.2}s", self.state.collision_count);
            SessionEvent::CollisionCounted {
                count: self.state.collision_count,
            }
        } else {
            SessionEvent::CollisionSuppressed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn track_snapshot(points: Vec<Vec3>) -> SessionSnapshot {
        SessionSnapshot {
            start_zone: points.first().copied(),
            end_zone: points.last().copied(),
            track_points: points,
            zone_radius: 0.1,
            ..Default::default()
        }
    }

    fn l_track() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ]
    }

    fn input(p: Vec3, colliding: bool) -> TickInput {
        TickInput {
            probe: vec![p],
            colliding,
        }
    }

    /// Machine in AwaitingStart with the L-shaped track loaded
    fn started() -> SessionMachine {
        let mut m = SessionMachine::default();
        m.apply_health(true);
        let ticket = m.issue_start().unwrap();
        m.apply_start(ticket, Ok(track_snapshot(l_track()))).unwrap();
        m
    }

    /// Machine in Timing
    fn timing() -> SessionMachine {
        let mut m = started();
        m.tick(&input(Vec3::ZERO, false), DT);
        assert_eq!(m.phase(), SessionPhase::Timing);
        m
    }

    const MIDWAY: Vec3 = Vec3::new(0.5, 0.0, 0.0);

    #[test]
    fn test_health_check_transitions() {
        let mut m = SessionMachine::default();
        assert_eq!(m.phase(), SessionPhase::Disconnected);
        assert_eq!(m.issue_start(), Err(SessionError::NotConnected));

        assert_eq!(m.apply_health(false), None);
        assert_eq!(m.phase(), SessionPhase::Disconnected);

        assert_eq!(m.apply_health(true), Some(SessionEvent::Connected));
        assert_eq!(m.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_start_builds_geometry_and_zones() {
        let m = started();
        assert_eq!(m.phase(), SessionPhase::AwaitingStart);
        let geometry = m.geometry().unwrap();
        assert_eq!(geometry.colliders.len(), 2);
        assert_eq!(m.zones().start, Some(Zone::new(Vec3::ZERO, 0.1)));
        assert_eq!(m.generation(), 1);
    }

    #[test]
    fn test_failed_start_leaves_idle_and_geometry() {
        let mut m = SessionMachine::default();
        m.apply_health(true);

        let ticket = m.issue_start().unwrap();
        let err = m
            .apply_start(
                ticket,
                Err(ClientError::Unreachable("connection refused".into())),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::Client(_)));
        assert_eq!(m.phase(), SessionPhase::Idle);
        assert!(m.geometry().is_none());
        assert!(m.snapshot().is_none());
    }

    #[test]
    fn test_failed_restart_keeps_cached_geometry() {
        let mut m = started();
        let build_id = m.geometry().unwrap().build_id;
        let zones = *m.zones();

        let ticket = m.issue_start().unwrap();
        let _ = m.apply_start(ticket, Err(ClientError::Timeout(5.0)));
        assert_eq!(m.geometry().unwrap().build_id, build_id);
        assert_eq!(*m.zones(), zones);
        assert_eq!(m.phase(), SessionPhase::AwaitingStart);
    }

    #[test]
    fn test_start_with_one_waypoint_is_rejected() {
        let mut m = SessionMachine::default();
        m.apply_health(true);
        let ticket = m.issue_start().unwrap();
        let err = m
            .apply_start(ticket, Ok(track_snapshot(vec![Vec3::ZERO])))
            .unwrap_err();
        assert_eq!(err, SessionError::InsufficientWaypoints { found: 1 });
        assert_eq!(m.phase(), SessionPhase::Idle);
        assert!(m.geometry().is_none());
    }

    #[test]
    fn test_start_zone_boundary_is_strict() {
        let mut m = started();
        m.tick(&input(Vec3::new(0.0, 0.1, 0.0), false), DT);
        assert_eq!(m.phase(), SessionPhase::AwaitingStart);

        let events = m.tick(&input(Vec3::new(0.0, 0.1 - 1e-4, 0.0), false), DT);
        assert_eq!(events, vec![SessionEvent::TimingStarted]);
        assert_eq!(m.phase(), SessionPhase::Timing);
        assert_eq!(m.state().elapsed, 0.0);
    }

    #[test]
    fn test_no_probe_sample_does_nothing() {
        let mut m = started();
        assert!(m.tick(&TickInput::default(), DT).is_empty());
        assert_eq!(m.phase(), SessionPhase::AwaitingStart);
    }

    #[test]
    fn test_elapsed_accumulates_only_while_timing() {
        let mut m = started();
        m.tick(&input(MIDWAY, false), 1.0);
        assert_eq!(m.state().elapsed, 0.0);

        let mut m = timing();
        m.tick(&input(MIDWAY, false), 0.25);
        m.tick(&input(MIDWAY, false), 0.5);
        assert!((m.state().elapsed - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_collision_exactly_one_cooldown_later_counts() {
        let mut m = timing();
        m.tick(&input(MIDWAY, true), 0.25);
        m.tick(&input(MIDWAY, false), 0.25);
        let events = m.tick(&input(MIDWAY, true), 0.25);

        assert_eq!(m.state().elapsed - 0.25, COLLISION_COOLDOWN_SECS);
        assert_eq!(events, vec![SessionEvent::CollisionCounted { count: 2 }]);
    }

    #[test]
    fn test_collision_debounce_within_cooldown() {
        let mut m = timing();
        m.tick(&input(MIDWAY, true), 0.1);
        m.tick(&input(MIDWAY, false), 0.1);
        let events = m.tick(&input(MIDWAY, true), 0.1);
        assert_eq!(events, vec![SessionEvent::CollisionSuppressed]);
        assert_eq!(m.state().collision_count, 1);
    }

    #[test]
    fn test_collision_edges_past_cooldown_count_twice() {
        let mut m = timing();
        m.tick(&input(MIDWAY, true), 0.1);
        m.tick(&input(MIDWAY, false), 0.3);
        let events = m.tick(&input(MIDWAY, true), 0.3);
        assert_eq!(events, vec![SessionEvent::CollisionCounted { count: 2 }]);
        assert_eq!(m.state().collision_count, 2);
    }

    #[test]
    fn test_sustained_contact_counts_once() {
        let mut m = timing();
        for _ in 0..120 {
            m.tick(&input(MIDWAY, true), DT);
        }
        assert_eq!(m.state().collision_count, 1);
    }

    #[test]
    fn test_end_zone_completes_and_freezes() {
        let mut m = timing();
        m.tick(&input(MIDWAY, false), 2.0);
        let events = m.tick(&input(Vec3::new(1.0, 0.95, 0.0), false), 0.5);
        assert_eq!(
            events,
            vec![SessionEvent::Completed {
                elapsed: 2.5,
                collisions: 0
            }]
        );

        m.tick(&input(MIDWAY, true), 5.0);
        assert_eq!(m.phase(), SessionPhase::Completed);
        assert_eq!(m.state().elapsed, 2.5);
        assert_eq!(m.state().collision_count, 0);
    }

    #[test]
    fn test_reset_from_completed() {
        let mut m = timing();
        // Four contacts, each well past the cooldown
        for _ in 0..4 {
            m.tick(&input(MIDWAY, true), 1.0);
            m.tick(&input(MIDWAY, false), 1.0);
        }
        m.tick(&input(MIDWAY, false), 4.3);
        m.tick(&input(Vec3::new(1.0, 1.0, 0.0), false), 0.0);
        assert_eq!(m.phase(), SessionPhase::Completed);
        assert!((m.state().elapsed - 12.3).abs() < 1e-4);
        assert_eq!(m.state().collision_count, 4);

        let geometry_before = m.geometry().cloned();
        assert_eq!(m.reset(), Ok(SessionEvent::Reset));
        assert_eq!(m.phase(), SessionPhase::AwaitingStart);
        assert_eq!(m.state().elapsed, 0.0);
        assert_eq!(m.state().collision_count, 0);
        assert_eq!(m.geometry().cloned(), geometry_before);
    }

    #[test]
    fn test_reset_without_session_fails() {
        let mut m = SessionMachine::default();
        m.apply_health(true);
        assert_eq!(m.reset(), Err(SessionError::NoTrack));
        assert_eq!(m.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_stale_response_after_reset_is_dropped() {
        let mut m = timing();
        let ticket = m.issue(RequestKind::Update);
        m.reset().unwrap();

        let stale = SessionSnapshot {
            collision_count: 9,
            ..Default::default()
        };
        assert_eq!(m.apply_snapshot(ticket, Ok(stale)), Ok(false));
        assert_eq!(m.snapshot().unwrap().collision_count, 0);

        let fresh = m.issue(RequestKind::Update);
        assert_eq!(
            m.apply_snapshot(fresh, Ok(SessionSnapshot::default())),
            Ok(true)
        );
    }

    #[test]
    fn test_stale_start_response_is_dropped() {
        let mut m = started();
        let ticket = m.issue_start().unwrap();
        m.reset().unwrap();
        let events = m
            .apply_start(ticket, Ok(track_snapshot(vec![Vec3::ZERO, Vec3::X])))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(m.geometry().unwrap().colliders.len(), 2);
    }

    #[test]
    fn test_track_fetch_ignored_while_timing() {
        let mut m = timing();
        let ticket = m.issue(RequestKind::Track);
        let applied = m
            .apply_track(ticket, Ok(track_snapshot(vec![Vec3::ZERO, Vec3::X])))
            .unwrap();
        assert!(!applied);
        assert_eq!(m.geometry().unwrap().colliders.len(), 2);
    }

    #[test]
    fn test_track_fetch_in_idle_builds_preview() {
        let mut m = SessionMachine::default();
        m.apply_health(true);
        let ticket = m.issue(RequestKind::Track);
        assert_eq!(
            m.apply_track(ticket, Ok(track_snapshot(l_track()))),
            Ok(true)
        );
        assert_eq!(m.phase(), SessionPhase::Idle);
        assert_eq!(m.geometry().unwrap().polyline.len(), 3);
    }

    #[test]
    fn test_zones_fall_back_to_track_ends() {
        let snap = SessionSnapshot {
            track_points: l_track(),
            ..Default::default()
        };
        let zones = SessionMachine::zones_for(&snap);
        assert_eq!(
            zones.start,
            Some(Zone::new(Vec3::ZERO, DEFAULT_ZONE_RADIUS))
        );
        assert_eq!(zones.end.unwrap().center, Vec3::new(1.0, 1.0, 0.0));
    }
}
