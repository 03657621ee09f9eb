//! Session state and core types
//!
//! Everything the state machine mutates lives in `SessionState`.

use glam::Vec3;
use serde::Serialize;

/// Current phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SessionPhase {
    /// No successful health check yet
    #[default]
    Disconnected,
    /// Server reachable, no session started
    Idle,
    /// Track loaded, waiting for the probe to enter the start zone
    AwaitingStart,
    /// Clock running
    Timing,
    /// End zone reached, stats frozen
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Idle => "idle",
            SessionPhase::AwaitingStart => "awaiting start",
            SessionPhase::Timing => "timing",
            SessionPhase::Completed => "completed",
        }
    }

    /// Phases that carry a loaded track
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            SessionPhase::AwaitingStart | SessionPhase::Timing | SessionPhase::Completed
        )
    }

    /// Phases in which probe samples are pushed to the server
    pub fn is_live(&self) -> bool {
        matches!(self, SessionPhase::AwaitingStart | SessionPhase::Timing)
    }
}

/// Spherical start/end region
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Zone {
    pub center: Vec3,
    pub radius: f32,
}

impl Zone {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Strictly inside: a point exactly on the boundary is outside
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.distance(self.center) < self.radius
    }
}

/// Start and end zones of the loaded track
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TrackZones {
    pub start: Option<Zone>,
    pub end: Option<Zone>,
}

impl TrackZones {
    pub fn in_start(&self, p: Vec3) -> bool {
        self.start.is_some_and(|z| z.contains(p))
    }

    pub fn in_end(&self, p: Vec3) -> bool {
        self.end.is_some_and(|z| z.contains(p))
    }
}

/// Something the presentation layer may want to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    Connected,
    SessionStarted { build_id: u64, waypoints: usize },
    TimingStarted,
    /// A new contact that counted
    CollisionCounted { count: u32 },
    /// A new contact inside the cooldown window
    CollisionSuppressed,
    Completed { elapsed: f32, collisions: u32 },
    Reset,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "connected to session server"),
            SessionEvent::SessionStarted {
                build_id,
                waypoints,
            } => write!(
                f,
                "session started (track #{build_id}, {waypoints} waypoints)"
            ),
            SessionEvent::TimingStarted => write!(f, "start zone reached, timer running"),
            SessionEvent::CollisionCounted { count } => write!(f, "collision #{count}"),
            SessionEvent::CollisionSuppressed => {
                write!(f, "collision within cooldown, not counted")
            }
            SessionEvent::Completed {
                elapsed,
                collisions,
            } => write!(f, "finished in {elapsed:.2}s with {collisions} collisions"),
            SessionEvent::Reset => write!(f, "session reset"),
        }
    }
}

/// Mutable session state, owned by the state machine
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// Seconds since the probe entered the start zone
    pub elapsed: f32,
    pub collision_count: u32,
    /// `elapsed` at the last counted collision
    pub last_collision_at: Option<f32>,
    /// Collision flag seen on the previous tick
    pub was_colliding: bool,
}

impl SessionState {
    /// Fresh state for a session waiting on the start zone
    pub fn awaiting_start() -> Self {
        Self {
            phase: SessionPhase::AwaitingStart,
            ..Default::default()
        }
    }

    /// Clear timing and collision stats, keeping the phase
    pub fn clear_stats(&mut self) {
        self.elapsed = 0.0;
        self.collision_count = 0;
        self.last_collision_at = None;
        self.was_colliding = false;
    }
}
