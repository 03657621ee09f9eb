//! Buzz Wire - client-side session driver for a networked buzz-wire game
//!
//! Core modules:
//! - `protocol`: HTTP session client and the lenient snapshot decoder
//! - `track`: Track geometry (polyline, segment colliders, zone markers)
//! - `session`: Session state machine and the driver that feeds it
//! - `settings`: Driver configuration

pub mod protocol;
pub mod session;
pub mod settings;
pub mod track;

pub use protocol::{ClientError, SessionClient, SessionSnapshot};
pub use session::{SessionDriver, SessionError, SessionMachine, SessionPhase};
pub use settings::{CollisionSource, Settings};
pub use track::{GeometryArtifacts, GeometryBuilder};

use glam::Vec3;

/// Session and geometry constants
pub mod consts {
    /// Default session server (the reference server listens on port 5000)
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
    /// Per-request timeout
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: f32 = 5.0;

    /// Distance to the wire (meters) the server treats as contact
    pub const DEFAULT_COLLISION_THRESHOLD: f32 = 0.05;
    /// Minimum gap between two counted collisions (seconds)
    pub const COLLISION_COOLDOWN_SECS: f32 = 0.5;
    /// Start/end zone radius used when the server omits one
    pub const DEFAULT_ZONE_RADIUS: f32 = 0.1;

    /// Visual radius of the wire (meters)
    pub const WIRE_RADIUS: f32 = 0.005;
    /// Collider radius relative to the wire radius
    pub const COLLIDER_RADIUS_MULTIPLIER: f32 = 2.0;
    /// Zone marker radius relative to the zone radius
    pub const ZONE_MARKER_SCALE: f32 = 1.0;

    /// Waypoints needed before a track is usable
    pub const MIN_TRACK_POINTS: usize = 2;

    /// Delay between health checks while disconnected
    pub const HEALTH_RETRY_SECS: f32 = 1.0;
}

/// Segments shorter than this (squared length) are treated as a point
const DEGENERATE_SEGMENT_LEN_SQ: f32 = 1e-10;

/// Closest point to `p` on the segment `a`-`b`
#[inline]
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let seg = b - a;
    let len_sq = seg.length_squared();
    if len_sq < DEGENERATE_SEGMENT_LEN_SQ {
        return a;
    }
    let t = ((p - a).dot(seg) / len_sq).clamp(0.0, 1.0);
    a + seg * t
}

/// Distance from `p` to the segment `a`-`b`
#[inline]
pub fn distance_to_segment(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    (p - closest_point_on_segment(p, a, b)).length()
}

/// Shortest distance from `p` to a polyline, `None` without at least one segment
pub fn distance_to_track(p: Vec3, points: &[Vec3]) -> Option<f32> {
    points
        .windows(2)
        .map(|w| distance_to_segment(p, w[0], w[1]))
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
