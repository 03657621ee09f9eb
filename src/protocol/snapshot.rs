//! Decoded session snapshot
//!
//! One snapshot per server response. Snapshots are never patched: each
//! response yields a fresh value that replaces the previous one.

use glam::Vec3;
use serde::Serialize;

use super::decoder::{
    decode_bool, decode_fixed_array3, decode_float, decode_int, decode_nested_array3,
};

/// Server response field names
pub mod fields {
    pub const GAME_STARTED: &str = "game_started";
    pub const GAME_COMPLETED: &str = "game_completed";
    pub const TIMING_STARTED: &str = "timing_started";
    pub const ELAPSED_TIME: &str = "elapsed_time";
    pub const COLLISION_COUNT: &str = "collision_count";
    pub const IS_COLLIDING: &str = "is_colliding";
    pub const DISTANCE_TO_TRACK: &str = "distance_to_track";
    pub const COLLISION_THRESHOLD: &str = "collision_threshold";
    pub const TRACK_POINTS: &str = "track_points";
    pub const START_ZONE: &str = "start_zone";
    pub const END_ZONE: &str = "end_zone";
    pub const ZONE_RADIUS: &str = "zone_radius";

    pub const ALL: &[&str] = &[
        GAME_STARTED,
        GAME_COMPLETED,
        TIMING_STARTED,
        ELAPSED_TIME,
        COLLISION_COUNT,
        IS_COLLIDING,
        DISTANCE_TO_TRACK,
        COLLISION_THRESHOLD,
        TRACK_POINTS,
        START_ZONE,
        END_ZONE,
        ZONE_RADIUS,
    ];
}

/// Session phase as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum RemotePhase {
    #[default]
    NotStarted,
    /// Started, waiting for the probe to enter the start zone
    AwaitingStart,
    Timing,
    Completed,
}

impl RemotePhase {
    /// Fold the server's three flags into one phase
    ///
    /// Combinations the server should never send are normalised: without
    /// `started` nothing else counts, and `completed` wins over `timing`.
    pub fn from_flags(started: bool, timing_started: bool, completed: bool) -> Self {
        match (started, timing_started, completed) {
            (false, false, false) => RemotePhase::NotStarted,
            (false, _, _) => {
                log::warn!(
                    "snapshot: inconsistent flags (started=false, timing={timing_started}, completed={completed})"
                );
                RemotePhase::NotStarted
            }
            (true, _, true) => RemotePhase::Completed,
            (true, true, false) => RemotePhase::Timing,
            (true, false, false) => RemotePhase::AwaitingStart,
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self, RemotePhase::NotStarted)
    }
}

/// Immutable session state decoded from one server response
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub phase: RemotePhase,
    /// Seconds since the server started timing
    pub elapsed: f32,
    pub collision_count: u32,
    pub is_colliding: bool,
    /// Distance from the probe to the wire, `-1` when the server did not compute it
    pub distance_to_track: f32,
    pub collision_threshold: f32,
    /// Waypoints in server order (empty for state-only responses)
    pub track_points: Vec<Vec3>,
    pub start_zone: Option<Vec3>,
    pub end_zone: Option<Vec3>,
    pub zone_radius: f32,
}

fn non_negative(key: &str, value: f32) -> f32 {
    if value < 0.0 {
        log::warn!("snapshot: negative {key} ({value}), clamping to 0");
        0.0
    } else {
        value
    }
}

impl SessionSnapshot {
    /// Decode a response body; never fails, absent fields take defaults
    pub fn decode(payload: &str) -> Self {
        use fields::*;

        let phase = RemotePhase::from_flags(
            decode_bool(payload, GAME_STARTED),
            decode_bool(payload, TIMING_STARTED),
            decode_bool(payload, GAME_COMPLETED),
        );

        let raw_count = decode_int(payload, COLLISION_COUNT);
        let collision_count = u32::try_from(raw_count).unwrap_or_else(|_| {
            log::warn!("snapshot: collision_count {raw_count} out of range, using 0");
            0
        });

        Self {
            phase,
            elapsed: non_negative(ELAPSED_TIME, decode_float(payload, ELAPSED_TIME)),
            collision_count,
            is_colliding: decode_bool(payload, IS_COLLIDING),
            distance_to_track: decode_float(payload, DISTANCE_TO_TRACK),
            collision_threshold: decode_float(payload, COLLISION_THRESHOLD),
            track_points: decode_nested_array3(payload, TRACK_POINTS),
            start_zone: decode_fixed_array3(payload, START_ZONE),
            end_zone: decode_fixed_array3(payload, END_ZONE),
            zone_radius: non_negative(ZONE_RADIUS, decode_float(payload, ZONE_RADIUS)),
        }
    }

    /// Whether the snapshot carries enough waypoints to build a track
    pub fn has_track(&self) -> bool {
        self.track_points.len() >= crate::consts::MIN_TRACK_POINTS
    }

    /// Server distance, `None` when it was not computed
    pub fn reported_distance(&self) -> Option<f32> {
        (self.distance_to_track >= 0.0).then_some(self.distance_to_track)
    }
}
