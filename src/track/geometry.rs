//! Track geometry: waypoints and zones into renderable and collidable artifacts
//!
//! A track of N waypoints becomes one polyline, N-1 capsule colliders (one per
//! consecutive pair, end caps included in the length) and a marker per zone.
//! The builder keeps at most one artifact set alive and disposes it before
//! every rebuild.

use glam::{Quat, Vec3};
use serde::Serialize;

use super::vertex::{self, LineVertex, colors};
use crate::consts::*;
use crate::settings::Settings;

/// Collision classification for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColliderTag {
    Track,
}

/// Capsule around one track segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCollider {
    /// Index of the segment's first waypoint
    pub index: usize,
    /// Segment midpoint
    pub center: Vec3,
    /// Unit vector from the segment start to its end
    pub direction: Vec3,
    pub radius: f32,
    /// Segment length plus both end caps
    pub length: f32,
    pub tag: ColliderTag,
}

impl SegmentCollider {
    pub fn new(index: usize, start: Vec3, end: Vec3, radius: f32) -> Self {
        let seg = end - start;
        Self {
            index,
            center: (start + end) * 0.5,
            // Zero-length segments still need an axis
            direction: seg.normalize_or(Vec3::Y),
            radius,
            length: seg.length() + 2.0 * radius,
            tag: ColliderTag::Track,
        }
    }

    /// Rotation taking the capsule's local up axis onto its direction
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_arc(Vec3::Y, self.direction)
    }

    /// Length of the core segment (without caps)
    pub fn segment_length(&self) -> f32 {
        (self.length - 2.0 * self.radius).max(0.0)
    }

    /// Endpoints of the core segment
    pub fn endpoints(&self) -> (Vec3, Vec3) {
        let half = self.direction * (self.segment_length() * 0.5);
        (self.center - half, self.center + half)
    }

    /// Whether `p` lies inside the capsule
    pub fn contains(&self, p: Vec3) -> bool {
        let (a, b) = self.endpoints();
        crate::distance_to_segment(p, a, b) < self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZoneKind {
    Start,
    End,
}

/// Visual marker at a zone center
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneMarker {
    pub kind: ZoneKind,
    pub center: Vec3,
    pub radius: f32,
}

impl ZoneMarker {
    pub fn color(&self) -> [f32; 4] {
        match self.kind {
            ZoneKind::Start => colors::START_ZONE,
            ZoneKind::End => colors::END_ZONE,
        }
    }

    /// Outline vertices (ring around the vertical axis)
    pub fn outline(&self, segments: u32) -> Vec<LineVertex> {
        vertex::ring(self.center, Vec3::Y, self.radius, self.color(), segments)
    }
}

/// Why a build produced no geometry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GeometryDiagnostic {
    InsufficientWaypoints { found: usize },
}

impl std::fmt::Display for GeometryDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryDiagnostic::InsufficientWaypoints { found } => write!(
                f,
                "track needs at least {MIN_TRACK_POINTS} waypoints, got {found}"
            ),
        }
    }
}

/// One track's worth of built geometry
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GeometryArtifacts {
    /// Increases with every build, so holders can spot a replaced set
    pub build_id: u64,
    /// Waypoints in order
    pub polyline: Vec<Vec3>,
    pub colliders: Vec<SegmentCollider>,
    pub markers: Vec<ZoneMarker>,
    pub diagnostic: Option<GeometryDiagnostic>,
}

impl GeometryArtifacts {
    pub fn is_empty(&self) -> bool {
        self.polyline.is_empty() && self.colliders.is_empty() && self.markers.is_empty()
    }

    /// Whether any sample lies inside any collider
    pub fn touches(&self, samples: &[Vec3]) -> bool {
        samples
            .iter()
            .any(|&p| self.colliders.iter().any(|c| c.contains(p)))
    }

    /// Shortest distance from any sample to the wire centerline
    pub fn min_distance(&self, samples: &[Vec3]) -> Option<f32> {
        samples
            .iter()
            .filter_map(|&p| crate::distance_to_track(p, &self.polyline))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Line-strip vertices for the wire
    pub fn wire_vertices(&self, touched: bool) -> Vec<LineVertex> {
        let color = if touched { colors::WIRE_TOUCHED } else { colors::WIRE };
        vertex::line_strip(&self.polyline, color)
    }
}

/// Sizing parameters for built geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryConfig {
    pub wire_radius: f32,
    pub collider_radius_multiplier: f32,
    pub zone_marker_scale: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            wire_radius: WIRE_RADIUS,
            collider_radius_multiplier: COLLIDER_RADIUS_MULTIPLIER,
            zone_marker_scale: ZONE_MARKER_SCALE,
        }
    }
}

impl From<&Settings> for GeometryConfig {
    fn from(s: &Settings) -> Self {
        Self {
            wire_radius: s.wire_radius,
            collider_radius_multiplier: s.collider_radius_multiplier,
            zone_marker_scale: s.zone_marker_scale,
        }
    }
}

impl GeometryConfig {
    pub fn collider_radius(&self) -> f32 {
        self.wire_radius * self.collider_radius_multiplier
    }
}

/// Builds track artifacts and owns the single active set
#[derive(Debug, Default)]
pub struct GeometryBuilder {
    config: GeometryConfig,
    active: Option<GeometryArtifacts>,
    next_build_id: u64,
}

impl GeometryBuilder {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            active: None,
            next_build_id: 1,
        }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// The current artifact set, if anything was built since the last clear
    pub fn active(&self) -> Option<&GeometryArtifacts> {
        self.active.as_ref()
    }

    /// Dispose of the current set, returning it
    pub fn clear(&mut self) -> Option<GeometryArtifacts> {
        let disposed = self.active.take();
        if let Some(set) = &disposed {
            log::debug!(
                "Disposed track geometry #{} ({} colliders)",
                set.build_id,
                set.colliders.len()
            );
        }
        disposed
    }

    /// Replace the active set with geometry for `waypoints`
    ///
    /// Fewer than two waypoints yields an empty set with a diagnostic.
    pub fn build(
        &mut self,
        waypoints: &[Vec3],
        start_zone: Option<Vec3>,
        end_zone: Option<Vec3>,
        zone_radius: f32,
    ) -> &GeometryArtifacts {
        self.clear();

        let build_id = self.next_build_id.max(1);
        self.next_build_id = build_id + 1;

        let artifacts = if waypoints.len() < MIN_TRACK_POINTS {
            let diagnostic = GeometryDiagnostic::InsufficientWaypoints {
                found: waypoints.len(),
            };
            log::warn!("Skipping track geometry: {diagnostic}");
            GeometryArtifacts {
                build_id,
                diagnostic: Some(diagnostic),
                ..Default::default()
            }
        } else {
            let radius = self.config.collider_radius();
            let colliders = waypoints
                .windows(2)
                .enumerate()
                .map(|(i, w)| SegmentCollider::new(i, w[0], w[1], radius))
                .collect::<Vec<_>>();

            let marker_radius = zone_radius * self.config.zone_marker_scale;
            let markers = [(ZoneKind::Start, start_zone), (ZoneKind::End, end_zone)]
                .into_iter()
                .filter_map(|(kind, center)| {
                    center.map(|center| ZoneMarker {
                        kind,
                        center,
                        radius: marker_radius,
                    })
                })
                .collect::<Vec<_>>();

            log::info!(
                "Built track geometry #{build_id}: {} waypoints, {} colliders, {} markers",
                waypoints.len(),
                colliders.len(),
                markers.len()
            );

            GeometryArtifacts {
                build_id,
                polyline: waypoints.to_vec(),
                colliders,
                markers,
                diagnostic: None,
            }
        };

        self.active.insert(artifacts)
    }
}
