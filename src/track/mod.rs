//! Track geometry
//!
//! Pure transformation from server waypoints to presentation artifacts. No
//! network or session dependencies.

pub mod geometry;
pub mod vertex;

pub use geometry::{
    ColliderTag, GeometryArtifacts, GeometryBuilder, GeometryConfig, GeometryDiagnostic,
    SegmentCollider, ZoneKind, ZoneMarker,
};
pub use vertex::LineVertex;
