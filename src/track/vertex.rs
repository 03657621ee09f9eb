//! GPU-ready vertex data for track artifacts

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// 3D line vertex with position and color
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub const fn new(x: f32, y: f32, z: f32, color: [f32; 4]) -> Self {
        Self {
            position: [x, y, z],
            color,
        }
    }

    pub fn at(p: Vec3, color: [f32; 4]) -> Self {
        Self::new(p.x, p.y, p.z, color)
    }
}

/// Colors for track elements
pub mod colors {
    pub const WIRE: [f32; 4] = [0.85, 0.65, 0.2, 1.0];
    pub const WIRE_TOUCHED: [f32; 4] = [1.0, 0.25, 0.15, 1.0];
    pub const START_ZONE: [f32; 4] = [0.2, 0.8, 0.4, 0.5];
    pub const END_ZONE: [f32; 4] = [0.9, 0.2, 0.3, 0.5];
}

/// Line-strip vertices visiting every point in order
pub fn line_strip(points: &[Vec3], color: [f32; 4]) -> Vec<LineVertex> {
    points.iter().map(|&p| LineVertex::at(p, color)).collect()
}

/// Line-list vertices for a ring of `segments` around `center` in the plane
/// perpendicular to `normal`
pub fn ring(
    center: Vec3,
    normal: Vec3,
    radius: f32,
    color: [f32; 4],
    segments: u32,
) -> Vec<LineVertex> {
    let segments = segments.max(3);
    let normal = normal.normalize_or(Vec3::Y);
    let (u, v) = normal.any_orthonormal_pair();

    let point = |i: u32| {
        let theta = (i as f32 / segments as f32) * std::f32::consts::TAU;
        center + (u * theta.cos() + v * theta.sin()) * radius
    };

    let mut vertices = Vec::with_capacity((segments * 2) as usize);
    for i in 0..segments {
        vertices.push(LineVertex::at(point(i), color));
        vertices.push(LineVertex::at(point(i + 1), color));
    }
    vertices
}
