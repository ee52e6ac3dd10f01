//! Mesh generation for the lookalike sphere, reference circles and handles

pub mod camera;
pub mod feeds;
pub mod fov;

use bytemuck::{Pod, Zeroable};

/// Position-only vertex shared by every pipeline
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
}

/// Triangulated UV sphere of unit radius centered at the origin
///
/// `rings` latitude bands, `segments` longitude steps. The shader derives
/// feed texture coordinates from the raw positions, so positions are all a
/// vertex carries.
pub fn uv_sphere(rings: u32, segments: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let theta = std::f32::consts::PI * ring as f32 / rings as f32;
        let (sin_t, cos_t) = theta.sin_cos();
        for segment in 0..=segments {
            let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
            let (sin_p, cos_p) = phi.sin_cos();
            vertices.push(Vertex {
                position: [sin_t * sin_p, cos_t, sin_t * cos_p],
            });
        }
    }

    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    (vertices, indices)
}

/// Closed unit circle in the xy plane as a line strip
pub fn circle_points(segments: u32) -> Vec<Vertex> {
    let mut points = Vec::with_capacity(segments as usize + 1);
    for i in 0..=segments {
        let theta = std::f32::consts::TAU * i as f32 / segments as f32;
        points.push(Vertex {
            position: [theta.cos(), theta.sin(), 0.0],
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_counts() {
        let (vertices, indices) = uv_sphere(8, 12);
        assert_eq!(vertices.len(), (9 * 13) as usize);
        assert_eq!(indices.len(), (8 * 12 * 6) as usize);
    }

    #[test]
    fn test_sphere_vertices_on_unit_sphere() {
        let (vertices, _) = uv_sphere(6, 6);
        for v in &vertices {
            let len2 = v.position.iter().map(|c| c * c).sum::<f32>();
            assert!((len2 - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sphere_indices_in_range() {
        let (vertices, indices) = uv_sphere(4, 7);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_circle_is_closed() {
        let points = circle_points(32);
        assert_eq!(points.len(), 33);
        let first = points.first().unwrap().position;
        let last = points.last().unwrap().position;
        for i in 0..3 {
            assert!((first[i] - last[i]).abs() < 1e-5);
        }
    }
}
