//! Geometry helpers on the xz-plane.

use glam::{Vec2, Vec3, Vec3Swizzles as _};

/// Twice the signed area of the triangle `abc` on the xz-plane.
/// Positive when `c` lies to the right of `a -> b` when looking down the y-axis.
#[inline]
pub(crate) fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = b - a;
    let ac = c - a;
    ac.x * ab.z - ab.x * ac.z
}

#[inline]
pub(crate) fn perp_2d(u: Vec3, v: Vec3) -> f32 {
    u.z * v.x - u.x * v.z
}

/// Returns `true` if the points are closer than a small threshold.
#[inline]
pub(crate) fn vequal(a: Vec3, b: Vec3) -> bool {
    const THRESHOLD: f32 = 1.0 / 16384.0;
    a.distance_squared(b) < THRESHOLD * THRESHOLD
}

/// The squared xz-distance from `p` to the segment `a -> b`, and the segment parameter of the closest point.
pub(crate) fn distance_point_segment_sqr_2d(p: Vec3, a: Vec3, b: Vec3) -> (f32, f32) {
    let ab = b.xz() - a.xz();
    let ap = p.xz() - a.xz();
    let len = ab.length_squared();
    let t = if len > 0.0 {
        (ab.dot(ap) / len).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let d = a.xz() + ab * t - p.xz();
    (d.length_squared(), t)
}

/// Returns `true` if `p` lies inside the convex polygon on the xz-plane.
pub(crate) fn point_in_polygon(p: Vec3, vertices: &[Vec3]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.z > p.z) != (vj.z > p.z)
            && p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// The height of the triangle `abc` at the xz-position of `p`, if `p` lies inside it.
pub(crate) fn closest_height_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-6;
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    // Compute scaled barycentric coordinates
    let denom = v0.x * v1.z - v0.z * v1.x;
    if denom.abs() < EPS {
        return None;
    }
    let mut u = v1.z * v2.x - v1.x * v2.z;
    let mut v = v0.x * v2.z - v0.z * v2.x;
    let (u, v, denom) = if denom < 0.0 {
        u = -u;
        v = -v;
        (u, v, -denom)
    } else {
        (u, v, denom)
    };

    // If point lies inside the triangle, return interpolated ycoord.
    let tolerance = EPS * denom;
    if u >= -tolerance && v >= -tolerance && (u + v) <= denom + tolerance {
        Some(a.y + (v0.y * u + v1.y * v) / denom)
    } else {
        None
    }
}

/// Clips the segment `p0 -> p1` against the convex polygon on the xz-plane.
///
/// Returns the entry and exit parameters along the segment together with the edge the segment
/// leaves through, or `None` if the segment misses the polygon.
/// Edge `i` goes from vertex `i` to vertex `i + 1`.
pub(crate) fn intersect_segment_poly_2d(
    p0: Vec3,
    p1: Vec3,
    vertices: &[Vec3],
) -> Option<SegmentClip> {
    const EPS: f32 = 1e-6;
    let mut clip = SegmentClip {
        t_min: 0.0,
        t_max: 1.0,
        leave_edge: None,
    };
    let dir = p1 - p0;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let edge = vertices[i] - vertices[j];
        let diff = p0 - vertices[j];
        let n = perp_2d(edge, diff);
        let d = perp_2d(dir, edge);
        if d.abs() < EPS {
            // The segment is nearly parallel to this edge.
            if n < 0.0 {
                return None;
            }
            j = i;
            continue;
        }
        let t = n / d;
        if d < 0.0 {
            // The segment is entering across this edge.
            if t > clip.t_min {
                clip.t_min = t;
                if clip.t_min > clip.t_max {
                    return None;
                }
            }
        } else if t < clip.t_max {
            // The segment is leaving across this edge.
            clip.t_max = t;
            clip.leave_edge = Some(j);
            if clip.t_max < clip.t_min {
                return None;
            }
        }
        j = i;
    }
    Some(clip)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SegmentClip {
    pub(crate) t_min: f32,
    pub(crate) t_max: f32,
    pub(crate) leave_edge: Option<usize>,
}

/// Returns `true` if two tile border edges overlap along the border and their heights are
/// within `climb` of each other. Slabs are given as `(position along the border, height)`
/// endpoint pairs sorted by position.
pub(crate) fn overlap_slabs(a: (Vec2, Vec2), b: (Vec2, Vec2), px: f32, climb: f32) -> bool {
    // Check for horizontal overlap.
    // The segment is shrunken a little so that slabs which touch
    // at end points are not connected.
    let min_x = (a.0.x + px).max(b.0.x + px);
    let max_x = (a.1.x - px).min(b.1.x - px);
    if min_x > max_x {
        return false;
    }

    // Check vertical overlap.
    let height_at = |slab: (Vec2, Vec2), x: f32| {
        let d = (slab.1.y - slab.0.y) / (slab.1.x - slab.0.x);
        slab.0.y + d * (x - slab.0.x)
    };
    let d_min = height_at(b, min_x) - height_at(a, min_x);
    let d_max = height_at(b, max_x) - height_at(a, max_x);

    // Crossing segments always overlap.
    if d_min * d_max < 0.0 {
        return true;
    }
    // Check for overlap at endpoints.
    let threshold = (climb * 2.0) * (climb * 2.0);
    d_min * d_min <= threshold || d_max * d_max <= threshold
}
