use glam::{IVec3, UVec3, Vec2, Vec3, Vec3A};

pub(crate) trait TriangleIndices {
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let a = vertices[self[0] as usize];
        let b = vertices[self[1] as usize];
        let c = vertices[self[2] as usize];
        let ab = b - a;
        let ac = c - a;
        ab.cross(ac).normalize_or_zero()
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard height (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The height offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Gets the direction for the specified offset. One of x and z should be 0.
/// Returns 0xff for offsets that are not a cardinal direction.
#[inline]
pub(crate) fn dir_offset(x: i32, z: i32) -> u8 {
    const DIRS: [u8; 5] = [3, 0, 0xff, 2, 1];
    let index = (((z + 1) << 1) + x) as usize & 0x7;
    DIRS.get(index).copied().unwrap_or(0xff)
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i >= 1 { i - 1 } else { n - 1 }
}

/// Squared distance on the xz-plane from `point` to the segment `(a, b)`.
pub(crate) fn distance_squared_between_point_and_line_vec2(
    point: Vec2,
    (a, b): (Vec2, Vec2),
) -> f32 {
    let ab = b - a;
    let d = ab.length_squared();
    let mut t = ab.dot(point - a);
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    (a + ab * t).distance_squared(point)
}

/// Squared distance from `point` to the segment `(a, b)`.
pub(crate) fn distance_squared_between_point_and_line_vec3(
    point: Vec3A,
    (a, b): (Vec3A, Vec3A),
) -> f32 {
    let ab = b - a;
    let d = ab.length_squared();
    let mut t = ab.dot(point - a);
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    (a + ab * t).distance_squared(point)
}

/// Squared distance on the xz-plane from an integer `point` to the segment `(a, b)`.
pub(crate) fn distance_squared_between_point_and_line_ivec(
    point: IVec3,
    (a, b): (IVec3, IVec3),
) -> f32 {
    let to_xz = |v: IVec3| Vec2::new(v.x as f32, v.z as f32);
    distance_squared_between_point_and_line_vec2(to_xz(point), (to_xz(a), to_xz(b)))
}

/// Twice the signed area of the triangle `(a, b, c)` on the xz-plane.
/// Negative when `c` lies to the left of `a -> b`.
#[inline]
pub(crate) fn area2(a: IVec3, b: IVec3, c: IVec3) -> i64 {
    (b.x - a.x) as i64 * (c.z - a.z) as i64 - (c.x - a.x) as i64 * (b.z - a.z) as i64
}

/// Returns `true` if `c` is strictly to the left of the directed line `a -> b`.
#[inline]
pub(crate) fn left(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(crate) fn collinear(a: IVec3, b: IVec3, c: IVec3) -> bool {
    area2(a, b, c) == 0
}

/// Returns `true` if `ab` properly intersects `cd`, i.e. they share a point interior to both segments.
pub(crate) fn intersect_prop(a: IVec3, b: IVec3, c: IVec3, d: IVec3) -> bool {
    // Eliminate improper cases.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Returns `true` if `c` lies on the closed segment `ab`. Requires `a`, `b` and `c` to be collinear.
fn between(a: IVec3, b: IVec3, c: IVec3) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    // If ab not vertical, check betweenness on x; else on z.
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

/// Returns `true` if segments `ab` and `cd` intersect, properly or improperly.
pub(crate) fn intersect(a: IVec3, b: IVec3, c: IVec3, d: IVec3) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Returns `true` if the two vertices are equal on the xz-plane.
#[inline]
pub(crate) fn vequal(a: IVec3, b: IVec3) -> bool {
    a.x == b.x && a.z == b.z
}

/// Converts a grid position into world space.
#[inline]
pub(crate) fn grid_to_world(
    origin: Vec3,
    position: Vec3,
    cell_size: f32,
    cell_height: f32,
) -> Vec3 {
    origin + position * Vec3::new(cell_size, cell_height, cell_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_offset_inverts_dir_offset_xz() {
        for dir in 0..4 {
            let x = dir_offset_x(dir) as i32;
            let z = dir_offset_z(dir) as i32;
            assert_eq!(dir_offset(x, z), dir);
        }
    }

    #[test]
    fn next_and_prev_wrap_around() {
        assert_eq!(next(2, 3), 0);
        assert_eq!(prev(0, 3), 2);
        assert_eq!(next(0, 3), 1);
        assert_eq!(prev(2, 3), 1);
    }

    #[test]
    fn point_to_segment_distance_clamps_to_endpoints() {
        let seg = (Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert_eq!(distance_squared_between_point_and_line_vec2(Vec2::new(1.0, 1.0), seg), 1.0);
        assert_eq!(distance_squared_between_point_and_line_vec2(Vec2::new(3.0, 0.0), seg), 1.0);
        assert_eq!(distance_squared_between_point_and_line_vec2(Vec2::new(-2.0, 0.0), seg), 4.0);
    }

    #[test]
    fn crossing_segments_intersect() {
        let a = IVec3::new(0, 0, 0);
        let b = IVec3::new(4, 0, 4);
        let c = IVec3::new(0, 0, 4);
        let d = IVec3::new(4, 0, 0);
        assert!(intersect(a, b, c, d));
        assert!(!intersect(a, c, b, d));
    }

    #[test]
    fn touching_segments_intersect() {
        let a = IVec3::new(0, 0, 0);
        let b = IVec3::new(4, 0, 0);
        let c = IVec3::new(2, 0, 0);
        let d = IVec3::new(2, 0, 3);
        assert!(intersect(a, b, c, d));
    }

    #[test]
    fn upward_facing_triangle_has_positive_normal_y() {
        let vertices = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 1.0),
            Vec3A::new(1.0, 0.0, 0.0),
        ];
        let normal = UVec3::new(0, 1, 2).normal(&vertices);
        assert_eq!(normal, Vec3A::Y);
    }
}
