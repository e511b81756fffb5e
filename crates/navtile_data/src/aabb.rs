use glam::{Vec2, Vec3, Vec3Swizzles as _};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb3d {
    /// The minimum corner
    pub min: Vec3,
    /// The maximum corner
    pub max: Vec3,
}

impl Aabb3d {
    /// Creates a new AABB from its corners.
    #[inline]
    pub fn new(min: impl Into<Vec3>, max: impl Into<Vec3>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Computes the AABB enclosing all `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts<T: Into<Vec3> + Copy>(verts: &[T]) -> Option<Self> {
        let mut iter = verts.iter().map(|v| (*v).into());
        let first: Vec3 = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), point| {
            (point.min(min), point.max(max))
        });
        Some(Self { min, max })
    }

    /// The extent of the box along every axis.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns `true` if the box has a non-negative extent on every axis and a positive extent on the xz-plane.
    pub fn is_valid(&self) -> bool {
        let size = self.size();
        self.min.is_finite() && self.max.is_finite() && size.x > 0.0 && size.z > 0.0 && size.y >= 0.0
    }

    /// Returns `true` if the two boxes overlap, touching counts as overlapping.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns `true` if the point lies inside the box on the xz-plane.
    #[inline]
    pub fn contains_xz(&self, point: Vec2) -> bool {
        let min = self.min.xz();
        let max = self.max.xz();
        point.cmpge(min).all() && point.cmple(max).all()
    }

    /// Returns a copy of the box grown by `amount` on every side.
    #[inline]
    pub fn expanded(&self, amount: Vec3) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_verts_encloses_all_points() {
        let aabb = Aabb3d::from_verts(&[
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-1.0, 5.0, 0.0),
            Vec3::new(0.0, -2.0, 4.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 5.0, 4.0));
    }

    #[test]
    fn from_verts_is_none_for_empty_input() {
        assert_eq!(Aabb3d::from_verts::<Vec3>(&[]), None);
    }

    #[test]
    fn flat_boxes_are_valid_but_degenerate_footprints_are_not() {
        assert!(Aabb3d::new(Vec3::ZERO, [10.0, 0.0, 10.0]).is_valid());
        assert!(!Aabb3d::new(Vec3::ZERO, [0.0, 1.0, 10.0]).is_valid());
        assert!(!Aabb3d::new(Vec3::ONE, Vec3::ZERO).is_valid());
    }

    #[test]
    fn intersection_includes_touching_boxes() {
        let a = Aabb3d::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb3d::new(Vec3::ONE, Vec3::splat(2.0));
        let c = Aabb3d::new(Vec3::splat(1.5), Vec3::splat(2.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
