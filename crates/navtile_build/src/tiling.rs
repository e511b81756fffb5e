//! Helpers for laying out tiles on the world's xz-plane.
//!
//! Tiles form a regular grid anchored at the world origin: tile `(x, z)` covers
//! `[x * size, (x + 1) * size)` on the x-axis and likewise on the z-axis,
//! where `size` is [`tile_world_size`].

use std::ops::Range;

use glam::{IVec2, Vec3, Vec3Swizzles as _};

use crate::{Aabb3d, BuildSettings};

/// The width and depth of a tile in world units.
#[inline]
pub fn tile_world_size(settings: &BuildSettings) -> f32 {
    settings.tile_size as f32 * settings.cell_size
}

/// The world space bounds of the tile at `coord`, spanning `y_range` vertically.
pub fn tile_bounds(settings: &BuildSettings, coord: IVec2, y_range: Range<f32>) -> Aabb3d {
    let size = tile_world_size(settings);
    let min = coord.as_vec2() * size;
    Aabb3d::new(
        Vec3::new(min.x, y_range.start, min.y),
        Vec3::new(min.x + size, y_range.end, min.y + size),
    )
}

/// All tile coordinates whose tiles overlap `bounds` on the xz-plane.
///
/// Returns an empty list for untiled settings.
pub fn overlapping_tiles(settings: &BuildSettings, bounds: Aabb3d) -> Vec<IVec2> {
    let size = tile_world_size(settings);
    if !(size > 0.0) {
        return Vec::new();
    }
    let min = (bounds.min.xz() / size).floor().as_ivec2();
    let max = (bounds.max.xz() / size).ceil().as_ivec2();
    (min.y..max.y)
        .flat_map(|z| (min.x..max.x).map(move |x| IVec2::new(x, z)))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn settings() -> BuildSettings {
        BuildSettings {
            cell_size: 0.5,
            tile_size: 8,
            ..Default::default()
        }
    }

    #[test]
    fn tile_bounds_are_anchored_at_the_origin() {
        let bounds = tile_bounds(&settings(), IVec2::new(-1, 2), -1.0..3.0);
        assert_relative_eq!(bounds.min.x, -4.0);
        assert_relative_eq!(bounds.max.x, 0.0);
        assert_relative_eq!(bounds.min.z, 8.0);
        assert_relative_eq!(bounds.max.z, 12.0);
        assert_relative_eq!(bounds.min.y, -1.0);
        assert_relative_eq!(bounds.max.y, 3.0);
    }

    #[test]
    fn overlapping_tiles_cover_the_box() {
        let bounds = Aabb3d::new(Vec3::new(-1.0, 0.0, 0.5), Vec3::new(5.0, 1.0, 3.0));
        let tiles = overlapping_tiles(&settings(), bounds);
        assert_eq!(
            tiles,
            vec![IVec2::new(-1, 0), IVec2::new(0, 0), IVec2::new(1, 0)]
        );
    }

    #[test]
    fn untiled_settings_have_no_tiles() {
        let settings = BuildSettings::default();
        assert!(overlapping_tiles(&settings, Aabb3d::new(Vec3::ZERO, Vec3::ONE)).is_empty());
    }
}
