use glam::{IVec3, Vec3A};

use crate::{Aabb3d, AreaType, CompactHeightfield};

impl CompactHeightfield {
    /// Sets the [`AreaType`] of the walkable spans within the given convex volume.
    pub fn mark_convex_poly_area(&mut self, volume: &ConvexVolume) {
        // Compute the bounding box of the polygon
        let Some(mut aabb) = Aabb3d::from_verts(&volume.vertices) else {
            // The volume is empty
            return;
        };
        aabb.min.y = volume.min_y;
        aabb.max.y = volume.max_y;

        self.mark_area(aabb, volume.area, |point| {
            point_in_poly(point, &volume.vertices)
        });
    }

    /// Sets the [`AreaType`] of the walkable spans within the given box.
    pub fn mark_box_area(&mut self, aabb: Aabb3d, area: AreaType) {
        self.mark_area(aabb, area, |_| true);
    }

    fn mark_area(&mut self, aabb: Aabb3d, area: AreaType, contains: impl Fn(Vec3A) -> bool) {
        // Compute the grid footprint of the volume
        let cell = Vec3A::new(self.cell_size, self.cell_height, self.cell_size);
        let min = (Vec3A::from(aabb.min) - Vec3A::from(self.aabb.min)) / cell;
        let max = (Vec3A::from(aabb.max) - Vec3A::from(self.aabb.min)) / cell;
        let mut min = IVec3::new(min.x as i32, min.y as i32, min.z as i32);
        let mut max = IVec3::new(max.x as i32, max.y as i32, max.z as i32);

        // Early-out if the volume lies entirely outside the grid.
        if max.x < 0 || min.x >= self.width as i32 || max.z < 0 || min.z >= self.height as i32 {
            return;
        }

        // Clamp the footprint to the grid
        min.x = min.x.max(0);
        max.x = max.x.min(self.width as i32 - 1);
        min.z = min.z.max(0);
        max.z = max.z.min(self.height as i32 - 1);

        for z in min.z..=max.z {
            for x in min.x..=max.x {
                let point = Vec3A::new(
                    self.aabb.min.x + (x as f32 + 0.5) * self.cell_size,
                    0.0,
                    self.aabb.min.z + (z as f32 + 0.5) * self.cell_size,
                );
                if !contains(point) {
                    continue;
                }
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // Skip if span is removed.
                    if !self.areas[i].is_walkable() {
                        continue;
                    }

                    // Skip if y extents don't overlap.
                    let y = self.spans[i].y as i32;
                    if y < min.y || y > max.y {
                        continue;
                    }
                    self.areas[i] = area;
                }
            }
        }
    }
}

fn point_in_poly(point: Vec3A, vertices: &[Vec3A]) -> bool {
    let mut inside = false;
    let mut j = vertices.len().saturating_sub(1);
    for i in 0..vertices.len() {
        let xi = vertices[i].x;
        let zi = vertices[i].z;
        let xj = vertices[j].x;
        let zj = vertices[j].z;
        if ((zi > point.z) != (zj > point.z))
            && (point.x < (xj - xi) * (point.z - zi) / (zj - zi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A convex polygon on the xz-plane, extruded between two heights.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexVolume {
    /// The vertices of the polygon. Only their x and z components are used.
    pub vertices: Vec<Vec3A>,
    /// The lower height of the volume in world units.
    pub min_y: f32,
    /// The upper height of the volume in world units.
    pub max_y: f32,
    /// The area type to assign to the spans inside the volume.
    pub area: AreaType,
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::compact_heightfield::tests::flat_heightfield;

    fn chf() -> CompactHeightfield {
        flat_heightfield(6, |_, _| Some(1)).into_compact(2, 1).unwrap()
    }

    fn area_at(chf: &CompactHeightfield, x: u16, z: u16) -> AreaType {
        chf.areas[chf.cell_at(x, z).index() as usize]
    }

    #[test]
    fn box_area_is_marked() {
        let mut chf = chf();
        chf.mark_box_area(Aabb3d::new(Vec3::ZERO, [2.5, 5.0, 2.5]), AreaType(1));
        assert_eq!(area_at(&chf, 0, 0), AreaType(1));
        assert_eq!(area_at(&chf, 2, 2), AreaType(1));
        assert_eq!(area_at(&chf, 3, 2), AreaType::DEFAULT_WALKABLE);
    }

    #[test]
    fn box_above_the_floor_does_not_mark() {
        let mut chf = chf();
        chf.mark_box_area(Aabb3d::new([0.0, 3.0, 0.0], [6.0, 5.0, 6.0]), AreaType(1));
        assert!(chf.areas.iter().all(|area| *area == AreaType::DEFAULT_WALKABLE));
    }

    #[test]
    fn convex_volume_marks_cells_whose_center_is_inside() {
        let mut chf = chf();
        let volume = ConvexVolume {
            vertices: vec![
                Vec3A::new(1.0, 0.0, 1.0),
                Vec3A::new(1.0, 0.0, 4.0),
                Vec3A::new(4.0, 0.0, 4.0),
                Vec3A::new(4.0, 0.0, 1.0),
            ],
            min_y: 0.0,
            max_y: 3.0,
            area: AreaType(9),
        };
        chf.mark_convex_poly_area(&volume);
        assert_eq!(area_at(&chf, 1, 1), AreaType(9));
        assert_eq!(area_at(&chf, 3, 3), AreaType(9));
        assert_eq!(area_at(&chf, 0, 0), AreaType::DEFAULT_WALKABLE);
        assert_eq!(area_at(&chf, 4, 4), AreaType::DEFAULT_WALKABLE);
    }
}
