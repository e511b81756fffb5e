//! Contains methods for rasterizing the triangles of a [`TriMesh`] into a [`Heightfield`].

use glam::Vec3A;

use crate::{
    Aabb3d,
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    span::{AreaType, SpanBuilder},
    trimesh::TriMesh,
};

impl Heightfield {
    /// Rasterizes every triangle of the trimesh into the heightfield.
    /// Triangles completely outside the heightfield bounds are skipped.
    ///
    /// # Arguments
    ///
    /// * `trimesh` - The triangles to rasterize, together with their area types.
    /// * `flag_merge_threshold` - The maximum difference between the ceilings of two spans to merge their area ids. [Units: vx]
    ///
    /// # Errors
    ///
    /// Returns an error if a span cannot be inserted.
    pub fn rasterize_triangles(
        &mut self,
        trimesh: &TriMesh,
        flag_merge_threshold: u16,
    ) -> Result<(), SpanInsertionError> {
        for (i, triangle) in trimesh.indices.iter().enumerate() {
            let triangle = [
                trimesh.vertices[triangle.x as usize],
                trimesh.vertices[triangle.y as usize],
                trimesh.vertices[triangle.z as usize],
            ];
            let area_type = trimesh.area_types[i];
            self.rasterize_triangle(triangle, area_type, flag_merge_threshold)?;
        }
        Ok(())
    }

    fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        area_type: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), SpanInsertionError> {
        let Some(triangle_aabb) = Aabb3d::from_verts(&triangle) else {
            return Ok(());
        };
        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if !self.aabb.intersects(&triangle_aabb) {
            return Ok(());
        }

        let origin = Vec3A::from(self.aabb.min);
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;
        let by = self.aabb.max.y - self.aabb.min.y;
        let width = self.width as i32;
        let height = self.height as i32;

        // Calculate the footprint of the triangle on the grid's z-axis
        let z0 = ((triangle_aabb.min.z - origin.z) * inverse_cell_size) as i32;
        let z1 = ((triangle_aabb.max.z - origin.z) * inverse_cell_size) as i32;

        // use -1 rather than 0 to cut the polygon properly at the start of the tile
        let z0 = z0.clamp(-1, height - 1);
        let z1 = z1.clamp(0, height - 1);

        // Clip the triangle into all grid cells it touches.
        let mut remaining = triangle.to_vec();
        let mut row = Vec::with_capacity(7);
        let mut next_remaining = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);
        let mut next_row = Vec::with_capacity(7);

        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well
            let cell_z = origin.z + (z + 1) as f32 * self.cell_size;
            divide_poly(&remaining, &mut row, &mut next_remaining, cell_z, Axis::Z);
            std::mem::swap(&mut remaining, &mut next_remaining);

            if row.len() < 3 || z < 0 {
                continue;
            }

            // find X-axis bounds of the row
            let (min_x, max_x) = row
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), v| {
                    (min.min(v.x), max.max(v.x))
                });
            let x0 = ((min_x - origin.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - origin.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= width {
                continue;
            }
            let x0 = x0.clamp(-1, width - 1);
            let x1 = x1.clamp(0, width - 1);

            for x in x0..=x1 {
                // Clip polygon to column. Store the remaining polygon as well
                let cell_x = origin.x + (x + 1) as f32 * self.cell_size;
                divide_poly(&row, &mut cell, &mut next_row, cell_x, Axis::X);
                std::mem::swap(&mut row, &mut next_row);

                if cell.len() < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), v| {
                        (min.min(v.y), max.max(v.y))
                    });
                let span_min = span_min - origin.y;
                let span_max = span_max - origin.y;

                // Skip the span if it's completely outside the heightfield bounding box
                if span_max < 0.0 || span_min > by {
                    continue;
                }

                // Clamp the span to the heightfield bounding box.
                let span_min = span_min.max(0.0);
                let span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                let max_height = Heightfield::MAX_SPAN_HEIGHT as f32;
                let min_height =
                    (span_min * inverse_cell_height).floor().clamp(0.0, max_height) as u16;
                let max_height = (span_max * inverse_cell_height)
                    .ceil()
                    .clamp(min_height as f32 + 1.0, max_height)
                    as u16;

                self.add_span(SpanInsertion {
                    x: x as u16,
                    z: z as u16,
                    flag_merge_threshold,
                    span: SpanBuilder {
                        min: min_height,
                        max: max_height,
                        area: area_type,
                        next: None,
                    }
                    .build(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Z,
}

impl Axis {
    #[inline]
    fn of(self, v: Vec3A) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Divides a convex polygon into two convex polygons on both sides of a line.
/// `below` receives the part with smaller coordinates along `axis`, `above` the rest.
fn divide_poly(
    polygon: &[Vec3A],
    below: &mut Vec<Vec3A>,
    above: &mut Vec<Vec3A>,
    axis_offset: f32,
    axis: Axis,
) {
    below.clear();
    above.clear();
    let n = polygon.len();
    if n == 0 {
        return;
    }

    let delta = |v: Vec3A| axis_offset - axis.of(v);

    let mut b = n - 1;
    for a in 0..n {
        let va = polygon[a];
        let vb = polygon[b];
        let da = delta(va);
        let db = delta(vb);
        let same_side = (da >= 0.0) == (db >= 0.0);
        if !same_side {
            let s = db / (db - da);
            let intersection = vb + (va - vb) * s;
            below.push(intersection);
            above.push(intersection);
            // add the point to the correct polygon
            if da > 0.0 {
                below.push(va);
            } else if da < 0.0 {
                above.push(va);
            }
        } else {
            // add the point to the correct polygon
            if da >= 0.0 {
                below.push(va);
                if da != 0.0 {
                    b = a;
                    continue;
                }
            }
            above.push(va);
        }
        b = a;
    }
}
