use glam::{IVec3, U16Vec3};
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, CompactHeightfield, RegionId,
    math::{
        distance_squared_between_point_and_line_ivec, intersect, left, left_on, next, prev, vequal,
    },
};

impl CompactHeightfield {
    /// The raw contours will match the region outlines exactly. The `max_error` and `max_edge_len`
    /// parameters control how closely the simplified contours will match the raw contours.
    ///
    /// Simplified contours are generated such that the vertices for portals between areas match up.
    /// (They are considered mandatory vertices.)
    ///
    /// Setting `max_edge_len` to zero will disable the edge length feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the holes of a region cannot be attributed to exactly one outline.
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
    ) -> Result<ContourSet, ContourError> {
        let mut cset = ContourSet {
            contours: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width - self.border_size * 2,
            height: self.height - self.border_size * 2,
            border_size: self.border_size,
            max_error,
        };
        if self.border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = self.border_size as f32 * self.cell_size;
            cset.aabb.min.x += pad;
            cset.aabb.min.z += pad;
            cset.aabb.max.x -= pad;
            cset.aabb.max.z -= pad;
        }

        let max_contours = self.max_region.bits().max(8);
        cset.contours.reserve(max_contours as usize);
        let mut flags = vec![0_u8; self.spans.len()];

        // Mark boundaries
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    let mut res = 0;
                    let span = &self.spans[i];
                    if !span.region.is_walkable_region() {
                        flags[i] = 0;
                        continue;
                    }
                    for dir in 0..4 {
                        let r = self
                            .neighbor(x as i32, z as i32, i, dir)
                            .map(|(_, _, a_i)| self.spans[a_i].region)
                            .unwrap_or(RegionId::NONE);
                        if r == span.region {
                            res |= 1 << dir;
                        }
                    }
                    // Inverse, mark non connected edges.
                    flags[i] = res ^ 0xf;
                }
            }
        }

        let mut verts = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);

        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let region = self.spans[i].region;
                    if !region.is_walkable_region() {
                        continue;
                    }
                    let area = self.areas[i];

                    verts.clear();
                    simplified.clear();

                    self.walk_contour(x, z, i, &mut flags, &mut verts);

                    simplify_contour(&verts, &mut simplified, max_error, max_edge_len, build_flags);
                    remove_degenerate_segments(&mut simplified);

                    // Create contour.
                    if simplified.len() < 3 {
                        continue;
                    }
                    let offset = U16Vec3::new(self.border_size, 0, self.border_size);
                    let vertices = simplified
                        .iter()
                        .map(|v| ContourVertex {
                            position: v.position.saturating_sub(offset),
                            region: v.region,
                        })
                        .collect();
                    let raw_vertices = verts
                        .iter()
                        .map(|v: &ContourVertex| ContourVertex {
                            position: v.position.saturating_sub(offset),
                            region: v.region,
                        })
                        .collect();
                    cset.contours.push(Contour {
                        vertices,
                        raw_vertices,
                        region,
                        area,
                    });
                }
            }
        }

        cset.merge_holes(self.max_region)?;
        Ok(cset)
    }

    fn walk_contour(
        &self,
        x: u16,
        z: u16,
        i: usize,
        flags: &mut [u8],
        points: &mut Vec<ContourVertex>,
    ) {
        let (mut x, mut z, mut i) = (x as i32, z as i32, i);
        // Choose the first non-connected edge
        let mut dir = 0_u8;
        while flags[i] & (1 << dir) == 0 {
            dir += 1;
        }

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 0..40_000 {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (p_y, is_border_vertex) = self.get_corner_height(x, z, i, dir);
                let (p_x, p_z) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut r = RegionVertexId::NONE;
                if let Some((_, _, a_i)) = self.neighbor(x, z, i, dir) {
                    r = RegionVertexId::from(self.spans[a_i].region);
                    if area != self.areas[a_i] {
                        r |= RegionVertexId::AREA_BORDER;
                    }
                }
                if is_border_vertex {
                    r |= RegionVertexId::BORDER_VERTEX;
                }
                points.push(ContourVertex {
                    position: U16Vec3::new(p_x as u16, p_y, p_z as u16),
                    region: r,
                });

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some((n_x, n_z, n_i)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    tracing::warn!("Contour walk hit a missing connection at ({x}, {z})");
                    return;
                };
                x = n_x;
                z = n_z;
                i = n_i;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                break;
            }
        }
    }

    /// Returns the height of the corner shared by the edge `dir` and the edge `dir + 1` of the span `i`,
    /// and whether that corner is a vertex on the tile border that can be removed later.
    fn get_corner_height(&self, x: i32, z: i32, i: usize, dir: u8) -> (u16, bool) {
        let span = &self.spans[i];
        let mut ch = span.y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let get_reg = |i: usize| self.spans[i].region.bits() as u32 | ((self.areas[i].0 as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = get_reg(i);

        if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, dir) {
            ch = ch.max(self.spans[a_i].y);
            regs[1] = get_reg(a_i);
            if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, dir_p) {
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }
        if let Some((a_x, a_z, a_i)) = self.neighbor(x, z, i, dir_p) {
            ch = ch.max(self.spans[a_i].y);
            regs[3] = get_reg(a_i);
            if let Some((_, _, b_i)) = self.neighbor(a_x, a_z, a_i, dir) {
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }

        // Check if the vertex is special edge vertex, these vertices will be removed later.
        let border = RegionId::BORDER_REGION.bits() as u32;
        let is_border_vertex = (0..4).any(|j| {
            let a = regs[j];
            let b = regs[(j + 1) & 0x3];
            let c = regs[(j + 2) & 0x3];
            let d = regs[(j + 3) & 0x3];

            // The vertex is a border vertex there are two same exterior cells in a row,
            // followed by two interior cells and none of the regions are out of bounds.
            let two_same_exts = (a & b & border) != 0 && a == b;
            let two_ints = ((c | d) & border) == 0;
            let ints_same_area = (c >> 16) == (d >> 16);
            let no_zeros = a != 0 && b != 0 && c != 0 && d != 0;
            two_same_exts && two_ints && ints_same_area && no_zeros
        });
        (ch, is_border_vertex)
    }
}

#[derive(Debug, Clone, Copy)]
struct SimplifiedVertex {
    position: U16Vec3,
    /// Index of the raw vertex this vertex was taken from.
    raw_index: usize,
    region: RegionVertexId,
}

impl SimplifiedVertex {
    fn new(raw: &[ContourVertex], raw_index: usize) -> Self {
        Self {
            position: raw[raw_index].position,
            raw_index,
            region: RegionVertexId::NONE,
        }
    }
}

fn simplify_contour(
    points: &[ContourVertex],
    simplified: &mut Vec<SimplifiedVertex>,
    max_error: f32,
    max_edge_len: u16,
    flags: BuildContoursFlags,
) {
    let pn = points.len();
    if pn == 0 {
        return;
    }
    let region_of = |v: &ContourVertex| v.region & RegionVertexId::REGION_MASK;
    let is_area_border = |v: &ContourVertex| v.region.contains(RegionVertexId::AREA_BORDER);

    // Add initial points.
    let has_connections = points
        .iter()
        .any(|point| region_of(point) != RegionVertexId::NONE);

    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        for i in 0..pn {
            let ii = (i + 1) % pn;
            let different_regs = region_of(&points[i]) != region_of(&points[ii]);
            let area_borders = is_area_border(&points[i]) != is_area_border(&points[ii]);
            if different_regs || area_borders {
                simplified.push(SimplifiedVertex::new(points, i));
            }
        }
    }

    if simplified.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = 0;
        let mut upper_right = 0;
        for (i, point) in points.iter().enumerate() {
            let p = point.position;
            let ll = points[lower_left].position;
            let ur = points[upper_right].position;
            if p.x < ll.x || (p.x == ll.x && p.z < ll.z) {
                lower_left = i;
            }
            if p.x > ur.x || (p.x == ur.x && p.z > ur.z) {
                upper_right = i;
            }
        }
        simplified.push(SimplifiedVertex::new(points, lower_left));
        simplified.push(SimplifiedVertex::new(points, upper_right));
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();

        let mut a = simplified[i].position.as_ivec3();
        let a_i = simplified[i].raw_index;
        let mut b = simplified[ii].position.as_ivec3();
        let b_i = simplified[ii].raw_index;

        // Find maximum deviation from the segment.
        let mut max_d = 0.0;
        let mut max_i = None;

        // Traverse the segment in lexilogical order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (c_inc, mut c_i, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            (1, (a_i + 1) % pn, b_i)
        } else {
            std::mem::swap(&mut a, &mut b);
            (pn - 1, (b_i + pn - 1) % pn, a_i)
        };

        // Tessellate only outer edges or edges between areas.
        if region_of(&points[c_i]) == RegionVertexId::NONE || is_area_border(&points[c_i]) {
            while c_i != end_i {
                let d = distance_squared_between_point_and_line_ivec(
                    points[c_i].position.as_ivec3(),
                    (a, b),
                );
                if d > max_d {
                    max_d = d;
                    max_i = Some(c_i);
                }
                c_i = (c_i + c_inc) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_d > max_error_sq => {
                simplified.insert(i + 1, SimplifiedVertex::new(points, max_i));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len_sq = max_edge_len as i32 * max_edge_len as i32;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();

            let a = simplified[i].position.as_ivec3();
            let a_i = simplified[i].raw_index;
            let b = simplified[ii].position.as_ivec3();
            let b_i = simplified[ii].raw_index;

            // Find maximum deviation from the segment.
            let mut max_i = None;
            let c_i = (a_i + 1) % pn;

            // Tessellate only outer edges or edges between areas.
            // Wall edges.
            let tessellate = (tessellate_walls && region_of(&points[c_i]) == RegionVertexId::NONE)
                // Edges between areas.
                || (tessellate_areas && is_area_border(&points[c_i]));

            if tessellate {
                let d = b - a;
                if d.x * d.x + d.z * d.z > max_edge_len_sq {
                    // Round based on the segments in lexilogical order so that the
                    // max tesselation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if b_i < a_i { b_i + pn - a_i } else { b_i - a_i };
                    if n > 1 {
                        max_i = Some(if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            (a_i + n / 2) % pn
                        } else {
                            (a_i + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            // If the max deviation is larger than accepted error,
            // add new point, else continue to next segment.
            match max_i {
                Some(max_i) => simplified.insert(i + 1, SimplifiedVertex::new(points, max_i)),
                None => i += 1,
            }
        }
    }

    for vertex in simplified.iter_mut() {
        // The edge vertex flag is take from the current raw point,
        // and the neighbour region is take from the next raw point.
        let a_i = (vertex.raw_index + 1) % pn;
        let b_i = vertex.raw_index;
        vertex.region = (points[a_i].region
            & (RegionVertexId::REGION_MASK | RegionVertexId::AREA_BORDER))
            | (points[b_i].region & RegionVertexId::BORDER_VERTEX);
    }
}

/// Removes adjacent vertices which are equal on the xz-plane, or else the triangulator will get confused.
fn remove_degenerate_segments(simplified: &mut Vec<SimplifiedVertex>) {
    let mut i = 0;
    while i < simplified.len() && simplified.len() > 1 {
        let ni = next(i, simplified.len());
        if vequal(
            simplified[i].position.as_ivec3(),
            simplified[ni].position.as_ivec3(),
        ) {
            // Degenerate segment, remove.
            simplified.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Twice the signed area of the contour on the xz-plane. Outlines are positive, holes negative.
fn calc_area_of_polygon_2d(vertices: &[ContourVertex]) -> i64 {
    let n = vertices.len();
    let mut area = 0_i64;
    for i in 0..n {
        let j = prev(i, n);
        let vi = vertices[i].position.as_ivec3();
        let vj = vertices[j].position.as_ivec3();
        area += vi.x as i64 * vj.z as i64 - vj.x as i64 * vi.z as i64;
    }
    (area + 1) / 2
}

fn in_cone(i: usize, vertices: &[ContourVertex], pj: IVec3) -> bool {
    let n = vertices.len();
    let pi = vertices[i].position.as_ivec3();
    let pi1 = vertices[next(i, n)].position.as_ivec3();
    let pin1 = vertices[prev(i, n)].position.as_ivec3();

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns `true` if the segment `d0 -> d1` intersects an edge of the contour.
/// Edges incident to the vertex `skip` are ignored.
fn intersect_seg_contour(d0: IVec3, d1: IVec3, skip: Option<usize>, vertices: &[ContourVertex]) -> bool {
    let n = vertices.len();
    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i.
        if skip == Some(k) || skip == Some(k1) {
            continue;
        }
        let p0 = vertices[k].position.as_ivec3();
        let p1 = vertices[k1].position.as_ivec3();
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return true;
        }
    }
    false
}

/// Returns the index of the left-most vertex of the contour, ties broken by the smallest z.
fn find_left_most_vertex(vertices: &[ContourVertex]) -> (u16, u16, usize) {
    let mut min_x = vertices[0].position.x;
    let mut min_z = vertices[0].position.z;
    let mut left_most = 0;
    for (i, v) in vertices.iter().enumerate().skip(1) {
        let (x, z) = (v.position.x, v.position.z);
        if x < min_x || (x == min_x && z < min_z) {
            min_x = x;
            min_z = z;
            left_most = i;
        }
    }
    (min_x, min_z, left_most)
}

/// Splices `hole` into `outline` through the diagonal between `outline[ia]` and `hole[ib]`.
fn merge_contours(outline: &mut Contour, hole: &mut Contour, ia: usize, ib: usize) {
    let na = outline.vertices.len();
    let nb = hole.vertices.len();
    let mut vertices = Vec::with_capacity(na + nb + 2);

    // Copy contour A.
    for i in 0..=na {
        vertices.push(outline.vertices[(ia + i) % na]);
    }

    // Copy contour B
    for i in 0..=nb {
        vertices.push(hole.vertices[(ib + i) % nb]);
    }

    outline.vertices = vertices;
    hole.vertices.clear();
}

/// The outline and holes of a single region.
#[derive(Default)]
struct ContourRegion {
    outline: Option<usize>,
    holes: Vec<ContourHole>,
}

struct ContourHole {
    contour: usize,
    min_x: u16,
    min_z: u16,
    left_most: usize,
}

impl ContourSet {
    /// Merges every hole contour into the outline contour of its region.
    fn merge_holes(&mut self, max_region: RegionId) -> Result<(), ContourError> {
        if self.contours.is_empty() {
            return Ok(());
        }
        // Calculate winding of all polygons.
        let is_hole: Vec<bool> = self
            .contours
            .iter()
            .map(|contour| calc_area_of_polygon_2d(&contour.vertices) < 0)
            .collect();
        if !is_hole.iter().any(|hole| *hole) {
            return Ok(());
        }

        // Collect outline contour and holes contours per region.
        // We assume that there is one outline and multiple holes.
        let mut regions: Vec<ContourRegion> = (0..=max_region.bits() as usize)
            .map(|_| ContourRegion::default())
            .collect();
        for (i, contour) in self.contours.iter().enumerate() {
            let Some(region) = regions.get_mut(contour.region.id() as usize) else {
                continue;
            };
            // Positively would contours are outlines, negative holes.
            if !is_hole[i] {
                if region.outline.is_some() {
                    return Err(ContourError::MultipleOutlines {
                        region: contour.region,
                    });
                }
                region.outline = Some(i);
            } else {
                let (min_x, min_z, left_most) = find_left_most_vertex(&contour.vertices);
                region.holes.push(ContourHole {
                    contour: i,
                    min_x,
                    min_z,
                    left_most,
                });
            }
        }

        for (region_index, region) in regions.iter_mut().enumerate() {
            if region.holes.is_empty() {
                continue;
            }
            let Some(outline) = region.outline else {
                return Err(ContourError::MissingOutline {
                    region: RegionId::from(region_index as u16),
                });
            };
            self.merge_region_holes(outline, &mut region.holes);
        }
        self.contours.retain(|contour| !contour.vertices.is_empty());
        Ok(())
    }

    fn merge_region_holes(&mut self, outline: usize, holes: &mut [ContourHole]) {
        // Sort holes from left to right.
        holes.sort_by_key(|hole| (hole.min_x, hole.min_z));

        let mut diagonals: Vec<(usize, i32)> = Vec::new();
        for i in 0..holes.len() {
            let hole_index = holes[i].contour;
            let hole_len = self.contours[hole_index].vertices.len();
            let mut index = None;
            let mut best_vertex = holes[i].left_most;
            for _ in 0..hole_len {
                // Find potential diagonals.
                // The 'best' vertex must be in the cone described by 3 cosequtive vertices of the outline.
                // ..o j-1
                //   |
                //   |   * best
                //   |
                // j o-----o j+1
                //         :
                diagonals.clear();
                let outline_vertices = &self.contours[outline].vertices;
                let corner = self.contours[hole_index].vertices[best_vertex]
                    .position
                    .as_ivec3();
                for j in 0..outline_vertices.len() {
                    if in_cone(j, outline_vertices, corner) {
                        let d = outline_vertices[j].position.as_ivec3() - corner;
                        diagonals.push((j, d.x * d.x + d.z * d.z));
                    }
                }
                // Sort potential diagonals by distance, we want to make the connection as short as possible.
                diagonals.sort_by_key(|(_, distance)| *distance);

                // Find a diagonal that is not intersecting the outline not the remaining holes.
                index = diagonals.iter().map(|(j, _)| *j).find(|&j| {
                    let pt = outline_vertices[j].position.as_ivec3();
                    let intersects_outline =
                        intersect_seg_contour(pt, corner, Some(j), outline_vertices);
                    let intersects_holes = holes[i..].iter().any(|hole| {
                        intersect_seg_contour(
                            pt,
                            corner,
                            None,
                            &self.contours[hole.contour].vertices,
                        )
                    });
                    !intersects_outline && !intersects_holes
                });
                // If found non-intersecting diagonal, stop looking.
                if index.is_some() {
                    break;
                }
                // All the potential diagonals for the current vertex were intersecting, try next vertex.
                best_vertex = (best_vertex + 1) % hole_len;
            }

            let Some(index) = index else {
                tracing::warn!(
                    "Failed to find merge points for hole of region {}",
                    self.contours[outline].region.id()
                );
                continue;
            };
            let (outline_contour, hole_contour) = index_pair(&mut self.contours, outline, hole_index);
            merge_contours(outline_contour, hole_contour, index, best_vertex);
        }
    }
}

/// Returns mutable references to two distinct elements.
fn index_pair<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The width of the set. (Along the x-axis in cell units.)
    pub width: u16,
    /// The height of the set. (Along the z-axis in cell units.)
    pub height: u16,
    /// The AABB border size used to generate the source data from which the contours were derived.
    pub border_size: u16,
    /// The max edge error that this contour set was simplified with.
    pub max_error: f32,
}

/// Errors that can occur when building a [`ContourSet`] with [`CompactHeightfield::build_contours`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContourError {
    /// A region has more than one outline, so its holes cannot be merged.
    #[error("Multiple outlines for region {}", region.id())]
    MultipleOutlines {
        /// The offending region
        region: RegionId,
    },
    /// A region only has holes but no outline to merge them into.
    #[error("Missing outline for region {}", region.id())]
    MissingOutline {
        /// The offending region
        region: RegionId,
    },
}

bitflags::bitflags! {
    /// The region id of a contour vertex, combined with flags describing the vertex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct RegionVertexId: u32 {
        /// No region.
        const NONE = 0;

        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = 0xffff;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. If a contour vertex's region ID has this bit set, the
        /// vertex will later be removed in order to match the segments and vertices
        /// at tile boundaries.
        /// (Used during the build process.)
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        /// (Used during the region and contour build process.)
        const AREA_BORDER = 0x20_000;
    }
}

impl From<RegionId> for RegionVertexId {
    fn from(region_id: RegionId) -> Self {
        RegionVertexId::from_bits_retain(region_id.bits() as u32)
    }
}

impl From<RegionVertexId> for RegionId {
    fn from(region_vertex_id: RegionVertexId) -> Self {
        let bits = region_vertex_id.bits() & RegionVertexId::REGION_MASK.bits();
        RegionId::from_bits_retain(bits as u16)
    }
}

/// A vertex of a [`Contour`] in field space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// The position of the vertex in cell units.
    pub position: U16Vec3,
    /// The region on the other side of the edge starting at this vertex, plus vertex flags.
    pub region: RegionVertexId,
}

impl ContourVertex {
    /// The region on the other side of the edge starting at this vertex.
    #[inline]
    pub fn neighbor_region(&self) -> RegionId {
        RegionId::from(self.region)
    }
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    /// Simplified contour vertex and connection data.
    pub vertices: Vec<ContourVertex>,
    /// Raw contour vertex and connection data.
    pub raw_vertices: Vec<ContourVertex>,
    /// Region ID of the contour.
    pub region: RegionId,
    /// Area type of the contour.
    pub area: AreaType,
}

bitflags::bitflags! {
    /// Contour build flags used in [`CompactHeightfield::build_contours`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BuildContoursFlags: u8 {
        /// Tessellate solid (impassable) edges during contour simplification.
        const TESSELLATE_SOLID_WALL_EDGES = 1;
        /// Tessellate edges between areas during contour simplification.
        const TESSELLATE_AREA_EDGES = 2;

        /// Default flags for building contours.
        const DEFAULT = Self::TESSELLATE_SOLID_WALL_EDGES.bits();
    }
}

impl Default for BuildContoursFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}
