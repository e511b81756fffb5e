use std::collections::HashMap;

use glam::{IVec3, U16Vec3};
use navtile_data::{EdgeLink, TileSide};
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, RegionId,
    contours::ContourSet,
    math::{intersect, intersect_prop, left, left_on, next, prev, vequal},
};

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonMesh {
    /// The mesh vertices in cell units.
    pub vertices: Vec<U16Vec3>,
    /// Polygon vertex indices, padded with [`PolygonMesh::NO_INDEX`].
    /// [Length: [`Self::polygon_count`] * [`Self::max_vertices_per_polygon`]]
    pub polygons: Vec<u16>,
    /// What lies across each polygon edge. Laid out like [`Self::polygons`].
    pub neighbors: Vec<EdgeLink>,
    /// The region id assigned to each polygon.
    pub regions: Vec<RegionId>,
    /// The flags assigned to each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: usize,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
}

impl PolygonMesh {
    /// Marks an unused vertex slot of a polygon.
    pub const NO_INDEX: u16 = u16::MAX;

    /// The largest supported value for [`Self::max_vertices_per_polygon`].
    pub const MAX_VERTICES_PER_POLYGON: usize = 6;

    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.regions.len()
    }

    /// The vertex indices of polygon `index`, without padding.
    pub fn polygon(&self, index: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon;
        let polygon = &self.polygons[index * nvp..(index + 1) * nvp];
        &polygon[..count_polygon_vertices(polygon)]
    }

    /// The edge links of polygon `index`, one per vertex of [`Self::polygon`].
    pub fn polygon_neighbors(&self, index: usize) -> &[EdgeLink] {
        let nvp = self.max_vertices_per_polygon;
        let len = self.polygon(index).len();
        &self.neighbors[index * nvp..index * nvp + len]
    }

    /// Builds the neighbor links between polygons that share an edge.
    fn build_adjacency(&mut self) {
        struct Edge {
            polygon: usize,
            edge: usize,
            other: Option<(usize, usize)>,
        }

        let nvp = self.max_vertices_per_polygon;
        let mut edges: HashMap<(u16, u16), Edge> = HashMap::new();
        for i in 0..self.polygon_count() {
            let polygon = self.polygon(i);
            for (j, &v0) in polygon.iter().enumerate() {
                let v1 = polygon[next(j, polygon.len())];
                if v0 < v1 {
                    edges.insert(
                        (v0, v1),
                        Edge {
                            polygon: i,
                            edge: j,
                            other: None,
                        },
                    );
                }
            }
        }
        for i in 0..self.polygon_count() {
            let polygon = self.polygon(i);
            for (j, &v0) in polygon.iter().enumerate() {
                let v1 = polygon[next(j, polygon.len())];
                if v0 > v1
                    && let Some(edge) = edges.get_mut(&(v1, v0))
                    && edge.other.is_none()
                {
                    edge.other = Some((i, j));
                }
            }
        }

        for edge in edges.values() {
            let Some((other_polygon, other_edge)) = edge.other else {
                continue;
            };
            self.neighbors[edge.polygon * nvp + edge.edge] = EdgeLink::Internal(other_polygon as u16);
            self.neighbors[other_polygon * nvp + other_edge] = EdgeLink::Internal(edge.polygon as u16);
        }
    }

    /// Tags unconnected edges that lie on the tile border of a `width` x `height` field.
    fn mark_portal_edges(&mut self, width: u16, height: u16) {
        let nvp = self.max_vertices_per_polygon;
        for i in 0..self.polygon_count() {
            let n = self.polygon(i).len();
            for j in 0..n {
                // Skip connected edges.
                if self.neighbors[i * nvp + j] != EdgeLink::Boundary {
                    continue;
                }
                let va = self.vertices[self.polygons[i * nvp + j] as usize];
                let vb = self.vertices[self.polygons[i * nvp + next(j, n)] as usize];

                let side = if va.x == 0 && vb.x == 0 {
                    Some(TileSide::NegX)
                } else if va.z == height && vb.z == height {
                    Some(TileSide::PosZ)
                } else if va.x == width && vb.x == width {
                    Some(TileSide::PosX)
                } else if va.z == 0 && vb.z == 0 {
                    Some(TileSide::NegZ)
                } else {
                    None
                };
                if let Some(side) = side {
                    self.neighbors[i * nvp + j] = EdgeLink::Portal(side);
                }
            }
        }
    }
}

impl ContourSet {
    /// Builds a polygon mesh from the provided contours.
    ///
    /// Each contour is triangulated and the triangles are greedily merged into convex polygons
    /// of at most `max_vertices_per_polygon` vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_vertices_per_polygon` is out of range or the mesh grows too large to be indexed.
    pub fn into_polygon_mesh(
        self,
        max_vertices_per_polygon: usize,
    ) -> Result<PolygonMesh, PolygonMeshError> {
        let nvp = max_vertices_per_polygon;
        if !(3..=PolygonMesh::MAX_VERTICES_PER_POLYGON).contains(&nvp) {
            return Err(PolygonMeshError::InvalidVerticesPerPolygon {
                max_vertices_per_polygon: nvp,
            });
        }

        let mut max_vertices = 0;
        let mut max_triangles = 0;
        let mut max_vertices_per_contour = 0;
        for contour in &self.contours {
            // Skip null contours.
            if contour.vertices.len() < 3 {
                continue;
            }
            max_vertices += contour.vertices.len();
            max_triangles += contour.vertices.len() - 2;
            max_vertices_per_contour = max_vertices_per_contour.max(contour.vertices.len());
        }
        if max_vertices >= 0xfffe {
            return Err(PolygonMeshError::TooManyVertices {
                vertex_count: max_vertices,
            });
        }

        let mut mesh = PolygonMesh {
            vertices: Vec::with_capacity(max_vertices),
            polygons: Vec::with_capacity(max_triangles * nvp),
            neighbors: Vec::with_capacity(max_triangles * nvp),
            regions: Vec::with_capacity(max_triangles),
            flags: Vec::new(),
            areas: Vec::with_capacity(max_triangles),
            max_vertices_per_polygon: nvp,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            border_size: self.border_size,
            max_edge_error: self.max_error,
        };

        let mut welder = VertexWelder::default();
        let mut positions = Vec::with_capacity(max_vertices_per_contour);
        let mut triangles = Vec::with_capacity(max_vertices_per_contour);
        let mut indices = Vec::with_capacity(max_vertices_per_contour);
        let mut polygons: Vec<u16> = Vec::with_capacity(max_vertices_per_contour * nvp);

        for contour in &self.contours {
            if contour.vertices.len() < 3 {
                continue;
            }

            // Triangulate contour
            positions.clear();
            positions.extend(contour.vertices.iter().map(|v| v.position.as_ivec3()));
            triangles.clear();
            if !triangulate(&positions, &mut triangles) {
                // Bad triangulation, should not happen.
                tracing::warn!(
                    "Failed to fully triangulate contour of region {}",
                    contour.region.id()
                );
            }

            // Add and merge vertices.
            indices.clear();
            indices.extend(
                contour
                    .vertices
                    .iter()
                    .map(|v| welder.add_vertex(v.position, &mut mesh.vertices)),
            );

            // Build initial polygons.
            polygons.clear();
            for &[a, b, c] in &triangles {
                let (a, b, c) = (indices[a], indices[b], indices[c]);
                if a != b && a != c && b != c {
                    polygons.extend([a, b, c]);
                    polygons.extend(std::iter::repeat_n(PolygonMesh::NO_INDEX, nvp - 3));
                }
            }
            if polygons.is_empty() {
                continue;
            }

            // Merge polygons.
            if nvp > 3 {
                merge_polygons(&mut polygons, &mesh.vertices, nvp);
            }

            // Store polygons.
            for polygon in polygons.chunks_exact(nvp) {
                mesh.polygons.extend_from_slice(polygon);
                mesh.neighbors
                    .extend(std::iter::repeat_n(EdgeLink::Boundary, nvp));
                mesh.regions.push(contour.region);
                mesh.areas.push(contour.area);
            }
        }

        if mesh.polygon_count() > 0xfffe {
            return Err(PolygonMeshError::TooManyPolygons {
                polygon_count: mesh.polygon_count(),
            });
        }

        // Calculate adjacency.
        mesh.build_adjacency();

        // Find portal edges
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(self.width, self.height);
        }

        // Just allocate the mesh flags array. The user is responsible to fill it.
        mesh.flags = vec![0; mesh.polygon_count()];
        Ok(mesh)
    }
}

/// Welds vertices that share a column and are within two cells of each other vertically.
#[derive(Default)]
struct VertexWelder {
    buckets: HashMap<(u16, u16), Vec<u16>>,
}

impl VertexWelder {
    fn add_vertex(&mut self, position: U16Vec3, vertices: &mut Vec<U16Vec3>) -> u16 {
        let bucket = self.buckets.entry((position.x, position.z)).or_default();
        if let Some(&i) = bucket
            .iter()
            .find(|&&i| vertices[i as usize].y.abs_diff(position.y) <= 2)
        {
            return i;
        }
        // Could not find, create new.
        let i = vertices.len() as u16;
        vertices.push(position);
        bucket.push(i);
        i
    }
}

fn count_polygon_vertices(polygon: &[u16]) -> usize {
    polygon
        .iter()
        .position(|&v| v == PolygonMesh::NO_INDEX)
        .unwrap_or(polygon.len())
}

/// Repeatedly merges the pair of polygons with the longest shared edge, as long as the result stays convex.
fn merge_polygons(polygons: &mut Vec<u16>, vertices: &[U16Vec3], nvp: usize) {
    loop {
        // Find best polygons to merge.
        let polygon_count = polygons.len() / nvp;
        let mut best_merge_value = 0;
        let mut best = None;
        for j in 0..polygon_count {
            let pj = &polygons[j * nvp..(j + 1) * nvp];
            for k in j + 1..polygon_count {
                let pk = &polygons[k * nvp..(k + 1) * nvp];
                if let Some((value, ea, eb)) = poly_merge_value(pj, pk, vertices, nvp)
                    && value > best_merge_value
                {
                    best_merge_value = value;
                    best = Some((j, k, ea, eb));
                }
            }
        }

        let Some((pa, pb, ea, eb)) = best else {
            // Could not merge any polygons, stop.
            break;
        };
        let merged = merge_polygon_vertices(
            &polygons[pa * nvp..(pa + 1) * nvp],
            &polygons[pb * nvp..(pb + 1) * nvp],
            ea,
            eb,
            nvp,
        );
        polygons[pa * nvp..(pa + 1) * nvp].copy_from_slice(&merged);
        // Fill the hole left by pb with the last polygon.
        let last = polygon_count - 1;
        if pb != last {
            polygons.copy_within(last * nvp..(last + 1) * nvp, pb * nvp);
        }
        polygons.truncate(last * nvp);
    }
}

/// Returns the squared length of the shared edge and the edge indices in both polygons,
/// or `None` if the polygons cannot be merged.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    vertices: &[U16Vec3],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = count_polygon_vertices(pa);
    let nb = count_polygon_vertices(pb);

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let (ea, eb) = (0..na).find_map(|i| {
        let va0 = pa[i];
        let va1 = pa[next(i, na)];
        let (va0, va1) = (va0.min(va1), va0.max(va1));
        (0..nb)
            .find(|&j| {
                let vb0 = pb[j];
                let vb1 = pb[next(j, nb)];
                va0 == vb0.min(vb1) && va1 == vb0.max(vb1)
            })
            .map(|j| (i, j))
    })?;

    let vertex = |i: u16| vertices[i as usize].as_ivec3();

    // Check to see if the merged polygon would be convex.
    let va = pa[prev(ea, na)];
    let vb = pa[ea];
    let vc = pb[(eb + 2) % nb];
    if !left(vertex(va), vertex(vb), vertex(vc)) {
        return None;
    }

    let va = pb[prev(eb, nb)];
    let vb = pb[eb];
    let vc = pa[(ea + 2) % na];
    if !left(vertex(va), vertex(vb), vertex(vc)) {
        return None;
    }

    let d = vertex(pa[ea]) - vertex(pa[next(ea, na)]);
    Some((d.x * d.x + d.z * d.z, ea, eb))
}

fn merge_polygon_vertices(pa: &[u16], pb: &[u16], ea: usize, eb: usize, nvp: usize) -> Vec<u16> {
    let na = count_polygon_vertices(pa);
    let nb = count_polygon_vertices(pb);
    let mut merged = Vec::with_capacity(nvp);
    // Add pa
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    // Add pb
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged.resize(nvp, PolygonMesh::NO_INDEX);
    merged
}

#[derive(Debug, Clone, Copy)]
struct EarVertex {
    /// Index into the vertices of the polygon being triangulated.
    index: usize,
    /// Whether the vertex can be clipped off as an ear.
    removable: bool,
}

/// Ear clipping triangulation of a simple polygon.
/// Returns `false` if the polygon could not be fully triangulated. `triangles` then holds the ears found so far.
pub(crate) fn triangulate(vertices: &[IVec3], triangles: &mut Vec<[usize; 3]>) -> bool {
    let mut polygon: Vec<EarVertex> = (0..vertices.len())
        .map(|index| EarVertex {
            index,
            removable: false,
        })
        .collect();
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, vertices, &polygon) {
            polygon[i1].removable = true;
        }
    }

    while polygon.len() > 3 {
        let n = polygon.len();
        let position = |i: usize| vertices[polygon[i].index];
        let diagonal_length = |a: usize, b: usize| {
            let d = position(b) - position(a);
            d.x * d.x + d.z * d.z
        };

        let mut min = None;
        for i in 0..n {
            let i1 = next(i, n);
            if polygon[i1].removable {
                let len = diagonal_length(i, next(i1, n));
                if min.is_none_or(|(min_len, _)| len < min_len) {
                    min = Some((len, i));
                }
            }
        }

        if min.is_none() {
            // We might get here because the contour has overlapping segments, like this:
            //
            //  A o-o=====o---o B
            //   /  |C   D|    \.
            //  o   o     o     o
            //  :   :     :     :
            //
            // We'll try to recover by loosing up the in-cone test a bit so that a diagonal
            // like A-B or C-D can be found and we can continue.
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, vertices, &polygon) {
                    let len = diagonal_length(i, i2);
                    if min.is_none_or(|(min_len, _)| len < min_len) {
                        min = Some((len, i));
                    }
                }
            }
        }
        let Some((_, i)) = min else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return false;
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        triangles.push([polygon[i].index, polygon[i1].index, polygon[i2].index]);

        // Removes P[i1]
        polygon.remove(i1);
        let n = polygon.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        // Update diagonal flags.
        polygon[i].removable = diagonal(prev(i, n), i1, vertices, &polygon);
        polygon[i1].removable = diagonal(i, next(i1, n), vertices, &polygon);
    }

    // Append the remaining triangle.
    triangles.push([polygon[0].index, polygon[1].index, polygon[2].index]);
    true
}

/// Returns `true` if the diagonal `(i, j)` is strictly internal to the polygon in the neighborhood of `i`.
fn in_cone(i: usize, j: usize, vertices: &[IVec3], polygon: &[EarVertex]) -> bool {
    let n = polygon.len();
    let pi = vertices[polygon[i].index];
    let pj = vertices[polygon[j].index];
    let pi1 = vertices[polygon[next(i, n)].index];
    let pin1 = vertices[polygon[prev(i, n)].index];

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn in_cone_loose(i: usize, j: usize, vertices: &[IVec3], polygon: &[EarVertex]) -> bool {
    let n = polygon.len();
    let pi = vertices[polygon[i].index];
    let pj = vertices[polygon[j].index];
    let pi1 = vertices[polygon[next(i, n)].index];
    let pin1 = vertices[polygon[prev(i, n)].index];

    if left_on(pin1, pi, pi1) {
        return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns `true` if `(i, j)` is a proper internal *or* external diagonal of the polygon,
/// ignoring edges incident to `i` and `j`.
fn diagonalie(
    i: usize,
    j: usize,
    vertices: &[IVec3],
    polygon: &[EarVertex],
    intersects: fn(IVec3, IVec3, IVec3, IVec3) -> bool,
) -> bool {
    let n = polygon.len();
    let d0 = vertices[polygon[i].index];
    let d1 = vertices[polygon[j].index];

    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vertices[polygon[k].index];
        let p1 = vertices[polygon[k1].index];
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersects(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

/// Returns `true` if `(i, j)` is a proper internal diagonal of the polygon.
fn diagonal(i: usize, j: usize, vertices: &[IVec3], polygon: &[EarVertex]) -> bool {
    in_cone(i, j, vertices, polygon) && diagonalie(i, j, vertices, polygon, intersect)
}

fn diagonal_loose(i: usize, j: usize, vertices: &[IVec3], polygon: &[EarVertex]) -> bool {
    in_cone_loose(i, j, vertices, polygon) && diagonalie(i, j, vertices, polygon, intersect_prop)
}

/// Errors that can occur when building a [`PolygonMesh`] with [`ContourSet::into_polygon_mesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolygonMeshError {
    /// The vertex limit per polygon is not supported.
    #[error(
        "Polygons must have between 3 and {} vertices, got {max_vertices_per_polygon}",
        PolygonMesh::MAX_VERTICES_PER_POLYGON
    )]
    InvalidVerticesPerPolygon {
        /// The requested vertex limit
        max_vertices_per_polygon: usize,
    },
    /// The mesh has more vertices than can be indexed.
    #[error("Too many vertices: {vertex_count}")]
    TooManyVertices {
        /// The number of vertices the mesh would need
        vertex_count: usize,
    },
    /// The mesh has more polygons than can be indexed.
    #[error("Too many polygons: {polygon_count}")]
    TooManyPolygons {
        /// The number of polygons the mesh would need
        polygon_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compact_heightfield::tests::flat_heightfield, contours::BuildContoursFlags,
    };

    fn polygon_mesh(
        size: u16,
        floor: impl Fn(u16, u16) -> Option<u16>,
        border_size: u16,
        nvp: usize,
    ) -> PolygonMesh {
        let mut chf = flat_heightfield(size, floor).into_compact(2, 1).unwrap();
        chf.build_distance_field();
        chf.build_regions(border_size, 0, 20).unwrap();
        chf.build_contours(1.3, 12, BuildContoursFlags::DEFAULT)
            .unwrap()
            .into_polygon_mesh(nvp)
            .unwrap()
    }

    fn twice_area(vertices: &[IVec3], triangles: &[[usize; 3]]) -> i64 {
        triangles
            .iter()
            .map(|&[a, b, c]| crate::math::area2(vertices[a], vertices[b], vertices[c]).abs())
            .sum()
    }

    #[test]
    fn convex_square_is_triangulated() {
        let vertices = [
            IVec3::new(0, 0, 0),
            IVec3::new(0, 0, 4),
            IVec3::new(4, 0, 4),
            IVec3::new(4, 0, 0),
        ];
        let mut triangles = Vec::new();
        assert!(triangulate(&vertices, &mut triangles));
        assert_eq!(triangles.len(), 2);
        assert_eq!(twice_area(&vertices, &triangles), 32);
    }

    #[test]
    fn concave_polygon_is_triangulated() {
        let vertices = [
            IVec3::new(0, 0, 0),
            IVec3::new(0, 0, 4),
            IVec3::new(2, 0, 4),
            IVec3::new(2, 0, 2),
            IVec3::new(4, 0, 2),
            IVec3::new(4, 0, 0),
        ];
        let mut triangles = Vec::new();
        assert!(triangulate(&vertices, &mut triangles));
        assert_eq!(triangles.len(), 4);
        // The L-shape covers 12 square cells.
        assert_eq!(twice_area(&vertices, &triangles), 24);
    }

    #[test]
    fn square_becomes_a_single_polygon() {
        let mesh = polygon_mesh(6, |_, _| Some(1), 0, 6);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygon(0).len(), 4);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(
            mesh.polygon_neighbors(0)
                .iter()
                .all(|link| *link == EdgeLink::Boundary)
        );
        assert_eq!(mesh.flags, vec![0]);
        assert_eq!(mesh.areas, vec![AreaType::DEFAULT_WALKABLE]);
    }

    #[test]
    fn triangles_only_mesh_links_neighbors() {
        let mesh = polygon_mesh(6, |_, _| Some(1), 0, 3);
        assert_eq!(mesh.polygon_count(), 2);
        assert!(mesh.polygon_neighbors(0).contains(&EdgeLink::Internal(1)));
        assert!(mesh.polygon_neighbors(1).contains(&EdgeLink::Internal(0)));
    }

    #[test]
    fn tile_border_edges_become_portals() {
        let mesh = polygon_mesh(12, |_, _| Some(1), 2, 6);
        let links: Vec<EdgeLink> = (0..mesh.polygon_count())
            .flat_map(|i| mesh.polygon_neighbors(i).to_vec())
            .collect();
        for side in TileSide::ALL {
            assert!(links.contains(&EdgeLink::Portal(side)), "missing {side:?}");
        }
        assert!(!links.contains(&EdgeLink::Boundary));
    }

    #[test]
    fn merged_polygons_are_convex() {
        let mesh = polygon_mesh(
            12,
            |x, z| (x < 6 || z < 6).then_some(1),
            0,
            6,
        );
        assert!(mesh.polygon_count() >= 2);
        for i in 0..mesh.polygon_count() {
            let polygon = mesh.polygon(i);
            let n = polygon.len();
            assert!((3..=6).contains(&n));
            for j in 0..n {
                let a = mesh.vertices[polygon[j] as usize].as_ivec3();
                let b = mesh.vertices[polygon[next(j, n)] as usize].as_ivec3();
                let c = mesh.vertices[polygon[next(next(j, n), n)] as usize].as_ivec3();
                assert!(left_on(a, b, c), "polygon {i} is not convex at {j}");
            }
        }
    }

    #[test]
    fn invalid_vertex_limit_is_rejected() {
        let cset = ContourSet {
            contours: Vec::new(),
            aabb: Aabb3d::default(),
            cell_size: 1.0,
            cell_height: 1.0,
            width: 1,
            height: 1,
            border_size: 0,
            max_error: 1.3,
        };
        assert_eq!(
            cset.into_polygon_mesh(7),
            Err(PolygonMeshError::InvalidVerticesPerPolygon {
                max_vertices_per_polygon: 7
            })
        );
    }
}
