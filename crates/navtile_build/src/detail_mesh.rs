use std::collections::VecDeque;

use glam::{Vec3, Vec3A, Vec3Swizzles as _};
use navtile_data::{DetailSubMesh, DetailTriangle};
use thiserror::Error;

use crate::{
    CompactHeightfield, PolygonMesh, RegionId,
    math::{
        dir_offset, dir_offset_x, dir_offset_z, distance_squared_between_point_and_line_vec2,
        distance_squared_between_point_and_line_vec3, next, prev,
    },
};

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetailPolygonMesh {
    /// The sub-mesh data, one per polygon of the source [`PolygonMesh`].
    pub meshes: Vec<DetailSubMesh>,
    /// The mesh vertices in world space.
    pub vertices: Vec<Vec3>,
    /// The mesh triangles, indexed relative to their sub-mesh.
    pub triangles: Vec<DetailTriangle>,
}

const MAX_VERTS: usize = 127;
const MAX_VERTS_PER_EDGE: usize = 32;
const UNSET_HEIGHT: u16 = u16::MAX;

impl DetailPolygonMesh {
    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// `sample_distance` is the spacing of height samples in world units, zero disables sampling.
    /// `sample_max_error` is the maximum distance in world units the detail surface may deviate
    /// from the heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if no height data can be found for a polygon.
    pub fn new(
        mesh: &PolygonMesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailPolygonMeshError> {
        let mut dmesh = DetailPolygonMesh::default();
        if mesh.vertices.is_empty() || mesh.polygon_count() == 0 {
            return Ok(dmesh);
        }
        let chf = heightfield;
        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let orig = Vec3A::from(mesh.aabb.min);
        let border_size = mesh.border_size;
        let height_search_radius = 1.max(mesh.max_edge_error.ceil() as u32);

        let mut builder = PolyDetailBuilder {
            sample_distance,
            sample_max_error,
            height_search_radius,
            cell_size: chf.cell_size,
            cell_height: chf.cell_height,
            ..Default::default()
        };
        let mut queue = VecDeque::with_capacity(512);
        let mut hp = HeightPatch::default();
        let mut max_hw = 0;
        let mut max_hh = 0;

        // Find max size for a polygon area.
        let bounds: Vec<Bounds> = (0..mesh.polygon_count())
            .map(|i| {
                let mut bounds = Bounds {
                    xmin: chf.width,
                    xmax: 0,
                    zmin: chf.height,
                    zmax: 0,
                };
                for &v in mesh.polygon(i) {
                    let v = mesh.vertices[v as usize];
                    bounds.xmin = bounds.xmin.min(v.x);
                    bounds.xmax = bounds.xmax.max(v.x);
                    bounds.zmin = bounds.zmin.min(v.z);
                    bounds.zmax = bounds.zmax.max(v.z);
                }
                bounds.xmin = bounds.xmin.saturating_sub(1);
                bounds.xmax = chf.width.min(bounds.xmax + 1);
                bounds.zmin = bounds.zmin.saturating_sub(1);
                bounds.zmax = chf.height.min(bounds.zmax + 1);
                if bounds.xmin < bounds.xmax && bounds.zmin < bounds.zmax {
                    max_hw = max_hw.max(bounds.width());
                    max_hh = max_hh.max(bounds.height());
                }
                bounds
            })
            .collect();
        hp.data = vec![UNSET_HEIGHT; max_hw as usize * max_hh as usize];
        dmesh.meshes.reserve(mesh.polygon_count());

        let mut poly = Vec::with_capacity(PolygonMesh::MAX_VERTICES_PER_POLYGON);
        for (i, bounds) in bounds.iter().enumerate() {
            let polygon = mesh.polygon(i);

            // Store polygon vertices for processing.
            poly.clear();
            poly.extend(polygon.iter().map(|&v| {
                let v = mesh.vertices[v as usize].as_vec3();
                Vec3A::new(v.x * cs, v.y * ch, v.z * cs)
            }));

            // Get the height data from the area of the polygon.
            hp.xmin = bounds.xmin;
            hp.zmin = bounds.zmin;
            hp.width = bounds.width();
            hp.height = bounds.height();
            hp.get_height_data(chf, mesh, polygon, border_size, &mut queue, mesh.regions[i])
                .ok_or(DetailPolygonMeshError::MissingHeightData { polygon: i })?;

            // Build detail mesh.
            builder.build(&poly, &hp);

            // Store detail submesh.
            dmesh.meshes.push(DetailSubMesh {
                first_vertex: dmesh.vertices.len() as u32,
                vertex_count: builder.vertices.len() as u32,
                first_triangle: dmesh.triangles.len() as u32,
                triangle_count: builder.triangles.len() as u32,
            });

            // Move detail verts to world space.
            dmesh.vertices.extend(builder.vertices.iter().map(|&v| {
                let mut v = v + orig;
                // Lift the surface by one cell, the spans' floors are the top of the solid voxels.
                v.y += chf.cell_height;
                Vec3::from(v)
            }));
            dmesh.triangles.extend(
                builder
                    .triangles
                    .iter()
                    .zip(&builder.triangle_flags)
                    .map(|(tri, &edge_flags)| DetailTriangle {
                        vertices: tri.map(|v| v as u16),
                        edge_flags,
                    }),
            );
        }

        Ok(dmesh)
    }
}

/// Scratch state for triangulating a single polygon, reused across polygons.
#[derive(Debug, Default)]
struct PolyDetailBuilder {
    sample_distance: f32,
    sample_max_error: f32,
    height_search_radius: u32,
    cell_size: f32,
    cell_height: f32,
    vertices: Vec<Vec3A>,
    hull: Vec<usize>,
    triangles: Vec<[usize; 3]>,
    triangle_flags: Vec<u8>,
    edges: Vec<DelaunayEdge>,
    samples: Vec<Sample>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    x: i32,
    y: u16,
    z: i32,
    added: bool,
}

impl PolyDetailBuilder {
    fn build(&mut self, poly: &[Vec3A], hp: &HeightPatch) {
        let nin = poly.len();
        let sample_dist = self.sample_distance;
        let cs = self.cell_size;
        let ch = self.cell_height;
        let ics = 1.0 / cs;

        self.vertices.clear();
        self.vertices.extend_from_slice(poly);
        self.hull.clear();
        self.edges.clear();
        self.triangles.clear();
        self.triangle_flags.clear();

        // Calculate minimum extents of the polygon based on input data.
        let min_extent = poly_min_extent(poly);

        // Tessellate outlines.
        // This is done in separate pass in order to ensure
        // seamless height values across the ply boundaries.
        if sample_dist > 0.0 {
            let mut edge = [Vec3A::ZERO; MAX_VERTS_PER_EDGE + 1];
            let mut j = nin - 1;
            for i in 0..nin {
                let mut vj = poly[j];
                let mut vi = poly[i];
                let mut swapped = false;
                // Make sure the segments are always handled in same order
                // using lexological sort or else there will be seams.
                if (vj.x - vi.x).abs() < 1.0e-6 {
                    if vj.z > vi.z {
                        std::mem::swap(&mut vj, &mut vi);
                        swapped = true;
                    }
                } else if vj.x > vi.x {
                    std::mem::swap(&mut vj, &mut vi);
                    swapped = true;
                }
                // Create samples along the edge.
                let dij = vi - vj;
                let d = dij.xz().length();
                let mut nn = 1 + (d / sample_dist).floor() as usize;
                nn = nn.min(MAX_VERTS_PER_EDGE - 1);
                if self.vertices.len() + nn >= MAX_VERTS {
                    nn = (MAX_VERTS - 1).saturating_sub(self.vertices.len()).max(1);
                }
                for (k, pos) in edge.iter_mut().enumerate().take(nn + 1) {
                    let u = k as f32 / nn as f32;
                    *pos = vj + dij * u;
                    pos.y = get_height(*pos, ics, ch, self.height_search_radius, hp) as f32 * ch;
                }

                // Simplify samples.
                let mut idx = vec![0, nn];
                let mut k = 0;
                while k < idx.len() - 1 {
                    let a = idx[k];
                    let b = idx[k + 1];
                    let va = edge[a];
                    let vb = edge[b];
                    // Find maximum deviation along the segment.
                    let mut max_d = 0.0;
                    let mut max_i = None;
                    for (m, &point) in edge.iter().enumerate().take(b).skip(a + 1) {
                        let dev = distance_squared_between_point_and_line_vec3(point, (va, vb));
                        if dev > max_d {
                            max_d = dev;
                            max_i = Some(m);
                        }
                    }
                    // If the max deviation is larger than accepted error,
                    // add new point, else continue to next segment.
                    match max_i {
                        Some(max_i) if max_d > self.sample_max_error * self.sample_max_error => {
                            idx.insert(k + 1, max_i);
                        }
                        _ => k += 1,
                    }
                }

                self.hull.push(j);
                // Add new vertices.
                let inner = &idx[1..idx.len() - 1];
                let mut add = |k: usize| {
                    self.hull.push(self.vertices.len());
                    self.vertices.push(edge[k]);
                };
                if swapped {
                    inner.iter().rev().for_each(|&k| add(k));
                } else {
                    inner.iter().for_each(|&k| add(k));
                }
                j = i;
            }
        } else {
            self.hull.extend(0..nin);
        }

        // If the polygon minimum extent is small (sliver or small triangle), do not try to add internal points.
        if min_extent < sample_dist * 2.0 {
            triangulate_hull(&self.vertices, &self.hull, nin, &mut self.triangles);
            self.set_triangle_flags();
            return;
        }

        // Tessellate the base mesh.
        // We're using the triangulate_hull instead of delaunay_hull as it tends to
        // create a bit better triangulation for long thin triangles when there
        // are no internal points.
        triangulate_hull(&self.vertices, &self.hull, nin, &mut self.triangles);

        if self.triangles.is_empty() {
            // Could not triangulate the poly, make sure there is some valid data there.
            tracing::warn!("Could not triangulate polygon ({} verts)", self.vertices.len());
            return;
        }

        if sample_dist > 0.0 {
            // Create sample locations in a grid.
            let (min, max) = poly
                .iter()
                .fold((poly[0], poly[0]), |(min, max), &v| (min.min(v), max.max(v)));
            let x0 = (min.x / sample_dist).floor() as i32;
            let x1 = (max.x / sample_dist).ceil() as i32;
            let z0 = (min.z / sample_dist).floor() as i32;
            let z1 = (max.z / sample_dist).ceil() as i32;
            self.samples.clear();
            for z in z0..z1 {
                for x in x0..x1 {
                    let pt = Vec3A::new(
                        x as f32 * sample_dist,
                        (max.y + min.y) * 0.5,
                        z as f32 * sample_dist,
                    );
                    // Make sure the samples are not too close to the edges.
                    if dist_to_poly(poly, pt) > -sample_dist / 2.0 {
                        continue;
                    }
                    let y = get_height(pt, ics, ch, self.height_search_radius, hp);
                    self.samples.push(Sample {
                        x,
                        y,
                        z,
                        added: false,
                    });
                }
            }

            // Add the samples starting from the one that has the most
            // error. The procedure stops when all samples are added
            // or when the max error is within treshold.
            for _ in 0..self.samples.len() {
                if self.vertices.len() >= MAX_VERTS {
                    break;
                }

                // Find sample with most error.
                let mut best_pt = Vec3A::ZERO;
                let mut best_d = 0.0;
                let mut best_i = None;
                for (i, sample) in self.samples.iter().enumerate() {
                    if sample.added {
                        continue;
                    }
                    // The sample location is jittered to get rid of some bad triangulations
                    // which are cause by symmetrical data from the grid structure.
                    let pt = Vec3A::new(
                        sample.x as f32 * sample_dist + jitter_x(i) * cs * 0.1,
                        sample.y as f32 * ch,
                        sample.z as f32 * sample_dist + jitter_z(i) * cs * 0.1,
                    );
                    let Some(d) = dist_to_tri_mesh(pt, &self.vertices, &self.triangles) else {
                        // Did not hit the mesh.
                        continue;
                    };
                    if d > best_d {
                        best_d = d;
                        best_i = Some(i);
                        best_pt = pt;
                    }
                }
                // If the max error is within accepted threshold, stop tesselating.
                let Some(best_i) = best_i.filter(|_| best_d > self.sample_max_error) else {
                    break;
                };
                // Mark sample as added.
                self.samples[best_i].added = true;
                // Add the new sample point.
                self.vertices.push(best_pt);

                // Create new triangulation.
                // TODO: Incremental add instead of full rebuild.
                self.edges.clear();
                self.triangles.clear();
                delaunay_hull(&self.vertices, &self.hull, &mut self.triangles, &mut self.edges);
            }
        }

        self.set_triangle_flags();
    }

    /// Find edges that lie on hull and mark them as such.
    fn set_triangle_flags(&mut self) {
        let hull = &self.hull;
        let flag = |a: usize, b: usize| {
            if on_hull(a, b, hull) {
                DetailTriangle::EDGE_BOUNDARY
            } else {
                0
            }
        };
        self.triangle_flags.clear();
        self.triangle_flags.extend(
            self.triangles
                .iter()
                .map(|&[a, b, c]| flag(a, b) | flag(b, c) << 2 | flag(c, a) << 4),
        );
    }
}

fn on_hull(a: usize, b: usize, hull: &[usize]) -> bool {
    let nhull = hull.len();
    // All internal sampled points come after the hull so we can early out for those.
    if a >= nhull || b >= nhull {
        return false;
    }
    let mut j = nhull - 1;
    for i in 0..nhull {
        if a == hull[j] && b == hull[i] {
            return true;
        }
        j = i;
    }
    false
}

fn triangulate_hull(verts: &[Vec3A], hull: &[usize], nin: usize, tris: &mut Vec<[usize; 3]>) {
    let nhull = hull.len();
    if nhull < 3 {
        return;
    }
    let mut start = 0;
    let mut left = 1;
    let mut right = nhull - 1;

    // Start from an ear with shortest perimeter.
    // This tends to favor well formed triangles as starting point.
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        if hull[i] >= nin {
            // Ears are triangles with original vertices as middle vertex while others are actually line segments on edges
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let pv = verts[hull[pi]].xz();
        let cv = verts[hull[i]].xz();
        let nv = verts[hull[ni]].xz();
        let d = pv.distance(cv) + cv.distance(nv) + nv.distance(pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    // Add first triangle
    tris.push([hull[start], hull[left], hull[right]]);

    // Triangulate the polygon by moving left or right,
    // depending on which triangle has shorter perimeter.
    // This heuristic was chose empirically, since it seems
    // handle tessellated straight edges well.
    while next(left, nhull) != right {
        // Check to see if se should advance left or right.
        let nleft = next(left, nhull);
        let nright = prev(right, nhull);

        let cvleft = verts[hull[left]].xz();
        let nvleft = verts[hull[nleft]].xz();
        let cvright = verts[hull[right]].xz();
        let nvright = verts[hull[nright]].xz();
        let dleft = cvleft.distance(nvleft) + nvleft.distance(cvright);
        let dright = cvright.distance(nvright) + cvleft.distance(nvright);
        if dleft < dright {
            tris.push([hull[left], hull[nleft], hull[right]]);
            left = nleft;
        } else {
            tris.push([hull[left], hull[nright], hull[right]]);
            right = nright;
        }
    }
}

/// A face bordering a [`DelaunayEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Undefined,
    Hull,
    Triangle(usize),
}

#[derive(Debug, Clone, Copy)]
struct DelaunayEdge {
    s: usize,
    t: usize,
    /// The face on the left of `s -> t`.
    left: Face,
    /// The face on the right of `s -> t`.
    right: Face,
}

impl DelaunayEdge {
    fn update_left_face(&mut self, s: usize, t: usize, face: Face) {
        if self.s == s && self.t == t && self.left == Face::Undefined {
            self.left = face;
        } else if self.t == s && self.s == t && self.right == Face::Undefined {
            self.right = face;
        }
    }
}

fn find_edge(edges: &[DelaunayEdge], s: usize, t: usize) -> Option<usize> {
    edges
        .iter()
        .position(|e| (e.s == s && e.t == t) || (e.s == t && e.t == s))
}

fn add_edge(edges: &mut Vec<DelaunayEdge>, max_edges: usize, s: usize, t: usize, left: Face, right: Face) {
    if edges.len() >= max_edges {
        tracing::error!("add_edge: Too many edges ({max_edges})");
        return;
    }
    // Add edge if not already in the triangulation.
    if find_edge(edges, s, t).is_none() {
        edges.push(DelaunayEdge { s, t, left, right });
    }
}

#[inline]
fn vcross2(p1: Vec3A, p2: Vec3A, p3: Vec3A) -> f32 {
    let u1 = p2.x - p1.x;
    let v1 = p2.z - p1.z;
    let u2 = p3.x - p1.x;
    let v2 = p3.z - p1.z;
    u1 * v2 - v1 * u2
}

/// Returns the center and radius of the circle through the three points on the xz-plane,
/// or `None` if they are collinear.
fn circum_circle(p1: Vec3A, p2: Vec3A, p3: Vec3A) -> Option<(Vec3A, f32)> {
    const EPS: f32 = 1e-6;
    // Calculate the circle relative to p1, to avoid some precision issues.
    let v1 = Vec3A::ZERO;
    let v2 = p2 - p1;
    let v3 = p3 - p1;

    let cp = vcross2(v1, v2, v3);
    if cp.abs() <= EPS {
        return None;
    }
    let v1_sq = v1.xz().length_squared();
    let v2_sq = v2.xz().length_squared();
    let v3_sq = v3.xz().length_squared();
    let c = Vec3A::new(
        (v1_sq * (v2.z - v3.z) + v2_sq * (v3.z - v1.z) + v3_sq * (v1.z - v2.z)) / (2.0 * cp),
        0.0,
        (v1_sq * (v3.x - v2.x) + v2_sq * (v1.x - v3.x) + v3_sq * (v2.x - v1.x)) / (2.0 * cp),
    );
    let r = c.xz().distance(v1.xz());
    Some((c + p1, r))
}

fn overlap_seg_seg_2d(a: Vec3A, b: Vec3A, c: Vec3A, d: Vec3A) -> bool {
    let a1 = vcross2(a, b, d);
    let a2 = vcross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = vcross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

fn overlap_edges(pts: &[Vec3A], edges: &[DelaunayEdge], s1: usize, t1: usize) -> bool {
    edges.iter().any(|e| {
        let (s0, t0) = (e.s, e.t);
        // Same or connected edges do not overlap.
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            return false;
        }
        overlap_seg_seg_2d(pts[s0], pts[t0], pts[s1], pts[t1])
    })
}

fn complete_facet(
    pts: &[Vec3A],
    edges: &mut Vec<DelaunayEdge>,
    max_edges: usize,
    face_count: &mut usize,
    e: usize,
) {
    const EPS: f32 = 1e-5;
    const TOLERANCE: f32 = 0.001;

    let edge = edges[e];
    // Cache s and t.
    let (s, t) = if edge.left == Face::Undefined {
        (edge.s, edge.t)
    } else if edge.right == Face::Undefined {
        (edge.t, edge.s)
    } else {
        // Edge already completed.
        return;
    };

    // Find best point on left of edge.
    let mut pt = None;
    let mut circle: Option<(Vec3A, f32)> = None;
    for u in 0..pts.len() {
        if u == s || u == t {
            continue;
        }
        if vcross2(pts[s], pts[t], pts[u]) <= EPS {
            continue;
        }
        let Some((c, r)) = circle else {
            // The circle is not updated yet, do it now.
            pt = Some(u);
            circle = Some(circum_circle(pts[s], pts[t], pts[u]).unwrap_or((pts[s], 0.0)));
            continue;
        };
        let d = c.xz().distance(pts[u].xz());
        if d > r * (1.0 + TOLERANCE) {
            // Outside current circumcircle, skip.
            continue;
        }
        if d >= r * (1.0 - TOLERANCE) {
            // Inside epsilon circum circle, do extra tests to make sure the edge is valid.
            // s-u and t-u cannot overlap with s-pt nor t-pt if they exists.
            if overlap_edges(pts, edges, s, u) || overlap_edges(pts, edges, t, u) {
                continue;
            }
        }
        // Inside safe circumcircle, or the edge is valid. Update circle.
        pt = Some(u);
        circle = Some(circum_circle(pts[s], pts[t], pts[u]).unwrap_or((pts[s], 0.0)));
    }

    // Add new triangle or update edge info if s-t is on hull.
    let Some(pt) = pt else {
        edges[e].update_left_face(s, t, Face::Hull);
        return;
    };
    let face = Face::Triangle(*face_count);
    // Update face information of edge being completed.
    edges[e].update_left_face(s, t, face);

    // Add new edge or update face info of old edge.
    match find_edge(edges, pt, s) {
        Some(e) => edges[e].update_left_face(pt, s, face),
        None => add_edge(edges, max_edges, pt, s, face, Face::Undefined),
    }
    // Add new edge or update face info of old edge.
    match find_edge(edges, t, pt) {
        Some(e) => edges[e].update_left_face(t, pt, face),
        None => add_edge(edges, max_edges, t, pt, face, Face::Undefined),
    }
    *face_count += 1;
}

/// Delaunay triangulation of `pts` constrained to the outline `hull`.
fn delaunay_hull(
    pts: &[Vec3A],
    hull: &[usize],
    tris: &mut Vec<[usize; 3]>,
    edges: &mut Vec<DelaunayEdge>,
) {
    let mut face_count = 0;
    let max_edges = pts.len() * 10;
    edges.clear();

    let mut j = hull.len() - 1;
    for i in 0..hull.len() {
        add_edge(edges, max_edges, hull[j], hull[i], Face::Hull, Face::Undefined);
        j = i;
    }

    let mut current_edge = 0;
    while current_edge < edges.len() {
        if edges[current_edge].left == Face::Undefined {
            complete_facet(pts, edges, max_edges, &mut face_count, current_edge);
        }
        if edges[current_edge].right == Face::Undefined {
            complete_facet(pts, edges, max_edges, &mut face_count, current_edge);
        }
        current_edge += 1;
    }

    // Create tris
    let mut faces: Vec<[Option<usize>; 3]> = vec![[None; 3]; face_count];
    for e in edges.iter() {
        if let Face::Triangle(f) = e.right {
            let t = &mut faces[f];
            if t[0].is_none() {
                t[0] = Some(e.s);
                t[1] = Some(e.t);
            } else if t[0] == Some(e.t) {
                t[2] = Some(e.s);
            } else if t[1] == Some(e.s) {
                t[2] = Some(e.t);
            }
        }
        if let Face::Triangle(f) = e.left {
            let t = &mut faces[f];
            if t[0].is_none() {
                t[0] = Some(e.t);
                t[1] = Some(e.s);
            } else if t[0] == Some(e.s) {
                t[2] = Some(e.t);
            } else if t[1] == Some(e.t) {
                t[2] = Some(e.s);
            }
        }
    }

    tris.clear();
    for (i, face) in faces.iter().enumerate() {
        match face {
            [Some(a), Some(b), Some(c)] => tris.push([*a, *b, *c]),
            _ => tracing::warn!("delaunay_hull: Removing dangling face {i} {face:?}"),
        }
    }
}

fn dist_to_tri_mesh(p: Vec3A, verts: &[Vec3A], tris: &[[usize; 3]]) -> Option<f32> {
    tris.iter()
        .filter_map(|&[a, b, c]| dist_pt_tri(p, verts[a], verts[b], verts[c]))
        .min_by(f32::total_cmp)
}

/// Distance from point p to triangle defined by vertices a, b, and c.
/// Returns None if the point is outside the triangle.
fn dist_pt_tri(p: Vec3A, a: Vec3A, b: Vec3A, c: Vec3A) -> Option<f32> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let dot00 = v0.xz().dot(v0.xz());
    let dot01 = v0.xz().dot(v1.xz());
    let dot02 = v0.xz().dot(v2.xz());
    let dot11 = v1.xz().dot(v1.xz());
    let dot12 = v1.xz().dot(v2.xz());

    // Compute barycentric coordinates
    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    // If point lies inside the triangle, return interpolated y-coord.
    const EPS: f32 = 1.0e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + v0.y * u + v1.y * v;
        Some((y - p.y).abs())
    } else {
        None
    }
}

fn jitter_x(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0x8da6b343) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

fn jitter_z(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0xd8163841) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

/// Signed distance on the xz-plane from `p` to the polygon outline, negative inside.
fn dist_to_poly(verts: &[Vec3A], p: Vec3A) -> f32 {
    let mut dmin = f32::MAX;
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        if (vi.z > p.z) != (vj.z > p.z) && p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        dmin = dmin.min(distance_squared_between_point_and_line_vec2(
            p.xz(),
            (vj.xz(), vi.xz()),
        ));
        j = i;
    }
    let dmin = dmin.sqrt();
    if inside { -dmin } else { dmin }
}

fn get_height(f: Vec3A, ics: f32, ch: f32, radius: u32, hp: &HeightPatch) -> u16 {
    let ix = (f.x * ics + 0.01).floor() as i32;
    let iz = (f.z * ics + 0.01).floor() as i32;
    let ix = (ix - hp.xmin as i32).clamp(0, hp.width as i32 - 1);
    let iz = (iz - hp.zmin as i32).clamp(0, hp.height as i32 - 1);
    let mut h = hp.data_at(ix, iz);
    if h != UNSET_HEIGHT {
        return h;
    }
    // Special case when data might be bad.
    // Walk adjacent cells in a spiral up to 'radius', and look
    // for a pixel which has a valid height.
    let (mut x, mut z, mut dx, mut dz) = (1, 0, 1, 0);
    let max_size = radius * 2 + 1;
    let max_iter = max_size * max_size - 1;

    let mut next_ring_iter_start = 8;
    let mut next_ring_iters = 16;

    let mut dmin = f32::MAX;
    for i in 0..max_iter {
        let nx = ix + x;
        let nz = iz + z;
        if nx >= 0 && nz >= 0 && nx < hp.width as i32 && nz < hp.height as i32 {
            let nh = hp.data_at(nx, nz);
            if nh != UNSET_HEIGHT {
                let d = (nh as f32 * ch - f.y).abs();
                if d < dmin {
                    h = nh;
                    dmin = d;
                }
            }
        }
        // We are searching in a grid which looks approximately like this:
        //  __________
        // |2 ______ 2|
        // | |1 __ 1| |
        // | | |__| | |
        // | |______| |
        // |__________|
        // We want to find the best height as close to the center cell as possible. This means that
        // if we find a height in one of the neighbor cells to the center, we don't want to
        // expand further out than the 8 neighbors - we want to limit our search to the closest
        // of these "rings", but the best height in the ring.
        // Each ring has 8 more cells than the previous one. If we are about to enter the next
        // ring and have found a height, we abort the search.
        if i + 1 == next_ring_iter_start {
            if h != UNSET_HEIGHT {
                break;
            }
            next_ring_iter_start += next_ring_iters;
            next_ring_iters += 8;
        }

        if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
            (dx, dz) = (-dz, dx);
        }
        x += dx;
        z += dz;
    }
    h
}

/// The smallest width of the polygon on the xz-plane, measured from each edge to its farthest vertex.
fn poly_min_extent(verts: &[Vec3A]) -> f32 {
    let nverts = verts.len();
    let mut min_dist = f32::MAX;
    for i in 0..nverts {
        let ni = next(i, nverts);
        let p1 = verts[i].xz();
        let p2 = verts[ni].xz();
        let max_edge_dist = (0..nverts)
            .filter(|&j| j != i && j != ni)
            .map(|j| distance_squared_between_point_and_line_vec2(verts[j].xz(), (p1, p2)))
            .fold(0.0_f32, f32::max);
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist.sqrt()
}

/// Errors that can occur when building a [`DetailPolygonMesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetailPolygonMeshError {
    /// No span of the heightfield lies under the polygon.
    #[error("Found no height data under polygon {polygon}")]
    MissingHeightData {
        /// The index of the polygon in the [`PolygonMesh`]
        polygon: usize,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct HeightPatch {
    data: Vec<u16>,
    xmin: u16,
    zmin: u16,
    width: u16,
    height: u16,
}

impl HeightPatch {
    /// Fills the patch with the floor heights under `polygon`.
    /// Returns `None` if no seed span could be found.
    fn get_height_data(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonMesh,
        polygon: &[u16],
        bs: u16,
        queue: &mut VecDeque<(i32, i32, usize)>,
        region: RegionId,
    ) -> Option<()> {
        // Note: Reads to the compact heightfield are offset by border size (bs)
        // since border size offset is already removed from the polymesh vertices.
        queue.clear();
        let data_len = self.data_len();
        self.data[..data_len].fill(UNSET_HEIGHT);

        let mut empty = true;

        // We cannot sample from this poly if it was created from polys
        // of different regions. If it was then it could potentially be overlapping
        // with polys of that region and the heights sampled here could be wrong.
        if region.is_walkable_region() {
            // Copy the height from the same region, and mark region borders
            // as seed points to fill the rest.
            for hz in 0..self.height {
                let z = self.zmin + hz + bs;
                for hx in 0..self.width {
                    let x = self.xmin + hx + bs;
                    for i in chf.cell_at(x, z).index_range() {
                        let span = &chf.spans[i];
                        if span.region != region {
                            continue;
                        }
                        // Store height
                        *self.data_at_mut(hx as i32, hz as i32) = span.y;
                        empty = false;

                        // If any of the neighbours is not in same region,
                        // add the current location as flood fill start
                        let border = (0..4).any(|dir| {
                            chf.neighbor(x as i32, z as i32, i, dir)
                                .is_some_and(|(_, _, a_i)| chf.spans[a_i].region != region)
                        });
                        if border {
                            queue.push_back((x as i32, z as i32, i));
                        }
                        break;
                    }
                }
            }
        }

        // if the polygon does not contain any points from the current region (rare, but happens)
        // or if it could potentially be overlapping polygons of the same region,
        // then use the center as the seed point.
        if empty {
            self.seed_with_poly_center(chf, mesh, polygon, bs, queue)?;
        }

        // We assume the seed is centered in the polygon, so a BFS to collect
        // height data will ensure we do not move onto overlapping polygons and
        // sample wrong heights.
        while let Some((cx, cz, ci)) = queue.pop_front() {
            for dir in 0..4 {
                let Some((ax, az, ai)) = chf.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                let hx = ax - self.xmin as i32 - bs as i32;
                let hz = az - self.zmin as i32 - bs as i32;
                if hx < 0 || hz < 0 || hx >= self.width as i32 || hz >= self.height as i32 {
                    continue;
                }
                if self.data_at(hx, hz) != UNSET_HEIGHT {
                    continue;
                }
                *self.data_at_mut(hx, hz) = chf.spans[ai].y;
                queue.push_back((ax, az, ai));
            }
        }
        Some(())
    }

    fn seed_with_poly_center(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonMesh,
        polygon: &[u16],
        bs: u16,
        queue: &mut VecDeque<(i32, i32, usize)>,
    ) -> Option<()> {
        // Note: Reads to the compact heightfield are offset by border size (bs)
        // since border size offset is already removed from the polymesh vertices.
        const OFFSET: [(i32, i32); 9] = [
            (0, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
        ];
        let bs = bs as i32;
        let contains = |x: i32, z: i32| {
            x >= self.xmin as i32
                && x < self.xmin as i32 + self.width as i32
                && z >= self.zmin as i32
                && z < self.zmin as i32 + self.height as i32
        };

        // Find cell closest to a poly vertex
        let mut start = None;
        let mut dmin = UNSET_HEIGHT as i32;
        'vertices: for &v in polygon {
            let v = mesh.vertices[v as usize].as_ivec3();
            for (ox, oz) in OFFSET {
                if dmin <= 0 {
                    break 'vertices;
                }
                let ax = v.x + ox;
                let az = v.z + oz;
                if !contains(ax, az) {
                    continue;
                }
                for i in chf.cell_at((ax + bs) as u16, (az + bs) as u16).index_range() {
                    let d = (v.y - chf.spans[i].y as i32).abs();
                    if d < dmin {
                        start = Some((ax, az, i));
                        dmin = d;
                    }
                }
            }
        }
        let (mut cx, mut cz, mut ci) = start?;

        // Find center of the polygon
        let (pcx, pcz) = polygon.iter().fold((0, 0), |(x, z), &v| {
            let v = mesh.vertices[v as usize];
            (x + v.x as i32, z + v.z as i32)
        });
        let pcx = pcx / polygon.len() as i32;
        let pcz = pcz / polygon.len() as i32;

        // Use the queue as a stack for DFS
        let mut stack = vec![(cx, cz, ci)];
        let mut dirs = [0_u8, 1, 2, 3];
        let data_len = self.data_len();
        // The patch doubles as the visited set during the walk.
        self.data[..data_len].fill(0);

        // DFS to move to the center. Note that we need a DFS here and can not just move
        // directly towards the center without recording intermediate nodes, even though the polygons
        // are convex. In very rare we can get stuck due to contour simplification if we do not
        // record nodes.
        loop {
            let Some(current) = stack.pop() else {
                tracing::warn!("Walk towards polygon center failed to reach center");
                break;
            };
            (cx, cz, ci) = current;
            if cx == pcx && cz == pcz {
                break;
            }

            // If we are already at the correct X-position, prefer direction
            // directly towards the center in the Z-axis; otherwise prefer
            // direction in the X-axis
            let direct_dir = if cx == pcx {
                dir_offset(0, if pcz > cz { 1 } else { -1 })
            } else {
                dir_offset(if pcx > cx { 1 } else { -1 }, 0)
            } as usize;

            // Push the direct dir last so we start with this on next iteration
            dirs.swap(direct_dir, 3);

            for &dir in &dirs {
                let Some(con) = chf.spans[ci].con(dir) else {
                    continue;
                };
                let new_x = cx + dir_offset_x(dir) as i32;
                let new_z = cz + dir_offset_z(dir) as i32;
                let hpx = new_x - self.xmin as i32;
                let hpz = new_z - self.zmin as i32;
                if hpx < 0 || hpx >= self.width as i32 || hpz < 0 || hpz >= self.height as i32 {
                    continue;
                }
                if self.data_at(hpx, hpz) != 0 {
                    continue;
                }
                *self.data_at_mut(hpx, hpz) = 1;
                let (_, _, new_index) = chf.con_indices(cx + bs, cz + bs, dir, con);
                stack.push((new_x, new_z, new_index));
            }
            dirs.swap(direct_dir, 3);
        }

        // Height data seeds are given in coordinates with borders
        queue.clear();
        queue.push_back((cx + bs, cz + bs, ci));
        self.data[..data_len].fill(UNSET_HEIGHT);
        *self.data_at_mut(cx - self.xmin as i32, cz - self.zmin as i32) = chf.spans[ci].y;
        Some(())
    }

    #[inline]
    fn data_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    fn data_at(&self, x: i32, z: i32) -> u16 {
        self.data[(x + z * self.width as i32) as usize]
    }

    #[inline]
    fn data_at_mut(&mut self, x: i32, z: i32) -> &mut u16 {
        &mut self.data[(x + z * self.width as i32) as usize]
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Bounds {
    xmin: u16,
    xmax: u16,
    zmin: u16,
    zmax: u16,
}

impl Bounds {
    #[inline]
    fn width(&self) -> u16 {
        self.xmax - self.xmin
    }

    #[inline]
    fn height(&self) -> u16 {
        self.zmax - self.zmin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compact_heightfield::tests::flat_heightfield, contours::BuildContoursFlags};

    fn detail_mesh(
        floor: impl Fn(u16, u16) -> Option<u16>,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> DetailPolygonMesh {
        let mut chf = flat_heightfield(6, floor).into_compact(2, 1).unwrap();
        chf.build_distance_field();
        chf.build_regions(0, 0, 20).unwrap();
        let mesh = chf
            .build_contours(1.3, 12, BuildContoursFlags::DEFAULT)
            .unwrap()
            .into_polygon_mesh(6)
            .unwrap();
        DetailPolygonMesh::new(&mesh, &chf, sample_distance, sample_max_error).unwrap()
    }

    fn assert_indices_in_range(dmesh: &DetailPolygonMesh) {
        for sub in &dmesh.meshes {
            let start = sub.first_triangle as usize;
            let end = start + sub.triangle_count as usize;
            for tri in &dmesh.triangles[start..end] {
                assert!(tri.vertices.iter().all(|&v| (v as u32) < sub.vertex_count));
            }
        }
    }

    #[test]
    fn flat_polygon_without_sampling_keeps_its_vertices() {
        let dmesh = detail_mesh(|_, _| Some(1), 0.0, 1.0);
        assert_eq!(dmesh.meshes.len(), 1);
        assert_eq!(dmesh.meshes[0].vertex_count, 4);
        assert_eq!(dmesh.meshes[0].triangle_count, 2);
        // One cell above the floor of the spans.
        assert!(dmesh.vertices.iter().all(|v| v.y == 2.0));
        assert_indices_in_range(&dmesh);
        for tri in &dmesh.triangles {
            let boundary_edges = (0..3).filter(|&e| tri.is_boundary_edge(e)).count();
            assert_eq!(boundary_edges, 2);
        }
    }

    #[test]
    fn flat_polygon_does_not_gain_samples() {
        let dmesh = detail_mesh(|_, _| Some(1), 2.0, 0.5);
        assert_eq!(dmesh.meshes[0].vertex_count, 4);
        assert_eq!(dmesh.meshes[0].triangle_count, 2);
    }

    #[test]
    fn bumps_are_sampled() {
        let dmesh = detail_mesh(
            |x, z| Some(if (2..4).contains(&x) && (2..4).contains(&z) { 2 } else { 1 }),
            1.0,
            0.1,
        );
        assert_eq!(dmesh.meshes.len(), 1);
        assert!(dmesh.meshes[0].vertex_count > 4);
        assert!(dmesh.vertices.iter().any(|v| v.y > 2.5));
        assert_indices_in_range(&dmesh);
    }

    #[test]
    fn delaunay_triangulates_square_with_center() {
        let pts = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
            Vec3A::new(2.0, 0.0, 2.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(1.1, 1.0, 0.9),
        ];
        let hull = [0, 1, 2, 3];
        let mut tris = Vec::new();
        let mut edges = Vec::new();
        delaunay_hull(&pts, &hull, &mut tris, &mut edges);
        assert_eq!(tris.len(), 4);
        for tri in &tris {
            assert!(tri.contains(&4));
        }
    }

    #[test]
    fn circum_circle_of_right_triangle() {
        let (c, r) = circum_circle(
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
        )
        .unwrap();
        assert!((c.x - 1.0).abs() < 1e-5 && (c.z - 1.0).abs() < 1e-5);
        assert!((r - 2.0_f32.sqrt()).abs() < 1e-5);
        assert!(circum_circle(Vec3A::ZERO, Vec3A::X, Vec3A::X * 2.0).is_none());
    }

    #[test]
    fn signed_distance_to_polygon() {
        let square = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 4.0),
            Vec3A::new(4.0, 0.0, 4.0),
            Vec3A::new(4.0, 0.0, 0.0),
        ];
        assert!((dist_to_poly(&square, Vec3A::new(2.0, 0.0, 1.0)) + 1.0).abs() < 1e-5);
        assert!((dist_to_poly(&square, Vec3A::new(6.0, 0.0, 2.0)) - 2.0).abs() < 1e-5);
        assert!((poly_min_extent(&square) - 4.0).abs() < 1e-5);
    }
}
