//! Pathfinding and raycasts over a [`Navmesh`].

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use glam::{Vec3, Vec3Swizzles as _};
use tracing::{debug, warn};

use crate::{
    Navmesh, PolyRef,
    math::{intersect_segment_poly_2d, tri_area_2d, vequal},
};

/// Input of [`NavmeshQuery::find_path`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PathfindQuery {
    /// Where the path starts.
    pub source: Vec3,
    /// Where the path should end.
    pub target: Vec3,
    /// Half extents of the box searched for polygons around `source` and `target`.
    pub search_extent: Vec3,
    /// Upper bound on both the polygons searched through and the returned points.
    /// `0` means unbounded. A found path always keeps its source and target, even for a bound of `1`.
    pub max_path_points: usize,
}

/// Output of [`NavmeshQuery::find_path`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PathfindResult {
    /// Whether a path to the target polygon exists.
    pub found: bool,
    /// The corners of the path, starting at the source and ending at the target,
    /// both moved onto the navmesh. Empty if no path was found.
    pub points: Vec<Vec3>,
}

/// Input of [`NavmeshQuery::raycast`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RaycastQuery {
    /// Where the ray starts. Moved onto the closest polygon before walking.
    pub start: Vec3,
    /// Where the ray ends. Only its xz-position is used.
    pub end: Vec3,
    /// Half extents of the box searched for a polygon around `start`.
    pub search_extent: Vec3,
    /// Upper bound on the polygons walked through. `0` means unbounded.
    pub max_path_points: usize,
}

/// Output of [`NavmeshQuery::raycast`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RaycastResult {
    /// Whether the ray hit a wall before reaching `end`.
    pub hit: bool,
    /// Where the ray hit the wall, or `end` if it did not.
    pub position: Vec3,
    /// The normal of the wall on the xz-plane, facing the start of the ray. Zero if nothing was hit.
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    poly: PolyRef,
    parent: Option<usize>,
    /// Where the node was entered.
    pos: Vec3,
    /// Cost from the start.
    g: f32,
    /// Cost from the start plus the estimate to the goal.
    f: f32,
    /// Polygons in the corridor up to and including this one.
    depth: usize,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct HeapNode {
    f: f32,
    sequence: u64,
    node: usize,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap. Ties go to the node pushed first.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Scratch space for queries against a [`Navmesh`].
///
/// Reusing one instance across queries avoids reallocating the search state.
/// Concurrent queries each need their own instance.
#[derive(Debug, Default)]
pub struct NavmeshQuery {
    nodes: Vec<Node>,
    lookup: HashMap<PolyRef, usize>,
    open: BinaryHeap<HeapNode>,
    sequence: u64,
}

impl NavmeshQuery {
    /// Scales the heuristic slightly below the true distance so it never overestimates.
    const H_SCALE: f32 = 0.999;

    /// Creates empty scratch space.
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.lookup.clear();
        self.open.clear();
        self.sequence = 0;
    }

    fn push(&mut self, node: usize) {
        self.open.push(HeapNode {
            f: self.nodes[node].f,
            sequence: self.sequence,
            node,
        });
        self.sequence += 1;
    }

    /// Finds a path between two points on the navmesh.
    ///
    /// Returns `found == false` with no points if either point is not near the navmesh
    /// or the target cannot be reached within `max_path_points` polygons.
    pub fn find_path(&mut self, navmesh: &Navmesh, query: &PathfindQuery) -> PathfindResult {
        let Some((start_ref, start_pos)) =
            navmesh.find_nearest_poly(query.source, query.search_extent)
        else {
            debug!("No polygon near the path source {}", query.source);
            return PathfindResult::default();
        };
        let Some((end_ref, end_pos)) = navmesh.find_nearest_poly(query.target, query.search_extent)
        else {
            debug!("No polygon near the path target {}", query.target);
            return PathfindResult::default();
        };

        let Some(corridor) = self.find_corridor(
            navmesh,
            start_ref,
            end_ref,
            start_pos,
            end_pos,
            query.max_path_points,
        ) else {
            return PathfindResult::default();
        };
        let Some(mut points) = string_pull(navmesh, &corridor, start_pos, end_pos) else {
            return PathfindResult::default();
        };

        // The source and the target are always kept.
        let max = query.max_path_points;
        if max > 0 && points.len() > max.max(2) {
            points.truncate(max.max(2) - 1);
            points.push(end_pos);
        }
        PathfindResult {
            found: true,
            points,
        }
    }

    /// A* over polygon links. Returns the polygons from `start_ref` to `end_ref`.
    fn find_corridor(
        &mut self,
        navmesh: &Navmesh,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
        max_polygons: usize,
    ) -> Option<Vec<PolyRef>> {
        self.reset();
        self.nodes.push(Node {
            poly: start_ref,
            parent: None,
            pos: start_pos,
            g: 0.0,
            f: start_pos.distance(end_pos) * Self::H_SCALE,
            depth: 1,
            closed: false,
        });
        self.lookup.insert(start_ref, 0);
        self.push(0);

        let mut goal = None;
        while let Some(HeapNode { f, node: current, .. }) = self.open.pop() {
            let node = self.nodes[current];
            // Stale heap entries of nodes that were improved later.
            if node.closed || f > node.f {
                continue;
            }
            self.nodes[current].closed = true;

            if node.poly == end_ref {
                goal = Some(current);
                break;
            }
            if max_polygons > 0 && node.depth >= max_polygons {
                continue;
            }

            let parent_poly = node.parent.map(|parent| self.nodes[parent].poly);
            let Some(tile) = navmesh.tile(node.poly.tile) else {
                continue;
            };
            for link in tile.links(node.poly.poly) {
                let neighbor = link.neighbor;
                if Some(neighbor) == parent_poly || !navmesh.is_valid_poly_ref(neighbor) {
                    continue;
                }
                let Some((left, right)) = navmesh.portal_points(node.poly, link) else {
                    continue;
                };
                let pos = left.lerp(right, 0.5);

                let (g, h) = if neighbor == end_ref {
                    (node.g + node.pos.distance(pos) + pos.distance(end_pos), 0.0)
                } else {
                    (
                        node.g + node.pos.distance(pos),
                        pos.distance(end_pos) * Self::H_SCALE,
                    )
                };

                let index = match self.lookup.get(&neighbor) {
                    Some(&existing) => {
                        let existing_node = &self.nodes[existing];
                        if existing_node.closed || existing_node.g <= g {
                            continue;
                        }
                        existing
                    }
                    None => {
                        self.nodes.push(Node {
                            poly: neighbor,
                            parent: None,
                            pos,
                            g: 0.0,
                            f: 0.0,
                            depth: 0,
                            closed: false,
                        });
                        let index = self.nodes.len() - 1;
                        self.lookup.insert(neighbor, index);
                        index
                    }
                };
                let updated = &mut self.nodes[index];
                updated.parent = Some(current);
                updated.pos = pos;
                updated.g = g;
                updated.f = g + h;
                updated.depth = node.depth + 1;
                self.push(index);
            }
        }

        let Some(goal) = goal else {
            debug!(
                "Target polygon not reached after visiting {} polygons",
                self.nodes.len()
            );
            return None;
        };

        let mut corridor = Vec::new();
        let mut current = Some(goal);
        while let Some(index) = current {
            corridor.push(self.nodes[index].poly);
            current = self.nodes[index].parent;
        }
        corridor.reverse();
        Some(corridor)
    }

    /// Walks along the navmesh surface from `start` towards `end` until a wall is hit.
    pub fn raycast(&mut self, navmesh: &Navmesh, query: &RaycastQuery) -> RaycastResult {
        const RANGE_EPS: f32 = 1e-3;
        let Some((start_ref, start_pos)) =
            navmesh.find_nearest_poly(query.start, query.search_extent)
        else {
            debug!("No polygon near the ray start {}", query.start);
            return RaycastResult::default();
        };
        let end = query.end;
        let direction = end - start_pos;

        let mut current = start_ref;
        let mut visited = 0;
        loop {
            visited += 1;
            let Some(vertices) = navmesh.poly_vertices(current) else {
                return RaycastResult::default();
            };
            let Some(clip) = intersect_segment_poly_2d(start_pos, end, &vertices) else {
                // The ray grazes the polygon it started in, there is nowhere to go.
                return RaycastResult {
                    hit: true,
                    position: start_pos,
                    normal: Vec3::ZERO,
                };
            };
            let Some(edge) = clip.leave_edge else {
                return RaycastResult {
                    hit: false,
                    position: end,
                    normal: Vec3::ZERO,
                };
            };

            let n = vertices.len();
            let (va, vb) = (vertices[edge], vertices[(edge + 1) % n]);
            let crossing = start_pos + direction * clip.t_max;

            let next = navmesh.tile(current.tile).and_then(|tile| {
                tile.links(current.poly)
                    .iter()
                    .filter(|link| link.edge as usize == edge)
                    .find(|link| {
                        // Partial links only hold if the ray crosses the shared part.
                        let ab = vb.xz() - va.xz();
                        let len = ab.length_squared();
                        if len <= 0.0 {
                            return false;
                        }
                        let t = ab.dot(crossing.xz() - va.xz()) / len;
                        t >= link.range.0 - RANGE_EPS && t <= link.range.1 + RANGE_EPS
                    })
                    .map(|link| link.neighbor)
            });

            let Some(next) = next else {
                let height = navmesh
                    .closest_point_on_poly(current, crossing)
                    .map_or(crossing.y, |(point, _)| point.y);
                let edge_dir = vb - va;
                let mut normal = Vec3::new(edge_dir.z, 0.0, -edge_dir.x).normalize_or_zero();
                if normal.dot(start_pos - crossing) < 0.0 {
                    normal = -normal;
                }
                return RaycastResult {
                    hit: true,
                    position: crossing.with_y(height),
                    normal,
                };
            };

            if query.max_path_points > 0 && visited >= query.max_path_points {
                warn!(
                    "Raycast stopped after walking through {visited} polygons without reaching its end"
                );
                let height = navmesh
                    .closest_point_on_poly(current, crossing)
                    .map_or(crossing.y, |(point, _)| point.y);
                return RaycastResult {
                    hit: false,
                    position: crossing.with_y(height),
                    normal: Vec3::ZERO,
                };
            }
            current = next;
        }
    }
}

/// Shortens the corridor into its corners with the simple stupid funnel algorithm.
fn string_pull(
    navmesh: &Navmesh,
    corridor: &[PolyRef],
    start: Vec3,
    end: Vec3,
) -> Option<Vec<Vec3>> {
    let mut portals = Vec::with_capacity(corridor.len() + 1);
    portals.push((start, start));
    for pair in corridor.windows(2) {
        let link = navmesh.link_between(pair[0], pair[1])?;
        portals.push(navmesh.portal_points(pair[0], link)?);
    }
    portals.push((end, end));

    let mut points = vec![start];
    let push = |points: &mut Vec<Vec3>, point: Vec3| {
        if points.last().is_none_or(|last| !vequal(*last, point)) {
            points.push(point);
        }
    };

    let mut apex = start;
    let mut portal_left = start;
    let mut portal_right = start;
    let mut apex_index = 0;
    let mut left_index = 0;
    let mut right_index = 0;

    let mut i = 1;
    while i < portals.len() {
        let (left, right) = portals[i];

        // Update right vertex.
        if tri_area_2d(apex, portal_right, right) <= 0.0 {
            if vequal(apex, portal_right) || tri_area_2d(apex, portal_left, right) > 0.0 {
                // Tighten the funnel.
                portal_right = right;
                right_index = i;
            } else {
                // Right over left, the left corner is on the path.
                push(&mut points, portal_left);
                apex = portal_left;
                apex_index = left_index;
                portal_left = apex;
                portal_right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        // Update left vertex.
        if tri_area_2d(apex, portal_left, left) >= 0.0 {
            if vequal(apex, portal_left) || tri_area_2d(apex, portal_right, left) < 0.0 {
                // Tighten the funnel.
                portal_left = left;
                left_index = i;
            } else {
                // Left over right, the right corner is on the path.
                push(&mut points, portal_right);
                apex = portal_right;
                apex_index = right_index;
                portal_left = apex;
                portal_right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }
        i += 1;
    }

    push(&mut points, end);
    if points.len() == 1 {
        // Start and end coincide.
        points.push(end);
    }
    Some(points)
}
