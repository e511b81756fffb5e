//! Packs the output of the build pipeline into a [`TileData`].

use glam::{IVec2, U16Vec3, Vec3};
use navtile_data::{BvNode, TileData, TileHeader, TilePolygon};
use thiserror::Error;

use crate::{Aabb3d, DetailPolygonMesh, NavmeshConfig, PolygonMesh, math::grid_to_world};

/// Assembles a tile out of a polygon mesh and its detail mesh.
///
/// Polygon vertices are moved to world space one cell above the floor of their spans,
/// which is where the detail mesh lies as well.
///
/// # Errors
///
/// Returns an error if the mesh has no polygons or the detail mesh does not belong to it.
pub fn build_tile_data(
    mesh: &PolygonMesh,
    detail: &DetailPolygonMesh,
    config: &NavmeshConfig,
    coord: IVec2,
) -> Result<TileData, TileBuildError> {
    let polygon_count = mesh.polygon_count();
    if polygon_count == 0 {
        return Err(TileBuildError::NoPolygons);
    }
    if detail.meshes.len() != polygon_count {
        return Err(TileBuildError::DetailMeshMismatch {
            polygons: polygon_count,
            detail_meshes: detail.meshes.len(),
        });
    }

    let cs = mesh.cell_size;
    let ch = mesh.cell_height;
    let origin = mesh.aabb.min;
    let vertices: Vec<Vec3> = mesh
        .vertices
        .iter()
        .map(|v| grid_to_world(origin, v.as_vec3() + Vec3::Y, cs, ch))
        .collect();

    let polygons = (0..polygon_count)
        .map(|i| TilePolygon {
            vertices: mesh.polygon(i).to_vec(),
            neighbors: mesh.polygon_neighbors(i).to_vec(),
            area: mesh.areas[i].0,
            flags: mesh.flags[i],
        })
        .collect::<Vec<_>>();

    // Detail vertices may lie above or below the polygon, so both contribute to the bounds.
    let aabb = vertices
        .iter()
        .chain(&detail.vertices)
        .fold(None, |aabb: Option<Aabb3d>, &v| {
            Some(match aabb {
                Some(aabb) => Aabb3d::new(aabb.min.min(v), aabb.max.max(v)),
                None => Aabb3d::new(v, v),
            })
        })
        .unwrap_or(mesh.aabb);

    let bv_quant_factor = 1.0 / cs;
    let mut tile = TileData {
        header: TileHeader {
            coord,
            aabb,
            walkable_height: config.agent.height,
            walkable_radius: config.agent.radius,
            walkable_climb: config.agent.max_climb,
            cell_size: cs,
            cell_height: ch,
            max_vertices_per_polygon: mesh.max_vertices_per_polygon as u8,
            bv_quant_factor,
        },
        vertices,
        polygons,
        detail_meshes: detail.meshes.clone(),
        detail_vertices: detail.vertices.clone(),
        detail_triangles: detail.triangles.clone(),
        bv_tree: Vec::new(),
    };
    tile.bv_tree = build_bv_tree(&tile);
    Ok(tile)
}

#[derive(Debug, Clone, Copy)]
struct BvItem {
    min: U16Vec3,
    max: U16Vec3,
    polygon: i32,
}

/// Builds a bounding volume tree over the quantized bounds of the tile's polygons.
fn build_bv_tree(tile: &TileData) -> Vec<BvNode> {
    let quant = tile.header.bv_quant_factor;
    let origin = tile.header.aabb.min;
    let quantize = |v: Vec3, round: fn(f32) -> f32| {
        let q = (v - origin) * quant;
        U16Vec3::new(
            round(q.x).clamp(0.0, u16::MAX as f32) as u16,
            round(q.y).clamp(0.0, u16::MAX as f32) as u16,
            round(q.z).clamp(0.0, u16::MAX as f32) as u16,
        )
    };

    let mut items: Vec<BvItem> = (0..tile.polygon_count())
        .map(|i| {
            let mesh = &tile.detail_meshes[i];
            let start = mesh.first_vertex as usize;
            let end = start + mesh.vertex_count as usize;
            let (min, max) = tile
                .polygon_vertices(i)
                .chain(tile.detail_vertices[start..end].iter().copied())
                .fold((Vec3::MAX, Vec3::MIN), |(min, max), v| (min.min(v), max.max(v)));
            BvItem {
                min: quantize(min, f32::floor),
                max: quantize(max, f32::ceil),
                polygon: i as i32,
            }
        })
        .collect();

    let mut nodes = Vec::with_capacity(items.len() * 2);
    subdivide(&mut items, &mut nodes);
    nodes
}

fn subdivide(items: &mut [BvItem], nodes: &mut Vec<BvNode>) {
    let current = nodes.len();
    if let [item] = items {
        // Leaf
        nodes.push(BvNode {
            min: item.min,
            max: item.max,
            index: item.polygon,
        });
        return;
    }

    // Split
    let (min, max) = items.iter().fold((U16Vec3::MAX, U16Vec3::MIN), |(min, max), item| {
        (min.min(item.min), max.max(item.max))
    });
    nodes.push(BvNode { min, max, index: 0 });

    let extent = max - min;
    if extent.x >= extent.y && extent.x >= extent.z {
        items.sort_by_key(|item| item.min.x);
    } else if extent.z >= extent.y {
        items.sort_by_key(|item| item.min.z);
    } else {
        items.sort_by_key(|item| item.min.y);
    }

    let (left, right) = items.split_at_mut(items.len() / 2);
    subdivide(left, nodes);
    subdivide(right, nodes);

    // Negative index means escape.
    nodes[current].index = -((nodes.len() - current) as i32);
}

/// Errors returned by [`build_tile_data`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileBuildError {
    /// The polygon mesh is empty, so there is nothing to store.
    #[error("Polygon mesh has no polygons")]
    NoPolygons,
    /// The detail mesh was built for a different polygon mesh.
    #[error("Polygon mesh has {polygons} polygons, but the detail mesh has {detail_meshes} sub-meshes")]
    DetailMeshMismatch {
        /// The number of polygons
        polygons: usize,
        /// The number of detail sub-meshes
        detail_meshes: usize,
    },
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use navtile_data::{EdgeLink, TileSide};

    use super::*;
    use crate::{AgentSettings, BuildSettings, CompactHeightfield};

    fn config() -> NavmeshConfig {
        let settings = BuildSettings {
            aabb: Aabb3d::new(Vec3::ZERO, Vec3::new(6.0, 4.0, 6.0)),
            cell_size: 1.0,
            cell_height: 1.0,
            ..Default::default()
        };
        let agent = AgentSettings {
            height: 3.0,
            radius: 0.0,
            max_climb: 1.0,
            ..Default::default()
        };
        NavmeshConfig::derive(&settings, &agent).unwrap()
    }

    fn meshes(
        floor: impl Fn(u16, u16) -> Option<u16>,
        border_size: u16,
        nvp: usize,
    ) -> (PolygonMesh, DetailPolygonMesh) {
        let size = 6 + border_size * 2;
        let mut chf: CompactHeightfield =
            crate::compact_heightfield::tests::flat_heightfield(size, floor)
                .into_compact(2, 1)
                .unwrap();
        chf.build_distance_field();
        chf.build_regions(border_size, 0, 20).unwrap();
        let mesh = chf
            .build_contours(1.3, 12, crate::BuildContoursFlags::DEFAULT)
            .unwrap()
            .into_polygon_mesh(nvp)
            .unwrap();
        let detail = DetailPolygonMesh::new(&mesh, &chf, 0.0, 1.0).unwrap();
        (mesh, detail)
    }

    #[test]
    fn square_becomes_a_single_polygon_tile() {
        let (mesh, detail) = meshes(|_, _| Some(1), 0, 6);
        let tile = build_tile_data(&mesh, &detail, &config(), IVec2::ZERO).unwrap();
        assert_eq!(tile.validate(), Ok(()));
        assert_eq!(tile.polygon_count(), 1);
        assert_eq!(tile.vertices.len(), 4);
        assert!(tile.vertices.iter().all(|v| v.y == 2.0));
        assert_eq!(tile.header.aabb.min, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(tile.header.aabb.max, Vec3::new(6.0, 2.0, 6.0));
        assert_eq!(tile.bv_tree.len(), 1);
        assert!(tile.bv_tree[0].is_leaf());
        assert_eq!(tile.header.walkable_height, 3.0);
    }

    #[test]
    fn bv_tree_covers_every_polygon_once() {
        let (mesh, detail) = meshes(|_, _| Some(1), 0, 3);
        let tile = build_tile_data(&mesh, &detail, &config(), IVec2::ZERO).unwrap();
        assert_eq!(tile.polygon_count(), 2);
        // One internal node with two leaves.
        assert_eq!(tile.bv_tree.len(), 3);
        assert_eq!(tile.bv_tree[0].index, -3);
        let mut leaves: Vec<i32> = tile
            .bv_tree
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.index)
            .collect();
        leaves.sort();
        assert_eq!(leaves, vec![0, 1]);
        let root = tile.bv_tree[0];
        for node in &tile.bv_tree[1..] {
            assert!(node.min.cmpge(root.min).all() && node.max.cmple(root.max).all());
        }
    }

    #[test]
    fn border_edges_become_portals() {
        let (mesh, detail) = meshes(|_, _| Some(1), 2, 6);
        let tile = build_tile_data(&mesh, &detail, &config(), IVec2::new(3, 4)).unwrap();
        assert_eq!(tile.header.coord, IVec2::new(3, 4));
        let sides: Vec<TileSide> = tile.polygons[0]
            .neighbors
            .iter()
            .filter_map(|link| match link {
                EdgeLink::Portal(side) => Some(*side),
                _ => None,
            })
            .collect();
        assert_eq!(sides.len(), 4);
        for side in TileSide::ALL {
            assert!(sides.contains(&side));
        }
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let (mesh, detail) = meshes(|_, _| None, 0, 6);
        assert_eq!(
            build_tile_data(&mesh, &detail, &config(), IVec2::ZERO),
            Err(TileBuildError::NoPolygons)
        );
    }
}
