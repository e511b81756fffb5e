//! The in-memory representation of a single navmesh tile.
//!
//! A tile is produced by the build pipeline, serialized with [`TileData::to_bytes`],
//! and loaded by the query engine with [`TileData::from_bytes`].

use glam::{IVec2, U16Vec3, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Aabb3d;

/// A self-contained navmesh tile: convex polygons, their adjacency, detail height meshes
/// and a bounding volume tree over the polygons.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileData {
    /// Tile placement and the agent parameters the tile was built for.
    pub header: TileHeader,
    /// Polygon vertices in world space.
    pub vertices: Vec<Vec3>,
    /// The convex polygons of the tile.
    pub polygons: Vec<TilePolygon>,
    /// One detail sub-mesh per polygon, in the same order as [`Self::polygons`].
    pub detail_meshes: Vec<DetailSubMesh>,
    /// Detail vertices in world space. Each sub-mesh starts with copies of its polygon's vertices.
    pub detail_vertices: Vec<Vec3>,
    /// Detail triangles, indexed relative to their sub-mesh's first vertex.
    pub detail_triangles: Vec<DetailTriangle>,
    /// Bounding volume tree over the polygons, stored depth-first.
    /// Empty if the tile was built without one.
    pub bv_tree: Vec<BvNode>,
}

/// Placement and build parameters of a tile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileHeader {
    /// The integer tile coordinate the tile was built for.
    pub coord: IVec2,
    /// The world space bounds of the tile's polygons.
    pub aabb: Aabb3d,
    /// The agent height the tile was built for. `[Units: wu]`
    pub walkable_height: f32,
    /// The agent radius the tile was built for. `[Units: wu]`
    pub walkable_radius: f32,
    /// The agent climb the tile was built for. `[Units: wu]`
    pub walkable_climb: f32,
    /// The xz-plane cell size of the voxel grid. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell size of the voxel grid. `[Units: wu]`
    pub cell_height: f32,
    /// The maximum number of vertices of a polygon in this tile.
    pub max_vertices_per_polygon: u8,
    /// Multiplier converting world units relative to [`Self::aabb`]'s minimum into [`BvNode`] units.
    pub bv_quant_factor: f32,
}

/// A convex polygon of a tile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TilePolygon {
    /// Indices into [`TileData::vertices`], in clockwise order seen from above.
    pub vertices: Vec<u16>,
    /// What lies across each edge. Edge `i` goes from `vertices[i]` to `vertices[i + 1]`.
    pub neighbors: Vec<EdgeLink>,
    /// The area id of the polygon.
    pub area: u8,
    /// User defined flags.
    pub flags: u16,
}

/// What lies across a polygon edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeLink {
    /// Nothing. The edge is a wall.
    #[default]
    Boundary,
    /// Another polygon in the same tile.
    Internal(u16),
    /// The edge lies on the tile border and may connect to a polygon of the neighboring tile.
    Portal(TileSide),
}

/// A side of a tile on the xz-plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileSide {
    /// The side facing +x.
    PosX,
    /// The side facing +z.
    PosZ,
    /// The side facing -x.
    NegX,
    /// The side facing -z.
    NegZ,
}

impl TileSide {
    /// All sides, in counter-clockwise order starting at +x.
    pub const ALL: [TileSide; 4] = [
        TileSide::PosX,
        TileSide::PosZ,
        TileSide::NegX,
        TileSide::NegZ,
    ];

    /// The side of the neighboring tile that faces this side.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            TileSide::PosX => TileSide::NegX,
            TileSide::PosZ => TileSide::NegZ,
            TileSide::NegX => TileSide::PosX,
            TileSide::NegZ => TileSide::PosZ,
        }
    }

    /// The tile coordinate offset towards the neighbor on this side.
    #[inline]
    pub fn offset(self) -> IVec2 {
        match self {
            TileSide::PosX => IVec2::new(1, 0),
            TileSide::PosZ => IVec2::new(0, 1),
            TileSide::NegX => IVec2::new(-1, 0),
            TileSide::NegZ => IVec2::new(0, -1),
        }
    }
}

/// The detail triangulation of one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetailSubMesh {
    /// Index of the first vertex in [`TileData::detail_vertices`].
    pub first_vertex: u32,
    /// Number of vertices of the sub-mesh.
    pub vertex_count: u32,
    /// Index of the first triangle in [`TileData::detail_triangles`].
    pub first_triangle: u32,
    /// Number of triangles of the sub-mesh.
    pub triangle_count: u32,
}

/// A triangle of a detail sub-mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetailTriangle {
    /// Vertex indices relative to [`DetailSubMesh::first_vertex`].
    pub vertices: [u16; 3],
    /// Two bits per edge, set to [`DetailTriangle::EDGE_BOUNDARY`] when the edge lies on the polygon outline.
    pub edge_flags: u8,
}

impl DetailTriangle {
    /// Marks a detail edge that lies on the polygon outline.
    pub const EDGE_BOUNDARY: u8 = 0x1;

    /// Returns `true` if edge `edge` (0..3) lies on the polygon outline.
    #[inline]
    pub fn is_boundary_edge(&self, edge: usize) -> bool {
        (self.edge_flags >> (edge * 2)) & 0x3 == Self::EDGE_BOUNDARY
    }
}

/// A node of the bounding volume tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BvNode {
    /// Quantized minimum bounds.
    pub min: U16Vec3,
    /// Quantized maximum bounds.
    pub max: U16Vec3,
    /// Polygon index for leaf nodes, negative escape offset for internal nodes.
    pub index: i32,
}

impl BvNode {
    /// Returns `true` if the node references a polygon.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.index >= 0
    }
}

impl TileData {
    /// The number of polygons in the tile.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// The world space vertices of polygon `index`.
    pub fn polygon_vertices(&self, index: usize) -> impl Iterator<Item = Vec3> + '_ {
        self.polygons[index]
            .vertices
            .iter()
            .map(|&v| self.vertices[v as usize])
    }

    /// Checks that every index stored in the tile is in range.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), TileValidationError> {
        let vertex_count = self.vertices.len();
        let polygon_count = self.polygons.len();
        for (i, polygon) in self.polygons.iter().enumerate() {
            if polygon.vertices.len() < 3 {
                return Err(TileValidationError::DegeneratePolygon { polygon: i });
            }
            if polygon.vertices.len() != polygon.neighbors.len() {
                return Err(TileValidationError::NeighborCountMismatch {
                    polygon: i,
                    vertices: polygon.vertices.len(),
                    neighbors: polygon.neighbors.len(),
                });
            }
            if let Some(&vertex) = polygon
                .vertices
                .iter()
                .find(|&&v| v as usize >= vertex_count)
            {
                return Err(TileValidationError::MissingVertex { polygon: i, vertex });
            }
            for link in &polygon.neighbors {
                if let EdgeLink::Internal(neighbor) = *link
                    && neighbor as usize >= polygon_count
                {
                    return Err(TileValidationError::DanglingLink {
                        polygon: i,
                        neighbor,
                    });
                }
            }
        }
        if !self.detail_meshes.is_empty() && self.detail_meshes.len() != polygon_count {
            return Err(TileValidationError::DetailMeshCountMismatch {
                polygons: polygon_count,
                detail_meshes: self.detail_meshes.len(),
            });
        }
        for (i, mesh) in self.detail_meshes.iter().enumerate() {
            let vertex_end = mesh.first_vertex as usize + mesh.vertex_count as usize;
            let triangle_end = mesh.first_triangle as usize + mesh.triangle_count as usize;
            if vertex_end > self.detail_vertices.len()
                || triangle_end > self.detail_triangles.len()
            {
                return Err(TileValidationError::DetailOutOfRange { detail_mesh: i });
            }
            let triangles = &self.detail_triangles[mesh.first_triangle as usize..triangle_end];
            if triangles
                .iter()
                .flat_map(|t| t.vertices)
                .any(|v| v as u32 >= mesh.vertex_count)
            {
                return Err(TileValidationError::DetailOutOfRange { detail_mesh: i });
            }
        }
        if let Some(node) = self
            .bv_tree
            .iter()
            .find(|node| node.is_leaf() && node.index as usize >= polygon_count)
        {
            return Err(TileValidationError::BvLeafOutOfRange {
                polygon: node.index,
            });
        }
        Ok(())
    }
}

/// Inconsistencies found by [`TileData::validate`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileValidationError {
    /// A polygon has fewer than three vertices.
    #[error("polygon {polygon} has fewer than 3 vertices")]
    DegeneratePolygon {
        /// The polygon index
        polygon: usize,
    },
    /// A polygon does not have one neighbor entry per edge.
    #[error("polygon {polygon} has {vertices} vertices but {neighbors} neighbors")]
    NeighborCountMismatch {
        /// The polygon index
        polygon: usize,
        /// The number of vertices
        vertices: usize,
        /// The number of neighbor entries
        neighbors: usize,
    },
    /// A polygon references a vertex that does not exist.
    #[error("polygon {polygon} references missing vertex {vertex}")]
    MissingVertex {
        /// The polygon index
        polygon: usize,
        /// The missing vertex index
        vertex: u16,
    },
    /// A polygon links to a polygon of the same tile that does not exist.
    #[error("polygon {polygon} links to missing polygon {neighbor}")]
    DanglingLink {
        /// The polygon index
        polygon: usize,
        /// The missing neighbor index
        neighbor: u16,
    },
    /// The tile has detail meshes, but not one per polygon.
    #[error("expected {polygons} detail meshes, found {detail_meshes}")]
    DetailMeshCountMismatch {
        /// The number of polygons
        polygons: usize,
        /// The number of detail meshes
        detail_meshes: usize,
    },
    /// A detail mesh reaches past the detail vertices or triangles.
    #[error("detail mesh {detail_mesh} is out of range")]
    DetailOutOfRange {
        /// The detail mesh index
        detail_mesh: usize,
    },
    /// A bounding volume tree leaf references a polygon that does not exist.
    #[error("bv node references missing polygon {polygon}")]
    BvLeafOutOfRange {
        /// The referenced polygon index
        polygon: i32,
    },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn square_tile() -> TileData {
        TileData {
            header: TileHeader {
                coord: IVec2::ZERO,
                aabb: Aabb3d::new(Vec3::ZERO, [1.0, 0.0, 1.0]),
                walkable_height: 2.0,
                walkable_radius: 0.5,
                walkable_climb: 0.25,
                cell_size: 0.25,
                cell_height: 0.2,
                max_vertices_per_polygon: 6,
                bv_quant_factor: 4.0,
            },
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
            ],
            polygons: vec![TilePolygon {
                vertices: vec![0, 1, 2, 3],
                neighbors: vec![
                    EdgeLink::Portal(TileSide::NegX),
                    EdgeLink::Boundary,
                    EdgeLink::Boundary,
                    EdgeLink::Boundary,
                ],
                area: 63,
                flags: 1,
            }],
            detail_meshes: vec![DetailSubMesh {
                first_vertex: 0,
                vertex_count: 4,
                first_triangle: 0,
                triangle_count: 2,
            }],
            detail_vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
            ],
            detail_triangles: vec![
                DetailTriangle {
                    vertices: [0, 1, 2],
                    edge_flags: 0b0101,
                },
                DetailTriangle {
                    vertices: [0, 2, 3],
                    edge_flags: 0b0001_0100,
                },
            ],
            bv_tree: vec![BvNode {
                min: U16Vec3::ZERO,
                max: U16Vec3::new(4, 0, 4),
                index: 0,
            }],
        }
    }

    #[test]
    fn valid_tile_passes_validation() {
        assert_eq!(square_tile().validate(), Ok(()));
    }

    #[test]
    fn missing_vertex_is_reported() {
        let mut tile = square_tile();
        tile.polygons[0].vertices[2] = 9;
        assert_eq!(
            tile.validate(),
            Err(TileValidationError::MissingVertex {
                polygon: 0,
                vertex: 9
            })
        );
    }

    #[test]
    fn dangling_internal_link_is_reported() {
        let mut tile = square_tile();
        tile.polygons[0].neighbors[1] = EdgeLink::Internal(3);
        assert_eq!(
            tile.validate(),
            Err(TileValidationError::DanglingLink {
                polygon: 0,
                neighbor: 3
            })
        );
    }

    #[test]
    fn detail_mesh_past_its_triangles_is_reported() {
        let mut tile = square_tile();
        tile.detail_meshes[0].triangle_count = 3;
        assert_eq!(
            tile.validate(),
            Err(TileValidationError::DetailOutOfRange { detail_mesh: 0 })
        );

        let mut tile = square_tile();
        tile.detail_triangles[1].vertices[2] = 4;
        assert_eq!(
            tile.validate(),
            Err(TileValidationError::DetailOutOfRange { detail_mesh: 0 })
        );
    }

    #[test]
    fn bv_leaf_past_the_polygons_is_reported() {
        let mut tile = square_tile();
        tile.bv_tree[0].index = 1;
        assert_eq!(
            tile.validate(),
            Err(TileValidationError::BvLeafOutOfRange { polygon: 1 })
        );
    }

    #[test]
    fn opposite_sides_point_back() {
        for side in TileSide::ALL {
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(side.offset() + side.opposite().offset(), IVec2::ZERO);
        }
    }

    #[test]
    fn boundary_edges_are_decoded_from_flags() {
        let tile = square_tile();
        let tri = tile.detail_triangles[1];
        assert!(!tri.is_boundary_edge(0));
        assert!(tri.is_boundary_edge(2));
    }
}
