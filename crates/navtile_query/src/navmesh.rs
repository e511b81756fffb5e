//! Runtime storage of navmesh tiles and the links between their polygons.

use std::collections::HashMap;

use glam::{IVec2, U16Vec3, Vec2, Vec3, Vec3Swizzles as _};
use navtile_data::{Aabb3d, EdgeLink, TileData, TileDataError, TileSide};
use slotmap::SlotMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::math::{
    closest_height_on_triangle, distance_point_segment_sqr_2d, overlap_slabs, point_in_polygon,
};

slotmap::new_key_type! {
    /// A generational key of a tile loaded into a [`Navmesh`].
    /// Keys of removed tiles never become valid again.
    pub struct TileKey;
}

/// A reference to a single polygon of a loaded tile.
///
/// Becomes invalid once its tile is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyRef {
    /// The tile the polygon belongs to.
    pub tile: TileKey,
    /// The index of the polygon inside its tile.
    pub poly: u16,
}

/// A traversable connection from one polygon edge to a neighboring polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// The polygon on the other side of the edge.
    pub neighbor: PolyRef,
    /// The edge of the owning polygon the link crosses.
    pub edge: u8,
    /// The part of the edge shared with the neighbor, as parameters from the edge's first
    /// vertex to its second. Internal links always span `(0.0, 1.0)`.
    pub range: (f32, f32),
}

impl Link {
    #[inline]
    fn covers_whole_edge(&self) -> bool {
        self.range.0 <= 0.0 && self.range.1 >= 1.0
    }
}

/// A tile loaded into a [`Navmesh`].
#[derive(Debug, Clone)]
pub struct MeshTile {
    coord: IVec2,
    data: TileData,
    /// Links per polygon.
    links: Vec<Vec<Link>>,
}

impl MeshTile {
    /// The coordinate the tile was added at.
    #[inline]
    pub fn coord(&self) -> IVec2 {
        self.coord
    }

    /// The decoded tile data.
    #[inline]
    pub fn data(&self) -> &TileData {
        &self.data
    }

    /// All links leaving polygon `poly`.
    #[inline]
    pub fn links(&self, poly: u16) -> &[Link] {
        self.links.get(poly as usize).map_or(&[], Vec::as_slice)
    }
}

/// A set of tiles, stitched together along their borders.
///
/// At most one tile is loaded per coordinate. Replacing a tile means removing it first.
#[derive(Debug, Clone)]
pub struct Navmesh {
    tiles: SlotMap<TileKey, MeshTile>,
    coords: HashMap<IVec2, TileKey>,
    tile_size: f32,
}

impl Navmesh {
    /// Distance in world units by which the ends of two border edges are shrunk before
    /// checking whether they overlap, so that edges touching at a single point stay unlinked.
    const PORTAL_SHRINK: f32 = 0.01;
    /// How far two border edges may be apart across the border and still be linked.
    const PORTAL_PLANE_TOLERANCE: f32 = 0.01;

    /// Creates an empty navmesh whose tiles are `tile_size` world units wide.
    ///
    /// # Errors
    ///
    /// Returns [`NavmeshError::InvalidTileSize`] if `tile_size` is not a finite positive number.
    pub fn new(tile_size: f32) -> Result<Self, NavmeshError> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(NavmeshError::InvalidTileSize(tile_size));
        }
        Ok(Self {
            tiles: SlotMap::with_key(),
            coords: HashMap::new(),
            tile_size,
        })
    }

    /// The world size of a tile on the xz-plane.
    #[inline]
    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// The number of loaded tiles.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// The key of the tile loaded at `coord`.
    #[inline]
    pub fn tile_at(&self, coord: IVec2) -> Option<TileKey> {
        self.coords.get(&coord).copied()
    }

    /// The tile behind `key`, if it is still loaded.
    #[inline]
    pub fn tile(&self, key: TileKey) -> Option<&MeshTile> {
        self.tiles.get(key)
    }

    /// Iterates over all loaded tiles.
    pub fn tiles(&self) -> impl Iterator<Item = (TileKey, &MeshTile)> {
        self.tiles.iter()
    }

    /// The tile coordinate containing the world position `pos`.
    #[inline]
    pub fn tile_coord_at(&self, pos: Vec3) -> IVec2 {
        (pos.xz() / self.tile_size).floor().as_ivec2()
    }

    /// Returns `true` if `poly` points to a polygon of a loaded tile.
    pub fn is_valid_poly_ref(&self, poly: PolyRef) -> bool {
        self.tiles
            .get(poly.tile)
            .is_some_and(|tile| (poly.poly as usize) < tile.data.polygon_count())
    }

    /// Decodes `blob` and loads it at `coord`, linking it with the tiles around it.
    ///
    /// # Errors
    ///
    /// Returns [`NavmeshError::TileOccupied`] if a tile is already loaded at `coord`,
    /// or [`NavmeshError::InvalidTileData`] if the blob cannot be decoded.
    pub fn add_tile(&mut self, coord: IVec2, blob: &[u8]) -> Result<TileKey, NavmeshError> {
        if self.coords.contains_key(&coord) {
            return Err(NavmeshError::TileOccupied { coord });
        }
        let data = TileData::from_bytes(blob)?;
        if data.header.coord != coord {
            warn!(
                "Tile built for {} is loaded at {coord}, portals may not line up",
                data.header.coord
            );
        }

        let polygon_count = data.polygon_count();
        let key = self.tiles.insert_with_key(|key| {
            let links = data
                .polygons
                .iter()
                .map(|polygon| {
                    polygon
                        .neighbors
                        .iter()
                        .enumerate()
                        .filter_map(|(edge, link)| match link {
                            EdgeLink::Internal(neighbor) => Some(Link {
                                neighbor: PolyRef {
                                    tile: key,
                                    poly: *neighbor,
                                },
                                edge: edge as u8,
                                range: (0.0, 1.0),
                            }),
                            _ => None,
                        })
                        .collect()
                })
                .collect();
            MeshTile { coord, data, links }
        });
        self.coords.insert(coord, key);

        for side in TileSide::ALL {
            let Some(neighbor) = self.tile_at(coord + side.offset()) else {
                continue;
            };
            self.connect_external_links(key, neighbor, side);
            self.connect_external_links(neighbor, key, side.opposite());
        }

        info!("Added tile at {coord} with {polygon_count} polygons");
        Ok(key)
    }

    /// Evicts the tile at `coord` and returns its data.
    /// Every [`PolyRef`] into the tile becomes invalid.
    ///
    /// # Errors
    ///
    /// Returns [`NavmeshError::TileNotFound`] if no tile is loaded at `coord`.
    pub fn remove_tile(&mut self, coord: IVec2) -> Result<TileData, NavmeshError> {
        let key = self
            .coords
            .remove(&coord)
            .ok_or(NavmeshError::TileNotFound { coord })?;
        let tile = self
            .tiles
            .remove(key)
            .ok_or(NavmeshError::TileNotFound { coord })?;

        for side in TileSide::ALL {
            let Some(neighbor) = self.tile_at(coord + side.offset()) else {
                continue;
            };
            if let Some(neighbor) = self.tiles.get_mut(neighbor) {
                for links in &mut neighbor.links {
                    links.retain(|link| link.neighbor.tile != key);
                }
            }
        }

        info!("Removed tile at {coord}");
        Ok(tile.data)
    }

    /// Links the portal edges of `from` on `side` to the matching edges of `to`.
    fn connect_external_links(&mut self, from: TileKey, to: TileKey, side: TileSide) {
        let (Some(from_tile), Some(to_tile)) = (self.tiles.get(from), self.tiles.get(to)) else {
            return;
        };
        let climb = from_tile
            .data
            .header
            .walkable_climb
            .max(to_tile.data.header.walkable_climb);

        let mut new_links = Vec::new();
        for (poly, polygon) in from_tile.data.polygons.iter().enumerate() {
            let n = polygon.vertices.len();
            for (edge, link) in polygon.neighbors.iter().enumerate() {
                if *link != EdgeLink::Portal(side) {
                    continue;
                }
                let va = from_tile.data.vertices[polygon.vertices[edge] as usize];
                let vb = from_tile.data.vertices[polygon.vertices[(edge + 1) % n] as usize];
                for (neighbor, (na, nb)) in portal_edges(&to_tile.data, side.opposite()) {
                    if (slab_coord(va, side) - slab_coord(na, side)).abs()
                        > Self::PORTAL_PLANE_TOLERANCE
                    {
                        continue;
                    }
                    if !overlap_slabs(
                        slab(va, vb, side),
                        slab(na, nb, side),
                        Self::PORTAL_SHRINK,
                        climb,
                    ) {
                        continue;
                    }
                    // Parametrize the neighbor's edge along ours.
                    let u = |v: Vec3| along_border(v, side);
                    let len = u(vb) - u(va);
                    let (mut tmin, mut tmax) = ((u(na) - u(va)) / len, (u(nb) - u(va)) / len);
                    if tmin > tmax {
                        std::mem::swap(&mut tmin, &mut tmax);
                    }
                    new_links.push((
                        poly,
                        Link {
                            neighbor: PolyRef {
                                tile: to,
                                poly: neighbor,
                            },
                            edge: edge as u8,
                            range: (tmin.clamp(0.0, 1.0), tmax.clamp(0.0, 1.0)),
                        },
                    ));
                }
            }
        }

        let count = new_links.len();
        if let Some(from_tile) = self.tiles.get_mut(from) {
            for (poly, link) in new_links {
                from_tile.links[poly].push(link);
            }
        }
        debug!("Connected {count} portal links on side {side:?}");
    }

    /// Finds the polygon closest to `center` among those overlapping the box `center ± extent`.
    /// Returns the polygon together with the closest point on it.
    ///
    /// A point hovering above or below a polygon within the tile's climb height counts as lying on it.
    pub fn find_nearest_poly(&self, center: Vec3, extent: Vec3) -> Option<(PolyRef, Vec3)> {
        let bounds = Aabb3d::new(center - extent, center + extent);
        let mut nearest = None;
        let mut nearest_distance = f32::MAX;
        for (key, tile) in self.tiles.iter() {
            if !tile.data.header.aabb.intersects(&bounds) {
                continue;
            }
            let climb = tile.data.header.walkable_climb;
            for poly in query_polygons(&tile.data, &bounds) {
                let poly = PolyRef { tile: key, poly };
                let Some((closest, over_poly)) = self.closest_point_on_poly(poly, center) else {
                    continue;
                };
                let diff = center - closest;
                let distance = if over_poly {
                    let d = diff.y.abs() - climb;
                    if d > 0.0 { d * d } else { 0.0 }
                } else {
                    diff.length_squared()
                };
                if distance < nearest_distance {
                    nearest_distance = distance;
                    nearest = Some((poly, closest));
                }
            }
        }
        nearest
    }

    /// Finds the point on `poly` closest to `pos`.
    ///
    /// The flag is `true` if `pos` lies above or below the polygon, in which case the point
    /// is `pos` moved onto the detail surface.
    pub fn closest_point_on_poly(&self, poly: PolyRef, pos: Vec3) -> Option<(Vec3, bool)> {
        let vertices = self.poly_vertices(poly)?;
        if let Some(height) = self.poly_height(poly, pos) {
            return Some((pos.with_y(height), true));
        }

        let n = vertices.len();
        let (closest, _) = (0..n)
            .map(|i| {
                let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                let (distance, t) = distance_point_segment_sqr_2d(pos, a, b);
                (a.lerp(b, t), distance)
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))?;
        Some((closest, false))
    }

    /// The height of the detail surface of `poly` at the xz-position of `pos`.
    ///
    /// Returns `None` if `pos` does not lie above or below the polygon.
    pub fn poly_height(&self, poly: PolyRef, pos: Vec3) -> Option<f32> {
        let tile = self.tiles.get(poly.tile)?;
        let vertices = self.poly_vertices(poly)?;
        if !point_in_polygon(pos, &vertices) {
            return None;
        }

        if let Some(mesh) = tile.data.detail_meshes.get(poly.poly as usize) {
            let first_vertex = mesh.first_vertex as usize;
            let first_triangle = mesh.first_triangle as usize;
            let triangles = tile
                .data
                .detail_triangles
                .get(first_triangle..first_triangle + mesh.triangle_count as usize)?;
            for triangle in triangles {
                let [a, b, c] = triangle
                    .vertices
                    .map(|v| tile.data.detail_vertices[first_vertex + v as usize]);
                if let Some(height) = closest_height_on_triangle(pos, a, b, c) {
                    return Some(height);
                }
            }
        }

        // Numerical slop along the outline, use the nearest edge.
        let n = vertices.len();
        (0..n)
            .map(|i| {
                let (a, b) = (vertices[i], vertices[(i + 1) % n]);
                let (distance, t) = distance_point_segment_sqr_2d(pos, a, b);
                (a.lerp(b, t).y, distance)
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(height, _)| height)
    }

    /// The world space vertices of `poly`.
    pub fn poly_vertices(&self, poly: PolyRef) -> Option<Vec<Vec3>> {
        let tile = self.tiles.get(poly.tile)?;
        let polygon = tile.data.polygons.get(poly.poly as usize)?;
        Some(
            polygon
                .vertices
                .iter()
                .map(|&v| tile.data.vertices[v as usize])
                .collect(),
        )
    }

    /// The shared segment of the edge `link` crosses, as `(left, right)` seen from `from`.
    pub(crate) fn portal_points(&self, from: PolyRef, link: &Link) -> Option<(Vec3, Vec3)> {
        let tile = self.tiles.get(from.tile)?;
        let polygon = tile.data.polygons.get(from.poly as usize)?;
        let n = polygon.vertices.len();
        let edge = link.edge as usize;
        let left = tile.data.vertices[polygon.vertices[edge] as usize];
        let right = tile.data.vertices[polygon.vertices[(edge + 1) % n] as usize];
        if link.covers_whole_edge() {
            Some((left, right))
        } else {
            Some((left.lerp(right, link.range.0), left.lerp(right, link.range.1)))
        }
    }

    /// The link leaving `from` towards `to`.
    pub(crate) fn link_between(&self, from: PolyRef, to: PolyRef) -> Option<&Link> {
        self.tiles
            .get(from.tile)?
            .links(from.poly)
            .iter()
            .find(|link| link.neighbor == to)
    }
}

/// All polygons of `tile` whose bounds overlap `bounds`.
fn query_polygons(tile: &TileData, bounds: &Aabb3d) -> Vec<u16> {
    let header = &tile.header;
    if tile.bv_tree.is_empty() {
        return (0..tile.polygon_count())
            .filter(|&i| {
                Aabb3d::from_verts(&tile.polygon_vertices(i).collect::<Vec<_>>())
                    .is_some_and(|aabb| aabb.intersects(bounds))
            })
            .map(|i| i as u16)
            .collect();
    }

    // Quantize the query box into the tree's space.
    let tile_min = header.aabb.min;
    let tile_max = header.aabb.max;
    let quant = header.bv_quant_factor;
    let min = (bounds.min.max(tile_min).min(tile_max) - tile_min) * quant;
    let max = (bounds.max.max(tile_min).min(tile_max) - tile_min) * quant;
    let query_min = U16Vec3::new(
        min.x as u16 & 0xfffe,
        min.y as u16 & 0xfffe,
        min.z as u16 & 0xfffe,
    );
    let query_max = U16Vec3::new(
        (max.x + 1.0) as u16 | 1,
        (max.y + 1.0) as u16 | 1,
        (max.z + 1.0) as u16 | 1,
    );

    let mut polygons = Vec::new();
    let mut i = 0;
    while i < tile.bv_tree.len() {
        let node = &tile.bv_tree[i];
        let overlap = query_min.cmple(node.max).all() && query_max.cmpge(node.min).all();
        if node.is_leaf() {
            if overlap {
                polygons.push(node.index as u16);
            }
            i += 1;
        } else if overlap {
            i += 1;
        } else {
            // Skip the whole subtree.
            i += node.index.unsigned_abs() as usize;
        }
    }
    polygons
}

/// Every edge of `tile` marked as a portal towards `side`, with the polygon owning it.
fn portal_edges(tile: &TileData, side: TileSide) -> impl Iterator<Item = (u16, (Vec3, Vec3))> + '_ {
    tile.polygons
        .iter()
        .enumerate()
        .flat_map(move |(poly, polygon)| {
            let n = polygon.vertices.len();
            polygon
                .neighbors
                .iter()
                .enumerate()
                .filter(move |(_, link)| **link == EdgeLink::Portal(side))
                .map(move |(edge, _)| {
                    let a = tile.vertices[polygon.vertices[edge] as usize];
                    let b = tile.vertices[polygon.vertices[(edge + 1) % n] as usize];
                    (poly as u16, (a, b))
                })
        })
}

/// The position across the border, which is the same for every edge on it.
#[inline]
fn slab_coord(v: Vec3, side: TileSide) -> f32 {
    match side {
        TileSide::PosX | TileSide::NegX => v.x,
        TileSide::PosZ | TileSide::NegZ => v.z,
    }
}

/// The position along the border.
#[inline]
fn along_border(v: Vec3, side: TileSide) -> f32 {
    match side {
        TileSide::PosX | TileSide::NegX => v.z,
        TileSide::PosZ | TileSide::NegZ => v.x,
    }
}

/// A border edge projected onto the border plane, sorted along the border.
fn slab(a: Vec3, b: Vec3, side: TileSide) -> (Vec2, Vec2) {
    let a = Vec2::new(along_border(a, side), a.y);
    let b = Vec2::new(along_border(b, side), b.y);
    if a.x <= b.x { (a, b) } else { (b, a) }
}

/// Errors returned by [`Navmesh`].
#[derive(Error, Debug)]
pub enum NavmeshError {
    /// The tile size is zero, negative or not finite.
    #[error("Tile size must be finite and positive, got {0}")]
    InvalidTileSize(f32),
    /// A tile is already loaded at the coordinate.
    #[error("A tile is already loaded at {coord}")]
    TileOccupied {
        /// The occupied coordinate
        coord: IVec2,
    },
    /// No tile is loaded at the coordinate.
    #[error("No tile is loaded at {coord}")]
    TileNotFound {
        /// The empty coordinate
        coord: IVec2,
    },
    /// The tile blob could not be decoded.
    #[error("Invalid tile data: {0}")]
    InvalidTileData(#[from] TileDataError),
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;
    use navtile_data::{BvNode, DetailSubMesh, DetailTriangle, TileHeader, TilePolygon};

    use super::*;

    /// A flat square tile of size `size` at `coord`, split into two triangles along its diagonal,
    /// with portals on every side.
    pub(crate) fn square_tile(coord: IVec2, size: f32, height: f32) -> TileData {
        let origin = Vec3::new(coord.x as f32 * size, height, coord.y as f32 * size);
        let vertices = vec![
            origin,
            origin + Vec3::new(0.0, 0.0, size),
            origin + Vec3::new(size, 0.0, size),
            origin + Vec3::new(size, 0.0, 0.0),
        ];
        TileData {
            header: TileHeader {
                coord,
                aabb: Aabb3d::new(origin, origin + Vec3::new(size, 0.0, size)),
                walkable_height: 2.0,
                walkable_radius: 0.5,
                walkable_climb: 0.25,
                cell_size: 0.25,
                cell_height: 0.2,
                max_vertices_per_polygon: 6,
                bv_quant_factor: 4.0,
            },
            vertices: vertices.clone(),
            polygons: vec![
                // (0, 1, 2)
                TilePolygon {
                    vertices: vec![0, 1, 2],
                    neighbors: vec![
                        EdgeLink::Portal(TileSide::NegX),
                        EdgeLink::Portal(TileSide::PosZ),
                        EdgeLink::Internal(1),
                    ],
                    area: 63,
                    flags: 1,
                },
                // (0, 2, 3)
                TilePolygon {
                    vertices: vec![0, 2, 3],
                    neighbors: vec![
                        EdgeLink::Internal(0),
                        EdgeLink::Portal(TileSide::PosX),
                        EdgeLink::Portal(TileSide::NegZ),
                    ],
                    area: 63,
                    flags: 1,
                },
            ],
            detail_meshes: vec![
                DetailSubMesh {
                    first_vertex: 0,
                    vertex_count: 3,
                    first_triangle: 0,
                    triangle_count: 1,
                },
                DetailSubMesh {
                    first_vertex: 3,
                    vertex_count: 3,
                    first_triangle: 1,
                    triangle_count: 1,
                },
            ],
            detail_vertices: vec![
                vertices[0],
                vertices[1],
                vertices[2],
                vertices[0],
                vertices[2],
                vertices[3],
            ],
            detail_triangles: vec![
                DetailTriangle {
                    vertices: [0, 1, 2],
                    edge_flags: 0b01_0101,
                },
                DetailTriangle {
                    vertices: [0, 1, 2],
                    edge_flags: 0b01_0101,
                },
            ],
            bv_tree: vec![
                BvNode {
                    min: U16Vec3::ZERO,
                    max: U16Vec3::new((size * 4.0) as u16, 0, (size * 4.0) as u16),
                    index: -3,
                },
                BvNode {
                    min: U16Vec3::ZERO,
                    max: U16Vec3::new((size * 4.0) as u16, 0, (size * 4.0) as u16),
                    index: 0,
                },
                BvNode {
                    min: U16Vec3::ZERO,
                    max: U16Vec3::new((size * 4.0) as u16, 0, (size * 4.0) as u16),
                    index: 1,
                },
            ],
        }
    }

    pub(crate) fn blob(tile: &TileData) -> Vec<u8> {
        tile.to_bytes().unwrap()
    }

    #[test]
    fn rejects_invalid_tile_size() {
        assert!(matches!(
            Navmesh::new(0.0),
            Err(NavmeshError::InvalidTileSize(_))
        ));
        assert!(matches!(
            Navmesh::new(f32::NAN),
            Err(NavmeshError::InvalidTileSize(_))
        ));
    }

    #[test]
    fn internal_links_are_built() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let key = navmesh.add_tile(IVec2::ZERO, &blob(&square_tile(IVec2::ZERO, 4.0, 0.0)))?;
        let tile = navmesh.tile(key).unwrap();
        assert_eq!(tile.links(0).len(), 1);
        assert_eq!(tile.links(0)[0].edge, 2);
        assert_eq!(tile.links(0)[0].neighbor, PolyRef { tile: key, poly: 1 });
        assert_eq!(tile.links(1)[0].neighbor, PolyRef { tile: key, poly: 0 });
        Ok(())
    }

    #[test]
    fn occupied_coordinate_is_rejected() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let data = blob(&square_tile(IVec2::ZERO, 4.0, 0.0));
        navmesh.add_tile(IVec2::ZERO, &data)?;
        assert!(matches!(
            navmesh.add_tile(IVec2::ZERO, &data),
            Err(NavmeshError::TileOccupied { .. })
        ));
        assert_eq!(navmesh.tile_count(), 1);
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        assert!(matches!(
            navmesh.add_tile(IVec2::ZERO, b"not a tile"),
            Err(NavmeshError::InvalidTileData(_))
        ));
        assert_eq!(navmesh.tile_count(), 0);
        Ok(())
    }

    #[test]
    fn neighbors_are_linked_both_ways() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let left = navmesh.add_tile(IVec2::ZERO, &blob(&square_tile(IVec2::ZERO, 4.0, 0.0)))?;
        let right_coord = IVec2::new(1, 0);
        let right = navmesh.add_tile(right_coord, &blob(&square_tile(right_coord, 4.0, 0.1)))?;

        // Polygon 1 owns the +x edge of the left tile, polygon 0 the -x edge of the right one.
        let outgoing = navmesh.tile(left).unwrap().links(1);
        let link = outgoing.iter().find(|l| l.neighbor.tile == right).unwrap();
        assert_eq!(link.neighbor.poly, 0);
        assert_eq!(link.edge, 1);
        assert_relative_eq!(link.range.0, 0.0);
        assert_relative_eq!(link.range.1, 1.0);
        let incoming = navmesh.tile(right).unwrap().links(0);
        assert!(incoming.iter().any(|l| l.neighbor == PolyRef { tile: left, poly: 1 }));
        Ok(())
    }

    #[test]
    fn tiles_too_far_apart_in_height_stay_unlinked() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let left = navmesh.add_tile(IVec2::ZERO, &blob(&square_tile(IVec2::ZERO, 4.0, 0.0)))?;
        let right_coord = IVec2::new(1, 0);
        navmesh.add_tile(right_coord, &blob(&square_tile(right_coord, 4.0, 3.0)))?;
        assert!(navmesh.tile(left).unwrap().links(1).iter().all(|l| l.neighbor.tile == left));
        Ok(())
    }

    #[test]
    fn removing_a_tile_unlinks_its_neighbors() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let left = navmesh.add_tile(IVec2::ZERO, &blob(&square_tile(IVec2::ZERO, 4.0, 0.0)))?;
        let right_coord = IVec2::new(1, 0);
        let original = square_tile(right_coord, 4.0, 0.0);
        let right = navmesh.add_tile(right_coord, &blob(&original))?;

        let removed = navmesh.remove_tile(right_coord)?;
        assert_eq!(removed, original);
        assert_eq!(navmesh.tile_count(), 1);
        assert!(navmesh.tile(right).is_none());
        assert!(!navmesh.is_valid_poly_ref(PolyRef { tile: right, poly: 0 }));
        assert_eq!(navmesh.tile(left).unwrap().links(1).len(), 1);
        assert!(matches!(
            navmesh.remove_tile(right_coord),
            Err(NavmeshError::TileNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn nearest_poly_snaps_onto_the_surface() -> anyhow::Result<()> {
        let mut navmesh = Navmesh::new(4.0)?;
        let key = navmesh.add_tile(IVec2::ZERO, &blob(&square_tile(IVec2::ZERO, 4.0, 1.0)))?;

        let (poly, point) = navmesh
            .find_nearest_poly(Vec3::new(3.0, 1.5, 1.0), Vec3::splat(1.0))
            .unwrap();
        assert_eq!(poly, PolyRef { tile: key, poly: 1 });
        assert_relative_eq!(point.y, 1.0);
        assert_relative_eq!(point.x, 3.0);

        // Outside the tile, the closest point lies on its outline.
        let (_, point) = navmesh
            .find_nearest_poly(Vec3::new(4.5, 1.0, 2.0), Vec3::splat(1.0))
            .unwrap();
        assert_relative_eq!(point.x, 4.0);
        assert_relative_eq!(point.z, 2.0);

        assert!(
            navmesh
                .find_nearest_poly(Vec3::new(20.0, 1.0, 20.0), Vec3::splat(1.0))
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn linear_scan_matches_bv_tree() {
        let tile = square_tile(IVec2::ZERO, 4.0, 0.0);
        let mut flat = tile.clone();
        flat.bv_tree.clear();
        let inside = Aabb3d::new(Vec3::new(3.0, -1.0, 0.5), Vec3::new(3.5, 1.0, 1.0));
        let outside = Aabb3d::new(Vec3::new(5.0, -1.0, 5.0), Vec3::new(6.0, 1.0, 6.0));
        assert_eq!(query_polygons(&tile, &inside), vec![0, 1]);
        assert_eq!(query_polygons(&flat, &inside), vec![0, 1]);
        assert!(query_polygons(&flat, &outside).is_empty());
    }

    #[test]
    fn tile_coordinates_follow_the_tile_size() -> anyhow::Result<()> {
        let navmesh = Navmesh::new(4.0)?;
        assert_eq!(navmesh.tile_coord_at(Vec3::new(5.0, 0.0, -1.0)), IVec2::new(1, -1));
        Ok(())
    }
}
